use std::{fmt, str::FromStr};

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::Error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl FromStr for Role {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(Error::Unauthorized(format!("Unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// The caller of a request, as vouched for by the auth layer in front of us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn student(user_id: i64) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn teacher(user_id: i64) -> Self {
        Self::new(user_id, Role::Teacher)
    }

    pub fn can_author(&self) -> bool {
        matches!(self.role, Role::Teacher | Role::Admin)
    }

    /// Only teachers and admins may change the catalog.
    pub fn require_author(&self) -> crate::error::Result<()> {
        if self.can_author() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "User {} with role {} may not modify the catalog",
                self.user_id, self.role
            )))
        }
    }
}

/// Headers carrying the identity, for the api docs.
#[derive(IntoParams)]
#[into_params(parameter_in = Header, rename_all = "kebab-case")]
#[allow(dead_code)]
pub struct IdentityHeaders {
    x_user_id: i64,
    x_user_role: Role,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, Error> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized(format!("Missing {name} header")))
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Unauthorized(format!("Invalid {USER_ID_HEADER} header")))?;
        let role = header(parts, USER_ROLE_HEADER)?.parse()?;
        Ok(Identity { user_id, role })
    }
}
