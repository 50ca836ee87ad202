use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;
use utoipa::ToSchema;

use super::{Catalog, required};
use crate::{
    error::{Error, Result},
    identity::Identity,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCourse {
    pub name: String,
}

/// make sure a course with this name exists
pub(crate) async fn register_course(conn: &mut SqliteConnection, name: &str) -> Result<()> {
    sqlx::query("insert or ignore into courses (name) values (?)")
        .bind(name)
        .execute(conn)
        .await?;
    Ok(())
}

impl Catalog {
    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>("select id, name from courses order by name")
            .fetch_all(&self.database)
            .await?;
        Ok(courses)
    }

    pub async fn create_course(&self, identity: &Identity, new: NewCourse) -> Result<Course> {
        identity.require_author()?;
        let name = required("name", &new.name)?;
        let result = sqlx::query("insert into courses (name) values (?)")
            .bind(&name)
            .execute(&self.database)
            .await;
        let id = match result {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(Error::conflict(format!("Course '{name}' already exists")));
            }
            Err(e) => return Err(e.into()),
        };
        info!("course {}-{} created by {}", id, name, identity.user_id);
        Ok(Course { id, name })
    }
}
