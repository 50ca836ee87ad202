use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    catalog::{
        Catalog,
        course::{Course, NewCourse},
    },
    error::Result,
    identity::{Identity, IdentityHeaders},
};

#[utoipa::path(
    context_path = "/api",
    path = "/courses",
    method(get),
    tag = "courses",
    responses(
        (status = 200, description = "All courses by name", body = Vec<Course>)
    )
)]
pub async fn list_courses(State(catalog): State<Arc<Catalog>>) -> Result<Json<Vec<Course>>> {
    Ok(Json(catalog.list_courses().await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/courses",
    method(post),
    tag = "courses",
    params(IdentityHeaders),
    request_body = NewCourse,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 409, description = "A course with this name exists")
    )
)]
pub async fn create_course(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Json(req): Json<NewCourse>,
) -> Result<(StatusCode, Json<Course>)> {
    let course = catalog.create_course(&identity, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub fn get_course_scope() -> Router<Arc<Catalog>> {
    Router::new().route("/courses", get(list_courses).post(create_course))
}
