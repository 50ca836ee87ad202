use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    catalog::{
        Catalog,
        lecture::{Lecture, LectureFilter, LectureSummary, LectureUpdate, MoveDirection, NewLecture},
        progress::{CompleteModuleRequest, NavigateRequest, StudentProgress},
    },
    error::Result,
    identity::{Identity, IdentityHeaders},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveModuleRequest {
    /// current position of the module
    pub index: usize,
    pub direction: MoveDirection,
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures",
    method(get),
    tag = "lectures",
    params(LectureFilter),
    responses(
        (status = 200, description = "Lectures matching the filter", body = Vec<LectureSummary>)
    )
)]
pub async fn list_lectures(
    State(catalog): State<Arc<Catalog>>,
    Query(filter): Query<LectureFilter>,
) -> Result<Json<Vec<LectureSummary>>> {
    Ok(Json(catalog.list_lectures(&filter).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures",
    method(post),
    tag = "lectures",
    params(IdentityHeaders),
    request_body = NewLecture,
    responses(
        (status = 201, description = "Lecture created", body = Lecture),
        (status = 400, description = "Missing field or empty module list"),
        (status = 404, description = "Some modules do not exist")
    )
)]
pub async fn create_lecture(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Json(req): Json<NewLecture>,
) -> Result<(StatusCode, Json<Lecture>)> {
    let lecture = catalog.create_lecture(&identity, req).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}",
    method(get),
    tag = "lectures",
    params(("id" = i64, Path, description = "Lecture id")),
    responses(
        (status = 200, description = "Lecture with its modules in order", body = Lecture),
        (status = 404, description = "No such lecture")
    )
)]
pub async fn get_lecture(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<i64>,
) -> Result<Json<Lecture>> {
    Ok(Json(catalog.get_lecture(id).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}",
    method(put),
    tag = "lectures",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    request_body = LectureUpdate,
    responses(
        (status = 200, description = "Updated lecture", body = Lecture),
        (status = 400, description = "Invalid field or empty module list"),
        (status = 404, description = "No such lecture or module")
    )
)]
pub async fn update_lecture(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<LectureUpdate>,
) -> Result<Json<Lecture>> {
    Ok(Json(catalog.update_lecture(&identity, id, req).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}",
    method(delete),
    tag = "lectures",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    responses(
        (status = 204, description = "Lecture deleted"),
        (status = 404, description = "No such lecture")
    )
)]
pub async fn delete_lecture(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    catalog.delete_lecture(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}/move",
    method(post),
    tag = "lectures",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    request_body = MoveModuleRequest,
    responses(
        (status = 200, description = "Lecture with the new order", body = Lecture),
        (status = 400, description = "No module at that position"),
        (status = 404, description = "No such lecture")
    )
)]
pub async fn move_module(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<MoveModuleRequest>,
) -> Result<Json<Lecture>> {
    let lecture = catalog
        .move_module(&identity, id, req.index, req.direction)
        .await?;
    Ok(Json(lecture))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}/start",
    method(post),
    tag = "progress",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    responses(
        (status = 200, description = "New or existing progress", body = StudentProgress),
        (status = 404, description = "No such lecture")
    )
)]
pub async fn start_lecture(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<StudentProgress>> {
    Ok(Json(catalog.start_lecture(id, &identity).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}/complete",
    method(post),
    tag = "progress",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    request_body = CompleteModuleRequest,
    responses(
        (status = 200, description = "Updated progress", body = StudentProgress),
        (status = 400, description = "Module is not part of the lecture"),
        (status = 404, description = "Lecture not started")
    )
)]
pub async fn complete_module(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<CompleteModuleRequest>,
) -> Result<Json<StudentProgress>> {
    let progress = catalog
        .complete_module(id, req.module_id, &identity, req.score)
        .await?;
    Ok(Json(progress))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}/navigate",
    method(post),
    tag = "progress",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    request_body = NavigateRequest,
    responses(
        (status = 200, description = "Updated progress", body = StudentProgress),
        (status = 400, description = "Target position not reachable"),
        (status = 404, description = "Lecture not started")
    )
)]
pub async fn navigate(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<StudentProgress>> {
    Ok(Json(catalog.go_to_module(id, &identity, req.index).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/lectures/{id}/progress",
    method(get),
    tag = "progress",
    params(("id" = i64, Path, description = "Lecture id"), IdentityHeaders),
    responses(
        (status = 200, description = "Progress of the calling student", body = StudentProgress),
        (status = 404, description = "Lecture not started")
    )
)]
pub async fn get_progress(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<StudentProgress>> {
    Ok(Json(catalog.get_student_progress(id, &identity).await?))
}

pub fn get_lecture_scope() -> Router<Arc<Catalog>> {
    Router::new()
        .route("/lectures", get(list_lectures).post(create_lecture))
        .route(
            "/lectures/{id}",
            get(get_lecture).put(update_lecture).delete(delete_lecture),
        )
        .route("/lectures/{id}/move", post(move_module))
        .route("/lectures/{id}/start", post(start_lecture))
        .route("/lectures/{id}/complete", post(complete_module))
        .route("/lectures/{id}/navigate", post(navigate))
        .route("/lectures/{id}/progress", get(get_progress))
}
