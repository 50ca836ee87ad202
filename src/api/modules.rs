use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    catalog::{
        Catalog,
        module::{Module, ModuleFilter, ModuleSummary, ModuleUpdate, NewModule},
    },
    error::Result,
    identity::{Identity, IdentityHeaders},
};

#[utoipa::path(
    context_path = "/api",
    path = "/modules",
    method(get),
    tag = "modules",
    params(ModuleFilter),
    responses(
        (status = 200, description = "Modules matching the filter", body = Vec<ModuleSummary>)
    )
)]
pub async fn list_modules(
    State(catalog): State<Arc<Catalog>>,
    Query(filter): Query<ModuleFilter>,
) -> Result<Json<Vec<ModuleSummary>>> {
    Ok(Json(catalog.list_modules(&filter).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/modules",
    method(post),
    tag = "modules",
    params(IdentityHeaders),
    request_body = NewModule,
    responses(
        (status = 201, description = "Module created", body = Module),
        (status = 400, description = "Missing field, unknown type or malformed content"),
        (status = 403, description = "Caller may not author modules")
    )
)]
pub async fn create_module(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Json(req): Json<NewModule>,
) -> Result<(StatusCode, Json<Module>)> {
    let module = catalog.create_module(&identity, req).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

#[utoipa::path(
    context_path = "/api",
    path = "/modules/{id}",
    method(get),
    tag = "modules",
    params(("id" = i64, Path, description = "Module id")),
    responses(
        (status = 200, description = "The module", body = Module),
        (status = 404, description = "No such module")
    )
)]
pub async fn get_module(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<i64>,
) -> Result<Json<Module>> {
    Ok(Json(catalog.get_module(id).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/modules/{id}",
    method(put),
    tag = "modules",
    params(("id" = i64, Path, description = "Module id"), IdentityHeaders),
    request_body = ModuleUpdate,
    responses(
        (status = 200, description = "Updated module", body = Module),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "No such module")
    )
)]
pub async fn update_module(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(req): Json<ModuleUpdate>,
) -> Result<Json<Module>> {
    Ok(Json(catalog.update_module(&identity, id, req).await?))
}

#[utoipa::path(
    context_path = "/api",
    path = "/modules/{id}",
    method(delete),
    tag = "modules",
    params(("id" = i64, Path, description = "Module id"), IdentityHeaders),
    responses(
        (status = 204, description = "Module deleted"),
        (status = 404, description = "No such module"),
        (status = 409, description = "Module is still part of a lecture")
    )
)]
pub async fn delete_module(
    State(catalog): State<Arc<Catalog>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    catalog.delete_module(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn get_module_scope() -> Router<Arc<Catalog>> {
    Router::new()
        .route("/modules", get(list_modules).post(create_module))
        .route(
            "/modules/{id}",
            get(get_module).put(update_module).delete(delete_module),
        )
}
