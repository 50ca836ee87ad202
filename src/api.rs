pub mod courses;
pub mod lectures;
pub mod modules;

use std::{sync::Arc, time::Duration};

use axum::Router;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::catalog::{
    Catalog,
    course::{Course, NewCourse},
    lecture::{Lecture, LectureModule, LectureSummary, LectureUpdate, MoveDirection, NewLecture},
    module::{
        Module, ModuleContent, ModuleSummary, ModuleType, ModuleUpdate, NewModule, Question,
        QuestionContent, TestContent, TextContent, VisualContent,
    },
    progress::{CompleteModuleRequest, NavigateRequest, StudentProgress},
};
use crate::identity::Role;

#[derive(OpenApi)]
#[openapi(
    info(title = "Lecture catalog", version = "1.0"),
    paths(
        modules::list_modules,
        modules::create_module,
        modules::get_module,
        modules::update_module,
        modules::delete_module,
        courses::list_courses,
        courses::create_course,
        lectures::list_lectures,
        lectures::create_lecture,
        lectures::get_lecture,
        lectures::update_lecture,
        lectures::delete_lecture,
        lectures::move_module,
        lectures::start_lecture,
        lectures::complete_module,
        lectures::navigate,
        lectures::get_progress,
    ),
    components(schemas(
        Module,
        ModuleSummary,
        ModuleType,
        ModuleContent,
        TextContent,
        VisualContent,
        Question,
        QuestionContent,
        TestContent,
        NewModule,
        ModuleUpdate,
        Course,
        NewCourse,
        Lecture,
        LectureModule,
        LectureSummary,
        NewLecture,
        LectureUpdate,
        MoveDirection,
        lectures::MoveModuleRequest,
        StudentProgress,
        CompleteModuleRequest,
        NavigateRequest,
        Role,
    ))
)]
pub struct ApiDoc;

pub fn get_openapi_json() -> anyhow::Result<String> {
    Ok(ApiDoc::openapi().to_pretty_json()?)
}

/// All `/api` routes plus the swagger ui, without middleware.
pub fn router(catalog: Arc<Catalog>) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(modules::get_module_scope())
                .merge(courses::get_course_scope())
                .merge(lectures::get_lecture_scope()),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(catalog)
}

/// The router with tracing, cors and the request timeout applied.
pub fn app(catalog: Arc<Catalog>, request_timeout: Duration) -> Router {
    router(catalog)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
