use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path of the generated OpenAPI document.
pub const OPENAPI_JSON: &str = "/api-docs/openapi.json";

/// Swagger UI at `/docs`, reading the document served at [`OPENAPI_JSON`].
pub fn router(state: SharedState) -> Router<SharedState> {
    let swagger = SwaggerUi::new("/docs").url(OPENAPI_JSON, ApiDoc::openapi());
    Router::<SharedState>::from(swagger).with_state(state)
}
