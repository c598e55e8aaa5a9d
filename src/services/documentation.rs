use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::game::start_quiz,
        crate::routes::game::start_topic,
        crate::routes::game::get_session,
        crate::routes::game::get_question,
        crate::routes::game::submit_answer,
        crate::routes::game::complete_session,
        crate::routes::game::join_session,
        crate::routes::game::toggle_ready,
        crate::routes::game::pause_session,
        crate::routes::game::resume_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::error::ErrorBody,
            crate::dto::game::StartQuizRequest,
            crate::dto::game::StartTopicRequest,
            crate::dto::game::SessionDescriptor,
            crate::dto::game::SessionSnapshot,
            crate::dto::game::PlayerSummary,
            crate::dto::game::QuestionResponse,
            crate::dto::game::AnswerOption,
            crate::dto::game::SubmitAnswerRequest,
            crate::dto::game::AnswerResultResponse,
            crate::dto::game::CompletionResponse,
            crate::dto::game::PlayerResult,
            crate::dto::game::SessionSummary,
            crate::dto::game::JoinResponse,
            crate::dto::game::ReadyResponse,
            crate::dto::game::StatusResponse,
            crate::dto::game::LobbyUpdate,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Session creation and gameplay"),
        (name = "lobby", description = "Ready-up, pause and resume"),
        (name = "realtime", description = "WebSocket session channel"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the game routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
