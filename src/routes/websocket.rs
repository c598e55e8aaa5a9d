use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{services::websocket_service, state::SharedState};

/// Query string of the realtime endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WsQuery {
    /// Bearer token of the connecting player.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/game/session/{id}/ws",
    tag = "realtime",
    params(
        ("id" = Uuid, Path, description = "Session to subscribe to"),
        WsQuery
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a realtime session channel.
///
/// Authorization happens after the upgrade; rejected callers receive a
/// policy-violation close frame.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(state, socket, session_id, query.token)
    })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/game/session/{id}/ws", get(ws_handler))
}
