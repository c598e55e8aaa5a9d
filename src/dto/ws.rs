use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dto::game::{
        AnswerResultResponse, LobbyUpdate, PlayerSummary, QuestionResponse, SessionSnapshot,
        SessionSummary, SubmitAnswerRequest,
    },
    state::game::UserId,
};

/// Events pushed to realtime session clients.
///
/// Serialized as `{"event": "<kebab-name>", "payload": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The session became active.
    SessionStart(SessionSnapshot),
    /// A new player joined the session.
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        session_id: Uuid,
        user_id: UserId,
        players: Vec<PlayerSummary>,
    },
    /// The question every player should now answer.
    Question(QuestionResponse),
    /// Outcome of a player's answer.
    AnswerResult(AnswerResultResponse),
    /// The session finished.
    SessionComplete(SessionSummary),
    /// A player's connection closed.
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        user_id: UserId,
        remaining_connections: usize,
    },
    /// Ready flags or lobby status changed.
    LobbyUpdate(LobbyUpdate),
    /// Keep-alive emitted on an interval.
    #[serde(rename_all = "camelCase")]
    ServerPing { server_time: i64 },
    /// Reply to a client `ping`.
    #[serde(rename_all = "camelCase")]
    Pong {
        id: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
        server_time: i64,
    },
    /// A request on this connection failed.
    Error { message: String, code: String },
}

/// Events accepted from realtime session clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Latency probe; echoed back as `pong`.
    Ping {
        #[serde(default)]
        id: Value,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    /// Answer to the current question.
    Answer(SubmitAnswerRequest),
    /// Request to finish the session.
    Complete,
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

impl ServerMessage {
    /// Error frame for a failed request.
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_events_use_kebab_case_envelope() {
        let ping = serde_json::to_value(ServerMessage::ServerPing { server_time: 42 }).unwrap();
        assert_eq!(ping, json!({"event": "server-ping", "payload": {"serverTime": 42}}));

        let user_id = Uuid::new_v4();
        let gone = serde_json::to_value(ServerMessage::PlayerDisconnected {
            user_id,
            remaining_connections: 1,
        })
        .unwrap();
        assert_eq!(gone["event"], "player-disconnected");
        assert_eq!(gone["payload"]["userId"], json!(user_id));
        assert_eq!(gone["payload"]["remainingConnections"], 1);
    }

    #[test]
    fn pong_echoes_id_and_omits_missing_timestamp() {
        let pong = serde_json::to_value(ServerMessage::Pong {
            id: json!("abc"),
            timestamp: None,
            server_time: 7,
        })
        .unwrap();
        assert_eq!(
            pong,
            json!({"event": "pong", "payload": {"id": "abc", "serverTime": 7}})
        );
    }

    #[test]
    fn parses_client_events() {
        let ping =
            ClientMessage::from_json_str(r#"{"event":"ping","payload":{"id":3,"timestamp":9}}"#)
                .unwrap();
        assert!(matches!(ping, ClientMessage::Ping { id, timestamp: Some(_) } if id == json!(3)));

        let complete = ClientMessage::from_json_str(r#"{"event":"complete"}"#).unwrap();
        assert!(matches!(complete, ClientMessage::Complete));

        let question_id = Uuid::new_v4();
        let answer_id = Uuid::new_v4();
        let answer = ClientMessage::from_json_str(
            &json!({
                "event": "answer",
                "payload": {"questionId": question_id, "answerId": answer_id, "answeredAt": 1000}
            })
            .to_string(),
        )
        .unwrap();
        match answer {
            ClientMessage::Answer(request) => {
                assert_eq!(request.question_id, question_id);
                assert_eq!(request.answered_at, 1000);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_client_event_is_an_error() {
        assert!(ClientMessage::from_json_str(r#"{"event":"dance"}"#).is_err());
    }
}
