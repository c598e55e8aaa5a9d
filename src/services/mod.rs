/// Bearer token resolution.
pub mod auth;
/// OpenAPI documentation generation.
pub mod documentation;
/// Session creation, questions, answers and completion.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Lobby ready-up, countdown, pause and resume.
pub mod lobby_service;
/// Read-only access to quizzes, topics and questions.
pub mod question_bank;
/// Realtime event construction and fan-out.
pub mod session_events;
/// Versioned persistence of sessions and answers.
pub mod session_store;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
