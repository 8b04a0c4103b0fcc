/// Board registry and device state machine.
pub mod board_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Match orchestration: device events, legs, persistence.
pub mod match_engine;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events subscriptions.
pub mod sse_service;
/// Match statistics and read-model assembly.
pub mod stats;
/// Storage connection supervisor with back-off.
pub mod storage_supervisor;
