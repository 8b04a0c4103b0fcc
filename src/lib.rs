//! Library crate for dart-live-back: live darts scoring from board telemetry,
//! with server-sent event fan-out. Exposed for the binaries and tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
