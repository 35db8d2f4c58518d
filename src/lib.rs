//! Library crate for camblaster-sync, exposing modules for binaries and integration tests.

/// On-device cache standing in for the browser's local storage.
pub mod cache;
/// Runtime configuration loaded at startup.
pub mod config;
/// Profile records and the remote store backends.
pub mod dao;
/// Request and response payloads of the HTTP API.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Reconciliation, leaderboard, audio and HTTP-facing services.
pub mod services;
/// Shared application state and the session controller.
pub mod state;
