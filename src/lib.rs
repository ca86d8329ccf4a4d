//! Library crate for aurora-games, exposing the session layer to the terminal
//! client and integration tests.

/// Configuration loaded from disk and environment.
pub mod config;
/// Storage layer: document stores and stored models.
pub mod dao;
/// Errors surfaced by the service layer.
pub mod error;
/// Session operations built on the storage and state layers.
pub mod services;
/// Game rules and session state.
pub mod state;
