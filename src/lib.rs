// Public API for integration tests and the server binary

pub mod abuse;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod protocol;
pub mod ranking;
pub mod state;
pub mod types;
