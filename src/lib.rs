//! PR Reviewer - team-based reviewer assignment for pull requests.
//!
//! The library exposes the assignment engine, its SQLite-backed directory
//! and ledger, and the axum HTTP API. The `pr-reviewer` binary wires them
//! together.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AssignmentError};
