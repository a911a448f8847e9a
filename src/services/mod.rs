//! Business logic services.
//!
//! The assignment engine and its selection helpers are independent of the
//! storage and HTTP layers; `api` and `server` wire them to SQLite and axum.

pub mod api;
pub mod assignment;
pub mod selection;
pub mod server;

pub use assignment::{AssignmentEngine, Directory, Ledger};
pub use server::AppState;
