//! Multi-user to-do list REST backend.
//!
//! Users register, log in for a bearer token, and manage their own tasks;
//! categories are a shared lookup table. Task visibility is enforced as a
//! query-level owner predicate in the store, so one user can never observe
//! another user's tasks — not even as a distinguishable "forbidden".

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;

pub use router::{app, AppState};
