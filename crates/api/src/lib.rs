//! Somnia API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket infrastructure, event fan-out) so integration tests and
//! the binary entrypoint can both access them.

pub mod config;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;
