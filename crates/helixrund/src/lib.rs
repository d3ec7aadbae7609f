//! HelixRun daemon
//!
//! Serves the agent registry over HTTP:
//!
//! - `POST /chat`: run an agent, stream canonical events as SSE frames
//! - `GET /agents`: list agent ids
//! - `GET /healthz`: liveness

pub mod chat;
pub mod config;
pub mod server;
pub mod transport;

pub use config::ServerArgs;
pub use server::{router, serve, AppState};
