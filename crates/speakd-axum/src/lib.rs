//! Axum web adapter for speakd.
//!
//! Exposes the session coordinator over four routes — `POST /start`,
//! `POST /stop`, `GET /status`, `GET /health` — with thin handlers that
//! each call exactly one coordinator operation. [`bootstrap`] is the
//! composition root where the production collaborator clients and the
//! local audio pipeline are wired in.
//!
//! [`bootstrap`]: bootstrap::bootstrap

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use bootstrap::{AxumContext, CorsConfig, ServerConfig, start_server};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
