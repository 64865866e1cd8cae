//! HTTP server layer for the gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 routes (trace, CORS, compression)               │
//! │                                                                 │
//! │   /health ──► handlers                                          │
//! │                                                                 │
//! │   /* ──► pipeline ─────────────────────────────► proxy ──► tile │
//! │          (host → path → tilejson)                (reqwest)  server
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod pipeline;
pub mod proxy;
pub mod routes;

pub use handlers::{health_handler, ErrorResponse, HealthResponse};
pub use pipeline::{Pipeline, Stage};
pub use proxy::DownstreamProxy;
pub use routes::{create_router, RouterConfig};
