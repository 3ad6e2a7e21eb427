//! HTTP surface for the diagnosis-group pipeline.
//!
//! `ocr_api_router()` returns a composable `Router` with every route under
//! `/api/`. `start_server()` binds it and serves until shut down.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::ocr_api_router;
pub use server::{start_server, OcrServer};
pub use types::ApiContext;
