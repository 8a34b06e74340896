//! API Module
//!
//! Admin HTTP surface over a single cache module.
//!
//! # Endpoints
//! - `GET/PUT/DELETE /cache/:key`, `POST /cache/:key/incr`, `POST /cache/clear`
//! - `POST /cache/batch/get|set|delete`
//! - `GET /stats`, `/health`, `/metrics/performance`, `/capacity`, `/errors`
//! - `POST /diagnostics`, `/self-heal`, `/benchmark`, `/integrity`,
//!   `/backup`, `/restore`
//! - `PUT /config`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
