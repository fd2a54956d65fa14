//! Valuator API Module
//!
//! HTTP interface of the valuation service: liveness, model info and
//! prediction behind a shared-secret header.

pub mod error;
pub mod handlers;
pub mod models;
pub mod server;

pub use error::{ApiError, AuthError};
pub use handlers::{ApiState, ModelHandle};
pub use models::*;
pub use server::{router, ApiServer};
