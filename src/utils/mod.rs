//! Shared utilities

pub mod error;
pub(crate) mod time;

pub use error::{AppError, AppResult};
