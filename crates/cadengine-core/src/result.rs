//! Convenience result type alias for the CAD Engine.

use crate::error::AppError;

/// A specialized `Result` type for CAD Engine operations.
pub type AppResult<T> = Result<T, AppError>;
