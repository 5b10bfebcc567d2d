pub mod error;
pub mod format;
pub mod time;

pub use error::{ErrorCategory, PdexpError, Result};
