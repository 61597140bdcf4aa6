//! # crawlset Config
//!
//! TOML configuration for a crawlset run: target page, per-page capture
//! targets and annotations, scroll tuning, outline style, dataset metadata,
//! link following and the optional open-and-capture interaction.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
