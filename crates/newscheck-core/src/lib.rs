//! newscheck-core: Core types, configuration, output contracts and logging for newscheck.

pub mod article;
pub mod binary;
pub mod build_info;
pub mod config;
pub mod error;
pub mod logging;
pub mod schema;

pub use article::ArticleSet;
pub use config::Config;
pub use error::{Error, Result};
pub use schema::{PayloadKind, ValidationOutcome};
