//! Configuration: schema types, `${VAR}` / `${VAR:default}` substitution,
//! and a loader that accepts TOML, YAML or JSON by file extension.
//!
//! Validation failures are fatal at startup: the loader returns an error and
//! the process exits non-zero.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use loader::{load_config, validate};
pub use schema::Config;
