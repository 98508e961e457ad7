//! Configuration for catalog access, object storage and remote injection.
//!
//! Values come from `lars2aws.toml` (all keys optional) with environment
//! overrides layered on top.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_config_toml, parse_config_toml_str, to_toml, validate_config};
pub use schema::{CatalogConfig, InjectConfig, Lars2AwsConfig, SseMode, StorageConfig};
pub use store::ConfigStore;
