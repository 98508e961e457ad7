//! lars2aws Core Library
//!
//! Promotes build artifacts from the LARS build catalog into S3 and injects
//! landed artifacts onto EC2 hosts through SSM Run Command.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod index;
pub mod inject;
pub mod plan;
pub mod storage;
pub mod types;
pub mod upload;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, Lars2AwsConfig};
    pub use crate::context::AppContext;

    // Catalog
    pub use crate::catalog::{CatalogClient, Page, search_page};
    pub use crate::types::{Application, BuildEntry, Maturity};

    // Plans and uploads
    pub use crate::plan::{PlanBuilder, Planner, sanitize_suffix};
    pub use crate::types::{ArtifactPlanItem, UploadResult};
    pub use crate::upload::UploadExecutor;

    // Storage
    pub use crate::index::{ObjectVersionMeta, PrefixIndex, PrefixIndexer};
    pub use crate::storage::ObjectStore;

    // Injection
    pub use crate::inject::{
        CommandStatus, InjectRequest, PollOutcome, PollPolicy, RemoteCommand, RemoteInjector,
        watch,
    };
}
