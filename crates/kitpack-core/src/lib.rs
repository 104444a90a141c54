//! Kitpack Core Library
//!
//! Resolves a product release and an integration branch, fetches both from
//! the source-hosting service, and combines them into a single deliverable
//! zip. On the consumer side it unpacks such a package and locates the
//! directory deployment commands run from.

pub mod archive;
pub mod assembler;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod fetch;
pub mod github;
pub mod remote;
pub mod resolver;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{Settings, Upstream};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{AssembleError, Error, ErrorKind, Stage};

    // Pipeline
    pub use crate::assembler::{AssembledPackage, Assembler};
    pub use crate::fetch::{ArtifactFetcher, FetchedFile};
    pub use crate::github::{AssetRef, BranchEntry, GitHubClient, ReleaseEntry};
    pub use crate::resolver::{IntegrationResolver, LATEST, ReleaseResolver, VersionListing};

    // Consumer side
    pub use crate::deploy::{BuildRunner, Deployment};
    pub use crate::remote::ApiClient;
}
