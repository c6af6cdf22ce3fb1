//! # autotag_repository
//!
//! Thin client for the content repository. The job layer depends only on the
//! [`Repository`] trait so that tests can substitute an in-memory fake.
//!
//! Node ids are the terminal segment of a node reference
//! (`workspace://SpacesStore/<id>` -> `<id>`). The repository root folder is
//! addressed by the alias [`ROOT_NODE_ID`].

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::RestRepository;
pub use config::RepositoryConfig;
pub use error::RepositoryError;
pub use types::NodeEntry;

use async_trait::async_trait;
use std::path::Path;

/// Alias of the repository root folder.
pub const ROOT_NODE_ID: &str = "-root-";

/// Calls the job layer needs from the repository.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All immediate children of a folder, across every page.
    async fn list_children(&self, node_id: &str) -> Result<Vec<NodeEntry>, RepositoryError>;

    /// Stream a node's binary content into `target`, returning the byte count.
    async fn download_content(&self, node_id: &str, target: &Path) -> Result<u64, RepositoryError>;

    /// Fetch a node's content as UTF-8 text.
    async fn read_text(&self, node_id: &str) -> Result<String, RepositoryError>;

    /// Create a child folder and return its id.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RepositoryError>;

    /// Upload a local file as a child of `parent_id` and return the new id.
    async fn upload_file(
        &self,
        parent_id: &str,
        local_path: &Path,
        name: &str,
    ) -> Result<String, RepositoryError>;

    async fn list_tags(&self, node_id: &str) -> Result<Vec<String>, RepositoryError>;

    /// Attach one tag. A 409 surfaces as an error with `is_conflict() == true`.
    async fn add_tag(&self, node_id: &str, tag: &str) -> Result<(), RepositoryError>;
}
