//! Remote content store
//!
//! The publisher talks to the repository only through [`GitDataApi`], so the
//! commit pipeline can run against GitHub or an in-memory double.

mod client;
#[cfg(test)]
pub mod memory;
mod types;

use async_trait::async_trait;

pub use client::{ClientError, GithubClient};
pub use types::*;

/// Git object-graph operations on one repository
#[async_trait]
pub trait GitDataApi: Send + Sync {
    /// Commit SHA the branch currently points at
    async fn get_branch_head(&self, branch: &str) -> Result<String, RemoteError>;

    /// Tree SHA of a commit
    async fn get_commit_tree(&self, commit_sha: &str) -> Result<String, RemoteError>;

    /// Store base64 content as a blob, returning its SHA
    async fn create_blob(&self, content_base64: &str) -> Result<String, RemoteError>;

    /// Create a tree that overlays `entries` on `base_tree`
    async fn create_tree(
        &self,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError>;

    async fn create_commit(
        &self,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, RemoteError>;

    /// Move the branch to `commit_sha` (fast-forward only)
    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), RemoteError>;

    /// Write one file directly on a branch
    async fn put_contents(
        &self,
        path: &str,
        content_base64: &str,
        message: &str,
        branch: &str,
    ) -> Result<ContentCommit, RemoteError>;

    async fn get_repository(&self) -> Result<RepositoryInfo, RemoteError>;
}
