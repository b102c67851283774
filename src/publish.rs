//! Remote Object Publisher
//!
//! Turns a finished upload session into exactly one commit on the target
//! branch. The pipeline halts at the first failed call; the branch ref is
//! only moved by the final step, so earlier failures leave nothing visible.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;

use crate::github::{ContentCommit, GitDataApi, RemoteError, TreeEntry};
use crate::upload::{assemble, encode_base64, UploadError, UploadSession};

/// One file ready to publish
#[derive(Debug, Clone)]
pub struct CommitFile {
    /// Destination path inside the repository
    pub path: String,
    /// Base64-encoded content
    pub content: String,
}

/// Every file of one session, published as a unit
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub files: Vec<CommitFile>,
}

impl CommitBatch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Outcome of a published batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub commit: String,
    pub files: usize,
}

#[derive(Clone)]
pub struct Publisher {
    api: Arc<dyn GitDataApi>,
    asset_root: String,
}

impl Publisher {
    pub fn new(api: Arc<dyn GitDataApi>, asset_root: impl Into<String>) -> Self {
        Self {
            api,
            asset_root: asset_root.into(),
        }
    }

    pub fn api(&self) -> &Arc<dyn GitDataApi> {
        &self.api
    }

    /// Repository path for a file under the asset root
    pub fn asset_path(&self, relative: &str) -> String {
        if self.asset_root.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.asset_root, relative)
        }
    }

    /// Assemble and encode every file of a session.
    ///
    /// Fails without side effects if any file is still missing chunks. Files
    /// sharing a destination name collapse to the one with the greatest file ID.
    pub fn prepare_batch(&self, session: &UploadSession) -> Result<CommitBatch, UploadError> {
        let mut by_path = BTreeMap::new();
        for (file_id, file) in &session.files {
            let bytes = assemble(file)?;
            let path = self.asset_path(&file.name);
            if by_path.contains_key(&path) {
                tracing::warn!(
                    session_id = %session.id,
                    file_id = %file_id,
                    path = %path,
                    "Duplicate destination path in session; later file wins"
                );
            }
            by_path.insert(path, encode_base64(&bytes));
        }

        Ok(CommitBatch {
            files: by_path
                .into_iter()
                .map(|(path, content)| CommitFile { path, content })
                .collect(),
        })
    }

    /// Publish a batch as one commit on `branch`.
    pub async fn publish_batch(
        &self,
        branch: &str,
        batch: CommitBatch,
    ) -> Result<PublishResult, RemoteError> {
        let parent = self.api.get_branch_head(branch).await?;
        let base_tree = self.api.get_commit_tree(&parent).await?;

        // Blobs have no ordering dependency on each other
        let blobs = try_join_all(
            batch
                .files
                .iter()
                .map(|f| self.api.create_blob(&f.content)),
        )
        .await?;

        let entries: Vec<TreeEntry> = batch
            .files
            .iter()
            .zip(blobs)
            .map(|(file, sha)| TreeEntry::blob(file.path.clone(), sha))
            .collect();

        let tree = self.api.create_tree(&base_tree, &entries).await?;

        let message = format!("upload assets ({} files)", entries.len());
        let commit = self
            .api
            .create_commit(&message, &tree, std::slice::from_ref(&parent))
            .await?;

        self.api.update_ref(branch, &commit).await?;

        tracing::info!(
            branch = %branch,
            parent = %parent,
            commit = %commit,
            files = entries.len(),
            "Published asset batch"
        );

        Ok(PublishResult {
            commit,
            files: entries.len(),
        })
    }

    /// Write one classified file directly on `branch`.
    pub async fn publish_single(
        &self,
        branch: &str,
        relative: &str,
        bytes: &[u8],
    ) -> Result<ContentCommit, RemoteError> {
        let path = self.asset_path(relative);
        let message = format!("upload {}", relative);
        let result = self
            .api
            .put_contents(&path, &encode_base64(bytes), &message, branch)
            .await?;

        tracing::info!(
            branch = %branch,
            path = %path,
            commit = %result.commit,
            "Published single asset"
        );
        Ok(result)
    }
}
