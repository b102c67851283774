//! GitHub Git Data API types

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Steps
// ============================================================================

/// One remote call, named for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStep {
    ResolveRef,
    ResolveCommit,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
    PutContents,
    GetRepository,
}

impl fmt::Display for ApiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveRef => "resolve ref",
            Self::ResolveCommit => "resolve commit",
            Self::CreateBlob => "create blob",
            Self::CreateTree => "create tree",
            Self::CreateCommit => "create commit",
            Self::UpdateRef => "update ref",
            Self::PutContents => "put contents",
            Self::GetRepository => "get repository",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A failed remote call
#[derive(Debug, thiserror::Error)]
#[error("GitHub {step} failed: {kind}")]
pub struct RemoteError {
    pub step: ApiStep,
    pub kind: RemoteErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteErrorKind {
    #[error("request error: {0}")]
    Transport(String),

    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn new(step: ApiStep, kind: RemoteErrorKind) -> Self {
        Self { step, kind }
    }

    /// HTTP status returned by the remote, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            RemoteErrorKind::Status { status, .. } => Some(status),
            _ => None,
        }
    }

    /// The contents endpoint refused to replace a file because no blob SHA
    /// was sent for it.
    pub fn is_existing_file_conflict(&self) -> bool {
        self.step == ApiStep::PutContents
            && matches!(
                &self.kind,
                RemoteErrorKind::Status { status: 422, message } if message.contains("\"sha\"")
            )
    }
}

// ============================================================================
// Tree Entries
// ============================================================================

/// Git file mode of a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileMode {
    #[serde(rename = "100644")]
    Regular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Blob,
}

/// One path in a new tree, pointing at an existing blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: FileMode,
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FileMode::Regular,
            kind: ObjectType::Blob,
            sha: sha.into(),
        }
    }
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CreateBlobRequest<'a> {
    pub content: &'a str,
    pub encoding: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTreeRequest<'a> {
    pub base_tree: &'a str,
    pub tree: &'a [TreeEntry],
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCommitRequest<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRefRequest<'a> {
    pub sha: &'a str,
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentsRequest<'a> {
    pub message: &'a str,
    pub content: &'a str,
    pub branch: &'a str,
}

// ============================================================================
// Response Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectRef {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefResponse {
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitResponse {
    pub tree: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentsResponse {
    pub commit: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryResponse {
    pub full_name: String,
    pub stargazers_count: u64,
}

/// Result of a single-file contents write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCommit {
    pub path: String,
    pub commit: String,
}

/// Public repository facts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub stars: u64,
}
