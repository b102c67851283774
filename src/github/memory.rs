//! In-memory repository for tests

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;

use super::types::*;
use super::GitDataApi;

struct Commit {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Default)]
struct RepoState {
    refs: HashMap<String, String>,
    commits: HashMap<String, Commit>,
    /// Tree SHA -> (path -> blob SHA)
    trees: HashMap<String, BTreeMap<String, String>>,
    blobs: HashMap<String, Vec<u8>>,
    calls: Vec<ApiStep>,
    next_id: u64,
}

impl RepoState {
    fn next_sha(&mut self) -> String {
        self.next_id += 1;
        format!("{:040x}", self.next_id)
    }
}

/// Git object store double with failure injection
pub struct MemoryRepo {
    state: Mutex<RepoState>,
    fail_at: Mutex<Option<ApiStep>>,
    stars: u64,
}

impl MemoryRepo {
    /// A repository whose `branch` points at one empty root commit
    pub fn new(branch: &str) -> Self {
        let mut state = RepoState::default();
        let tree = state.next_sha();
        let commit = state.next_sha();
        state.trees.insert(tree.clone(), BTreeMap::new());
        state.commits.insert(
            commit.clone(),
            Commit {
                tree,
                parents: Vec::new(),
                message: "initial".to_string(),
            },
        );
        state.refs.insert(branch.to_string(), commit);

        Self {
            state: Mutex::new(state),
            fail_at: Mutex::new(None),
            stars: 42,
        }
    }

    /// Make every subsequent call of `step` fail with a 422
    pub fn fail_at(&self, step: ApiStep) {
        *self.fail_at.lock() = Some(step);
    }

    pub fn clear_failure(&self) {
        *self.fail_at.lock() = None;
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ApiStep> {
        self.state.lock().calls.clone()
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state.lock().refs.get(branch).cloned()
    }

    pub fn commit_message(&self, commit: &str) -> Option<String> {
        self.state.lock().commits.get(commit).map(|c| c.message.clone())
    }

    pub fn commit_parents(&self, commit: &str) -> Vec<String> {
        self.state
            .lock()
            .commits
            .get(commit)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    /// Decoded file contents visible at `commit`
    pub fn files_at(&self, commit: &str) -> BTreeMap<String, Vec<u8>> {
        let state = self.state.lock();
        let Some(tree) = state.commits.get(commit).and_then(|c| state.trees.get(&c.tree)) else {
            return BTreeMap::new();
        };
        tree.iter()
            .map(|(path, blob)| (path.clone(), state.blobs[blob].clone()))
            .collect()
    }

    fn enter(&self, step: ApiStep) -> Result<(), RemoteError> {
        self.state.lock().calls.push(step);
        if *self.fail_at.lock() == Some(step) {
            return Err(unprocessable(step, "injected failure"));
        }
        Ok(())
    }
}

fn unprocessable(step: ApiStep, message: &str) -> RemoteError {
    RemoteError::new(
        step,
        RemoteErrorKind::Status {
            status: 422,
            message: message.to_string(),
        },
    )
}

fn not_found(step: ApiStep) -> RemoteError {
    RemoteError::new(
        step,
        RemoteErrorKind::Status {
            status: 404,
            message: "Not Found".to_string(),
        },
    )
}

fn decode(step: ApiStep, content: &str) -> Result<Vec<u8>, RemoteError> {
    base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| unprocessable(step, &e.to_string()))
}

#[async_trait]
impl GitDataApi for MemoryRepo {
    async fn get_branch_head(&self, branch: &str) -> Result<String, RemoteError> {
        self.enter(ApiStep::ResolveRef)?;
        self.head(branch).ok_or_else(|| not_found(ApiStep::ResolveRef))
    }

    async fn get_commit_tree(&self, commit_sha: &str) -> Result<String, RemoteError> {
        self.enter(ApiStep::ResolveCommit)?;
        let state = self.state.lock();
        state
            .commits
            .get(commit_sha)
            .map(|c| c.tree.clone())
            .ok_or_else(|| not_found(ApiStep::ResolveCommit))
    }

    async fn create_blob(&self, content_base64: &str) -> Result<String, RemoteError> {
        self.enter(ApiStep::CreateBlob)?;
        let bytes = decode(ApiStep::CreateBlob, content_base64)?;
        let mut state = self.state.lock();
        let sha = state.next_sha();
        state.blobs.insert(sha.clone(), bytes);
        Ok(sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError> {
        self.enter(ApiStep::CreateTree)?;
        let mut state = self.state.lock();
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| unprocessable(ApiStep::CreateTree, "base_tree not found"))?;
        for entry in entries {
            if !state.blobs.contains_key(&entry.sha) {
                return Err(unprocessable(ApiStep::CreateTree, "blob not found"));
            }
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        let sha = state.next_sha();
        state.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, RemoteError> {
        self.enter(ApiStep::CreateCommit)?;
        let mut state = self.state.lock();
        if !state.trees.contains_key(tree) {
            return Err(unprocessable(ApiStep::CreateCommit, "tree not found"));
        }
        let sha = state.next_sha();
        state.commits.insert(
            sha.clone(),
            Commit {
                tree: tree.to_string(),
                parents: parents.to_vec(),
                message: message.to_string(),
            },
        );
        Ok(sha)
    }

    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), RemoteError> {
        self.enter(ApiStep::UpdateRef)?;
        let mut state = self.state.lock();
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| not_found(ApiStep::UpdateRef))?;
        let fast_forward = state
            .commits
            .get(commit_sha)
            .is_some_and(|c| c.parents.contains(&current));
        if !fast_forward {
            return Err(unprocessable(ApiStep::UpdateRef, "Update is not a fast forward"));
        }
        state.refs.insert(branch.to_string(), commit_sha.to_string());
        Ok(())
    }

    async fn put_contents(
        &self,
        path: &str,
        content_base64: &str,
        message: &str,
        branch: &str,
    ) -> Result<ContentCommit, RemoteError> {
        self.enter(ApiStep::PutContents)?;
        let bytes = decode(ApiStep::PutContents, content_base64)?;
        let mut state = self.state.lock();

        let parent = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| not_found(ApiStep::PutContents))?;
        let mut tree = state
            .commits
            .get(&parent)
            .and_then(|c| state.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();
        if tree.contains_key(path) {
            return Err(unprocessable(
                ApiStep::PutContents,
                "Invalid request.\n\n\"sha\" wasn't supplied.",
            ));
        }

        let blob = state.next_sha();
        state.blobs.insert(blob.clone(), bytes);
        tree.insert(path.to_string(), blob);

        let tree_sha = state.next_sha();
        state.trees.insert(tree_sha.clone(), tree);
        let commit = state.next_sha();
        state.commits.insert(
            commit.clone(),
            Commit {
                tree: tree_sha,
                parents: vec![parent],
                message: message.to_string(),
            },
        );
        state.refs.insert(branch.to_string(), commit.clone());

        Ok(ContentCommit {
            path: path.to_string(),
            commit,
        })
    }

    async fn get_repository(&self) -> Result<RepositoryInfo, RemoteError> {
        self.enter(ApiStep::GetRepository)?;
        Ok(RepositoryInfo {
            full_name: "octo/site".to_string(),
            stars: self.stars,
        })
    }
}
