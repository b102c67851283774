//! GitHub REST client
//!
//! Thin reqwest wrapper over the Git Data, Contents and Repositories
//! endpoints of one repository.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::types::*;
use super::GitDataApi;
use crate::config::GithubConfig;

const USER_AGENT: &str = concat!("asset-relay-server/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Failure to construct a [`GithubClient`]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("GITHUB_TOKEN is not a valid header value")]
    InvalidToken(#[from] InvalidHeaderValue),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Client for a single GitHub repository
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self, ClientError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        })
    }

    /// Build a URL under `/repos/{owner}/{repo}`
    fn repo_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
        } else {
            format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
        }
    }

    /// Send a request and decode a successful JSON response
    async fn send<T: DeserializeOwned>(
        &self,
        step: ApiStep,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.execute(step, request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::new(step, RemoteErrorKind::Decode(e.to_string())))
    }

    /// Send a request, mapping transport failures and non-2xx statuses
    async fn execute(
        &self,
        step: ApiStep,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::new(step, RemoteErrorKind::Transport(e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(step = %step, status, "GitHub API returned an error");
            return Err(RemoteError::new(
                step,
                RemoteErrorKind::Status { status, message },
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl GitDataApi for GithubClient {
    async fn get_branch_head(&self, branch: &str) -> Result<String, RemoteError> {
        let url = self.repo_url(&format!("git/ref/heads/{}", encode_path(branch)));
        let body: RefResponse = self.send(ApiStep::ResolveRef, self.client.get(url)).await?;
        Ok(body.object.sha)
    }

    async fn get_commit_tree(&self, commit_sha: &str) -> Result<String, RemoteError> {
        let url = self.repo_url(&format!("git/commits/{}", commit_sha));
        let body: CommitResponse = self.send(ApiStep::ResolveCommit, self.client.get(url)).await?;
        Ok(body.tree.sha)
    }

    async fn create_blob(&self, content_base64: &str) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.repo_url("git/blobs"))
            .json(&CreateBlobRequest {
                content: content_base64,
                encoding: "base64",
            });
        let body: ObjectRef = self.send(ApiStep::CreateBlob, request).await?;
        Ok(body.sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.repo_url("git/trees"))
            .json(&CreateTreeRequest {
                base_tree,
                tree: entries,
            });
        let body: ObjectRef = self.send(ApiStep::CreateTree, request).await?;
        Ok(body.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.repo_url("git/commits"))
            .json(&CreateCommitRequest {
                message,
                tree,
                parents,
            });
        let body: ObjectRef = self.send(ApiStep::CreateCommit, request).await?;
        Ok(body.sha)
    }

    async fn update_ref(&self, branch: &str, commit_sha: &str) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("git/refs/heads/{}", encode_path(branch)));
        let request = self.client.patch(url).json(&UpdateRefRequest {
            sha: commit_sha,
            force: false,
        });
        self.execute(ApiStep::UpdateRef, request).await?;
        Ok(())
    }

    async fn put_contents(
        &self,
        path: &str,
        content_base64: &str,
        message: &str,
        branch: &str,
    ) -> Result<ContentCommit, RemoteError> {
        let url = self.repo_url(&format!("contents/{}", encode_path(path)));
        let request = self.client.put(url).json(&PutContentsRequest {
            message,
            content: content_base64,
            branch,
        });
        let body: PutContentsResponse = self.send(ApiStep::PutContents, request).await?;
        Ok(ContentCommit {
            path: path.to_string(),
            commit: body.commit.sha,
        })
    }

    async fn get_repository(&self) -> Result<RepositoryInfo, RemoteError> {
        let body: RepositoryResponse = self
            .send(ApiStep::GetRepository, self.client.get(self.repo_url("")))
            .await?;
        Ok(RepositoryInfo {
            full_name: body.full_name,
            stars: body.stargazers_count,
        })
    }
}

/// Percent-encode each segment of a slash-separated path
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
