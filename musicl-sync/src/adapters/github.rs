//! GitHub contents API as a [`VersionedStore`].
//!
//! The blob `sha` is the version token. A PUT with a stale `sha` (or without
//! one for an existing file) is rejected by GitHub with 409 or 422.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use musicl_core::config::GithubTarget;

use crate::error::SyncError;
use crate::ports::{DirEntry, Versioned, VersionedStore};

pub struct GitHubStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct ListedEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

impl GitHubStore {
    pub fn new(target: &GithubTarget, user_agent: &str) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .map_err(|e| SyncError::StoreAccess {
                path: target.api_base.clone(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_base: target.api_base.trim_end_matches('/').to_string(),
            owner: target.owner.clone(),
            repo: target.repo.clone(),
            branch: target.branch.clone(),
            token: target.resolve_token(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, self.contents_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder, path: &str) -> Result<Response, SyncError> {
        req.send().await.map_err(|e| SyncError::StoreUnavailable {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

/// Map a non-success status to the sync taxonomy.
async fn status_error(resp: Response, path: &str) -> SyncError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => SyncError::VersionConflict {
            path: path.to_string(),
            attempts: 1,
        },
        StatusCode::TOO_MANY_REQUESTS => SyncError::StoreUnavailable {
            path: path.to_string(),
            message,
        },
        s if s.is_server_error() => SyncError::StoreUnavailable {
            path: path.to_string(),
            message,
        },
        _ => SyncError::StoreAccess {
            path: path.to_string(),
            message,
        },
    }
}

fn decode_content(file: &ContentFile, path: &str) -> Result<String, SyncError> {
    if !file.encoding.is_empty() && file.encoding != "base64" {
        return Err(SyncError::StoreAccess {
            path: path.to_string(),
            message: format!("unsupported content encoding '{}'", file.encoding),
        });
    }
    let packed: String = file.content.split_whitespace().collect();
    let bytes = STANDARD.decode(packed).map_err(|e| SyncError::StoreAccess {
        path: path.to_string(),
        message: format!("invalid base64 content: {e}"),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn body_error(path: &str, e: reqwest::Error) -> SyncError {
    SyncError::StoreUnavailable {
        path: path.to_string(),
        message: format!("unreadable response: {e}"),
    }
}

#[async_trait]
impl VersionedStore for GitHubStore {
    async fn get_with_version(&self, path: &str) -> Result<Versioned, SyncError> {
        let req = self
            .request(reqwest::Method::GET, path)
            .query(&[("ref", self.branch.as_str())]);
        let resp = self.send(req, path).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Versioned::default());
        }
        if !resp.status().is_success() {
            return Err(status_error(resp, path).await);
        }
        let file: ContentFile = resp.json().await.map_err(|e| body_error(path, e))?;
        let content = decode_content(&file, path)?;
        Ok(Versioned {
            content: Some(content),
            version: Some(file.sha),
        })
    }

    async fn put_if_version(
        &self,
        path: &str,
        content: &str,
        expected: Option<&str>,
        message: &str,
    ) -> Result<String, SyncError> {
        let body = PutBody {
            message,
            content: STANDARD.encode(content.as_bytes()),
            branch: &self.branch,
            sha: expected,
        };
        let req = self.request(reqwest::Method::PUT, path).json(&body);
        let resp = self.send(req, path).await?;
        if !resp.status().is_success() {
            let err = status_error(resp, path).await;
            tracing::warn!(path, error = %err, "store write rejected");
            return Err(err);
        }
        let put: PutResponse = resp.json().await.map_err(|e| body_error(path, e))?;
        tracing::info!(path, sha = %put.content.sha, "committed");
        Ok(put.content.sha)
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, SyncError> {
        let req = self
            .request(reqwest::Method::GET, path)
            .query(&[("ref", self.branch.as_str())]);
        let resp = self.send(req, path).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !resp.status().is_success() {
            return Err(status_error(resp, path).await);
        }
        let listed: Vec<ListedEntry> = resp.json().await.map_err(|e| body_error(path, e))?;
        Ok(listed
            .into_iter()
            .filter(|e| e.kind == "file")
            .map(|e| DirEntry {
                name: e.name,
                path: e.path,
            })
            .collect())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        let file = ContentFile {
            sha: "abc".into(),
            content: "PHJz\ncy8+\n".into(),
            encoding: "base64".into(),
        };
        assert_eq!(decode_content(&file, "p").unwrap(), "<rss/>");
    }

    #[test]
    fn public_url_points_at_raw_branch() {
        let target = GithubTarget {
            owner: "chadf".into(),
            repo: "playlists".into(),
            branch: "main".into(),
            token: None,
            token_env: "MUSICL_TEST_UNSET_TOKEN".into(),
            api_base: "https://api.github.com/".into(),
        };
        let store = GitHubStore::new(&target, "musicl-test").unwrap();
        assert_eq!(
            store.public_url("docs/mmt.xml"),
            "https://raw.githubusercontent.com/chadf/playlists/main/docs/mmt.xml"
        );
    }
}
