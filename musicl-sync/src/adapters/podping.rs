//! Podping-style [`ChangeNotifier`]: `GET {endpoint}/?url={feed}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use musicl_core::config::NotifierSettings;

use crate::error::SyncError;
use crate::ports::{Announcement, ChangeNotifier};

pub struct PodpingNotifier {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl PodpingNotifier {
    pub fn new(settings: &NotifierSettings) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| SyncError::StoreAccess {
                path: settings.endpoint.clone(),
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            token: settings.resolve_token(),
        })
    }
}

#[async_trait]
impl ChangeNotifier for PodpingNotifier {
    async fn announce(&self, public_url: &str) -> Announcement {
        if public_url.trim().is_empty() {
            return Announcement {
                accepted: false,
                detail: "feed URL is empty".to_string(),
            };
        }

        let mut req = self
            .client
            .get(format!("{}/", self.endpoint))
            .query(&[("url", public_url)]);
        if let Some(token) = &self.token {
            req = req.header("Authorization", token);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(url = public_url, "podping accepted");
                Announcement {
                    accepted: true,
                    detail: format!("HTTP {}", resp.status().as_u16()),
                }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let hint = if status == 401 {
                    " (check the podping token)"
                } else {
                    ""
                };
                Announcement {
                    accepted: false,
                    detail: format!("HTTP {status}{hint}"),
                }
            }
            Err(e) => Announcement {
                accepted: false,
                detail: e.to_string(),
            },
        }
    }
}
