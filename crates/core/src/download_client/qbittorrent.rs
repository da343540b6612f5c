//! qBittorrent Web API client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ClientDownloadId, ClientState, ClientStatus, DownloadClient, DownloadClientError};
use crate::config::QBittorrentConfig;
use crate::indexer::{Protocol, ReleaseInfo};

/// Torrent download client talking to qBittorrent's `/api/v2`.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Set once logged in; the session cookie itself lives in the cookie jar.
    authenticated: Arc<RwLock<bool>>,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Result<Self, DownloadClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| DownloadClientError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            authenticated: Arc::new(RwLock::new(false)),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), endpoint)
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];
        let response = self
            .client
            .post(self.url("/api/v2/auth/login"))
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Send an authenticated request, logging in again once if the session
    /// has expired. `build` is called per attempt since multipart bodies
    /// cannot be replayed.
    async fn send<F>(&self, build: F) -> Result<String, DownloadClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        if !*self.authenticated.read().await {
            self.login().await?;
        }

        let mut response = build().send().await.map_err(map_reqwest_error)?;
        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = build().send().await.map_err(map_reqwest_error)?;
        }

        let status = response.status();
        if status.is_server_error() {
            return Err(DownloadClientError::Unavailable(format!("HTTP {}", status)));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadClientError::NotFound(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(DownloadClientError::Api(format!("HTTP {}", status)));
        }

        response.text().await.map_err(map_reqwest_error)
    }

    async fn torrents(&self, query: &str) -> Result<Vec<QBTorrentInfo>, DownloadClientError> {
        let url = self.url(&format!("/api/v2/torrents/info?{}", query));
        let body = self.send(|| self.client.get(&url)).await?;
        serde_json::from_str(&body)
            .map_err(|e| DownloadClientError::Api(format!("Failed to parse response: {}", e)))
    }

    /// Torrents added from a `.torrent` URL have no hash up front; find the
    /// newest one in our category with the release's name.
    async fn find_by_name(&self, name: &str) -> Result<Option<String>, DownloadClientError> {
        let mut query = "sort=added_on&reverse=true".to_string();
        if let Some(category) = &self.config.category {
            query.push_str(&format!("&category={}", urlencoding::encode(category)));
        }
        let torrents = self.torrents(&query).await?;
        Ok(torrents
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.hash.to_lowercase()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DownloadClientError {
    if e.is_timeout() {
        DownloadClientError::Timeout
    } else if e.is_connect() {
        DownloadClientError::ConnectionFailed(e.to_string())
    } else {
        DownloadClientError::Api(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    content_path: String,
}

impl QBTorrentInfo {
    fn into_status(self) -> ClientStatus {
        let (state, message) = parse_qb_state(&self.state);
        let output_path = if !self.content_path.is_empty() {
            Some(PathBuf::from(self.content_path))
        } else if !self.save_path.is_empty() {
            Some(PathBuf::from(self.save_path).join(&self.name))
        } else {
            None
        };

        ClientStatus {
            state,
            progress: self.progress,
            output_path,
            message: message.map(str::to_string),
        }
    }
}

/// Map a qBittorrent state string to a client state and an optional
/// explanation.
fn parse_qb_state(state: &str) -> (ClientState, Option<&'static str>) {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" | "checkingDL"
        | "moving" | "checkingResumeData" => (ClientState::Downloading, None),
        "uploading" | "forcedUP" | "stalledUP" | "queuedUP" | "pausedUP" | "stoppedUP"
        | "checkingUP" => (ClientState::Completed, None),
        "queuedDL" => (ClientState::Queued, None),
        "stalledDL" => (
            ClientState::Warning,
            Some("The download is stalled with no connections"),
        ),
        "pausedDL" | "stoppedDL" => (ClientState::Warning, Some("The download is paused")),
        "error" => (ClientState::Error, Some("qBittorrent reported an error")),
        "missingFiles" => (
            ClientState::Error,
            Some("The download is missing files"),
        ),
        _ => (ClientState::Warning, Some("Unknown download state")),
    }
}

/// Extract the info hash from a magnet URI.
fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .filter(|hash| !hash.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn submit(&self, release: &ReleaseInfo) -> Result<ClientDownloadId, DownloadClientError> {
        if release.protocol != Protocol::Torrent {
            return Err(DownloadClientError::Rejected(format!(
                "qBittorrent cannot download {} releases",
                release.protocol
            )));
        }

        let url = self.url("/api/v2/torrents/add");
        let body = self
            .send(|| {
                let mut form = multipart::Form::new().text("urls", release.download_url.clone());
                if let Some(path) = &self.config.download_path {
                    form = form.text("savepath", path.clone());
                }
                if let Some(category) = &self.config.category {
                    form = form.text("category", category.clone());
                }
                self.client.post(&url).multipart(form)
            })
            .await?;

        if body.contains("Fails.") {
            return Err(DownloadClientError::Rejected(format!(
                "qBittorrent refused {}",
                release.title
            )));
        }

        let hash = match release
            .info_hash
            .as_ref()
            .map(|h| h.to_lowercase())
            .or_else(|| extract_hash_from_magnet(&release.download_url))
        {
            Some(hash) => hash,
            None => self.find_by_name(&release.title).await?.ok_or_else(|| {
                DownloadClientError::Api(format!(
                    "Added {} but could not find it in the client",
                    release.title
                ))
            })?,
        };

        info!(hash = %hash, title = %release.title, "Torrent added to qBittorrent");
        Ok(ClientDownloadId::new(hash))
    }

    async fn query_status(&self, id: &ClientDownloadId) -> Result<ClientStatus, DownloadClientError> {
        let torrents = self
            .torrents(&format!("hashes={}", id.as_str().to_lowercase()))
            .await?;
        torrents
            .into_iter()
            .next()
            .map(QBTorrentInfo::into_status)
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn remove(&self, id: &ClientDownloadId, delete_data: bool) -> Result<(), DownloadClientError> {
        let url = self.url("/api/v2/torrents/delete");
        let hash = id.as_str().to_lowercase();
        let delete_files = if delete_data { "true" } else { "false" };
        self.send(|| {
            self.client
                .post(&url)
                .form(&[("hashes", hash.as_str()), ("deleteFiles", delete_files)])
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qb_state_downloading() {
        assert_eq!(parse_qb_state("downloading").0, ClientState::Downloading);
        assert_eq!(parse_qb_state("metaDL").0, ClientState::Downloading);
        assert_eq!(parse_qb_state("checkingDL").0, ClientState::Downloading);
    }

    #[test]
    fn test_parse_qb_state_seeding_is_completed() {
        assert_eq!(parse_qb_state("uploading").0, ClientState::Completed);
        assert_eq!(parse_qb_state("stalledUP").0, ClientState::Completed);
        assert_eq!(parse_qb_state("pausedUP").0, ClientState::Completed);
    }

    #[test]
    fn test_parse_qb_state_warnings() {
        let (state, message) = parse_qb_state("stalledDL");
        assert_eq!(state, ClientState::Warning);
        assert!(message.unwrap().contains("stalled"));
        assert_eq!(parse_qb_state("pausedDL").0, ClientState::Warning);
        assert_eq!(parse_qb_state("somethingNew").0, ClientState::Warning);
    }

    #[test]
    fn test_parse_qb_state_errors() {
        assert_eq!(parse_qb_state("error").0, ClientState::Error);
        assert_eq!(parse_qb_state("missingFiles").0, ClientState::Error);
        assert_eq!(parse_qb_state("queuedDL").0, ClientState::Queued);
    }

    #[test]
    fn test_extract_hash_from_magnet() {
        assert_eq!(
            extract_hash_from_magnet("magnet:?xt=urn:btih:ABC123&dn=Name"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_hash_from_magnet("magnet:?dn=Name&xt=urn:btih:def456"),
            Some("def456".to_string())
        );
        assert_eq!(extract_hash_from_magnet("http://example.com/a.torrent"), None);
        assert_eq!(extract_hash_from_magnet("magnet:?dn=NoHash"), None);
    }

    #[test]
    fn test_info_output_path_prefers_content_path() {
        let info: QBTorrentInfo = serde_json::from_str(
            r#"{"hash":"ABC","name":"Movie","state":"uploading","progress":1.0,
                "save_path":"/downloads","content_path":"/downloads/Movie"}"#,
        )
        .unwrap();
        let status = info.into_status();
        assert_eq!(status.state, ClientState::Completed);
        assert_eq!(status.output_path, Some(PathBuf::from("/downloads/Movie")));

        let info: QBTorrentInfo = serde_json::from_str(
            r#"{"hash":"ABC","name":"Movie","state":"downloading","progress":0.5,
                "save_path":"/downloads"}"#,
        )
        .unwrap();
        assert_eq!(
            info.into_status().output_path,
            Some(PathBuf::from("/downloads/Movie"))
        );
    }

    #[tokio::test]
    async fn test_submit_rejects_usenet() {
        let client = QBittorrentClient::new(QBittorrentConfig::default()).unwrap();
        let release = ReleaseInfo::new("A", "http://nzb/a", "nzb", Protocol::Usenet);
        let err = client.submit(&release).await.unwrap_err();
        assert!(matches!(err, DownloadClientError::Rejected(_)));
    }
}
