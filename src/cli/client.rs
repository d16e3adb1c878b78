//! IPC Client for communicating with the site limiter daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Request/response handling
//! - Connection retry logic
//! - Timeout handling

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::daemon::ipc::SOCKET_FILE_NAME;
use crate::storage::data_dir;
use crate::types::{CooldownSettings, IpcRequest, IpcResponse, LearningMode};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (64KB)
const MAX_RESPONSE_SIZE: usize = 65536;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client with the default socket path.
    pub fn new() -> Result<Self> {
        let socket_path = data_dir()
            .context("ストレージディレクトリが特定できません")?
            .join(SOCKET_FILE_NAME);
        Ok(Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        })
    }

    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    // ── Message verbs ────────────────────────────────────────────────

    /// Queries site configs and running timers.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetStatus).await
    }

    /// Creates or updates a site configuration.
    pub async fn update_site(&self, site: &str, minutes: u32) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::UpdateSiteConfig {
            site: site.to_string(),
            minutes,
        })
        .await
    }

    /// Removes a site configuration.
    pub async fn remove_site(&self, site: &str) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::RemoveSite {
            site: site.to_string(),
        })
        .await
    }

    /// Queries cooldown settings.
    pub async fn cooldown_settings(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetCooldownSettings)
            .await
    }

    /// Replaces cooldown settings.
    pub async fn update_cooldown_settings(
        &self,
        settings: CooldownSettings,
    ) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::UpdateCooldownSettings { settings })
            .await
    }

    /// Queries the blocked-site records.
    pub async fn blocked_sites(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetBlockedSites)
            .await
    }

    /// Queries whitelisted channels.
    pub async fn whitelist_channels(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetWhitelistChannels)
            .await
    }

    /// Replaces whitelisted channels.
    pub async fn update_whitelist_channels(&self, channels: Vec<String>) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::UpdateWhitelistChannels { channels })
            .await
    }

    /// Queries whitelisted videos.
    pub async fn whitelist_videos(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetWhitelistVideos)
            .await
    }

    /// Replaces whitelisted videos.
    pub async fn update_whitelist_videos(&self, videos: Vec<String>) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::UpdateWhitelistVideos { videos })
            .await
    }

    /// Whitelists the video a URL points at.
    pub async fn add_video(&self, url: &str) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::AddCurrentVideoToWhitelist {
            url: url.to_string(),
        })
        .await
    }

    /// Queries learning mode settings.
    pub async fn learning_mode(&self) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::GetLearningMode)
            .await
    }

    /// Replaces learning mode settings.
    pub async fn update_learning_mode(&self, settings: LearningMode) -> Result<IpcResponse> {
        self.send_request_with_retry(&IpcRequest::UpdateLearningMode { settings })
            .await
    }

    // ── Transport ────────────────────────────────────────────────────

    /// Sends a request to the daemon with retry logic.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("リクエスト失敗 (試行 {}/{}): {}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap())
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        // Connect with timeout
        let mut stream = timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("接続がタイムアウトしました")?
            .context("Daemonに接続できません。'sitelimit daemon' を起動してください")?;

        // Serialize request
        let request_json =
            serde_json::to_string(request).context("リクエストのシリアライズに失敗しました")?;

        // Send request with timeout
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(request_json.as_bytes()),
        )
        .await
        .context("書き込みがタイムアウトしました")?
        .context("リクエストの送信に失敗しました")?;

        // Flush
        timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.flush())
            .await
            .context("フラッシュがタイムアウトしました")?
            .context("フラッシュに失敗しました")?;

        // Shutdown write side to signal end of request
        stream
            .shutdown()
            .await
            .context("シャットダウンに失敗しました")?;

        // Read response with timeout
        let mut buffer = vec![0u8; MAX_RESPONSE_SIZE];
        let n = timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.read(&mut buffer),
        )
        .await
        .context("読み込みがタイムアウトしました")?
        .context("レスポンスの受信に失敗しました")?;

        if n == 0 {
            anyhow::bail!("Daemonからの応答がありませんでした");
        }

        // Deserialize response
        let response: IpcResponse =
            serde_json::from_slice(&buffer[..n]).context("レスポンスのパースに失敗しました")?;

        // Check for error response
        if response.status == "error" {
            anyhow::bail!("{}", response.message);
        }

        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_socket_path() {
        let client = IpcClient::with_socket_path(PathBuf::from("/tmp/test.sock"));
        assert_eq!(client.socket_path(), &PathBuf::from("/tmp/test.sock"));
    }

    #[tokio::test]
    async fn test_request_fails_without_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::with_socket_path(dir.path().join("absent.sock"));
        // No daemon bound; all retries fail.
        let result = client.status().await;
        assert!(result.is_err());
    }
}
