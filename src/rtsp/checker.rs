//! Stream verification and discovery on top of the RTSP client

use std::net::Ipv4Addr;

use crate::config::RtspConfig;
use crate::error::{Error, Result};
use crate::models::RtspStreamInfo;

use super::client::RtspClient;
use super::ffprobe;
use super::sdp::parse_sdp;

/// A stream to verify
#[derive(Debug, Clone)]
pub struct StreamCheckRequest {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Outcome of one verification
#[derive(Debug, Clone)]
pub struct StreamCheckResult {
    pub url: String,
    pub stream: Option<RtspStreamInfo>,
    pub available: bool,
    pub error: Option<String>,
}

/// Verifies RTSP streams and enumerates the ones a device exposes
pub struct Checker {
    config: RtspConfig,
}

impl Checker {
    pub fn new(config: RtspConfig) -> Self {
        Self { config }
    }

    /// Verify one stream URL: OPTIONS, DESCRIBE, SDP decode. When the
    /// built-in client fails and ffprobe is enabled, fall back to it.
    pub async fn check_stream(
        &self,
        rtsp_url: &str,
        username: &str,
        password: &str,
    ) -> Result<RtspStreamInfo> {
        tracing::debug!(url = %rtsp_url, "Checking RTSP stream");

        match self.check_with_client(rtsp_url, username, password).await {
            Ok(info) => Ok(info),
            Err(client_err) => {
                if !self.config.use_ffmpeg {
                    return Err(client_err);
                }
                tracing::debug!(
                    url = %rtsp_url,
                    error = %client_err,
                    "RTSP client failed, trying ffprobe fallback"
                );
                let info = ffprobe::probe_stream(
                    rtsp_url,
                    username,
                    password,
                    &self.config.ffmpeg_path,
                    self.config.timeout(),
                )
                .await
                .map_err(|probe_err| {
                    Error::Rtsp(format!(
                        "both RTSP client and ffprobe failed: {client_err}; {probe_err}"
                    ))
                })?;
                Ok(info.into_model())
            }
        }
    }

    async fn check_with_client(
        &self,
        rtsp_url: &str,
        username: &str,
        password: &str,
    ) -> Result<RtspStreamInfo> {
        let mut client =
            RtspClient::connect(rtsp_url, username, password, self.config.timeout()).await?;

        let options = client.options().await?;
        if options.status_code != 200 {
            return Err(Error::Rtsp(format!(
                "OPTIONS returned {} {}",
                options.status_code, options.status_text
            )));
        }

        let describe = client.describe().await?;
        if describe.status_code != 200 {
            return Err(Error::Rtsp(format!(
                "DESCRIBE returned {} {}",
                describe.status_code, describe.status_text
            )));
        }

        // A malformed or empty SDP still counts as an available stream;
        // DESCRIBE said 200, the description is just incomplete.
        let mut info = parse_sdp(&describe.body);
        info.url = rtsp_url.to_string();
        info.available = true;
        Ok(info.into_model())
    }

    /// Quick availability test without SDP decoding
    pub async fn test_stream(
        &self,
        rtsp_url: &str,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        let mut client =
            RtspClient::connect(rtsp_url, username, password, self.config.timeout()).await?;
        let response = client.options().await?;
        Ok(response.status_code == 200)
    }

    /// Verify several streams concurrently
    pub async fn check_many(&self, requests: Vec<StreamCheckRequest>) -> Vec<StreamCheckResult> {
        let mut results = Vec::with_capacity(requests.len());
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let checker = Checker::new(self.config.clone());
            handles.push(tokio::spawn(async move {
                let outcome = checker
                    .check_stream(&request.url, &request.username, &request.password)
                    .await;
                match outcome {
                    Ok(stream) => StreamCheckResult {
                        url: request.url,
                        available: stream.available,
                        stream: Some(stream),
                        error: None,
                    },
                    Err(e) => StreamCheckResult {
                        url: request.url,
                        stream: None,
                        available: false,
                        error: Some(e.to_string()),
                    },
                }
            }));
        }

        for handle in handles {
            if let Ok(result) = handle.await {
                results.push(result);
            }
        }
        results
    }

    /// Enumerate streams on a host: every configured default path, then a
    /// root-path DESCRIBE. Results dedup by URL string equality.
    pub async fn discover_streams(
        &self,
        ip: Ipv4Addr,
        port: u16,
        username: &str,
        password: &str,
    ) -> Vec<RtspStreamInfo> {
        let base = if port == 554 {
            format!("rtsp://{ip}")
        } else {
            format!("rtsp://{ip}:{port}")
        };

        let mut discovered: Vec<RtspStreamInfo> = Vec::new();
        let mut candidates: Vec<String> = self
            .config
            .default_paths
            .iter()
            .map(|path| format!("{base}{path}"))
            .collect();
        candidates.push(format!("{base}/"));

        tracing::debug!(ip = %ip, paths = candidates.len(), "Discovering RTSP streams");

        for url in candidates {
            if discovered.iter().any(|s| s.url == url) {
                continue;
            }
            match self.check_stream(&url, username, password).await {
                Ok(stream) if stream.available => {
                    tracing::info!(
                        url = %url,
                        codec = %stream.codec,
                        resolution = %stream.resolution,
                        fps = stream.fps,
                        "Discovered RTSP stream"
                    );
                    discovered.push(stream);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Stream not available");
                }
            }
        }

        discovered
    }
}
