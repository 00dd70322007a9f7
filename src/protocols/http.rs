//! Shared HTTP plumbing for the HTTP-carried detectors

use std::time::Duration;

use reqwest::redirect::Policy;

use crate::error::Result;

/// Build a probe client bound to one target host.
///
/// Redirects are followed only while they stay on that host; camera web
/// servers routinely present self-signed certificates, so certificate
/// validation failures are treated as a per-probe condition rather than an
/// error.
pub(crate) fn probe_client(host: String, timeout: Duration) -> Result<reqwest::Client> {
    let policy = Policy::custom(move |attempt| {
        if attempt.previous().len() >= 5 {
            return attempt.stop();
        }
        match attempt.url().host_str() {
            Some(h) if h == host => attempt.follow(),
            _ => attempt.stop(),
        }
    });

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(policy)
        .danger_accept_invalid_certs(true)
        .build()?;
    Ok(client)
}

/// Read at most `limit` bytes of a response body.
///
/// MJPEG endpoints stream forever, so the body must never be drained in
/// full; chunks accumulate until the limit is reached or the stream ends.
pub(crate) async fn read_prefix(mut response: reqwest::Response, limit: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::with_capacity(limit.min(8192));
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
                if take < chunk.len() {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    buf
}

/// Content-Type header value, empty when absent
pub(crate) fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
