use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, redirect, Client, StatusCode};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::config::ProbeSection;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build probe http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result of one reachability check against a stream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable { reason: String },
    Invalid { reason: String },
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Reachable => None,
            ProbeOutcome::Unreachable { reason } | ProbeOutcome::Invalid { reason } => {
                Some(reason.as_str())
            }
        }
    }
}

/// Seam between the scheduler and the network, so sweeps can be driven
/// against scripted outcomes in tests.
#[async_trait]
pub trait ChannelProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Two-stage reachability probe for remote media URLs.
///
/// Stage one is a header-only request: cheap, and enough for well-behaved
/// origins. Origins that reject HEAD but happily stream data get a second
/// chance through a small ranged GET, where the first body chunk settles
/// the verdict regardless of status code. Errors never escape: every
/// failure mode collapses into `ProbeOutcome`.
pub struct StreamProbe {
    client: Client,
    primary_timeout: Duration,
    fallback_timeout: Duration,
    max_body_bytes: u64,
}

impl StreamProbe {
    pub fn new(config: &ProbeSection) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            primary_timeout: Duration::from_secs(config.primary_timeout_seconds),
            fallback_timeout: Duration::from_secs(config.fallback_timeout_seconds),
            max_body_bytes: config.max_body_bytes.max(1),
        })
    }

    async fn head_check(&self, url: &Url) -> Option<ProbeOutcome> {
        match timeout(self.primary_timeout, self.client.head(url.clone()).send()).await {
            Ok(Ok(response)) if is_live_status(response.status()) => Some(ProbeOutcome::Reachable),
            Ok(Ok(response)) => {
                debug!(target: "stream_probe", url = %url, status = %response.status(), "head probe inconclusive");
                None
            }
            Ok(Err(err)) => {
                debug!(target: "stream_probe", url = %url, error = %err, "head probe failed");
                None
            }
            Err(_) => {
                debug!(target: "stream_probe", url = %url, "head probe timed out");
                None
            }
        }
    }

    /// Ranged GET fallback. The byte range caps what a cooperative server
    /// sends, and the first-chunk early return bounds the read even when
    /// the server ignores `Range` and answers 200 with a full body.
    /// Dropping the response tears the connection down.
    async fn ranged_get(&self, url: &Url) -> ProbeOutcome {
        let range = format!("bytes=0-{}", self.max_body_bytes - 1);
        let attempt = async {
            let response = self
                .client
                .get(url.clone())
                .header(header::RANGE, range)
                .send()
                .await?;
            let status = response.status();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                if !chunk?.is_empty() {
                    return Ok(ProbeOutcome::Reachable);
                }
            }
            // Body completed without a single byte: fall back to status.
            Ok::<_, reqwest::Error>(if is_live_status(status) {
                ProbeOutcome::Reachable
            } else {
                ProbeOutcome::Unreachable {
                    reason: format!("status {status}"),
                }
            })
        };
        match timeout(self.fallback_timeout, attempt).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => ProbeOutcome::Unreachable {
                reason: err.to_string(),
            },
            Err(_) => ProbeOutcome::Unreachable {
                reason: "fallback timeout".to_string(),
            },
        }
    }
}

#[async_trait]
impl ChannelProber for StreamProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => {
                return ProbeOutcome::Invalid {
                    reason: "invalid url".to_string(),
                }
            }
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return ProbeOutcome::Invalid {
                reason: format!("unsupported scheme {}", parsed.scheme()),
            };
        }
        if let Some(outcome) = self.head_check(&parsed).await {
            return outcome;
        }
        self.ranged_get(&parsed).await
    }
}

fn is_live_status(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_section() -> ProbeSection {
        ProbeSection {
            primary_timeout_seconds: 1,
            fallback_timeout_seconds: 1,
            max_body_bytes: 1024,
            user_agent: "canaltv-test".to_string(),
        }
    }

    #[test]
    fn live_status_covers_success_and_redirects() {
        assert!(is_live_status(StatusCode::OK));
        assert!(is_live_status(StatusCode::PARTIAL_CONTENT));
        assert!(is_live_status(StatusCode::FOUND));
        assert!(!is_live_status(StatusCode::NOT_FOUND));
        assert!(!is_live_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn malformed_url_fails_without_network() {
        let probe = StreamProbe::new(&probe_section()).unwrap();
        let outcome = probe.probe("not a url").await;
        assert_eq!(
            outcome,
            ProbeOutcome::Invalid {
                reason: "invalid url".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid() {
        let probe = StreamProbe::new(&probe_section()).unwrap();
        let outcome = probe.probe("rtsp://origin.example/stream").await;
        assert!(matches!(outcome, ProbeOutcome::Invalid { .. }));
        assert_eq!(outcome.reason(), Some("unsupported scheme rtsp"));
    }
}
