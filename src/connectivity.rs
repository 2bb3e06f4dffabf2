use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Pre-flight network check run before loading from the hosted database.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Used when no probe URL is configured (local store only).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

#[async_trait]
impl Connectivity for AssumeOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Reports online when a HEAD request to `url` gets any HTTP response.
#[derive(Clone)]
pub struct HttpProbe {
    http: Client,
    url: Url,
}

impl fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbe")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpProbe {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("studio-admin/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connectivity for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.http.head(self.url.clone()).send().await {
            Ok(res) => {
                debug!(status = %res.status(), url = %self.url, "connectivity probe answered");
                true
            }
            Err(err) => {
                debug!(?err, url = %self.url, "connectivity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_probe_reports_offline() {
        // Port 9 on localhost is the discard service; nothing listens there in CI.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let probe = HttpProbe::new(url, Duration::from_millis(300)).unwrap();
        assert!(!probe.is_online().await);
        assert!(AssumeOnline.is_online().await);
    }
}
