//! Candidate sources: local files, remote lists and in-memory text

use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default remote candidate list
pub const DEFAULT_LIST_URL: &str = "https://zip.cm.edu.kg/all.txt";

/// Default timeout for downloading a list in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Producer of raw candidate list text
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Human readable origin, used in logs
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<String>;
}

/// Candidate list stored on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Remote candidate list, optionally mirrored to a local file.
///
/// When the local copy already exists it is used instead of downloading.
pub struct HttpSource {
    url: String,
    client: Client,
    local_copy: Option<PathBuf>,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
            local_copy: None,
        })
    }

    pub fn with_local_copy(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_copy = Some(path.into());
        self
    }

    async fn download(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let content = response.text().await?;
        info!(url = %self.url, bytes = content.len(), "downloaded candidate list");
        Ok(content)
    }
}

#[async_trait]
impl CandidateSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<String> {
        let Some(path) = &self.local_copy else {
            return self.download().await;
        };

        if tokio::fs::try_exists(path).await? {
            info!(path = %path.display(), "using existing local copy");
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        let content = self.download().await?;
        if let Err(e) = tokio::fs::write(path, &content).await {
            warn!(path = %path.display(), error = %e, "failed to save local copy");
        }
        Ok(content)
    }
}

/// In-memory candidate list
#[derive(Debug, Clone)]
pub struct TextSource {
    content: String,
}

impl TextSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[async_trait]
impl CandidateSource for TextSource {
    fn describe(&self) -> String {
        "inline text".to_string()
    }

    async fn fetch(&self) -> Result<String> {
        Ok(self.content.clone())
    }
}
