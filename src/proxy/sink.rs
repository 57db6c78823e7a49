//! Result sinks receiving the final ordered list

use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// Consumer of the final output lines
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, lines: &[String]) -> Result<()>;
}

/// Writes lines to a file, one per line.
///
/// An empty result leaves any existing file untouched.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn deliver(&self, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            warn!(path = %self.path.display(), "no entries, output file not written");
            return Ok(());
        }
        tokio::fs::write(&self.path, lines.join("\n")).await?;
        info!(path = %self.path.display(), entries = lines.len(), "wrote output");
        Ok(())
    }
}

/// Prints lines to stdout
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

#[async_trait]
impl ResultSink for StdoutSink {
    async fn deliver(&self, lines: &[String]) -> Result<()> {
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }
}
