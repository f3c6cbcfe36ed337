use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Read access to source text
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Reads straight from the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceReader;

#[async_trait]
impl SourceReader for FsSourceReader {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
