//! URL-list sources for batch submission.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("URL list not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("read URL list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Produces an ordered list of URLs from a path.
pub trait UrlListSource: Send + Sync {
    fn read_urls(&self, path: &Path) -> Result<Vec<String>, SourceError>;
}

/// Plain text file, one URL per line. Lines are trimmed; blank lines and
/// `#` comments are skipped; order is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlListFile;

impl UrlListFile {
    pub fn parse(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}

impl UrlListSource for UrlListFile {
    fn read_urls(&self, path: &Path) -> Result<Vec<String>, SourceError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound(path.to_path_buf())
            } else {
                SourceError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let urls = Self::parse(&text);
        tracing::debug!("read {} URLs from {}", urls.len(), path.display());
        Ok(urls)
    }
}
