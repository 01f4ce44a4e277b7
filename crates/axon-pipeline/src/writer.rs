use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub trait ArtifactWriter {
    #[allow(clippy::missing_errors_doc)]
    fn write(&self, path: &Path, content: &str) -> Result<()>;
}

/// Writes artifacts to the local filesystem, creating parent directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactWriter;

impl ArtifactWriter for FsArtifactWriter {
    fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create artifact directory {}", parent.display())
                })?;
            }
        }
        fs::write(path, content)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = content.len(), "saved artifact");
        Ok(())
    }
}
