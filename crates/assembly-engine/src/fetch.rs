//! Asset fetching for image, video, and audio sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shortreel_common::error::{ReelError, ReelResult};

use crate::workspace::JobWorkspace;

/// Resolves a source reference to its bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> ReelResult<Vec<u8>>;

    /// Fetcher name for logs.
    fn name(&self) -> &str;
}

/// Serves `file://` URLs and plain filesystem paths.
#[derive(Debug, Clone, Default)]
pub struct LocalAssetFetcher {
    /// Base directory for relative paths (process working directory if unset).
    root: Option<PathBuf>,
}

impl LocalAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> ReelResult<PathBuf> {
        let raw = if let Some(rest) = url.strip_prefix("file://") {
            rest.strip_prefix("localhost").unwrap_or(rest)
        } else if let Some((scheme, _)) = url.split_once("://") {
            return Err(ReelError::asset_fetch(
                url,
                format!("unsupported scheme '{scheme}'"),
            ));
        } else {
            url
        };
        if raw.trim().is_empty() {
            return Err(ReelError::asset_fetch(url, "empty path"));
        }

        let path = Path::new(raw);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait]
impl AssetFetcher for LocalAssetFetcher {
    async fn fetch(&self, url: &str) -> ReelResult<Vec<u8>> {
        let path = self.resolve(url)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ReelError::asset_fetch(url, format!("{}: {e}", path.display())))?;
        if bytes.is_empty() {
            return Err(ReelError::asset_fetch(url, "asset is empty"));
        }
        Ok(bytes)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Fetch `url` and store it in the workspace as `{stem}.{ext}`.
pub async fn fetch_into(
    fetcher: &dyn AssetFetcher,
    url: &str,
    workspace: &JobWorkspace,
    stem: &str,
) -> ReelResult<PathBuf> {
    let bytes = fetcher.fetch(url).await?;
    let path = workspace.file(&format!("{stem}.{}", extension_of(url)));
    tokio::fs::write(&path, &bytes).await?;
    tracing::debug!(
        url,
        fetcher = fetcher.name(),
        bytes = bytes.len(),
        path = %path.display(),
        "Fetched asset"
    );
    Ok(path)
}

/// File extension of a URL path, ignoring query and fragment. Falls back to `bin`.
pub fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_string(),
    }
}
