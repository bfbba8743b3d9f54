//! Per-job working directory.
//!
//! Every intermediate file of a job lives under one uniquely named
//! directory. The directory is removed when the workspace is closed or
//! dropped, so success, failure, and cancellation all clean up.

use std::path::{Path, PathBuf};

use shortreel_common::error::{ReelError, ReelResult};
use tempfile::TempDir;

/// Scoped owner of a job's intermediate files.
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: String,
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh directory under `root`, named after the job plus a
    /// random suffix.
    pub fn create(root: &Path, job_id: &str) -> ReelResult<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("shortreel-{}-", sanitize_component(job_id)))
            .tempdir_in(root)?;
        tracing::debug!(job_id, dir = %dir.path().display(), "Created job workspace");
        Ok(Self {
            job_id: job_id.to_string(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the rendered clip for scene `index`.
    pub fn scene_clip_path(&self, index: usize) -> PathBuf {
        self.file(&format!("scene_{index:03}.mp4"))
    }

    /// Path of any other intermediate file.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Move a finished file out of the workspace to `dest`.
    ///
    /// Uses a rename when possible; across filesystems the file is copied to
    /// a hidden sibling of `dest` first, so `dest` only ever appears complete.
    pub fn commit(&self, staged: &Path, dest: &Path) -> ReelResult<()> {
        if !staged.starts_with(self.path()) {
            return Err(ReelError::media(format!(
                "refusing to commit {} from outside the job workspace",
                staged.display()
            )));
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if std::fs::rename(staged, dest).is_ok() {
            return Ok(());
        }

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let partial = dest.with_file_name(format!(".{file_name}.partial"));
        let copied = std::fs::copy(staged, &partial).and_then(|_| std::fs::rename(&partial, dest));
        if let Err(e) = copied {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the directory and everything in it.
    pub fn close(self) -> ReelResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(job_id = %self.job_id, dir = %path.display(), "Removed job workspace");
        Ok(())
    }
}

/// Reduce an id to characters safe in a file name.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "job".to_string()
    } else {
        cleaned
    }
}
