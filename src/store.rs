use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::ConversionError, job::JobId};

pub const TARGET_EXTENSION: &str = "mp3";
/// Left behind by yt-dlp when the download landed but the transcode step did not rename it.
pub const ALTERNATE_EXTENSION: &str = "webm";

#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    /// yt-dlp output template, `<dir>/<id>.%(ext)s`.
    pub template: PathBuf,
    pub final_path: PathBuf,
    pub alternate_path: PathBuf,
}

impl TempStore {
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths_for(&self, job_id: &JobId) -> JobPaths {
        JobPaths {
            template: self.dir.join(format!("{job_id}.%(ext)s")),
            final_path: self.dir.join(format!("{job_id}.{TARGET_EXTENSION}")),
            alternate_path: self.dir.join(format!("{job_id}.{ALTERNATE_EXTENSION}")),
        }
    }

    pub async fn sweep_stale(&self, older_than: Duration) -> usize {
        if older_than.is_zero() {
            return 0;
        }

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    warn!("Could not open temp directory for sweeping: {error}");
                }
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let maybe_entry = match entries.next_entry().await {
                Ok(value) => value,
                Err(error) => {
                    warn!("Could not iterate temp directory for sweeping: {error}");
                    break;
                }
            };

            let Some(entry) = maybe_entry else {
                break;
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!("Could not read metadata of {:?}: {error}", path);
                    continue;
                }
            };

            let modified_at = match metadata.modified() {
                Ok(value) => value,
                Err(error) => {
                    warn!("Could not read modification time of {:?}: {error}", path);
                    continue;
                }
            };

            let age = now.duration_since(modified_at).unwrap_or_default();
            if age < older_than {
                continue;
            }

            if metadata.is_file() && is_job_artifact(&path) && remove_artifact(&path).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {removed} stale temp artifact(s) from {:?}", self.dir);
        }
        removed
    }

    /// Removes whatever a failed job may have left behind, including yt-dlp's intermediate
    /// `<id>.<ext>` and `<id>.<ext>.part` files.
    pub async fn discard_job(&self, job_id: &JobId) -> usize {
        let prefix = format!("{job_id}.");
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Could not open temp directory to discard job {job_id}: {error}");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    warn!("Could not iterate temp directory to discard job {job_id}: {error}");
                    break;
                }
            };

            let owned_by_job = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if owned_by_job && remove_artifact(&entry.path()).await {
                removed += 1;
            }
        }
        removed
    }
}

/// Finds the job's finished file, renaming the alternate-extension leftover when that is all
/// the tool produced.
pub async fn resolve_output(paths: &JobPaths) -> Result<PathBuf, ConversionError> {
    if is_file(&paths.final_path).await? {
        return Ok(paths.final_path.clone());
    }

    if is_file(&paths.alternate_path).await? {
        tokio::fs::rename(&paths.alternate_path, &paths.final_path)
            .await
            .map_err(|error| {
                ConversionError::Internal(format!(
                    "could not rename {:?} to {:?}: {error}",
                    paths.alternate_path, paths.final_path
                ))
            })?;
        info!(
            "Renamed {:?} to {:?} after transcode left the alternate extension",
            paths.alternate_path, paths.final_path
        );
        return Ok(paths.final_path.clone());
    }

    Err(ConversionError::ConversionFailed(format!(
        "neither {:?} nor {:?} was created",
        paths.final_path, paths.alternate_path
    )))
}

/// Only files named after a job id are ours to sweep.
fn is_job_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split_once('.'))
        .is_some_and(|(stem, _)| Uuid::parse_str(stem).is_ok())
}

async fn is_file(path: &Path) -> Result<bool, ConversionError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(ConversionError::Internal(format!(
            "could not inspect {:?}: {error}",
            path
        ))),
    }
}

/// Best-effort delete. Returns whether a file was actually removed.
pub async fn remove_artifact(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed temp artifact {:?}", path);
            true
        }
        Err(error) if error.kind() == ErrorKind::NotFound => false,
        Err(error) => {
            warn!("Cleanup failed for {:?}: {error}", path);
            false
        }
    }
}

fn remove_artifact_blocking(path: &Path) {
    if let Err(error) = std::fs::remove_file(path)
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Cleanup failed for {:?}: {error}", path);
    }
}

/// Owns a confirmed output file; the file is deleted once, when the guard is dropped.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_artifact(&path).await;
                });
            }
            Err(_) => remove_artifact_blocking(&path),
        }
    }
}
