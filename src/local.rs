//! Local conversion backend: yt-dlp downloads the best audio stream and transcodes it to MP3
//! into the temporary store.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    config::{ConfigError, LocalConfig},
    error::ConversionError,
    job::{ConversionJob, ConversionResult, Converter, DownloadedFile, validate_source_url},
    store::{TARGET_EXTENSION, TempArtifact, TempStore, resolve_output},
};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool ran and reported that the resource could not be fetched.
    #[error("{0}")]
    Unavailable(String),
    #[error("{0} is not installed or not on PATH")]
    Missing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ToolError> for ConversionError {
    fn from(value: ToolError) -> Self {
        match value {
            ToolError::Unavailable(detail) => ConversionError::UpstreamUnavailable(detail),
            other => ConversionError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub url: String,
    pub output_template: PathBuf,
}

#[async_trait]
pub trait DownloadTool: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpOptions {
    pub cookies_path: PathBuf,
    pub audio_quality_kbps: u32,
    pub socket_timeout: Duration,
    pub player_clients: Vec<String>,
}

impl YtDlpOptions {
    pub fn args(&self, invocation: &ToolInvocation) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            TARGET_EXTENSION.to_string(),
            "--audio-quality".to_string(),
            format!("{}K", self.audio_quality_kbps),
            "--cookies".to_string(),
            self.cookies_path.to_string_lossy().into_owned(),
            "--no-cache-dir".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
            "--no-playlist".to_string(),
            "--no-check-certificates".to_string(),
        ];

        if !self.player_clients.is_empty() {
            args.push("--extractor-args".to_string());
            args.push(format!(
                "youtube:player_client={}",
                self.player_clients.join(",")
            ));
        }

        args.push("-o".to_string());
        args.push(invocation.output_template.to_string_lossy().into_owned());
        args.push(invocation.url.clone());
        args
    }
}

pub struct YtDlp {
    bin: String,
    options: YtDlpOptions,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>, options: YtDlpOptions) -> Self {
        Self {
            bin: bin.into(),
            options,
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        Self::new(
            config.ytdlp_bin.clone(),
            YtDlpOptions {
                cookies_path: config.cookies_path.clone(),
                audio_quality_kbps: config.audio_quality_kbps,
                socket_timeout: config.socket_timeout,
                player_clients: config.player_clients.clone(),
            },
        )
    }
}

#[async_trait]
impl DownloadTool for YtDlp {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
        let args = self.options.args(invocation);
        debug!("Running {} {:?}", self.bin, args);

        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ToolError::Missing(self.bin.clone())
                } else {
                    ToolError::Io(error)
                }
            })?;

        if !output.status.success() {
            return Err(ToolError::Unavailable(last_error_line(&output.stderr)));
        }

        Ok(())
    }
}

fn last_error_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited without completing the download")
        .to_string()
}

pub struct LocalConverter {
    store: TempStore,
    tool: Arc<dyn DownloadTool>,
    stale_after: Duration,
}

impl LocalConverter {
    pub fn new(store: TempStore, tool: Arc<dyn DownloadTool>, stale_after: Duration) -> Self {
        Self {
            store,
            tool,
            stale_after,
        }
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    async fn execute(&self, job: &ConversionJob) -> Result<PathBuf, ConversionError> {
        let invocation = ToolInvocation {
            url: job.source_url.clone(),
            output_template: job.output.template.clone(),
        };
        self.tool.run(&invocation).await?;
        resolve_output(&job.output).await
    }
}

#[async_trait]
impl Converter for LocalConverter {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn convert(&self, url: &str) -> Result<ConversionResult, ConversionError> {
        let url = validate_source_url(url)?;
        self.store.sweep_stale(self.stale_after).await;

        let job = ConversionJob::new(url, &self.store);
        info!(job_id = %job.job_id, "Conversion started for: {}", job.source_url);

        match self.execute(&job).await {
            Ok(path) => {
                info!(job_id = %job.job_id, "Conversion finished: {:?}", path);
                Ok(ConversionResult::File(DownloadedFile {
                    filename: job.display_filename(),
                    artifact: TempArtifact::new(path),
                }))
            }
            Err(error) => {
                warn!(job_id = %job.job_id, "Conversion failed: {error}");
                self.store.discard_job(&job.job_id).await;
                Err(error)
            }
        }
    }
}

/// Startup precondition for the local backend.
pub async fn validate_cookie_file(path: &Path) -> Result<(), ConfigError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::CookiesNotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::CookiesUnreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_file() {
        return Err(ConfigError::CookiesNotFound(path.to_path_buf()));
    }

    tokio::fs::File::open(path)
        .await
        .map(drop)
        .map_err(|source| ConfigError::CookiesUnreadable {
            path: path.to_path_buf(),
            source,
        })
}
