use std::{fmt, path::Path};

use async_trait::async_trait;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::{
    error::ConversionError,
    store::{JobPaths, TempArtifact, TempStore},
};

const SUPPORTED_DOMAINS: [&str; 2] = ["youtube.com", "youtu.be"];

/// Per-request identifier; namespaces every file a job writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source_url: String,
    pub job_id: JobId,
    pub output: JobPaths,
}

impl ConversionJob {
    pub fn new(source_url: &str, store: &TempStore) -> Self {
        let job_id = JobId::new();
        Self {
            source_url: source_url.to_string(),
            output: store.paths_for(&job_id),
            job_id,
        }
    }

    pub fn display_filename(&self) -> String {
        format!("{}.{}", self.job_id, crate::store::TARGET_EXTENSION)
    }
}

/// A converted file sitting in the temporary store. Dropping it deletes the file.
#[derive(Debug)]
pub struct DownloadedFile {
    pub filename: String,
    pub artifact: TempArtifact,
}

impl DownloadedFile {
    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

/// Remote conversion result relayed to the caller, who fetches the file itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RemoteMetadata {
    pub success: bool,
    pub title: String,
    #[serde(rename = "type")]
    pub file_type: Option<serde_json::Value>,
    pub size: Option<serde_json::Value>,
    pub download_url: String,
    pub duration: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ConversionResult {
    File(DownloadedFile),
    Redirect(String),
    Metadata(RemoteMetadata),
}

#[async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn convert(&self, url: &str) -> Result<ConversionResult, ConversionError>;
}

pub fn validate_source_url(input: &str) -> Result<&str, ConversionError> {
    let url = input.trim();
    if url.is_empty() {
        return Err(ConversionError::InvalidInput(
            "Please provide a YouTube URL.".to_string(),
        ));
    }

    if !is_supported_video_url(url) {
        return Err(ConversionError::InvalidInput(
            "Invalid YouTube URL".to_string(),
        ));
    }

    Ok(url)
}

fn is_supported_video_url(input: &str) -> bool {
    let parsed = match Url::parse(input) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    SUPPORTED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn accepts_youtube_hosts() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=abc",
            "  https://music.youtube.com/watch?v=abc  ",
        ] {
            assert!(validate_source_url(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn trims_accepted_urls() {
        assert_eq!(
            validate_source_url(" https://youtu.be/abc ").ok(),
            Some("https://youtu.be/abc")
        );
    }

    #[test]
    fn rejects_everything_else() {
        for url in [
            "",
            "   ",
            "not a url",
            "https://vimeo.com/12345",
            "ftp://youtube.com/watch?v=abc",
            "https://notyoutube.com/watch?v=abc",
            "https://example.com/?next=youtube.com",
        ] {
            assert!(
                matches!(
                    validate_source_url(url),
                    Err(ConversionError::InvalidInput(_))
                ),
                "{url:?} should be rejected"
            );
        }
    }

    #[test]
    fn job_ids_do_not_collide() {
        let ids: HashSet<JobId> = (0..10_000).map(|_| JobId::new()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
