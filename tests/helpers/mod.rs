#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, header::CONTENT_TYPE},
};
use ytmp3_backend::{
    config::AllowedOrigins,
    http::{AppState, build_cors_layer, build_router},
    job::Converter,
    local::{DownloadTool, LocalConverter, ToolError, ToolInvocation},
    store::TempStore,
};

pub const FAKE_MP3: &[u8] = b"ID3\x04\x00\x00fake-mp3-frames";

#[derive(Debug, Clone, Copy)]
pub enum Produce {
    Final,
    Alternate,
    Nothing,
    Unavailable,
    /// Leaves yt-dlp's intermediate files behind, then fails.
    PartialThenUnavailable,
}

pub struct StubTool {
    produce: Produce,
    calls: AtomicUsize,
    templates: Mutex<Vec<PathBuf>>,
}

impl StubTool {
    pub fn new(produce: Produce) -> Arc<Self> {
        Arc::new(Self {
            produce,
            calls: AtomicUsize::new(0),
            templates: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn templates(&self) -> Vec<PathBuf> {
        self.templates.lock().unwrap().clone()
    }
}

fn with_extension(template: &Path, ext: &str) -> PathBuf {
    PathBuf::from(template.to_string_lossy().replace("%(ext)s", ext))
}

#[async_trait]
impl DownloadTool for StubTool {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.templates
            .lock()
            .unwrap()
            .push(invocation.output_template.clone());

        match self.produce {
            Produce::Final => {
                tokio::fs::write(with_extension(&invocation.output_template, "mp3"), FAKE_MP3)
                    .await?
            }
            Produce::Alternate => {
                tokio::fs::write(with_extension(&invocation.output_template, "webm"), FAKE_MP3)
                    .await?
            }
            Produce::Nothing => {}
            Produce::PartialThenUnavailable => {
                for ext in ["m4a", "m4a.part", "webm.part"] {
                    tokio::fs::write(with_extension(&invocation.output_template, ext), FAKE_MP3)
                        .await?;
                }
                return Err(ToolError::Unavailable(
                    "ERROR: Postprocessing: audio conversion failed".to_string(),
                ));
            }
            Produce::Unavailable => {
                return Err(ToolError::Unavailable(
                    "ERROR: [youtube] abc: Private video".to_string(),
                ));
            }
        }

        Ok(())
    }
}

pub struct LocalFixture {
    pub dir: tempfile::TempDir,
    pub store: TempStore,
    pub tool: Arc<StubTool>,
    pub converter: Arc<LocalConverter>,
}

impl LocalFixture {
    pub async fn new(produce: Produce) -> Self {
        Self::with_stale_after(produce, Duration::from_secs(3600)).await
    }

    pub async fn with_stale_after(produce: Produce, stale_after: Duration) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TempStore::open(dir.path().join("temp")).await.unwrap();
        let tool = StubTool::new(produce);
        let converter = Arc::new(LocalConverter::new(
            store.clone(),
            tool.clone(),
            stale_after,
        ));

        Self {
            dir,
            store,
            tool,
            converter,
        }
    }

    pub fn router(&self) -> Router {
        app(self.converter.clone())
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }

    pub async fn wait_until_empty(&self) -> bool {
        for _ in 0..100 {
            if self.temp_files().is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

pub fn app(converter: Arc<dyn Converter>) -> Router {
    build_router(
        AppState::new(converter),
        build_cors_layer(&AllowedOrigins::Any),
    )
}

pub fn convert_request(url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("url={}", urlencoding::encode(url))))
        .unwrap()
}

pub fn multipart_request(fields: &[(&str, &str)]) -> Request<Body> {
    let boundary = "XyZ-convert-boundary";
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
