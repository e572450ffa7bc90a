#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use vddk_builder_auth::AuthorizationGate;
use vddk_builder_auth::testing::StaticReviewer;
use vddk_builder_build::testing::{RecordingBuilder, RecordingPusher};
use vddk_builder_build::{BuildOrchestrator, BuildSlot, OrchestratorSettings};
use vddk_builder_registry::testing::StaticProbe;
use vddk_builderd::{AppState, app};

pub const REGISTRY: &str = "registry.local:5000";
pub const DEFAULT_IMAGE: &str = "vddk";
pub const ADMIN_TOKEN: &str = "cluster-admin-token";
pub const VIEWER_TOKEN: &str = "viewer-token";
pub const BROKEN_TOKEN: &str = "broken-token";

pub struct ServerOptions {
    pub require_auth: bool,
    pub builder: RecordingBuilder,
    pub pusher: RecordingPusher,
    pub probe: StaticProbe,
    pub upload_max_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            require_auth: false,
            builder: RecordingBuilder::new(),
            pusher: RecordingPusher::new(),
            probe: StaticProbe::new(),
            upload_max_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Router bound to an ephemeral port with in-process fakes behind it
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub slot: BuildSlot,
    pub builder: Arc<RecordingBuilder>,
    pub pusher: Arc<RecordingPusher>,
    pub probe: Arc<StaticProbe>,
    pub reviewer: Arc<StaticReviewer>,
    pub upload_dir: PathBuf,
    pub staging_dir: PathBuf,
    _root: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_options(ServerOptions::default()).await
    }

    pub async fn with_options(options: ServerOptions) -> Self {
        let root = tempfile::tempdir().unwrap();
        let upload_dir = root.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();
        let staging_dir = root.path().join("work").join("extracted");

        let builder = Arc::new(options.builder);
        let pusher = Arc::new(options.pusher);
        let probe = Arc::new(options.probe);
        let reviewer = Arc::new(StaticReviewer::allowing([ADMIN_TOKEN]).failing_on(BROKEN_TOKEN));
        let slot = BuildSlot::new();

        let orchestrator = BuildOrchestrator::new(
            OrchestratorSettings {
                registry_host: REGISTRY.to_string(),
                default_image_name: DEFAULT_IMAGE.to_string(),
                staging_dir: staging_dir.clone(),
            },
            builder.clone(),
            pusher.clone(),
        );

        let state = AppState {
            gate: Arc::new(AuthorizationGate::new(
                options.require_auth,
                reviewer.clone(),
            )),
            slot: slot.clone(),
            orchestrator: Arc::new(orchestrator),
            probe: probe.clone(),
            upload_dir: upload_dir.clone(),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state, options.upload_max_bytes);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            slot,
            builder,
            pusher,
            probe,
            reviewer,
            upload_dir,
            staging_dir,
            _root: root,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// `POST /upload` with `archive` as the `file` field
    pub async fn upload(
        &self,
        query: &str,
        token: Option<&str>,
        file_name: &str,
        archive: Vec<u8>,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(archive).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(self.url(&format!("/upload{}", query)))
            .multipart(form);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    pub async fn check_image(&self, query: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(&format!("/check-image{}", query)));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    /// Wait until the detached build has released the slot
    pub async fn wait_until_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.slot.is_busy() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("build did not finish in time");
    }

    pub fn uploaded_files(&self) -> Vec<String> {
        list_dir(&self.upload_dir)
    }
}

pub fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// gzip-compressed tar holding `files` as regular files
pub fn build_context(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        archive
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }

    archive.into_inner().unwrap().finish().unwrap()
}

pub fn vddk_context() -> Vec<u8> {
    build_context(&[
        ("Containerfile.vddk", "FROM scratch\nCOPY vmware-vix-disklib-distrib /\n"),
        ("vmware-vix-disklib-distrib/lib64/libvixDiskLib.so", "ELF"),
    ])
}
