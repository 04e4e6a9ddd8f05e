//! Shared fixtures: a sample image, an in-memory transport and an HTTP fake registry
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use image_migrator::digest::DigestUtils;
use image_migrator::error::{MigrateError, Result};
use image_migrator::events::{EventSink, TransferEvent};
use image_migrator::image::FetchedManifest;
use image_migrator::image::manifest::{DOCKER_MANIFEST_V2, OCI_CONFIG_V1, OCI_MANIFEST_V1};
use image_migrator::registry::{BlobWritten, RegistryCoordinates, RegistryTransport};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Config blob plus two layers and the manifest that lists them
#[derive(Debug, Clone)]
pub struct SampleImage {
    pub manifest: Vec<u8>,
    /// Content type a registry serves the manifest under
    pub content_type: String,
    pub config: (String, Vec<u8>),
    pub layers: Vec<(String, Vec<u8>)>,
}

impl SampleImage {
    /// Docker schema 2 image
    pub fn new() -> Self {
        Self::build(
            Some(DOCKER_MANIFEST_V2),
            "application/vnd.docker.container.image.v1+json",
            "application/vnd.docker.image.rootfs.diff.tar.gzip",
        )
    }

    /// OCI image whose manifest leaves out the optional top-level `mediaType`
    pub fn oci() -> Self {
        Self::build(None, OCI_CONFIG_V1, "application/vnd.oci.image.layer.v1.tar+gzip")
    }

    fn build(media_type: Option<&str>, config_type: &str, layer_type: &str) -> Self {
        let config = br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers"}}"#.to_vec();
        // Larger than one read chunk so streaming paths loop more than once.
        let layer1: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let layer2 = b"second layer contents".to_vec();

        let config = (DigestUtils::compute_docker_digest(&config), config);
        let layers = vec![
            (DigestUtils::compute_docker_digest(&layer1), layer1),
            (DigestUtils::compute_docker_digest(&layer2), layer2),
        ];

        let mut manifest = serde_json::json!({
            "schemaVersion": 2,
            "config": {
                "mediaType": config_type,
                "size": config.1.len(),
                "digest": config.0,
            },
            "layers": layers.iter().map(|(digest, data)| serde_json::json!({
                "mediaType": layer_type,
                "size": data.len(),
                "digest": digest,
            })).collect::<Vec<_>>(),
        });
        if let Some(media_type) = media_type {
            manifest["mediaType"] = serde_json::Value::from(media_type);
        }
        let manifest = serde_json::to_vec_pretty(&manifest).unwrap();

        Self {
            manifest,
            content_type: media_type.unwrap_or(OCI_MANIFEST_V1).to_string(),
            config,
            layers,
        }
    }

    pub fn config_digest(&self) -> &str {
        &self.config.0
    }

    /// Digest of layer `n`, counting from 1
    pub fn layer_digest(&self, n: usize) -> &str {
        &self.layers[n - 1].0
    }

    pub fn blobs(&self) -> impl Iterator<Item = &(String, Vec<u8>)> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }

    pub fn manifest_digest(&self) -> String {
        DigestUtils::compute_docker_digest(&self.manifest)
    }
}

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub registry: String,
    pub target: String,
}

#[derive(Default)]
struct Repo {
    manifests: HashMap<String, (Vec<u8>, String)>,
    blobs: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
struct FakeState {
    repos: HashMap<(String, String), Repo>,
    sessions: HashMap<String, (String, String)>,
    calls: Vec<Call>,
}

/// In-memory registries keyed by base URL and repository
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
    commit_failures: Mutex<HashMap<String, u16>>,
    corrupt_downloads: Mutex<HashSet<String>>,
    download_delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    session_counter: AtomicUsize,
}

fn key(coords: &RegistryCoordinates) -> (String, String) {
    (coords.base_url.clone(), coords.repository.clone())
}

fn not_found(coords: &RegistryCoordinates, operation: &'static str, target: &str) -> MigrateError {
    MigrateError::Protocol {
        registry: coords.base_url.clone(),
        repository: coords.repository.clone(),
        operation,
        target: target.to_string(),
        status: 404,
        body: "not found".to_string(),
    }
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_image(&self, coords: &RegistryCoordinates, tag: &str, image: &SampleImage) {
        self.seed_manifest(coords, tag, &image.manifest);
        self.set_manifest_type(coords, tag, &image.content_type);
        for (digest, data) in image.blobs() {
            self.seed_blob(coords, digest, data);
        }
    }

    pub fn seed_manifest(&self, coords: &RegistryCoordinates, tag: &str, manifest: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(key(coords))
            .or_default()
            .manifests
            .insert(tag.to_string(), (manifest.to_vec(), DOCKER_MANIFEST_V2.to_string()));
    }

    fn set_manifest_type(&self, coords: &RegistryCoordinates, tag: &str, content_type: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state
            .repos
            .get_mut(&key(coords))
            .and_then(|r| r.manifests.get_mut(tag))
        {
            entry.1 = content_type.to_string();
        }
    }

    pub fn seed_blob(&self, coords: &RegistryCoordinates, digest: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(key(coords))
            .or_default()
            .blobs
            .insert(digest.to_string(), data.to_vec());
    }

    /// Make `commit_blob` for `digest` answer with `status`
    pub fn fail_commit(&self, digest: &str, status: u16) {
        self.commit_failures
            .lock()
            .unwrap()
            .insert(digest.to_string(), status);
    }

    /// Serve altered bytes when `digest` is downloaded
    pub fn corrupt_download(&self, digest: &str) {
        self.corrupt_downloads
            .lock()
            .unwrap()
            .insert(digest.to_string());
    }

    pub fn delay_download(&self, digest: &str, delay: Duration) {
        self.download_delays
            .lock()
            .unwrap()
            .insert(digest.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Calls of one kind against one registry
    pub fn calls_to(&self, op: &str, registry: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == op && c.registry == registry)
            .collect()
    }

    pub fn manifest(&self, coords: &RegistryCoordinates, tag: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(&key(coords))
            .and_then(|r| r.manifests.get(tag))
            .map(|(raw, _)| raw.clone())
    }

    pub fn blob(&self, coords: &RegistryCoordinates, digest: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(&key(coords))
            .and_then(|r| r.blobs.get(digest))
            .cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str, coords: &RegistryCoordinates, target: &str) {
        self.state.lock().unwrap().calls.push(Call {
            op,
            registry: coords.base_url.clone(),
            target: target.to_string(),
        });
    }
}

#[async_trait]
impl RegistryTransport for FakeTransport {
    async fn fetch_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
    ) -> Result<FetchedManifest> {
        self.record("fetch_manifest", coords, reference);
        let (raw, content_type) = {
            let state = self.state.lock().unwrap();
            state
                .repos
                .get(&key(coords))
                .and_then(|r| r.manifests.get(reference))
                .cloned()
                .ok_or_else(|| not_found(coords, "fetch manifest", reference))?
        };
        FetchedManifest::parse(raw, Some(content_type)).map_err(|reason| MigrateError::ManifestFormat {
            registry: coords.base_url.clone(),
            repository: coords.repository.clone(),
            reference: reference.to_string(),
            reason,
        })
    }

    async fn manifest_exists(&self, coords: &RegistryCoordinates, reference: &str) -> Result<bool> {
        self.record("manifest_exists", coords, reference);
        Ok(self.manifest(coords, reference).is_some())
    }

    async fn blob_exists(&self, coords: &RegistryCoordinates, digest: &str) -> Result<bool> {
        self.record("blob_exists", coords, digest);
        Ok(self.blob(coords, digest).is_some())
    }

    async fn download_blob(
        &self,
        coords: &RegistryCoordinates,
        digest: &str,
        dest: &Path,
    ) -> Result<BlobWritten> {
        self.record("download_blob", coords, digest);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = self.download_delays.lock().unwrap().get(digest).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = async {
            let mut data = self
                .blob(coords, digest)
                .ok_or_else(|| not_found(coords, "download blob", digest))?;
            let corrupt = self.corrupt_downloads.lock().unwrap().contains(digest);
            if corrupt {
                data.extend_from_slice(b"garbage");
            }
            tokio::fs::write(dest, &data)
                .await
                .map_err(|e| MigrateError::io(dest, e))?;
            Ok(BlobWritten {
                size: data.len() as u64,
                digest: DigestUtils::compute_docker_digest(&data),
            })
        }
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn open_upload_session(&self, coords: &RegistryCoordinates) -> Result<String> {
        self.record("open_upload_session", coords, &coords.repository);
        let id = self.session_counter.fetch_add(1, Ordering::SeqCst);
        let location = format!("{}/v2/{}/blobs/uploads/{}", coords.base_url, coords.repository, id);
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(location.clone(), key(coords));
        Ok(location)
    }

    async fn commit_blob(
        &self,
        coords: &RegistryCoordinates,
        location: &str,
        digest: &str,
        source: &Path,
    ) -> Result<()> {
        self.record("commit_blob", coords, digest);
        let failure = self.commit_failures.lock().unwrap().get(digest).copied();
        if let Some(status) = failure {
            return Err(MigrateError::Protocol {
                registry: coords.base_url.clone(),
                repository: coords.repository.clone(),
                operation: "commit blob",
                target: digest.to_string(),
                status,
                body: "injected failure".to_string(),
            });
        }

        let data = tokio::fs::read(source)
            .await
            .map_err(|e| MigrateError::io(source, e))?;
        assert_eq!(DigestUtils::compute_docker_digest(&data), digest, "committed bytes must match digest");

        let mut state = self.state.lock().unwrap();
        let repo_key = state
            .sessions
            .remove(location)
            .ok_or_else(|| not_found(coords, "commit blob", location))?;
        state
            .repos
            .entry(repo_key)
            .or_default()
            .blobs
            .insert(digest.to_string(), data);
        Ok(())
    }

    async fn commit_manifest(
        &self,
        coords: &RegistryCoordinates,
        reference: &str,
        manifest: &[u8],
        content_type: &str,
    ) -> Result<Option<String>> {
        self.record("commit_manifest", coords, reference);
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(key(coords))
            .or_default()
            .manifests
            .insert(reference.to_string(), (manifest.to_vec(), content_type.to_string()));
        Ok(Some(DigestUtils::compute_docker_digest(manifest)))
    }
}

/// Event sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TransferEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TransferEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct RegistryData {
    manifests: HashMap<(String, String), (Vec<u8>, String)>,
    blobs: HashMap<(String, String), Vec<u8>>,
    /// Session id to repository
    sessions: HashMap<String, String>,
    fail_commit: HashMap<String, u16>,
    requests: Vec<String>,
}

struct RegistryShared {
    credentials: Option<(String, String)>,
    data: Mutex<RegistryData>,
}

/// Minimal Registry API v2 server on 127.0.0.1 with optional basic auth
pub struct FakeRegistry {
    pub base_url: String,
    shared: Arc<RegistryShared>,
    server: JoinHandle<()>,
}

impl FakeRegistry {
    pub async fn start(credentials: Option<(&str, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let shared = Arc::new(RegistryShared {
            credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
            data: Mutex::new(RegistryData::default()),
        });
        let app = Router::new()
            .fallback(handle_registry)
            .with_state(Arc::clone(&shared));

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            shared,
            server,
        }
    }

    pub fn seed_image(&self, repository: &str, tag: &str, image: &SampleImage) {
        self.seed_manifest(repository, tag, &image.manifest, &image.content_type);
        let mut data = self.shared.data.lock().unwrap();
        for (digest, bytes) in image.blobs() {
            data.blobs
                .insert((repository.to_string(), digest.clone()), bytes.clone());
        }
    }

    /// Serve `raw` for `repository:tag` under `content_type`
    pub fn seed_manifest(&self, repository: &str, tag: &str, raw: &[u8], content_type: &str) {
        self.shared.data.lock().unwrap().manifests.insert(
            (repository.to_string(), tag.to_string()),
            (raw.to_vec(), content_type.to_string()),
        );
    }

    pub fn seed_blob(&self, repository: &str, digest: &str, bytes: &[u8]) {
        self.shared
            .data
            .lock()
            .unwrap()
            .blobs
            .insert((repository.to_string(), digest.to_string()), bytes.to_vec());
    }

    pub fn fail_commit(&self, digest: &str, status: u16) {
        self.shared
            .data
            .lock()
            .unwrap()
            .fail_commit
            .insert(digest.to_string(), status);
    }

    pub fn manifest(&self, repository: &str, tag: &str) -> Option<(Vec<u8>, String)> {
        self.shared
            .data
            .lock()
            .unwrap()
            .manifests
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
    }

    pub fn blob(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.shared
            .data
            .lock()
            .unwrap()
            .blobs
            .get(&(repository.to_string(), digest.to_string()))
            .cloned()
    }

    /// `METHOD /path` of every request received, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.shared.data.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, method: &str, path_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(&format!("{} ", method)) && r.contains(path_fragment))
            .count()
    }
}

impl Drop for FakeRegistry {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn authorized(shared: &RegistryShared, headers: &HeaderMap) -> bool {
    let Some((username, password)) = &shared.credentials else {
        return true;
    };
    let expected = format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)));
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

async fn handle_registry(
    State(shared): State<Arc<RegistryShared>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    shared
        .data
        .lock()
        .unwrap()
        .requests
        .push(format!("{} {}", method, path));

    if !authorized(&shared, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"fake\"")],
            "authentication required",
        )
            .into_response();
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if rest.is_empty() {
        return StatusCode::OK.into_response();
    }

    if let Some(pos) = rest.find("/blobs/uploads/") {
        let repository = rest[..pos].to_string();
        let session = rest[pos + "/blobs/uploads/".len()..].to_string();
        return handle_upload(&shared, &method, &uri, repository, session, body);
    }
    if let Some(pos) = rest.rfind("/blobs/") {
        let repository = rest[..pos].to_string();
        let digest = rest[pos + "/blobs/".len()..].to_string();
        return handle_blob(&shared, &method, repository, digest);
    }
    if let Some(pos) = rest.rfind("/manifests/") {
        let repository = rest[..pos].to_string();
        let reference = rest[pos + "/manifests/".len()..].to_string();
        return handle_manifest(&shared, &method, &headers, repository, reference, body);
    }
    StatusCode::NOT_FOUND.into_response()
}

fn handle_upload(
    shared: &RegistryShared,
    method: &Method,
    uri: &Uri,
    repository: String,
    session: String,
    body: Bytes,
) -> Response {
    let mut data = shared.data.lock().unwrap();

    if *method == Method::POST && session.is_empty() {
        let id = uuid::Uuid::new_v4().to_string();
        data.sessions.insert(id.clone(), repository.clone());
        // Relative location with its own query, as most registries send it
        let location = format!("/v2/{}/blobs/uploads/{}?_state={}", repository, id, id);
        return (StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response();
    }

    if *method != Method::PUT {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    if query_param(uri, "_state").as_deref() != Some(session.as_str()) {
        return (StatusCode::BAD_REQUEST, "upload state lost").into_response();
    }
    let Some(digest) = query_param(uri, "digest") else {
        return (StatusCode::BAD_REQUEST, "digest missing").into_response();
    };
    if let Some(status) = data.fail_commit.get(&digest).copied() {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, "injected failure").into_response();
    }
    if data.sessions.remove(&session).as_deref() != Some(repository.as_str()) {
        return (StatusCode::NOT_FOUND, "BLOB_UPLOAD_UNKNOWN").into_response();
    }
    if DigestUtils::compute_docker_digest(&body) != digest {
        return (StatusCode::BAD_REQUEST, "DIGEST_INVALID").into_response();
    }

    data.blobs.insert((repository, digest.clone()), body.to_vec());
    (StatusCode::CREATED, [("Docker-Content-Digest", digest)]).into_response()
}

fn handle_blob(shared: &RegistryShared, method: &Method, repository: String, digest: String) -> Response {
    let data = shared.data.lock().unwrap();
    let Some(blob) = data.blobs.get(&(repository, digest.clone())) else {
        return (StatusCode::NOT_FOUND, "BLOB_UNKNOWN").into_response();
    };
    match *method {
        Method::HEAD => (StatusCode::OK, [("Docker-Content-Digest", digest)]).into_response(),
        Method::GET => (StatusCode::OK, blob.clone()).into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn handle_manifest(
    shared: &RegistryShared,
    method: &Method,
    headers: &HeaderMap,
    repository: String,
    reference: String,
    body: Bytes,
) -> Response {
    let mut data = shared.data.lock().unwrap();
    let key = (repository, reference);

    match *method {
        Method::PUT => {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let digest = DigestUtils::compute_docker_digest(&body);
            data.manifests.insert(key, (body.to_vec(), content_type));
            (StatusCode::CREATED, [("Docker-Content-Digest", digest)]).into_response()
        }
        Method::GET | Method::HEAD => match data.manifests.get(&key) {
            Some((raw, content_type)) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.clone())],
                raw.clone(),
            )
                .into_response(),
            None => (StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN").into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
