//! Test server harness for WebDAV integration tests.
//!
//! Provides a `TestServer` that manages the lifecycle of a WebDAV server
//! with one mount (in-memory or over a temporary directory), along with
//! HTTP convenience methods.

use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tempfile::TempDir;
use treedav_core::{FsResource, MemoryResource};
use treedav_webdav::{MountTable, ServerConfig, WebDavServer};

/// Prefix every test mount is exposed under.
pub const MOUNT: &str = "webdav";

/// Characters escaped in a URI path; `/` stays as the separator and non-ASCII is always encoded.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode a path for use in Destination headers.
pub fn url_encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SET).to_string()
}

/// Which backend the test mount uses.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Memory,
    Filesystem,
}

/// Every backend, for tests that must hold on all of them.
pub const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Filesystem];

/// Test server with HTTP client and automatic cleanup.
pub struct TestServer {
    /// The running WebDAV server.
    server: WebDavServer,
    /// HTTP client for making requests.
    client: Client,
    /// Base URL of the mount (no trailing slash).
    pub base_url: String,
    /// Temporary directory (cleaned up on drop).
    temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Start a server with an empty in-memory mount.
    pub async fn with_memory() -> Self {
        Self::with_backend(Backend::Memory).await
    }

    /// Start a server with a mount over a fresh temporary directory.
    pub async fn with_temp_dir() -> Self {
        Self::with_backend(Backend::Filesystem).await
    }

    /// Start a server with an empty mount of the given kind.
    pub async fn with_backend(backend: Backend) -> Self {
        let mut mounts = MountTable::new();
        let temp_dir = match backend {
            Backend::Memory => {
                mounts
                    .mount(Box::new(MemoryResource::new_root(MOUNT)))
                    .expect("Failed to mount memory tree");
                None
            }
            Backend::Filesystem => {
                let temp_dir = TempDir::new().expect("Failed to create temp dir");
                mounts
                    .mount(Box::new(FsResource::new_root(MOUNT, temp_dir.path())))
                    .expect("Failed to mount temp dir");
                Some(temp_dir)
            }
        };

        // Start server on random port
        let server = WebDavServer::start(mounts, ServerConfig::default())
            .await
            .expect("Failed to start WebDAV server");

        let base_url = format!("{}/{MOUNT}", server.url());

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        let test_server = Self {
            server,
            client,
            base_url,
            temp_dir,
        };

        // Wait for server to be ready
        test_server.wait_ready().await;

        test_server
    }

    /// Wait for the server to be ready to accept connections.
    async fn wait_ready(&self) {
        for _ in 0..50 {
            if let Ok(resp) = self
                .client
                .request(Method::OPTIONS, self.url("/"))
                .send()
                .await
                && resp.status().is_success()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Server did not become ready in time");
    }

    /// Host directory behind a filesystem mount.
    pub fn temp_path(&self) -> Option<&std::path::Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Server root URL (without the mount prefix).
    pub fn server_url(&self) -> String {
        self.server.url()
    }

    /// Build a full URL from a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a URL-encoded URL for use in Destination headers.
    /// Non-ASCII characters must be percent-encoded in HTTP headers.
    pub fn url_encoded(&self, path: &str) -> String {
        format!("{}{}", self.base_url, url_encode_path(path))
    }

    /// Start an arbitrary request.
    pub fn request(&self, method: &str, path: &str) -> RequestBuilder {
        self.client.request(
            Method::from_bytes(method.as_bytes()).expect("invalid method"),
            self.url(path),
        )
    }

    // ========== HTTP Convenience Methods ==========

    /// GET a file's contents.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a byte range.
    pub async fn get_range(&self, path: &str, range: &str) -> Response {
        self.client
            .get(self.url(path))
            .header("Range", range)
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a file's contents as bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, (StatusCode, String)> {
        let resp = self.get(path).await;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// HEAD a resource.
    pub async fn head(&self, path: &str) -> Response {
        self.client
            .head(self.url(path))
            .send()
            .await
            .expect("HEAD request failed")
    }

    /// PUT file contents.
    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    /// PUT file contents and assert success.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self.put(path, body).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "PUT {} failed with status {}: {}",
            path,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// DELETE a file or directory.
    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    /// DELETE and assert success.
    pub async fn delete_ok(&self, path: &str) {
        let resp = self.delete(path).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "DELETE {} failed with status {}: {}",
            path,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> Response {
        self.request("MKCOL", path)
            .send()
            .await
            .expect("MKCOL request failed")
    }

    /// MKCOL and assert success.
    pub async fn mkcol_ok(&self, path: &str) {
        let resp = self.mkcol(path).await;
        let status = resp.status();
        assert_eq!(
            status,
            StatusCode::CREATED,
            "MKCOL {} failed: {}",
            path,
            resp.text().await.unwrap_or_default()
        );
    }

    /// PROPFIND (list directory or get properties).
    pub async fn propfind(&self, path: &str, depth: &str) -> Response {
        self.request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed")
    }

    /// PROPFIND and return body as string.
    pub async fn propfind_body(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self.propfind(path, depth).await;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        (status, body)
    }

    /// PROPFIND with an XML request body.
    pub async fn propfind_with(&self, path: &str, depth: &str, xml: &str) -> (StatusCode, String) {
        let resp = self
            .request("PROPFIND", path)
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(xml.to_string())
            .send()
            .await
            .expect("PROPFIND request failed");
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        (status, body)
    }

    /// COPY a file or directory.
    pub async fn copy(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("COPY", from)
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("COPY request failed")
    }

    /// COPY and assert success.
    pub async fn copy_ok(&self, from: &str, to: &str) {
        let resp = self.copy(from, to, true).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "COPY {} -> {} failed with status {}: {}",
            from,
            to,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// MOVE a file or directory.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Response {
        self.request("MOVE", from)
            .header("Destination", self.url_encoded(to))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .expect("MOVE request failed")
    }

    /// MOVE and assert success.
    pub async fn move_ok(&self, from: &str, to: &str) {
        let resp = self.move_(from, to, true).await;
        let status = resp.status();
        assert!(
            status.is_success(),
            "MOVE {} -> {} failed with status {}: {}",
            from,
            to,
            status,
            resp.text().await.unwrap_or_default()
        );
    }

    /// Stop the server explicitly (otherwise happens on drop).
    pub async fn stop(self) {
        self.server.stop().await;
    }
}

/// Shared test client for concurrent operations.
///
/// Use `TestServer::shared_client()` to get this for spawning concurrent tasks.
#[derive(Clone)]
pub struct SharedTestClient {
    client: Client,
    pub base_url: String,
}

impl SharedTestClient {
    /// Build a full URL from a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a file's contents as bytes.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, (StatusCode, String)> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed");
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err((status, body))
        }
    }

    /// PUT file contents.
    pub async fn put(&self, path: &str, body: impl Into<reqwest::Body>) -> Result<StatusCode, String> {
        self.client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| e.to_string())
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> Result<StatusCode, String> {
        self.client
            .request(Method::from_bytes(b"MKCOL").expect("invalid method"), self.url(path))
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| e.to_string())
    }

    /// MOVE a file or directory.
    pub async fn move_(&self, from: &str, to: &str, overwrite: bool) -> Result<StatusCode, String> {
        self.client
            .request(Method::from_bytes(b"MOVE").expect("invalid method"), self.url(from))
            .header("Destination", format!("{}{}", self.base_url, url_encode_path(to)))
            .header("Overwrite", if overwrite { "T" } else { "F" })
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| e.to_string())
    }
}

impl TestServer {
    /// Get a shared client for concurrent operations.
    ///
    /// The returned client can be cloned and used across multiple tasks.
    pub fn shared_client(&self) -> SharedTestClient {
        SharedTestClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
