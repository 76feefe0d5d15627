use std::net::SocketAddr;
use std::sync::Arc;

use common::StorageConfig;
use common::storage::filesystem::FilesystemBlobStore;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tempfile::TempDir;

use server::avatar::{AvatarService, MemoryAvatarRepository};
use server::config::{AppConfig, AvatarConfig, CorsConfig, DatabaseConfig, ServerConfig};
use server::state::AppState;

pub mod routes {
    pub fn thumb(id: &str) -> String {
        format!("/api/v1/file/{id}")
    }

    pub fn raw(id: &str) -> String {
        format!("/api/v1/file/{id}/raw")
    }
}

/// Blob size limit used by every test server.
pub const MAX_BLOB_SIZE: u64 = 256 * 1024;

/// A running test server backed by an in-memory record store and a
/// filesystem blob store in a temporary directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub blobs: Arc<FilesystemBlobStore>,
    pub records: Arc<MemoryAvatarRepository>,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw response body.
    pub bytes: Vec<u8>,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let bytes = res
            .bytes()
            .await
            .expect("Failed to read response body")
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Self {
            status,
            headers,
            bytes,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decode the body as an image and return its dimensions.
    pub fn image_dimensions(&self) -> (u32, u32) {
        let image = image::load_from_memory(&self.bytes).expect("body is not an image");
        (image.width(), image.height())
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let storage = StorageConfig {
            blob_dir: dir.path().join("blobs"),
            max_blob_size: MAX_BLOB_SIZE,
        };

        let blobs = Arc::new(
            FilesystemBlobStore::new(storage.blob_dir.clone(), storage.max_blob_size)
                .await
                .expect("Failed to create blob store"),
        );
        let records = Arc::new(MemoryAvatarRepository::new());

        let avatar = AvatarConfig::default();
        let avatars = AvatarService::new(blobs.clone(), records.clone())
            .with_max_resize_dimension(avatar.max_resize_dimension);

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
            },
            storage,
            avatar,
        };

        let state = AppState {
            avatars: Arc::new(avatars),
            config: Arc::new(app_config),
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            blobs,
            records,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_if_none_match(&self, path: &str, etag: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("If-None-Match", etag)
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// `POST` an upload form with the image in `files` and an optional
    /// `config` part.
    pub async fn upload(
        &self,
        path: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
        config: Option<&Value>,
    ) -> TestResponse {
        let form = upload_form(file_name, file_bytes, config);
        let res = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// `PUT` an upload form, as used to replace an avatar's image.
    pub async fn replace(
        &self,
        path: &str,
        file_name: &str,
        file_bytes: Vec<u8>,
        config: Option<&Value>,
    ) -> TestResponse {
        let form = upload_form(file_name, file_bytes, config);
        let res = self
            .client
            .put(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart replace request");

        TestResponse::from_response(res).await
    }

    /// Number of blobs currently in the store.
    pub async fn blob_count(&self) -> usize {
        self.blobs
            .blob_ids()
            .await
            .expect("Failed to list blobs")
            .len()
    }
}

fn upload_form(
    file_name: &str,
    file_bytes: Vec<u8>,
    config: Option<&Value>,
) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(file_bytes).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new().part("files", part);
    match config {
        Some(config) => form.text("config", config.to_string()),
        None => form,
    }
}

/// A random-looking 32-hex-character avatar id, unique per `seed`.
pub fn avatar_id(seed: u8) -> String {
    format!("{:032x}", 0x5eed_0000_0000_0000_0000_0000_0000_0000u128 + u128::from(seed))
}

/// Encode a `width` x `height` test pattern in the given format.
pub fn test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, format)
        .expect("Failed to encode test image");
    out.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    test_image(width, height, ImageFormat::Png)
}
