//! Test helpers for Tabula server integration tests
//!
//! - Router setup over a migrated SQLite pool and a temporary blob root
//! - Multipart request builders
//! - Polling until ingestion reaches a terminal status

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use std::time::Duration;
use tabula_server::{
    api::{self, AppState},
    config::Config,
    ingest::IngestionQueue,
    storage::{config::StorageConfig, Storage},
};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "tabula-test-boundary";

/// Router wired to real stores, the way `main` wires it
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub storage: Storage,
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, Config::default()).await
    }

    pub async fn with_config(pool: SqlitePool, config: Config) -> Self {
        let dir = TempDir::new().expect("create storage dir");
        let storage = Storage::new(StorageConfig::at(dir.path()))
            .await
            .expect("open storage");
        let (queue, _dispatcher) =
            IngestionQueue::start(pool.clone(), storage.clone(), config.ingest.clone());

        let state = AppState {
            db: pool.clone(),
            storage: storage.clone(),
            queue,
        };

        Self {
            router: api::create_router(state, &config),
            pool,
            storage,
            _storage_dir: dir,
        }
    }

    /// Send a request and decode the body as JSON (`Null` for non-JSON bodies)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn upload(&self, filename: &str, content: &[u8]) -> (StatusCode, Value) {
        self.send(multipart_request("file", filename, content)).await
    }

    /// Poll the progress endpoint until the file is `completed` or `failed`
    pub async fn wait_for_terminal(&self, file_id: i64) -> Value {
        for _ in 0..500 {
            let (status, progress) = self.get(&format!("/files/{}/progress", file_id)).await;
            assert_eq!(status, StatusCode::OK, "progress lookup failed: {}", progress);

            if matches!(progress["status"].as_str(), Some("completed") | Some("failed")) {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("file {} did not finish ingesting", file_id);
    }
}

/// `POST /files` with a single multipart field
pub fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// CSV with a `name,value` header and `rows` data lines
pub fn csv_with_rows(rows: usize) -> Vec<u8> {
    let mut csv = String::from("name,value\n");
    for i in 1..=rows {
        csv.push_str(&format!("item-{},{}\n", i, i * 10));
    }
    csv.into_bytes()
}

/// Two-row workbook with a text, a numeric and a blank column
pub fn sample_xlsx() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "city").unwrap();
    sheet.write_string(0, 1, "population").unwrap();
    sheet.write_string(0, 2, "notes").unwrap();
    sheet.write_string(1, 0, "Lisbon").unwrap();
    sheet.write_number(1, 1, 545_000).unwrap();
    sheet.write_string(2, 0, "Porto").unwrap();
    sheet.write_number(2, 1, 231.5).unwrap();
    sheet.write_string(2, 2, "estimate").unwrap();
    workbook.save_to_buffer().unwrap()
}
