#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use inventory::app::{AppState, router};
use inventory::storage::{LOGGED_IN_USER_KEY, PRODUCTS_KEY};
use inventory::{MemoryStorage, Storage};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "inventory-test-boundary";

fn app() -> (Router, MemoryStorage) {
    let storage = MemoryStorage::new();
    let app = router(AppState::new(Arc::new(storage.clone())));
    (app, storage)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::delete(uri).body(Body::empty()).unwrap()
}

fn form(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(uri: &str, file_name: &str, contents: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn log_in(app: &Router) {
    let (status, _) = send(
        app,
        form(
            "POST",
            "/api/signup",
            "username=Ada&email=ada%40example.com&password=pw&rePassword=pw",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(
        app,
        form("POST", "/api/login", "email=ada%40example.com&password=pw"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "Ada");
}

async fn add(app: &Router, body: &str) -> Value {
    let (status, product) = send_json(app, form("POST", "/api/products", body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", product);
    product
}

#[tokio::test]
async fn catalog_requires_a_session() {
    let (app, _) = app();

    let (status, body) = send_json(&app, get("/api/products")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    // The template is public
    let (status, bytes) = send(&app, get("/api/template")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn signup_login_logout() {
    let (app, storage) = app();

    let (_, body) = send_json(&app, get("/api/session")).await;
    assert_eq!(body["username"], Value::Null);

    log_in(&app).await;
    let (_, body) = send_json(&app, get("/api/session")).await;
    assert_eq!(body["username"], "Ada");
    assert_eq!(storage.get(LOGGED_IN_USER_KEY).unwrap().as_deref(), Some("Ada"));

    let (status, _) = send(&app, form("POST", "/api/logout", "")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get("/api/products")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn account_errors_map_to_statuses() {
    let (app, _) = app();
    log_in(&app).await;

    let duplicate = "username=Ada2&email=ada%40example.com&password=x&rePassword=x";
    let (status, _) = send(&app, form("POST", "/api/signup", duplicate)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mismatch = "username=Bob&email=bob%40example.com&password=x&rePassword=y";
    let (status, _) = send(&app, form("POST", "/api/signup", mismatch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        form("POST", "/api/login", "email=ada%40example.com&password=wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn add_filter_and_remove_products() {
    let (app, storage) = app();
    log_in(&app).await;

    let rice = add(&app, "itemName=Rice&price=2000&quantity=10&category=Food+Stuff").await;
    add(&app, "itemName=Chin+Chin&price=500&quantity=20&category=Snacks").await;
    add(&app, "itemName=Plantain+Chips&price=300&quantity=40&category=Snacks").await;
    assert_eq!(rice["itemName"], "Rice");
    assert_eq!(rice["category"], "Food Stuff");

    let (_, all) = send_json(&app, get("/api/products")).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, snacks) = send_json(&app, get("/api/products?category=Snacks&search=chips")).await;
    let names: Vec<&str> = snacks
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["itemName"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Plantain Chips"]);

    let id = rice["id"].as_u64().unwrap();
    let (status, body) = send_json(&app, delete(&format!("/api/products/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"]["id"], id);

    let (_, body) = send_json(&app, delete(&format!("/api/products/{}", id))).await;
    assert_eq!(body["removed"], Value::Null);

    let persisted = storage.get(PRODUCTS_KEY).unwrap().unwrap();
    assert!(!persisted.contains("Rice"));
}

#[tokio::test]
async fn invalid_product_names_bad_fields() {
    let (app, _) = app();
    log_in(&app).await;

    let (status, body) = send_json(
        &app,
        form("POST", "/api/products", "itemName=Rice&price=abc&quantity=1&category=Snacks"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], serde_json::json!(["price"]));

    let (_, all) = send_json(&app, get("/api/products")).await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn qr_payload_for_product() {
    let (app, _) = app();
    log_in(&app).await;
    let phone = add(&app, "itemName=Tecno&price=90000&quantity=3&category=Mobile").await;
    let id = phone["id"].as_u64().unwrap();

    let (status, body) = send_json(&app, get(&format!("/api/products/{}/qr", id))).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_str(body["payload"].as_str().unwrap()).unwrap();
    assert_eq!(
        payload,
        serde_json::json!({"name": "Tecno", "quantity": 3, "category": "Mobile"})
    );

    let (status, _) = send(&app, get(&format!("/api/products/{}/qr", id + 1))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_then_import_spreadsheet() {
    let (app, _) = app();
    log_in(&app).await;
    let csv = b"S/N,Item Name,Quantity,Category\n1,Rice,10,Food Stuff\n2,Gala,,Snacks\n";

    let (status, preview) =
        send_json(&app, upload("/api/import/preview", "stock.csv", csv)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview.as_array().unwrap().len(), 2);
    let (_, all) = send_json(&app, get("/api/products")).await;
    assert!(all.as_array().unwrap().is_empty());

    let (status, added) = send_json(&app, upload("/api/import", "stock.csv", csv)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added[0]["price"], 0.0);
    assert_eq!(added[0]["quantity"], 10);
    assert_eq!(added[1]["quantity"], 0);

    let (status, _) = send(&app, upload("/api/import", "stock.xlsx", b"garbage")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn export_formats() {
    let (app, _) = app();
    log_in(&app).await;
    add(&app, "itemName=Rice&price=2000&quantity=10&category=Food+Stuff").await;

    let (status, csv) = send(&app, get("/api/export")).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(
        csv,
        "S/N,Item Name,Price,Quantity,Category\n1,Rice,2000,10,Food Stuff\n"
    );

    let (status, xlsx) = send(&app, get("/api/export?format=xlsx")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(xlsx.starts_with(b"PK"));

    let (status, _) = send(&app, get("/api/export?format=pdf")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn backup_and_restore() {
    let (app, _) = app();
    log_in(&app).await;
    let rice = add(&app, "itemName=Rice&price=2000&quantity=10&category=Food+Stuff").await;
    add(&app, "itemName=Gala&price=100&quantity=5&category=Snacks").await;

    let (status, backup) = send(&app, get("/api/backup")).await;
    assert_eq!(status, StatusCode::OK);

    let id = rice["id"].as_u64().unwrap();
    send(&app, delete(&format!("/api/products/{}", id))).await;

    let (status, restored) =
        send_json(&app, upload("/api/restore", "inventory.bin.gz", &backup)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored.as_array().unwrap().len(), 2);
    assert_eq!(restored[0], rice);

    let (status, _) = send(&app, upload("/api/restore", "inventory.bin.gz", b"nope")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// Gzip of a snapshot claiming one product whose name is 1 TiB long
fn hostile_backup() -> Vec<u8> {
    let mut raw = Vec::new();
    for n in [1u64, 7, 1 << 40] {
        raw.extend_from_slice(&n.to_le_bytes());
    }
    raw.extend_from_slice(b"abc");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn malformed_backups_are_rejected_and_server_keeps_serving() {
    let (app, _) = app();
    log_in(&app).await;
    add(&app, "itemName=Rice&price=2000&quantity=10&category=Food+Stuff").await;

    let (_, backup) = send(&app, get("/api/backup")).await;
    let truncated = backup[..backup.len() / 2].to_vec();

    for upload_bytes in [truncated, hostile_backup()] {
        let (status, body) =
            send_json(&app, upload("/api/restore", "inventory.bin.gz", &upload_bytes)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "error");
    }

    // Catalog untouched and still reachable
    let (status, all) = send_json(&app, get("/api/products")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}
