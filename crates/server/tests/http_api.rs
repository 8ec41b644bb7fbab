//! End-to-end tests for the HTTP API.
//!
//! The router is exercised in-process with `tower::ServiceExt::oneshot`
//! against a state built on the deterministic stub embedder, so no model
//! assets are needed. Artifacts live in a temp directory built the same way
//! the offline job writes them.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use clip::{Embedder, StubEmbedder};
use index::storage::{write_matrix, write_names, EMBEDDINGS_FILE, INDEX_FILE, NAMES_FILE};
use index::{Artifacts, CaptionStore, FlatIndex};
use ndarray::Array2;
use server::{build_router, SearchService, ServerConfig, ServerState};

/// Keeps the temp directory alive for the duration of a test.
struct TestApp {
    router: Router,
    _tmp: tempfile::TempDir,
}

fn png_bytes(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_fn(8, 8, |x, y| {
        image::Rgb([seed, (x * 31) as u8, (y * 17) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Build a serving state over `n` stub-embedded images plus captions for
/// the first two.
fn test_app(n: usize) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let artifact_dir = tmp.path().join("artifacts");
    let images_dir = tmp.path().join("images");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::create_dir_all(&images_dir).unwrap();

    let embedder = Arc::new(StubEmbedder::new());
    let names: Vec<String> = (0..n).map(|i| format!("img_{i}.jpg")).collect();
    let vectors: Vec<Vec<f32>> = names
        .iter()
        .map(|name| embedder.embed_text(name).unwrap())
        .collect();

    let dim = embedder.dimension();
    let flat: Vec<f32> = vectors.iter().flatten().copied().collect();
    let matrix = Array2::from_shape_vec((n, dim), flat).unwrap();
    write_matrix(&artifact_dir.join(EMBEDDINGS_FILE), &matrix).unwrap();
    write_names(&artifact_dir.join(NAMES_FILE), &names).unwrap();
    let index = FlatIndex::build(dim, vectors).unwrap();
    std::fs::write(artifact_dir.join(INDEX_FILE), index.encode().unwrap()).unwrap();

    std::fs::write(images_dir.join("img_0.jpg"), png_bytes(1)).unwrap();

    let captions = CaptionStore::from_reader(Cursor::new(
        "img_0.jpg#0\tA dog on the beach .\nimg_1.jpg#0\tTwo children playing .\n",
    ))
    .unwrap();

    let artifacts = Artifacts::load(&artifact_dir).unwrap();
    let service = SearchService::new(embedder, artifacts, captions).unwrap();

    let config = ServerConfig {
        images_dir,
        ..ServerConfig::default()
    };
    let state = Arc::new(ServerState::from_parts(config, service));

    TestApp {
        router: build_router(state),
        _tmp: tmp,
    }
}

fn form_request(texto: &str) -> Request<Body> {
    let encoded: String = texto
        .bytes()
        .map(|b| format!("%{b:02X}"))
        .collect();
    Request::builder()
        .method("POST")
        .uri("/buscar_por_texto")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("texto={encoded}")))
        .unwrap()
}

fn multipart_request(boundary: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/buscar_por_imagen")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn text_search_returns_ten_ranked_results() {
    let app = test_app(15);

    let response = app.router.oneshot(form_request("img_1.jpg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["query"], "img_1.jpg");
    let resultados = body["resultados"].as_array().unwrap();
    assert_eq!(resultados.len(), 10);

    // Stub embeds the literal query text, so the matching name ranks first.
    assert_eq!(resultados[0]["imageName"], "img_1.jpg");
    assert_eq!(resultados[0]["caption"], "Two children playing .");
}

#[tokio::test]
async fn text_search_smaller_index_returns_all_rows() {
    let app = test_app(3);

    let response = app.router.oneshot(form_request("anything")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["resultados"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn uncaptioned_results_use_the_sentinel() {
    let app = test_app(3);

    let response = app.router.oneshot(form_request("img_2.jpg")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["resultados"][0]["imageName"], "img_2.jpg");
    assert_eq!(body["resultados"][0]["caption"], "Sin descripción");
}

#[tokio::test]
async fn empty_text_query_is_unprocessable() {
    let app = test_app(3);

    let response = app.router.oneshot(form_request("   ")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "EMBEDDING_ERROR");
}

#[tokio::test]
async fn missing_form_field_is_a_client_error() {
    let app = test_app(3);

    let request = Request::builder()
        .method("POST")
        .uri("/buscar_por_texto")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("wrong_field=hola"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn image_search_accepts_a_png_upload() {
    let app = test_app(12);

    let request = multipart_request("XBOUNDARYX", "query.png", &png_bytes(42));
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["filename"], "query.png");
    let resultados = body["resultados"].as_array().unwrap();
    assert_eq!(resultados.len(), 10);
    assert!(resultados[0]["imageName"].is_string());
    assert!(resultados[0]["caption"].is_string());
}

#[tokio::test]
async fn undecodable_upload_is_unprocessable_and_service_survives() {
    let app = test_app(3);

    let request = multipart_request("XBOUNDARYX", "junk.bin", b"not an image at all");
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "EMBEDDING_ERROR");

    // The next query on the same router still works.
    let response = app.router.oneshot(form_request("img_0.jpg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn multipart_without_file_part_is_a_bad_request() {
    let app = test_app(3);

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nhola\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/buscar_por_imagen")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn indexed_images_are_served_statically() {
    let app = test_app(3);

    let request = Request::builder()
        .uri("/imagenes/img_0.jpg")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_static_image_is_not_found() {
    let app = test_app(3);

    let request = Request::builder()
        .uri("/imagenes/nope.jpg")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_ready_report_ok() {
    let app = test_app(5);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["indexed_images"], 5);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = test_app(3);

    let request = Request::builder()
        .uri("/no_such_route")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = test_app(3);

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
