use std::net::{SocketAddr, TcpListener};

use axum::{http::StatusCode, routing::get, Router};
use sign_interpreter::download::{ensure_model_present, DownloadError, Outcome};

/// Serves `/model.pb` with fixed bytes and 404s everything else.
fn spawn_model_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/model.pb", get(|| async { b"frozen graph bytes".to_vec() }))
        .route("/missing.pb", get(|| async { StatusCode::NOT_FOUND }));

    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn downloads_missing_model() {
    let addr = spawn_model_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("model.pb");

    let outcome = ensure_model_present(&client(), &format!("http://{addr}/model.pb"), &path)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Downloaded { bytes: 18 });
    assert_eq!(std::fs::read(&path).unwrap(), b"frozen graph bytes");
    assert!(!path.with_extension("part").exists());
}

#[tokio::test]
async fn skips_existing_model() {
    let addr = spawn_model_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.pb");
    std::fs::write(&path, b"already here").unwrap();

    let outcome = ensure_model_present(&client(), &format!("http://{addr}/model.pb"), &path)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::AlreadyPresent);
    assert_eq!(std::fs::read(&path).unwrap(), b"already here");
}

#[tokio::test]
async fn error_status_leaves_nothing_behind() {
    let addr = spawn_model_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.pb");

    let err = ensure_model_present(&client(), &format!("http://{addr}/missing.pb"), &path)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Status(status) if status == reqwest::StatusCode::NOT_FOUND));
    assert!(!path.exists());
}
