//! Integration tests for the download pipeline.
//!
//! These tests verify the full download flow with mock HTTP servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portal_core::download::DownloadOutcome;
use portal_core::{
    ApiClient, DownloadError, DownloadMethod, DownloadOptions, DownloadProgress, DownloadTracker,
    Downloader, NotificationService, Session,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};

fn downloader(base: &str, session: Session, output: &TempDir) -> (Downloader, NotificationService) {
    let notifier = NotificationService::new();
    let client = ApiClient::new(base, Duration::from_secs(5), Arc::new(session), notifier.clone())
        .expect("client should build");
    let downloader = Downloader::new(&client, output.path()).expect("downloader should build");
    (downloader, notifier)
}

async fn mount_file(server: &MockServer, route: &str, content: &[u8], disposition: Option<&str>) {
    let mut template = ResponseTemplate::new(200).set_body_bytes(content.to_vec());
    if let Some(disposition) = disposition {
        template = template.insert_header("content-disposition", disposition);
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_buffered_download_uses_content_disposition_filename() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let content = b"id,total\n1,42\n";
    mount_file(
        &server,
        "/api/reports/7",
        content,
        Some("attachment; filename*=UTF-8''Q3%20report.csv"),
    )
    .await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&format!("{}/api", server.uri()), Session::new(), &output);

    let successes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&successes);
    let outcome = downloader
        .download(
            "/reports/7",
            DownloadOptions::new().on_success(Arc::new(move |name| seen.lock().unwrap().push(name.to_string()))),
        )
        .await
        .expect("download should succeed");

    let DownloadOutcome::Saved { path, filename, bytes } = outcome else {
        panic!("download should not be cancelled");
    };
    assert_eq!(filename, "Q3 report.csv");
    assert_eq!(bytes, content.len() as u64);
    assert_eq!(path, output.path().join("Q3 report.csv"));
    assert_eq!(std::fs::read(&path).expect("read saved file"), content);
    assert_eq!(*successes.lock().unwrap(), vec!["Q3 report.csv".to_string()]);
}

#[tokio::test]
async fn test_filename_falls_back_to_url_and_explicit_name_wins() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/files/brochure.pdf", b"%PDF-1.7", None).await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&server.uri(), Session::new(), &output);

    let url = format!("{}/files/brochure.pdf?v=3", server.uri());
    let first = downloader.download(&url, DownloadOptions::new()).await.expect("first download");
    assert!(matches!(first, DownloadOutcome::Saved { ref filename, .. } if filename == "brochure.pdf"));

    let second = downloader
        .download(&url, DownloadOptions::new().filename("renamed.pdf"))
        .await
        .expect("second download");
    assert!(matches!(second, DownloadOutcome::Saved { ref filename, .. } if filename == "renamed.pdf"));
    assert!(output.path().join("renamed.pdf").exists());

    // Duplicate names get a numeric suffix instead of overwriting.
    let third = downloader.download(&url, DownloadOptions::new()).await.expect("third download");
    let DownloadOutcome::Saved { path, .. } = third else {
        panic!("download should not be cancelled");
    };
    assert_eq!(path, output.path().join("brochure_1.pdf"));
}

#[tokio::test]
async fn test_streaming_download_reports_progress_to_100() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let content = vec![7u8; 256 * 1024];
    Mock::given(method("POST"))
        .and(path("/api/export"))
        .and(header("authorization", "Bearer abc"))
        .and(query_param("format", "xlsx"))
        .and(body_json(json!({"ids": [1, 2, 3]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.clone())
                .insert_header("content-disposition", "attachment; filename=\"export.xlsx\""),
        )
        .mount(&server)
        .await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&format!("{}/api", server.uri()), Session::with_token("abc"), &output);

    let events: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let options = DownloadOptions::new()
        .method(DownloadMethod::Post)
        .query("format", "xlsx")
        .body(json!({"ids": [1, 2, 3]}))
        .on_progress(Arc::new(move |p| sink.lock().unwrap().push(p)));

    let outcome = downloader.download("export", options).await.expect("download should succeed");
    assert!(matches!(outcome, DownloadOutcome::Saved { ref filename, .. } if filename == "export.xlsx"));

    let events = events.lock().unwrap();
    assert!(!events.is_empty(), "progress should be reported");
    assert!(events.windows(2).all(|w| w[0].loaded <= w[1].loaded));
    let last = events.last().unwrap();
    assert_eq!(last.loaded, content.len() as u64);
    assert_eq!(last.total, content.len() as u64);
    assert_eq!(last.percent, 100);
}

#[tokio::test]
async fn test_streaming_without_content_length_reports_no_progress() {
    if should_skip_socket_bound_test() {
        return;
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let response = "HTTP/1.1 200 OK\r\n\
            Content-Type: application/octet-stream\r\n\
            Transfer-Encoding: chunked\r\n\
            Connection: close\r\n\r\n\
            5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        socket.write_all(response.as_bytes()).await.expect("write");
        socket.shutdown().await.ok();
    });

    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&format!("http://{addr}"), Session::new(), &output);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let outcome = downloader
        .download(
            "/stream/data.bin",
            DownloadOptions::new().on_progress(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .expect("download should succeed");

    let DownloadOutcome::Saved { path, bytes, .. } = outcome else {
        panic!("download should not be cancelled");
    };
    assert_eq!(bytes, 11);
    assert_eq!(std::fs::read(path).expect("read"), b"hello world");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_streaming_http_error_calls_on_error_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&server.uri(), Session::new(), &output);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    let err = downloader
        .download(
            "/missing.zip",
            DownloadOptions::new()
                .on_progress(Arc::new(|_| {}))
                .on_success(Arc::new(|_| panic!("on_success must not run")))
                .on_error(Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
        )
        .await
        .unwrap_err();

    match &err {
        DownloadError::HttpStatus { status, status_text, .. } => {
            assert_eq!(*status, 404);
            assert_eq!(status_text, "Not Found");
        }
        other => panic!("Expected HttpStatus, got {other:?}"),
    }
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(output.path()).expect("read dir").count(), 0);
}

#[tokio::test]
async fn test_buffered_http_error_goes_through_api_client_policy() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/private.pdf"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, notifier) = downloader(&format!("{}/api", server.uri()), Session::new(), &output);

    let err = downloader
        .download("/private.pdf", DownloadOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Api(_)), "Expected Api error, got {err:?}");
    assert_eq!(err.status(), Some(403));
    assert_eq!(notifier.toasts()[0].title, "Permission denied");
}

#[tokio::test]
async fn test_before_guard_cancels_without_request() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&server.uri(), Session::new(), &output);

    let outcome = downloader
        .download("/anything", DownloadOptions::new().on_before(Arc::new(|| false)))
        .await
        .expect("cancel is not an error");
    assert_eq!(outcome, DownloadOutcome::Cancelled);
}

#[tokio::test]
async fn test_tracker_publishes_final_state() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_file(&server, "/logo.svg", &[b'x'; 4096], None).await;
    let output = TempDir::new().expect("temp dir");
    let (downloader, _) = downloader(&server.uri(), Session::new(), &output);
    let tracker = DownloadTracker::new(downloader);
    let mut updates = tracker.subscribe();

    tracker
        .download("/logo.svg", DownloadOptions::new())
        .await
        .expect("download should succeed");

    assert!(updates.has_changed().unwrap_or(false));
    let state = tracker.state();
    assert!(!state.downloading);
    assert_eq!(state.progress, 100);
    assert!(state.error.is_none());

    let err = tracker.download("/gone.svg", DownloadOptions::new()).await;
    assert!(err.is_err());
    let state = tracker.state();
    assert!(!state.downloading);
    assert_eq!(state.progress, 0);
    assert_eq!(state.error.as_ref().and_then(|e| e.status), Some(404));
    let _ = updates.borrow_and_update();
}
