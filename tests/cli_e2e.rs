//! End-to-end CLI tests for the portal and deploy-webhook binaries.

#![allow(deprecated)]

mod support;
use support::socket_guard::start_mock_server_or_skip;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn portal() -> Command {
    let mut cmd = Command::cargo_bin("portal").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("PORTAL_TOKEN")
        .env_remove("PORTAL_API_URL");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    portal()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("theme"));
}

#[test]
fn test_binary_version_displays_version() {
    portal()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("portal"));
}

#[test]
fn test_binary_missing_subcommand_fails() {
    portal().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_binary_invalid_config_fails() {
    portal()
        .env("PORTAL_API_TIMEOUT_MS", "soon")
        .args(["theme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PORTAL_API_TIMEOUT_MS"));
}

#[test]
fn test_serve_rejects_root_prefix() {
    portal()
        .args(["serve", "--listen", "127.0.0.1:0", "--prefix", "/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PORTAL_PROXY_PREFIX"));
}

#[test]
fn test_theme_set_toggle_and_get_persist() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("theme");

    portal()
        .args(["-q", "theme", "--file"])
        .arg(&file)
        .args(["set", "dark"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dark (dark)"));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "dark");

    portal()
        .args(["-q", "theme", "--file"])
        .arg(&file)
        .arg("toggle")
        .assert()
        .success()
        .stdout(predicate::str::contains("light (light)"));

    portal()
        .args(["-q", "theme", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("light"));
}

#[tokio::test]
async fn test_download_saves_file_and_prints_path() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/files/7"))
        .and(header("authorization", "Bearer cli-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"PDF".to_vec())
                .insert_header("Content-Disposition", "attachment; filename=\"terms.pdf\""),
        )
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    portal()
        .env("PORTAL_API_URL", format!("{}/api", mock_server.uri()))
        .args(["-q", "download", "/files/7", "--cookie", "lang=en; token=cli-token", "-o"])
        .arg(tempdir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("terms.pdf"));

    assert_eq!(std::fs::read(tempdir.path().join("terms.pdf")).unwrap(), b"PDF");
}

#[tokio::test]
async fn test_download_http_error_exits_non_zero() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    portal()
        .env("PORTAL_API_URL", mock_server.uri())
        .args(["-q", "download", "/missing", "--progress", "-o"])
        .arg(tempdir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}

#[test]
fn test_download_post_with_token_query_and_body() {
    let Some(mock_server) = tokio_test::block_on(start_mock_server_or_skip()) else {
        return;
    };
    tokio_test::block_on(
        Mock::given(method("POST"))
            .and(path("/export"))
            .and(header("authorization", "Bearer flag-token"))
            .and(query_param("format", "csv"))
            .and(body_json(serde_json::json!({"ids": [4, 5]})))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n"))
            .expect(1)
            .mount(&mock_server),
    );

    let tempdir = TempDir::new().unwrap();
    portal()
        .env("PORTAL_API_URL", mock_server.uri())
        .args(["-q", "download", "/export", "-X", "post", "--token", "flag-token"])
        .args(["--query", "format=csv", "--body", r#"{"ids":[4,5]}"#, "-f", "rows.csv", "-o"])
        .arg(tempdir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("rows.csv"));

    assert_eq!(std::fs::read_to_string(tempdir.path().join("rows.csv")).unwrap(), "a,b\n");
}

#[test]
fn test_deploy_webhook_help_lists_flags() {
    Command::cargo_bin("deploy-webhook")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--secret"))
        .stdout(predicate::str::contains("--deploy-script"))
        .stdout(predicate::str::contains("--port"));
}
