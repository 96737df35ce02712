//! Run via `cargo test -p backit-cli --test integration`
use crate::cli::Cli;
use assert_cmd::{assert::OutputAssertExt as _, prelude::CommandCargoExt as _};
use predicates::str::contains;
use serde_json::json;
use std::{process::Command, time::Duration};
use testresult::TestResult;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};


fn backit() -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("backit")?;
    cmd.arg("--no-colors");
    Ok(cmd)
}

async fn account_server(account: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v0/account"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account))
        .mount(&server)
        .await;
    server
}

/// A backend for `a@x.com` (password `secret123`) that accepts a change to `b@x.com`
async fn email_change_server(send_verification: ResponseTemplate) -> MockServer {
    let server = account_server(json!({
        "email": "a@x.com",
        "has_password_credential": true,
        "linked_providers": [],
    }))
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v0/account/email/available"))
        .and(query_param("email", "b@x.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "available": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/auth/reauthenticate"))
        .and(body_json(json!({ "email": "a@x.com", "password": "secret123" })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/auth/reauthenticate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/account/email/verify"))
        .and(body_json(json!({ "email": "b@x.com" })))
        .respond_with(send_verification)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/auth/sign-out"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

#[test_log::test]
fn test_cli_helptext() -> TestResult {
    backit()?
        .arg("help")
        .assert()
        .try_success()?
        .try_stdout(contains("backit"))?
        .try_stdout(contains("account"))?
        .try_stdout(contains("email"))?
        .try_stdout(contains("paths"))?
        .try_stdout(contains("--api-endpoint"))?;

    Ok(())
}

#[test_log::test]
fn test_cli_email_helptext() -> TestResult {
    backit()?
        .arg("email")
        .arg("change")
        .arg("--help")
        .assert()
        .try_success()?
        .try_stdout(contains("verification link"))?
        .try_stdout(contains("--email"))?;

    Ok(())
}

#[test_log::test]
fn test_cli_paths() -> TestResult {
    backit()?
        .arg("paths")
        .assert()
        .try_success()?
        .try_stdout(contains("config.toml"))?;

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_account_show() -> TestResult {
    let server = account_server(json!({
        "email": "a@x.com",
        "has_password_credential": true,
        "linked_providers": ["google.com"],
    }))
    .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        backit()?
            .env("BACKIT_SESSION_TOKEN", "test-token")
            .arg("--api-endpoint")
            .arg(uri)
            .arg("account")
            .arg("show")
            .assert()
            .try_success()?
            .try_stdout(contains("Email: a@x.com"))?
            .try_stdout(contains("Password sign-in: yes"))?
            .try_stdout(contains("Linked providers: google.com"))?;
        Ok(())
    })
    .await??;

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_email_change_blocked_for_federated_account() -> TestResult {
    let server = account_server(json!({
        "email": "a@x.com",
        "has_password_credential": false,
        "linked_providers": ["google.com"],
    }))
    .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        backit()?
            .env("BACKIT_SESSION_TOKEN", "test-token")
            .arg("--api-endpoint")
            .arg(uri)
            .arg("email")
            .arg("change")
            .arg("--email")
            .arg("b@x.com")
            .assert()
            .try_success()?
            .try_stdout(contains("can't be changed here"))?;
        Ok(())
    })
    .await??;

    // Blocked sessions never contact the provider beyond reading the account
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_account_show_without_session() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v0/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        backit()?
            .env_remove("BACKIT_SESSION_TOKEN")
            .arg("--api-endpoint")
            .arg(uri)
            .arg("account")
            .arg("show")
            .assert()
            .try_failure()?
            .try_stderr(contains("credential"))?;
        Ok(())
    })
    .await??;

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_email_change() -> TestResult {
    let server = email_change_server(ResponseTemplate::new(200)).await;
    Mock::given(method("POST"))
        .and(path("/api/v0/account/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "b@x.com" })))
        .mount(&server)
        .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut cli = Cli::run(|cmd| {
            cmd.env("BACKIT_SESSION_TOKEN", "test-token")
                .env("BACKIT_FLOW__POLL_INTERVAL_MS", "50")
                .arg("--api-endpoint")
                .arg(&uri)
                .arg("email")
                .arg("change")
                .arg("--email")
                .arg("b@x.com")
        })?;

        cli.expect("Your current email address is a@x.com")?;
        cli.expect("Please confirm with your current password")?;
        cli.send_line("wrong")?;
        cli.expect("The password is incorrect.")?;

        cli.expect("What's your new email address?")?;
        cli.send_line("b@x.com")?;
        cli.expect("Please confirm with your current password")?;
        cli.send_line("secret123")?;

        cli.expect("We've sent a verification link to b@x.com")?;
        cli.expect("Successfully changed your email address to b@x.com")?;
        cli.expect("Please sign in again with your new email address")?;
        cli.expect_success()?;

        Ok(())
    })
    .await??;

    assert_eq!(requests_to(&server, "/api/v0/auth/reauthenticate").await, 2);
    assert_eq!(requests_to(&server, "/api/v0/account/email/verify").await, 1);
    assert_eq!(requests_to(&server, "/api/v0/auth/sign-out").await, 1);

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_email_change_check_now_then_quit() -> TestResult {
    let server = email_change_server(ResponseTemplate::new(200)).await;
    Mock::given(method("POST"))
        .and(path("/api/v0/account/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "email": "a@x.com" })))
        .mount(&server)
        .await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut cli = Cli::run(|cmd| {
            cmd.env("BACKIT_SESSION_TOKEN", "test-token")
                // only explicit checks reach the backend
                .env("BACKIT_FLOW__POLL_INTERVAL_MS", "600000")
                .arg("--api-endpoint")
                .arg(&uri)
                .arg("email")
                .arg("change")
                .arg("--email")
                .arg("b@x.com")
        })?;

        cli.expect("Please confirm with your current password")?;
        cli.send_line("secret123")?;
        cli.expect("Press Ctrl+C for more options")?;

        cli.interrupt()?;
        cli.expect("What now?")?;
        cli.send_line("Check now")?;
        cli.expect("Your new address isn't verified yet.")?;

        cli.interrupt()?;
        cli.expect("What now?")?;
        cli.send_line("Quit")?;
        cli.expect("Your email address wasn't changed.")?;
        cli.expect_success()?;

        Ok(())
    })
    .await??;

    assert_eq!(requests_to(&server, "/api/v0/account/refresh").await, 1);
    assert_eq!(requests_to(&server, "/api/v0/auth/sign-out").await, 0);

    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_cli_email_change_interrupted_while_submitting() -> TestResult {
    let server =
        email_change_server(ResponseTemplate::new(200).set_delay(Duration::from_secs(3))).await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut cli = Cli::run(|cmd| {
            cmd.env("BACKIT_SESSION_TOKEN", "test-token")
                .arg("--api-endpoint")
                .arg(&uri)
                .arg("email")
                .arg("change")
                .arg("--email")
                .arg("b@x.com")
        })?;

        cli.expect("Please confirm with your current password")?;
        cli.send_line("secret123")?;

        cli.interrupt()?;
        cli.expect("Your email address wasn't changed.")?;
        cli.expect_success()?;

        Ok(())
    })
    .await??;

    assert_eq!(requests_to(&server, "/api/v0/auth/sign-out").await, 0);

    Ok(())
}
