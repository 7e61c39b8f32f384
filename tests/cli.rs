//
//  buildkite-cli
//  tests/cli.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! End-to-end tests that run the `bk` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `bk` invocation isolated from the developer's own config, tokens and
/// repository.
fn bk(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bk").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("BUILDKITE_TOKEN_STORAGE", "file")
        .env("NO_COLOR", "1")
        .env_remove("BUILDKITE_API_TOKEN")
        .env_remove("BUILDKITE_ORGANIZATION_SLUG")
        .env_remove("BUILDKITE_REST_API_ENDPOINT")
        .env_remove("BUILDKITE_GRAPHQL_ENDPOINT")
        .env_remove("BK_DEBUG")
        .env_remove("PAGER");
    cmd
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("bk version "));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("agent"))
        .stdout(predicate::str::contains("artifacts"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let home = TempDir::new().unwrap();
    bk(&home).args(["build", "list", "--bogus"]).assert().code(2);
}

#[test]
fn test_missing_organization_is_configuration_error() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["agent", "list", "--no-input"])
        .env("BUILDKITE_API_TOKEN", "bkua_test")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("No organization selected"));
}

#[test]
fn test_missing_token_is_authentication_error() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["agent", "list", "--no-input"])
        .env("BUILDKITE_ORGANIZATION_SLUG", "acme")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("No API token configured"));
}

#[test]
fn test_json_errors_go_to_stderr() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["agent", "list", "--no-input", "-o", "json"])
        .env("BUILDKITE_API_TOKEN", "bkua_test")
        .assert()
        .code(6)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("\"exit_code\":6"));
}

#[test]
fn test_build_view_renders_summary() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/organizations/acme/pipelines/web/builds/42")
        .with_status(200)
        .with_body(
            r#"{"id":"b-1","number":42,"state":"passed","branch":"main",
                "message":"Fix flaky test","jobs":[]}"#,
        )
        .create();
    server
        .mock("GET", "/organizations/acme/pipelines/web/builds/42/artifacts")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();
    server
        .mock("GET", "/organizations/acme/pipelines/web/builds/42/annotations")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create();

    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["build", "view", "https://buildkite.com/acme/web/builds/42", "--no-pager", "--no-input"])
        .env("BUILDKITE_REST_API_ENDPOINT", server.url())
        .env("BUILDKITE_API_TOKEN", "bkua_test")
        .env("BUILDKITE_ORGANIZATION_SLUG", "acme")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build #42"));
}

#[test]
fn test_agent_stop_partial_failure_exits_one() {
    let mut server = mockito::Server::new();
    server
        .mock("PUT", "/organizations/acme/agents/a1/stop")
        .with_status(204)
        .create();
    server
        .mock("PUT", "/organizations/acme/agents/a2/stop")
        .with_status(404)
        .with_body(r#"{"message":"No agent found"}"#)
        .create();

    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["agent", "stop", "a1", "a2", "-q", "--no-input"])
        .env("BUILDKITE_REST_API_ENDPOINT", server.url())
        .env("BUILDKITE_API_TOKEN", "bkua_test")
        .env("BUILDKITE_ORGANIZATION_SLUG", "acme")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1 of 2"));
}

#[test]
fn test_prompt_print_shows_selected_org() {
    let home = TempDir::new().unwrap();
    bk(&home)
        .args(["prompt", "--print"])
        .env("BUILDKITE_ORGANIZATION_SLUG", "acme")
        .assert()
        .success()
        .stdout("acme\n");
}
