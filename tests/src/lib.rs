#![cfg(test)]

use crate::fixtures::server::IsolatedServer;
use crate::fixtures::source::{BROKEN_REF, MISSING_REF};
use crate::fixtures::*;
use crate::setup::*;
use crossbuild_common::api::{ListEvents, Status};
use rstest::rstest;
use std::fs::File;
use std::io::Read;
use zip::ZipArchive;

mod api;
pub(crate) mod fixtures;
pub mod setup;

fn zip_entries(server: &IsolatedServer, filename: &str) -> Vec<String> {
    let file = File::open(server.archive(filename)).unwrap();
    let zip = ZipArchive::new(file).unwrap();
    let mut names = zip
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(String::from)
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[rstest]
#[tokio::test]
pub async fn new_daemon_has_no_events(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let events = client.list_events(&ListEvents::default()).await.unwrap();

    assert!(events.is_empty())
}

#[rstest]
#[tokio::test]
pub async fn build_produces_an_archive_per_target(isolated_server: IsolatedServer) {
    let event = build_and_wait(&isolated_server.client, "master").await;

    assert_eq!(Status::Succeeded, event.status);
    assert_eq!(None, event.diagnostic);
    assert_eq!(
        zip_entries(&isolated_server, "app_master_linux_amd64.zip"),
        &["app/app", "app/templates/index.tmpl"]
    );
    assert_eq!(
        zip_entries(&isolated_server, "app_master_windows_386.zip"),
        &["app/app.exe", "app/templates/index.tmpl"]
    );
}

#[rstest]
#[tokio::test]
pub async fn archive_contains_the_cross_compiled_binary(isolated_server: IsolatedServer) {
    build_and_wait(&isolated_server.client, "v1.0").await;

    let file = File::open(isolated_server.archive("app_v1.0_windows_386.zip")).unwrap();
    let mut zip = ZipArchive::new(file).unwrap();
    let mut binary = String::new();
    zip.by_name("app/app.exe")
        .unwrap()
        .read_to_string(&mut binary)
        .unwrap();

    assert_eq!("windows/386", binary)
}

#[rstest]
#[tokio::test]
pub async fn fetch_failure_is_recorded(isolated_server: IsolatedServer) {
    let event = build_and_wait(&isolated_server.client, MISSING_REF).await;

    assert_eq!(Status::Failed, event.status);
    assert_eq!(
        Some("Failed to fetch source archive: 404 Not Found"),
        event.diagnostic.as_deref()
    );
    assert!(!isolated_server.archive("app_missing_linux_amd64.zip").exists());
}

#[rstest]
#[tokio::test]
pub async fn compile_failure_keeps_compiler_output(isolated_server: IsolatedServer) {
    let event = build_and_wait(&isolated_server.client, BROKEN_REF).await;

    assert_eq!(Status::Failed, event.status);
    let diagnostic = event.diagnostic.unwrap();
    assert!(
        diagnostic.starts_with("Failed to build target: linux amd64: "),
        "{}",
        diagnostic
    );
    assert!(diagnostic.contains("undefined: run"), "{}", diagnostic);
}

#[rstest]
#[tokio::test]
pub async fn refs_with_slashes_keep_distinct_archives(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    build_and_wait(client, "release/1.0").await;
    build_and_wait(client, "release-1.0").await;

    assert!(isolated_server
        .archive("app_release~1.0_linux_amd64.zip")
        .exists());
    assert!(isolated_server
        .archive("app_release-1.0_linux_amd64.zip")
        .exists());
}

#[rstest]
#[tokio::test]
pub async fn failed_build_does_not_block_the_next_one(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    let failed = client.request_build(MISSING_REF).await.unwrap();
    let next = client.request_build("develop").await.unwrap();

    assert_eq!(Status::Failed, wait_until_done(client, failed.id).await.status);
    assert_eq!(Status::Succeeded, wait_until_done(client, next.id).await.status);
}

#[rstest]
#[tokio::test]
pub async fn workspace_is_clean_after_build(isolated_server: IsolatedServer) {
    build_and_wait(&isolated_server.client, "master").await;

    let source = isolated_server.root().join("gopath/src/github.com/example/app");
    assert!(!source.exists());
}

#[rstest]
#[tokio::test]
pub async fn every_build_is_recorded_once_per_transition(isolated_server: IsolatedServer) {
    let first = build_and_wait(&isolated_server.client, "master").await;
    let second = build_and_wait(&isolated_server.client, MISSING_REF).await;

    assert_eq!(
        isolated_server.ledger.writes(),
        &[
            (first.id, Status::Running),
            (first.id, Status::Succeeded),
            (second.id, Status::Running),
            (second.id, Status::Failed),
        ]
    );
}
