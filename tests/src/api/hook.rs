use crate::fixtures::server::IsolatedServer;
use crate::fixtures::*;
use crate::setup::*;
use crossbuild_common::api::{BuildEvent, ErrorResponse, ListEvents, Status};
use crossbuild_common::http::StatusCode;
use rstest::rstest;
use serde_json::json;
use std::borrow::Cow;

#[rstest]
#[tokio::test]
pub async fn push_returns_pending_event(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let event = client.request_build("master").await.unwrap();

    assert_eq!(Status::Pending, event.status);
    assert_eq!("master", event.git_ref);
    assert_eq!(None, event.diagnostic);
    assert_eq!(event.created_at, event.updated_at);
}

#[rstest]
#[tokio::test]
pub async fn webhook_ref_prefix_is_stripped(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let branch = client.request_build("refs/heads/develop").await.unwrap();
    let tag = client.request_build("refs/tags/v0.2.0").await.unwrap();

    assert_eq!("develop", branch.git_ref);
    assert_eq!("v0.2.0", tag.git_ref);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("refs/heads/")]
#[case("--upload-pack=touch")]
#[case("../../etc")]
#[tokio::test]
pub async fn invalid_ref_is_rejected(#[case] git_ref: &str, isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let res = client
        .post(Cow::Borrowed("hook"))
        .unwrap()
        .json(&json!({ "ref": git_ref }))
        .send()
        .await
        .unwrap();

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let err = res.json::<ErrorResponse>().await.unwrap();
    assert!(err.error.starts_with("Invalid reference:"), "{}", err.error);

    let events = client.list_events(&ListEvents::default()).await.unwrap();
    assert!(events.is_empty());
}

#[rstest]
#[tokio::test]
pub async fn missing_ref_is_rejected(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let err = client.request_build("").await.unwrap_err();

    assert!(format!("{:#}", err).contains("Build request was rejected"));
}

#[rstest]
#[tokio::test]
pub async fn get_hook_is_accepted_in_test_mode(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let res = client
        .get(Cow::Borrowed("hook"))
        .unwrap()
        .query(&[("ref", "refs/tags/v1.0")])
        .send()
        .await
        .unwrap();

    assert_eq!(StatusCode::OK, res.status());
    let event = res.json::<BuildEvent>().await.unwrap();
    assert_eq!("v1.0", event.git_ref);
    assert_eq!(Status::Succeeded, wait_until_done(&client, event.id).await.status);
}

#[rstest]
#[tokio::test]
pub async fn get_hook_is_not_mounted_in_github_mode(github_server: IsolatedServer) {
    let client = github_server.client;

    let res = client
        .get(Cow::Borrowed("hook"))
        .unwrap()
        .query(&[("ref", "master")])
        .send()
        .await
        .unwrap();

    assert!(res.status().is_client_error(), "{}", res.status());
    let events = client.list_events(&ListEvents::default()).await.unwrap();
    assert!(events.is_empty());

    // pushes are still accepted
    let event = client.request_build("master").await.unwrap();
    assert_eq!(Status::Pending, event.status);
}
