use crate::fixtures::server::IsolatedServer;
use crate::fixtures::*;
use crate::setup::*;
use crossbuild_common::api::{ListEvents, Status};
use crossbuild_common::http::StatusCode;
use rstest::rstest;
use std::borrow::Cow;

#[rstest]
#[tokio::test]
pub async fn events_are_listed_newest_first(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let first = build_and_wait(&client, "master").await;
    let second = build_and_wait(&client, "develop").await;
    let third = build_and_wait(&client, "v1.0").await;

    let events = client.list_events(&ListEvents::default()).await.unwrap();
    let ids = events.iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids, &[third.id, second.id, first.id]);

    let events = client.list_events(&ListEvents { limit: Some(2) }).await.unwrap();
    let ids = events.iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids, &[third.id, second.id]);
}

#[rstest]
#[tokio::test]
pub async fn event_reaches_terminal_status(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let event = client.request_build("master").await.unwrap();
    let done = wait_until_done(&client, event.id).await;

    assert_eq!(event.id, done.id);
    assert_eq!(event.created_at, done.created_at);
    assert!(done.updated_at >= done.created_at);
    assert_eq!(Status::Succeeded, done.status);
}

#[rstest]
#[tokio::test]
pub async fn unknown_event_is_not_found(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let res = client
        .get(Cow::Borrowed("api/v0/events/4242"))
        .unwrap()
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::NOT_FOUND, res.status());

    assert!(client.get_event(4242).await.is_err());
}

#[rstest]
#[tokio::test]
pub async fn builds_run_in_submission_order(isolated_server: IsolatedServer) {
    let client = isolated_server.client;

    let mut ids = Vec::new();
    for git_ref in ["master", "develop", "v1.0"] {
        ids.push(client.request_build(git_ref).await.unwrap().id);
    }
    for id in &ids {
        wait_until_done(&client, *id).await;
    }

    let started = isolated_server
        .ledger
        .writes()
        .into_iter()
        .filter(|(_, status)| *status == Status::Running)
        .map(|(id, _)| id)
        .collect::<Vec<_>>();
    assert_eq!(started, ids);
}
