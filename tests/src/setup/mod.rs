use crossbuild_common::api::{BuildEvent, Client, Status};
use std::time::Duration;

/// Poll the daemon until the event reached a terminal status.
pub async fn wait_until_done(client: &Client, id: i32) -> BuildEvent {
    for _ in 0..300 {
        let event = client.get_event(id).await.unwrap();
        if event.status.is_terminal() {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("build event #{} did not finish in time", id);
}

pub async fn build_and_wait(client: &Client, git_ref: &str) -> BuildEvent {
    let event = client.request_build(git_ref).await.unwrap();
    assert_eq!(event.status, Status::Pending);
    wait_until_done(client, event.id).await
}
