use crate::fixtures::server::IsolatedServer;
use crate::fixtures::*;
use crate::setup::*;
use crossbuild_common::api::Status;
use rstest::rstest;

#[rstest]
#[tokio::test]
pub async fn targets_cover_every_branch(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    let targets = client.list_targets().await.unwrap();

    let names = targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        &[
            "app_master_linux_amd64",
            "app_master_windows_386",
            "app_develop_linux_amd64",
            "app_develop_windows_386",
        ]
    );
    assert_eq!("app_develop_windows_386.zip", targets[3].archive);
    assert!(targets.iter().all(|t| t.last_build.is_none()));
}

#[rstest]
#[tokio::test]
pub async fn successful_build_updates_its_branch(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    let event = build_and_wait(client, "refs/heads/develop").await;
    assert_eq!(Status::Succeeded, event.status);

    let targets = client.list_targets().await.unwrap();
    for target in targets {
        if target.branch == "develop" {
            assert_eq!(Some(event.updated_at), target.last_build, "{}", target.name);
        } else {
            assert_eq!(None, target.last_build, "{}", target.name);
        }
    }
}

#[rstest]
#[tokio::test]
pub async fn tag_build_does_not_update_targets(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    let event = build_and_wait(client, "v2.0").await;
    assert_eq!(Status::Succeeded, event.status);

    assert!(isolated_server.archive("app_v2.0_linux_amd64.zip").exists());
    let targets = client.list_targets().await.unwrap();
    assert!(targets.iter().all(|t| t.last_build.is_none()));
}

#[rstest]
#[tokio::test]
pub async fn failed_build_does_not_update_targets(isolated_server: IsolatedServer) {
    let client = &isolated_server.client;

    let event = build_and_wait(client, crate::fixtures::source::BROKEN_REF).await;
    assert_eq!(Status::Failed, event.status);

    let targets = client.list_targets().await.unwrap();
    assert!(targets.iter().all(|t| t.last_build.is_none()));
}
