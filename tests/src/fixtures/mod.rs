pub mod server;
pub mod source;

use crate::fixtures::server::{IsolatedServer, ServerHolder};
use crate::fixtures::source::StubFetcher;
use crossbuild_common::api::Client;
use crossbuild_common::config::{ConfigFile, WebhookMode};
use crossbuild_common::errors::info;
use crossbuild_worker::pack::Packager;
use crossbuild_worker::pipeline::Pipeline;
use crossbuild_worker::workspace::Workspace;
use crossbuildd::ledger::MemoryLedger;
use rstest::fixture;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Fails if the fetcher left a `FAIL` file, otherwise writes a fake binary
/// named like `go build` would.
const BUILD_SCRIPT: &str = r#"if [ -e FAIL ]; then cat FAIL >&2; exit 2; fi; n=$(basename "$PWD"); if [ "$GOOS" = windows ]; then n="$n.exe"; fi; printf "%s/%s" "$GOOS" "$GOARCH" > "$n""#;

#[fixture]
pub fn root_dir() -> TempDir {
    TempDir::new().unwrap()
}

pub fn config_file(root: &Path, mode: WebhookMode) -> ConfigFile {
    let mut config: ConfigFile = toml::from_str(
        r#"
branches = ["master", "develop"]
targets = ["linux amd64", "windows 386"]
resources = ["templates"]
database_path = ":memory:"

[http]
bind_addr = "127.0.0.1:0"

[repository]
import_path = "github.com/example/app"
archive_url = "https://example.invalid/archive/{ref}.zip"

[build]
deps_cmd = []
timeout = 60
"#,
    )
    .unwrap();

    config.webhook.mode = Some(mode);
    config.build.workspace = Some(root.join("gopath"));
    config.archive_path = Some(root.join("archive"));
    config.build.build_cmd = Some(vec![
        "sh".to_string(),
        "-c".to_string(),
        BUILD_SCRIPT.to_string(),
        "build".to_string(),
    ]);
    config
}

fn spawn_server(root: TempDir, mode: WebhookMode) -> IsolatedServer {
    let config = crossbuildd::config::from_struct(config_file(root.path(), mode)).unwrap();
    let settings = &config.settings;

    // the real compiler and packager, only the network fetch is stubbed
    let pipeline = Pipeline::new(
        Workspace::new(&settings.workspace, &settings.import_path).unwrap(),
        Box::new(StubFetcher),
        Box::new(settings.compiler.clone()),
        Packager::new(&settings.archive_path, settings.resources.clone()),
        settings.targets.clone(),
        settings.tags.clone(),
    );

    let ledger = Arc::new(MemoryLedger::new());
    let mut server = ServerHolder::new(config, ledger.clone(), pipeline).unwrap();
    server.start().unwrap();

    let endpoint = format!("http://{}", server.address);
    info!("Setting up client for {:?}", endpoint);
    let client = Client::new(ConfigFile::default(), Some(endpoint)).unwrap();

    IsolatedServer::new(server, root, ledger, client)
}

#[fixture]
pub fn isolated_server(root_dir: TempDir) -> IsolatedServer {
    spawn_server(root_dir, WebhookMode::Test)
}

#[fixture]
pub fn github_server(root_dir: TempDir) -> IsolatedServer {
    spawn_server(root_dir, WebhookMode::Github)
}
