use crate::args::{Args, SubCommand};
use clap::Parser;
use crossbuild_common::api::normalize_ref;
use crossbuild_common::config;
use crossbuild_common::errors::*;
use crossbuild_worker::config::Settings;
use crossbuild_worker::pipeline::Pipeline;
use env_logger::Env;

mod args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "info,crossbuild_worker=debug,crossbuild_common=debug",
        2 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(Env::default().default_filter_or(logging));

    let config = config::load(args.config.as_ref()).context("Failed to load config file")?;
    let settings = Settings::from_config(&config).context("Invalid configuration")?;

    match args.subcommand {
        SubCommand::Build(build) => {
            let git_ref = normalize_ref(&build.git_ref)?;
            let pipeline = Pipeline::from_settings(&settings)?;

            let archives = pipeline
                .run(&git_ref)
                .await
                .with_context(|| anyhow!("Failed to build {:?}", git_ref))?;
            for archive in archives {
                println!("{}", archive.display());
            }
        }
        SubCommand::CheckConfig => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{}", json);
        }
    }

    Ok(())
}
