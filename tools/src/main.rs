use crate::args::*;
use clap::Parser;
use colored::*;
use crossbuild_common::api::*;
use crossbuild_common::errors::*;
use env_logger::Env;
use serde::Serialize;
use std::io;
use std::io::prelude::*;
use std::time::Duration;

pub mod args;
pub mod pager;

fn print_json<S: Serialize>(x: &S) -> Result<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, &x)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn format_event(event: &BuildEvent) -> String {
    format!(
        "{} {} {:-30} {}",
        format!("#{:<5}", event.id).bold(),
        event.status.fancy(),
        event.git_ref.bold(),
        event
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .bright_black(),
    )
}

fn format_target(target: &TargetStatus) -> String {
    let last_build = match target.last_build {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string().green(),
        None => "never".yellow(),
    };
    format!("{:-50} {:19} {}", target.name.bold(), last_build, target.archive)
}

async fn wait_for(client: &Client, mut event: BuildEvent, interval: u64) -> Result<BuildEvent> {
    let interval = Duration::from_secs(interval.max(1));
    while !event.status.is_terminal() {
        tokio::time::sleep(interval).await;
        let next = client
            .get_event(event.id)
            .await
            .with_context(|| anyhow!("Failed to poll build event #{}", event.id))?;
        if next.status != event.status {
            info!("Build event #{} is now {}", next.id, next.status);
        }
        event = next;
    }
    Ok(event)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logging = match args.verbose {
        0 => "info",
        1 => "info,crossbuildctl=debug,crossbuild_common=debug",
        2 => "debug",
        _ => "trace",
    };

    env_logger::init_from_env(Env::default().default_filter_or(logging));

    if args.color {
        debug!("Bypass tty detection and always use colors");
        colored::control::set_override(true);
    }

    let config =
        crossbuild_common::config::load(args.config).context("Failed to load config file")?;
    let client = Client::new(config, args.endpoint)?;

    match args.subcommand {
        SubCommand::Build(build) => {
            let event = client
                .request_build(&build.git_ref)
                .await
                .context("Failed to request build")?;
            println!("{}", format_event(&event));

            if build.wait {
                let event = wait_for(&client, event, build.interval).await?;
                println!("{}", format_event(&event));
                if let Some(diagnostic) = &event.diagnostic {
                    println!("{}", diagnostic);
                }
                if event.status == Status::Failed {
                    bail!("Build event #{} failed", event.id);
                }
            }
        }
        SubCommand::Events(events) => {
            let list = client
                .list_events(&ListEvents {
                    limit: events.limit,
                })
                .await?;
            if events.json {
                print_json(&list)?;
            } else {
                let mut stdout = io::stdout();
                for event in list {
                    if writeln!(stdout, "{}", format_event(&event)).is_err() {
                        break;
                    }
                }
            }
        }
        SubCommand::Event(show) => {
            let event = client
                .get_event(show.id)
                .await
                .with_context(|| anyhow!("Failed to fetch build event #{}", show.id))?;
            if show.json {
                print_json(&event)?;
            } else {
                let mut out = format_event(&event);
                out.push('\n');
                out.push_str(&format!(
                    "created at {}\n",
                    event.created_at.format("%Y-%m-%d %H:%M:%S")
                ));
                if let Some(diagnostic) = &event.diagnostic {
                    out.push('\n');
                    out.push_str(diagnostic);
                    out.push('\n');
                }
                pager::write(out.as_bytes())?;
            }
        }
        SubCommand::Targets(targets) => {
            let list = client
                .list_targets()
                .await?
                .into_iter()
                .filter(|t| match &targets.branch {
                    Some(branch) => t.branch == *branch,
                    None => true,
                })
                .collect::<Vec<_>>();
            if targets.json {
                print_json(&list)?;
            } else {
                let mut stdout = io::stdout();
                for target in list {
                    if writeln!(stdout, "{}", format_target(&target)).is_err() {
                        break;
                    }
                }
            }
        }
        SubCommand::Completions(completions) => args::gen_completions(&completions)?,
    }

    Ok(())
}
