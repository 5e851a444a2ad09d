use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use crossbuild_common::errors::*;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Verbose logging
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// crossbuild endpoint to talk to
    #[arg(short = 'H', long)]
    pub endpoint: Option<String>,
    /// Configuration file path
    #[arg(short, long, env = "CROSSBUILD_CONFIG")]
    pub config: Option<PathBuf>,
    /// Bypass tty detection and always use colors
    #[arg(short = 'C', long, global = true)]
    pub color: bool,
    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// Request a build of a branch, tag or commit
    Build(Build),
    /// List recent build events
    Events(Events),
    /// Show a single build event, including its diagnostic
    Event(EventShow),
    /// List the configured targets and when they were last built
    Targets(Targets),
    /// Generate shell completions
    Completions(Completions),
}

#[derive(Debug, Parser)]
pub struct Build {
    /// The reference to build, `refs/heads/` and `refs/tags/` are stripped
    #[arg(value_name = "REF")]
    pub git_ref: String,
    /// Poll the build event until it succeeded or failed
    #[arg(short, long)]
    pub wait: bool,
    /// Seconds between two polls
    #[arg(long, default_value = "5")]
    pub interval: u64,
}

#[derive(Debug, Parser)]
pub struct Events {
    /// Only show the newest events
    #[arg(short = 'n', long)]
    pub limit: Option<i64>,
    /// Print json output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct EventShow {
    pub id: i32,
    /// Print json output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct Targets {
    /// Only show targets of this branch
    #[arg(long)]
    pub branch: Option<String>,
    /// Print json output
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct Completions {
    pub shell: Shell,
}

pub fn gen_completions(args: &Completions) -> Result<()> {
    clap_complete::generate(
        args.shell,
        &mut Args::command(),
        "crossbuildctl",
        &mut io::stdout(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_build() {
        let args = Args::parse_from(["crossbuildctl", "-H", "http://ci:3050", "build", "-w", "refs/tags/v1.2"]);
        assert_eq!(args.endpoint.as_deref(), Some("http://ci:3050"));
        match args.subcommand {
            SubCommand::Build(build) => {
                assert_eq!(build.git_ref, "refs/tags/v1.2");
                assert!(build.wait);
                assert_eq!(build.interval, 5);
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }
    }

    #[test]
    fn parse_events_limit() {
        let args = Args::parse_from(["crossbuildctl", "events", "-n", "3", "--json"]);
        match args.subcommand {
            SubCommand::Events(events) => {
                assert_eq!(events.limit, Some(3));
                assert!(events.json);
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }
    }
}
