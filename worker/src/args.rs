use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Verbose logging
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    #[arg(short, long, global = true, env = "CROSSBUILD_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// Cross-compile and package a reference for every configured target
    Build(Build),
    /// Load and print the resolved build settings
    CheckConfig,
}

#[derive(Debug, Parser)]
pub struct Build {
    /// Branch, tag or commit to build
    #[arg(value_name = "REF")]
    pub git_ref: String,
}
