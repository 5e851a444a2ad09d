use crossbuild_common::errors::*;
use std::env;
use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

const DEFAULT_PAGER: &str = "less -R";

fn pager_cmd() -> Option<Vec<String>> {
    if env::var_os("NOPAGER").is_some() || !io::stdout().is_terminal() {
        return None;
    }
    let cmd = env::var("PAGER").unwrap_or_else(|_| DEFAULT_PAGER.to_string());
    let cmd = cmd.split_whitespace().map(String::from).collect::<Vec<_>>();
    if cmd.is_empty() {
        None
    } else {
        Some(cmd)
    }
}

/// Show build output, through `$PAGER` when attached to a terminal.
pub fn write(buf: &[u8]) -> Result<()> {
    let Some(cmd) = pager_cmd() else {
        io::stdout().write_all(buf).ok();
        return Ok(());
    };

    let child = Command::new(&cmd[0])
        .args(&cmd[1..])
        .stdin(Stdio::piped())
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(err) => {
            debug!("Failed to spawn pager {:?}, writing to stdout: {:#}", cmd[0], err);
            io::stdout().write_all(buf).ok();
            return Ok(());
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        // the user may quit the pager early
        stdin.write_all(buf).ok();
    }
    child.wait().context("Failed to wait for pager")?;
    Ok(())
}
