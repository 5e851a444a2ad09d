use crossbuild_common::errors::*;
use futures_util::FutureExt;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::borrow::Cow;
use std::cmp;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::select;
use tokio::time;

const SIGKILL_DELAY: u64 = 10;
const IDLE_WAKEUP: u64 = 60;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub timeout: Option<Duration>,
    pub max_bytes: Option<usize>,
}

impl Limits {
    /// A timeout of 0 seconds means no timeout.
    pub fn new(timeout: u64, max_bytes: usize) -> Limits {
        Limits {
            timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            max_bytes: Some(max_bytes),
        }
    }
}

pub struct Options {
    pub limits: Limits,
    pub envs: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl Options {
    pub fn new(limits: Limits) -> Options {
        Options {
            limits,
            envs: HashMap::new(),
            cwd: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    /// stdout and stderr in the order they were read
    pub combined: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// stderr of the process, or all of its output if nothing was written to stderr.
    pub fn diagnostic(&self) -> String {
        let buf = if self.stderr.iter().all(u8::is_ascii_whitespace) {
            &self.combined
        } else {
            &self.stderr
        };
        String::from_utf8_lossy(buf).trim_end().to_string()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

struct Capture {
    output: Output,
    timeout: Option<Duration>,
    size_limit: Option<usize>,
    start: Instant,
    sigterm_sent: Option<Instant>,
    truncated: bool,
}

impl Capture {
    fn new(limits: Limits) -> Capture {
        Capture {
            output: Output::default(),
            timeout: limits.timeout,
            size_limit: limits.max_bytes,
            start: Instant::now(),
            sigterm_sent: None,
            truncated: false,
        }
    }

    fn into_output(mut self, success: bool) -> Output {
        self.output.success = success;
        self.output
    }

    /// Output past the size limit is dropped, the process keeps running.
    async fn push_bytes(&mut self, child: &mut Child, stream: Stream, mut slice: &[u8]) -> Result<()> {
        if !self.truncated {
            if let Some(size_limit) = self.size_limit {
                let n = cmp::min(
                    size_limit.saturating_sub(self.output.combined.len()),
                    slice.len(),
                );
                if n < 1 {
                    warn!(
                        "Exceeding output limit: output={}, slice={}, limit={}",
                        self.output.combined.len(),
                        slice.len(),
                        size_limit
                    );
                    let msg = format!("TRUNCATED DUE TO SIZE LIMIT: {} bytes", size_limit);
                    self.truncate(child, &msg, false).await?;
                    return Ok(());
                } else {
                    // truncate to stay within the limit
                    slice = &slice[..n];
                }
            }

            self.output.combined.extend(slice);
            match stream {
                Stream::Stdout => self.output.stdout.extend(slice),
                Stream::Stderr => self.output.stderr.extend(slice),
            }
        }

        Ok(())
    }

    fn kill(pid: u32, signal: Signal) -> Result<()> {
        // convert 1234 to -1234 to kill grand-children too
        let pid = -(pid as i32);
        info!("Sending {} to child(pid={})", signal, pid);
        signal::kill(Pid::from_raw(pid), signal)?;
        Ok(())
    }

    async fn truncate(&mut self, child: &mut Child, reason: &str, kill: bool) -> Result<()> {
        if kill {
            if let Some(pid) = child.id() {
                Self::kill(pid, Signal::SIGTERM)?;
            }
            self.sigterm_sent = Some(Instant::now());
        }

        let msg = format!("\n\n{}\n\n", reason);
        self.output.combined.extend(msg.as_bytes());
        self.output.stderr.extend(msg.as_bytes());
        self.truncated = true;
        Ok(())
    }

    async fn next_wakeup(
        &mut self,
        child: &mut Child,
        stdout_open: &mut bool,
        stderr_open: &mut bool,
    ) -> Result<Duration> {
        // check if we need to SIGKILL due to SIGTERM timeout
        if let Some(sigterm_sent) = self.sigterm_sent {
            if sigterm_sent.elapsed() > Duration::from_secs(SIGKILL_DELAY) {
                if let Some(pid) = child.id() {
                    warn!(
                        "child(pid={}) didn't terminate {}s after SIGTERM, sending SIGKILL",
                        pid, SIGKILL_DELAY
                    );
                    // child.id is going to return None after this
                    Self::kill(pid, Signal::SIGKILL)?;
                    *stdout_open = false;
                    *stderr_open = false;
                }
            }
        }

        let Some(timeout) = self.timeout else {
            return Ok(Duration::from_secs(IDLE_WAKEUP));
        };

        // check if the process timed out and we need to SIGTERM
        if let Some(remaining) = timeout.checked_sub(self.start.elapsed()) {
            return Ok(remaining);
        } else if self.sigterm_sent.is_none() {
            warn!("child timed out, killing...");
            let msg = format!("TRUNCATED DUE TO TIMEOUT: {} seconds", timeout.as_secs());
            self.truncate(child, &msg, true).await?;
        }

        // if we don't need any timeouts anymore we just return any value
        Ok(Duration::from_secs(SIGKILL_DELAY))
    }
}

/// Run a program to completion and capture its output. A non-zero exit is
/// reported through `Output::success`, errors are reserved for failing to
/// run the program at all.
pub async fn run<I, S>(bin: &str, args: I, opts: Options) -> Result<Output>
where
    I: IntoIterator<Item = S> + fmt::Debug,
    S: AsRef<OsStr>,
{
    info!("Running {:?} {:?}", bin, args);
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(&opts.envs)
        .kill_on_drop(true);

    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }

    unsafe {
        cmd.pre_exec(|| {
            // create a new process group
            let pid = nix::unistd::getpid();
            if let Err(err) = nix::unistd::setpgid(pid, Pid::from_raw(0)) {
                warn!("Failed to create new process group: {:#?}", err);
            }
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .with_context(|| anyhow!("Failed to execute {:?}", bin))?;

    let mut child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| format_err!("Failed to capture stdout of {:?}", bin))?;
    let mut child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| format_err!("Failed to capture stderr of {:?}", bin))?;

    let mut buf_stdout = [0u8; 4096];
    let mut buf_stderr = [0u8; 4096];

    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut cap = Capture::new(opts.limits);
    let success = loop {
        let remaining = cap
            .next_wakeup(&mut child, &mut stdout_open, &mut stderr_open)
            .await?;

        if stdout_open || stderr_open {
            select! {
                n = child_stdout.read(&mut buf_stdout).fuse(), if stdout_open => {
                    let n = n?;
                    trace!("read stdout: {}", n);
                    if n == 0 {
                        stdout_open = false;
                    } else {
                        cap.push_bytes(&mut child, Stream::Stdout, &buf_stdout[..n]).await?;
                    }
                },
                n = child_stderr.read(&mut buf_stderr).fuse(), if stderr_open => {
                    let n = n?;
                    trace!("read stderr: {}", n);
                    if n == 0 {
                        stderr_open = false;
                    } else {
                        cap.push_bytes(&mut child, Stream::Stderr, &buf_stderr[..n]).await?;
                    }
                },
                _ = time::sleep(remaining).fuse() => continue,
            }
        } else {
            select! {
                status = child.wait().fuse() => {
                    let status = status?;
                    info!("{:?} exited with exit={}, captured {} bytes", bin, status, cap.output.combined.len());
                    break status.success();
                }
                _ = time::sleep(remaining).fuse() => continue,
            }
        }
    };

    Ok(cap.into_output(success))
}
