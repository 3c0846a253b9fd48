use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Gateway, PaneInfo, PaneTarget, SplitDirection, SplitSpec, WindowInfo, WindowTarget};
use crate::error::{Error, Result};

/// Per-invocation timeout before a call is abandoned.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Production gateway shelling out to the tmux binary.
pub struct TmuxGateway {
    /// Path to tmux binary
    tmux_path: String,
    timeout: Duration,
}

struct CmdOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl TmuxGateway {
    pub fn new() -> Self {
        Self {
            tmux_path: std::env::var("TMUX_HERE_BIN").unwrap_or_else(|_| "tmux".to_string()),
            timeout: CALL_TIMEOUT,
        }
    }

    /// Run one tmux invocation under the per-call timeout.
    ///
    /// Stdout and stderr are drained on reader threads so a chatty child can
    /// never fill a pipe and stall; the child is killed once the deadline
    /// passes.
    fn invoke(&self, args: &[&str]) -> Result<CmdOutput> {
        debug!(command = %args.join(" "), "tmux");
        let mut child = Command::new(&self.tmux_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::gateway(format!("failed to spawn {}: {}", self.tmux_path, e)))?;

        let stdout = reader_thread(child.stdout.take());
        let stderr = reader_thread(child.stderr.take());

        let status = self.wait_with_deadline(&mut child, args)?;

        Ok(CmdOutput {
            success: status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn wait_with_deadline(&self, child: &mut Child, args: &[&str]) -> Result<bool> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.success()),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::GatewayTimeout {
                        command: format!("{} {}", self.tmux_path, args.join(" ")),
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => return Err(Error::gateway(format!("failed to wait on tmux: {e}"))),
            }
        }
    }

    /// Run an invocation that must succeed; returns trimmed stdout.
    fn invoke_checked(&self, args: &[&str]) -> Result<String> {
        let out = self.invoke(args)?;
        if !out.success {
            return Err(Error::gateway(format!(
                "`{} {}` failed: {}",
                self.tmux_path,
                args.join(" "),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout.trim_end().to_string())
    }

    /// The command to attach to a session (for external execution).
    pub fn attach_command(&self, session: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            session.to_string(),
        ]
    }
}

impl Default for TmuxGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway for TmuxGateway {
    fn current_session(&self) -> Result<Option<String>> {
        // $TMUX is only set for processes running inside a session.
        if std::env::var("TMUX").is_err() {
            return Ok(None);
        }
        let name = self.invoke_checked(&["display-message", "-p", "#{session_name}"])?;
        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        // Exact-match target; a bare name would prefix-match.
        let out = self.invoke(&["has-session", "-t", &format!("={name}")])?;
        Ok(out.success)
    }

    fn list_windows(&self, session: &str) -> Result<Vec<WindowInfo>> {
        let stdout = self.invoke_checked(&[
            "list-windows",
            "-t",
            session,
            "-F",
            "#{window_index}|#{window_name}|#{window_active}",
        ])?;
        Ok(stdout.lines().filter_map(parse_window_line).collect())
    }

    fn list_panes(&self, session: &str, window: usize) -> Result<Vec<PaneInfo>> {
        let target = format!("{session}:{window}");
        let stdout = self.invoke_checked(&[
            "list-panes",
            "-t",
            &target,
            "-F",
            // Path goes last: it is the only field that may contain the
            // separator.
            "#{pane_index}|#{pane_active}|#{pane_current_command}|#{pane_width}|#{pane_height}|#{window_width}|#{window_height}|#{pane_current_path}",
        ])?;
        Ok(stdout.lines().filter_map(parse_pane_line).collect())
    }

    fn new_session(&self, name: &str, window_name: &str, dir: &Path) -> Result<WindowTarget> {
        let dir = dir.to_string_lossy();
        let index = self.invoke_checked(&[
            "new-session",
            "-d",
            "-s",
            name,
            "-n",
            window_name,
            "-c",
            &dir,
            "-P",
            "-F",
            "#{window_index}",
        ])?;
        Ok(WindowTarget {
            session: name.to_string(),
            index: index.parse().unwrap_or(0),
        })
    }

    fn create_window(&self, session: &str, name: &str, dir: &Path) -> Result<WindowTarget> {
        let dir = dir.to_string_lossy();
        let index = self.invoke_checked(&[
            "new-window",
            "-t",
            session,
            "-n",
            name,
            "-c",
            &dir,
            "-P",
            "-F",
            "#{window_index}",
        ])?;
        Ok(WindowTarget {
            session: session.to_string(),
            index: index.parse().unwrap_or(0),
        })
    }

    fn create_pane(
        &self,
        window: &WindowTarget,
        dir: &Path,
        split: SplitSpec,
    ) -> Result<PaneTarget> {
        let target = window.to_string();
        let dir = dir.to_string_lossy();
        let mut args: Vec<&str> = vec!["split-window", "-t", target.as_str()];
        args.push(match split.direction {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        });
        let size;
        if let Some(pct) = split.size_pct {
            size = format!("{pct}%");
            args.push("-l");
            args.push(&size);
        }
        args.extend(["-c", dir.as_ref(), "-P", "-F", "#{pane_index}"]);
        let index = self.invoke_checked(&args)?;
        Ok(PaneTarget {
            session: window.session.clone(),
            window: window.index,
            index: index.parse().unwrap_or(0),
        })
    }

    fn rename_window(&self, window: &WindowTarget, name: &str) -> Result<()> {
        self.invoke_checked(&["rename-window", "-t", &window.to_string(), name])?;
        Ok(())
    }

    fn select_window(&self, window: &WindowTarget) -> Result<()> {
        self.invoke_checked(&["select-window", "-t", &window.to_string()])?;
        Ok(())
    }

    fn select_pane(&self, pane: &PaneTarget) -> Result<()> {
        self.invoke_checked(&["select-pane", "-t", &pane.to_string()])?;
        Ok(())
    }

    fn send_command(&self, pane: &PaneTarget, text: &str) -> Result<()> {
        self.invoke_checked(&["send-keys", "-t", &pane.to_string(), text, "Enter"])?;
        Ok(())
    }

    fn switch_client(&self, session: &str) -> Result<()> {
        self.invoke_checked(&["switch-client", "-t", session])?;
        Ok(())
    }
}

fn reader_thread(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(WindowInfo {
        index: parts[0].parse().ok()?,
        name: parts[1].to_string(),
        active: parts[2] == "1",
    })
}

fn parse_pane_line(line: &str) -> Option<PaneInfo> {
    let parts: Vec<&str> = line.splitn(8, '|').collect();
    if parts.len() < 8 {
        return None;
    }
    Some(PaneInfo {
        index: parts[0].parse().ok()?,
        active: parts[1] == "1",
        command: parts[2].to_string(),
        width: parts[3].parse().ok()?,
        height: parts[4].parse().ok()?,
        window_width: parts[5].parse().ok()?,
        window_height: parts[6].parse().ok()?,
        path: PathBuf::from(parts[7]),
    })
}
