use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tmux::Gateway;

/// Commands tmux reports for a pane sitting at an interactive prompt.
/// These are not worth replaying, so capture records no command for them.
const IDLE_SHELLS: &[&str] = &["bash", "zsh", "fish", "sh", "dash", "ksh", "tcsh", "csh", "nu"];

/// A single terminal surface within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pane {
    pub index: usize,
    /// Working directory at capture time, always absolute.
    pub path: PathBuf,
    /// Foreground command at capture time; absent for an idle shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub active: bool,
    /// Share of the window this pane occupied, in percent. Relative so a
    /// restore adapts to whatever terminal size is current.
    pub width_pct: u8,
    pub height_pct: u8,
}

/// A tab-like container of one or more panes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub name: String,
    pub active: bool,
    pub panes: Vec<Pane>,
}

impl Window {
    pub fn active_pane(&self) -> Option<&Pane> {
        self.panes.iter().find(|p| p.active)
    }
}

/// An ordered set of windows under one deterministic session name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub windows: Vec<Window>,
}

impl Session {
    pub fn active_window(&self) -> Option<&Window> {
        self.windows.iter().find(|w| w.active)
    }
}

/// Immutable description of a session's topology at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub session: Session,
    /// Unix seconds.
    pub captured_at: u64,
    /// Directory the snapshot is keyed by, kept for diagnostics.
    pub source_dir: PathBuf,
}

impl TopologySnapshot {
    /// Capture the session bound to the current terminal.
    ///
    /// Windows and panes are walked strictly in the gateway's reported
    /// index order so a later restore recreates them in split order. The
    /// snapshot's session name comes from the directory key, not from the
    /// live session.
    pub fn capture(
        gateway: &dyn Gateway,
        source_dir: &Path,
        session_name: &str,
    ) -> Result<TopologySnapshot> {
        let live = gateway
            .current_session()?
            .ok_or(Error::NoActiveSession)?;

        let window_rows = gateway.list_windows(&live)?;
        if window_rows.is_empty() {
            return Err(Error::gateway(format!(
                "session '{live}' reported no windows"
            )));
        }

        let mut windows = Vec::with_capacity(window_rows.len());
        for row in &window_rows {
            let pane_rows = gateway.list_panes(&live, row.index)?;
            if pane_rows.is_empty() {
                return Err(Error::gateway(format!(
                    "window {}:{} reported no panes",
                    live, row.index
                )));
            }
            let panes = pane_rows
                .iter()
                .map(|p| Pane {
                    index: p.index,
                    path: p.path.clone(),
                    command: replayable_command(&p.command),
                    active: p.active,
                    width_pct: share(p.width, p.window_width),
                    height_pct: share(p.height, p.window_height),
                })
                .collect();
            windows.push(Window {
                index: row.index,
                name: row.name.clone(),
                active: row.active,
                panes: ensure_one_active_pane(panes),
            });
        }

        Ok(TopologySnapshot {
            session: Session {
                name: session_name.to_string(),
                windows: ensure_one_active_window(windows),
            },
            captured_at: now_unix(),
            source_dir: source_dir.to_path_buf(),
        })
    }

    /// Check the structural invariants a snapshot must satisfy before it
    /// can be replayed: non-empty windows and panes, exactly one active
    /// window and one active pane per window, absolute pane paths.
    ///
    /// Capture always produces a valid snapshot; this guards records coming
    /// back off disk.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.session.windows.is_empty() {
            return Err("session has no windows".to_string());
        }
        if self.session.windows.iter().filter(|w| w.active).count() != 1 {
            return Err("session must have exactly one active window".to_string());
        }
        for window in &self.session.windows {
            if window.panes.is_empty() {
                return Err(format!("window {} '{}' has no panes", window.index, window.name));
            }
            if window.panes.iter().filter(|p| p.active).count() != 1 {
                return Err(format!(
                    "window {} '{}' must have exactly one active pane",
                    window.index, window.name
                ));
            }
            if let Some(pane) = window.panes.iter().find(|p| !p.path.is_absolute()) {
                return Err(format!(
                    "pane {} in window {} has a non-absolute path {}",
                    pane.index,
                    window.index,
                    pane.path.display()
                ));
            }
        }
        Ok(())
    }
}

/// Map a pane's reported foreground command to the command worth replaying.
fn replayable_command(command: &str) -> Option<String> {
    let trimmed = command.trim();
    if trimmed.is_empty() || IDLE_SHELLS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A pane's share of its window, clamped to 1..=100.
fn share(cells: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((cells * 100 / total).clamp(1, 100)) as u8
}

/// Exactly one active pane per window: keep the first reported marker, or
/// fall back to pane 0 when the server reported none.
fn ensure_one_active_pane(mut panes: Vec<Pane>) -> Vec<Pane> {
    let first_active = panes.iter().position(|p| p.active).unwrap_or(0);
    for (i, pane) in panes.iter_mut().enumerate() {
        pane.active = i == first_active;
    }
    panes
}

fn ensure_one_active_window(mut windows: Vec<Window>) -> Vec<Window> {
    let first_active = windows.iter().position(|w| w.active).unwrap_or(0);
    for (i, window) in windows.iter_mut().enumerate() {
        window.active = i == first_active;
    }
    windows
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl fmt::Display for TopologySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session: {}", self.session.name)?;
        writeln!(f, "Captured from: {}", self.source_dir.display())?;
        for window in &self.session.windows {
            writeln!(
                f,
                "Window {} ({}){}",
                window.index,
                window.name,
                if window.active { " [active]" } else { "" }
            )?;
            for pane in &window.panes {
                write!(
                    f,
                    "  Pane {}{}: {} ({}x{}%)",
                    pane.index,
                    if pane.active { " [active]" } else { "" },
                    pane.path.display(),
                    pane.width_pct,
                    pane.height_pct,
                )?;
                match &pane.command {
                    Some(cmd) => writeln!(f, " running `{cmd}`")?,
                    None => writeln!(f)?,
                }
            }
        }
        Ok(())
    }
}
