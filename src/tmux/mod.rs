mod client;

pub use client::TmuxGateway;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A window addressed as `session:index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTarget {
    pub session: String,
    pub index: usize,
}

impl fmt::Display for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.index)
    }
}

/// A pane addressed as `session:window.pane`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneTarget {
    pub session: String,
    pub window: usize,
    pub index: usize,
}

impl fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.index)
    }
}

/// Window row as reported by the live server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub index: usize,
    pub name: String,
    pub active: bool,
}

/// Pane row as reported by the live server.
///
/// Geometry is in cells and is only used to compute relative shares; it is
/// never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub index: usize,
    pub active: bool,
    pub command: String,
    pub width: u32,
    pub height: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub path: PathBuf,
}

/// How to split when creating a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Side by side (`split-window -h`).
    Horizontal,
    /// Stacked (`split-window -v`).
    Vertical,
}

impl fmt::Display for SplitDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitDirection::Horizontal => write!(f, "horizontal"),
            SplitDirection::Vertical => write!(f, "vertical"),
        }
    }
}

/// Geometry hint for a new pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSpec {
    pub direction: SplitDirection,
    /// Percentage of the split given to the new pane, when known.
    pub size_pct: Option<u8>,
}

/// Capability boundary over the live multiplexer.
///
/// One production implementation shells out to tmux; tests use an in-memory
/// fake that records calls and returns scripted topologies. Mutating calls
/// never retry; callers decide whether a failure is fatal.
pub trait Gateway {
    /// Session bound to this terminal, or `None` when not inside tmux.
    fn current_session(&self) -> Result<Option<String>>;
    fn has_session(&self, name: &str) -> Result<bool>;
    fn list_windows(&self, session: &str) -> Result<Vec<WindowInfo>>;
    fn list_panes(&self, session: &str, window: usize) -> Result<Vec<PaneInfo>>;

    /// Create a detached session whose first window is `window_name` at `dir`.
    fn new_session(&self, name: &str, window_name: &str, dir: &Path) -> Result<WindowTarget>;
    fn create_window(&self, session: &str, name: &str, dir: &Path) -> Result<WindowTarget>;
    fn create_pane(&self, window: &WindowTarget, dir: &Path, split: SplitSpec)
        -> Result<PaneTarget>;
    fn rename_window(&self, window: &WindowTarget, name: &str) -> Result<()>;
    fn select_window(&self, window: &WindowTarget) -> Result<()>;
    fn select_pane(&self, pane: &PaneTarget) -> Result<()>;
    fn send_command(&self, pane: &PaneTarget, text: &str) -> Result<()>;
    fn switch_client(&self, session: &str) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    //! Scripted in-memory gateway for capture/restore tests.

    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, HashSet};
    use std::path::Path;

    use super::*;
    use crate::error::Error;

    /// Records every mutating call and serves a scripted topology.
    #[derive(Default)]
    pub struct FakeGateway {
        pub current: Option<String>,
        pub windows: Vec<WindowInfo>,
        pub panes: HashMap<usize, Vec<PaneInfo>>,
        /// Session names `has_session` reports as existing.
        pub existing_sessions: HashSet<String>,
        /// Window names whose creation is scripted to fail.
        pub fail_windows: HashSet<String>,
        calls: RefCell<Vec<String>>,
        next_window: Cell<usize>,
        next_pane: RefCell<HashMap<usize, usize>>,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        /// Count of mutating calls recorded so far.
        pub fn mutation_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl Gateway for FakeGateway {
        fn current_session(&self) -> Result<Option<String>> {
            Ok(self.current.clone())
        }

        fn has_session(&self, name: &str) -> Result<bool> {
            Ok(self.existing_sessions.contains(name))
        }

        fn list_windows(&self, _session: &str) -> Result<Vec<WindowInfo>> {
            Ok(self.windows.clone())
        }

        fn list_panes(&self, _session: &str, window: usize) -> Result<Vec<PaneInfo>> {
            Ok(self.panes.get(&window).cloned().unwrap_or_default())
        }

        fn new_session(&self, name: &str, window_name: &str, dir: &Path) -> Result<WindowTarget> {
            if self.fail_windows.contains(window_name) {
                return Err(Error::gateway(format!(
                    "scripted failure creating session window '{window_name}'"
                )));
            }
            self.record(format!("new-session {name} {window_name} {}", dir.display()));
            self.next_window.set(1);
            Ok(WindowTarget {
                session: name.to_string(),
                index: 0,
            })
        }

        fn create_window(&self, session: &str, name: &str, dir: &Path) -> Result<WindowTarget> {
            if self.fail_windows.contains(name) {
                return Err(Error::gateway(format!(
                    "scripted failure creating window '{name}'"
                )));
            }
            let index = self.next_window.get();
            self.next_window.set(index + 1);
            self.record(format!("create-window {session} {name} {}", dir.display()));
            Ok(WindowTarget {
                session: session.to_string(),
                index,
            })
        }

        fn create_pane(
            &self,
            window: &WindowTarget,
            dir: &Path,
            split: SplitSpec,
        ) -> Result<PaneTarget> {
            let mut next = self.next_pane.borrow_mut();
            let index = next.entry(window.index).or_insert(1);
            let pane = PaneTarget {
                session: window.session.clone(),
                window: window.index,
                index: *index,
            };
            *index += 1;
            self.record(format!(
                "create-pane {window} {} {} {}",
                dir.display(),
                split.direction,
                split.size_pct.map_or_else(|| "-".to_string(), |p| p.to_string()),
            ));
            Ok(pane)
        }

        fn rename_window(&self, window: &WindowTarget, name: &str) -> Result<()> {
            self.record(format!("rename-window {window} {name}"));
            Ok(())
        }

        fn select_window(&self, window: &WindowTarget) -> Result<()> {
            self.record(format!("select-window {window}"));
            Ok(())
        }

        fn select_pane(&self, pane: &PaneTarget) -> Result<()> {
            self.record(format!("select-pane {pane}"));
            Ok(())
        }

        fn send_command(&self, pane: &PaneTarget, text: &str) -> Result<()> {
            self.record(format!("send-command {pane} {text}"));
            Ok(())
        }

        fn switch_client(&self, session: &str) -> Result<()> {
            self.record(format!("switch-client {session}"));
            Ok(())
        }
    }
}
