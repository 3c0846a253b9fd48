use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::snapshot::{Pane, TopologySnapshot, Window};
use crate::tmux::{Gateway, PaneTarget, SplitDirection, SplitSpec, WindowTarget};

/// Lifecycle of one restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Pending,
    Applying,
    Completed,
    PartiallyFailed,
    /// Terminal state of a dry run; nothing was mutated.
    Reported,
}

/// Planned creation of one pane. `split` is absent for the pane that comes
/// with its window.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PanePlan {
    dir: PathBuf,
    split: Option<SplitSpec>,
    command: Option<String>,
    active: bool,
}

/// Planned creation of one window, in snapshot order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WindowPlan {
    index: usize,
    name: String,
    active: bool,
    panes: Vec<PanePlan>,
}

/// Outcome for one window of the snapshot.
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub index: usize,
    pub name: String,
    /// Reason the window (or one of its panes) failed, when it did.
    pub error: Option<String>,
}

/// Aggregate result of a restore attempt.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub session: String,
    pub state: RestoreState,
    pub windows: Vec<WindowOutcome>,
    /// Human-readable plan, populated on dry runs.
    pub rendered: Vec<String>,
}

impl RestoreReport {
    pub fn succeeded(&self) -> usize {
        self.windows.iter().filter(|w| w.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.windows.len() - self.succeeded()
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded() > 0
    }

    pub fn summary(&self) -> String {
        if self.state == RestoreState::Reported {
            return format!(
                "Dry run: would restore {} window(s) into session '{}'",
                self.windows.len(),
                self.session
            );
        }
        if self.failed() == 0 {
            format!(
                "Restored {} window(s) into session '{}'",
                self.succeeded(),
                self.session
            )
        } else {
            let mut out = format!(
                "Restored {} window(s) into session '{}' ({} failed)",
                self.succeeded(),
                self.session,
                self.failed()
            );
            for w in self.windows.iter().filter(|w| w.error.is_some()) {
                out.push_str(&format!(
                    "\n  window {} '{}': {}",
                    w.index,
                    w.name,
                    w.error.as_deref().unwrap_or_default()
                ));
            }
            out
        }
    }
}

/// Replays a snapshot against the gateway, or renders the plan without
/// touching it. Both modes consume the same per-window plans, so dry-run
/// output always matches what a real run would do.
pub struct Restorer;

impl Restorer {
    /// Apply a snapshot. Window/pane creation failures are recorded per
    /// window and remaining windows still run; nothing is rolled back.
    pub fn apply(
        gateway: &dyn Gateway,
        snapshot: &TopologySnapshot,
        dry_run: bool,
    ) -> Result<RestoreReport> {
        let plans: Vec<WindowPlan> = snapshot.session.windows.iter().map(plan_window).collect();
        let mut report = RestoreReport {
            session: snapshot.session.name.clone(),
            state: RestoreState::Pending,
            windows: plans
                .iter()
                .map(|p| WindowOutcome {
                    index: p.index,
                    name: p.name.clone(),
                    error: None,
                })
                .collect(),
            rendered: Vec::new(),
        };

        if dry_run {
            report.rendered = render(&report.session, &plans);
            report.state = RestoreState::Reported;
            return Ok(report);
        }

        let session = report.session.clone();
        let mut session_ready = gateway.has_session(&session)?;
        report.state = RestoreState::Applying;
        let mut active_target = None;

        for (i, plan) in plans.iter().enumerate() {
            // Records are validated on read, but apply can be handed any
            // snapshot; a pane-less window is a per-window failure, not a
            // panic.
            if plan.panes.is_empty() {
                warn!(window = plan.index, name = %plan.name, "window has no panes");
                report.windows[i].error =
                    Some(format!("window '{}' has no panes in the saved record", plan.name));
                continue;
            }
            let outcome = apply_window(gateway, &session, plan, !session_ready);
            report.windows[i].error = match outcome {
                Ok(created) => {
                    info!(window = plan.index, name = %plan.name, "window restored");
                    session_ready = true;
                    if plan.active {
                        active_target = Some(created);
                    }
                    None
                }
                Err(e) => {
                    warn!(window = plan.index, name = %plan.name, error = %e, "window failed");
                    Some(e.to_string())
                }
            };
        }

        // Focus the window the snapshot marked active, if it made it. The
        // created target is used, not the snapshot index: an existing
        // session hands out its own window numbers.
        if let Some(window) = active_target {
            if let Err(e) = gateway.select_window(&window) {
                warn!(window = %window, error = %e, "failed to focus window");
            }
        }

        report.state = if report.failed() == 0 {
            RestoreState::Completed
        } else {
            RestoreState::PartiallyFailed
        };

        Ok(report)
    }
}

/// Derive the replay plan for one window from its captured panes.
fn plan_window(window: &Window) -> WindowPlan {
    WindowPlan {
        index: window.index,
        name: window.name.clone(),
        active: window.active,
        panes: window
            .panes
            .iter()
            .enumerate()
            .map(|(i, pane)| PanePlan {
                dir: pane.path.clone(),
                split: (i > 0).then(|| split_for(pane)),
                command: pane.command.clone(),
                active: pane.active,
            })
            .collect(),
    }
}

/// A pane spanning the window's full height was split off sideways; anything
/// else is treated as a stacked split. The captured share of the window
/// becomes the split percentage.
fn split_for(pane: &Pane) -> SplitSpec {
    if pane.height_pct >= 100 {
        SplitSpec {
            direction: SplitDirection::Horizontal,
            size_pct: Some(pane.width_pct),
        }
    } else {
        SplitSpec {
            direction: SplitDirection::Vertical,
            size_pct: Some(pane.height_pct),
        }
    }
}

/// Create one window with its panes, commands, and focus.
///
/// The first window of a fresh session rides along with session creation;
/// every other window is appended, never replacing anything already there.
fn apply_window(
    gateway: &dyn Gateway,
    session: &str,
    plan: &WindowPlan,
    into_new_session: bool,
) -> Result<WindowTarget> {
    let first_dir = &plan.panes[0].dir;
    let window = if into_new_session {
        gateway.new_session(session, &plan.name, first_dir)?
    } else {
        gateway.create_window(session, &plan.name, first_dir)?
    };

    let mut targets = vec![PaneTarget {
        session: window.session.clone(),
        window: window.index,
        index: 0,
    }];
    for pane in &plan.panes[1..] {
        // split is always Some past index 0
        let split = pane.split.unwrap_or(SplitSpec {
            direction: SplitDirection::Vertical,
            size_pct: None,
        });
        targets.push(gateway.create_pane(&window, &pane.dir, split)?);
    }

    let mut sent = false;
    for (pane, target) in plan.panes.iter().zip(&targets) {
        if let Some(cmd) = &pane.command {
            gateway.send_command(target, cmd)?;
            sent = true;
        }
    }
    // automatic-rename retitles a window once a command runs; put the
    // captured name back.
    if sent {
        gateway.rename_window(&window, &plan.name)?;
    }

    if let Some(pos) = plan.panes.iter().position(|p| p.active) {
        gateway.select_pane(&targets[pos])?;
    }

    Ok(window)
}

/// Human-readable plan, one window per stanza.
fn render(session: &str, plans: &[WindowPlan]) -> Vec<String> {
    let mut lines = vec![format!("session '{session}'")];
    for plan in plans {
        let dirs: Vec<String> = plan
            .panes
            .iter()
            .map(|p| p.dir.display().to_string())
            .collect();
        lines.push(format!(
            "create window {} '{}' with {} pane(s) at {}{}",
            plan.index,
            plan.name,
            plan.panes.len(),
            dirs.join(", "),
            if plan.active { " [active]" } else { "" },
        ));
        for (i, pane) in plan.panes.iter().enumerate() {
            if let Some(cmd) = &pane.command {
                lines.push(format!("  run `{cmd}` in pane {i}"));
            }
            if pane.active {
                lines.push(format!("  focus pane {i}"));
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Session;
    use crate::tmux::fake::FakeGateway;

    fn pane(index: usize, path: &str, command: Option<&str>, active: bool) -> Pane {
        Pane {
            index,
            path: PathBuf::from(path),
            command: command.map(str::to_string),
            active,
            width_pct: 50,
            height_pct: 100,
        }
    }

    fn two_window_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            session: Session {
                name: "proj-abc123".to_string(),
                windows: vec![
                    Window {
                        index: 0,
                        name: "main".to_string(),
                        active: true,
                        panes: vec![
                            pane(0, "/home/u/proj", Some("vim"), false),
                            pane(1, "/home/u/proj/sub", None, true),
                        ],
                    },
                    Window {
                        index: 1,
                        name: "logs".to_string(),
                        active: false,
                        panes: vec![pane(0, "/home/u/proj", Some("tail -f app.log"), true)],
                    },
                ],
            },
            captured_at: 1_700_000_000,
            source_dir: PathBuf::from("/home/u/proj"),
        }
    }

    #[test]
    fn test_restore_calls_in_capture_order() {
        let gw = FakeGateway::new();
        let report = Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();

        assert_eq!(report.state, RestoreState::Completed);
        assert_eq!(report.succeeded(), 2);
        let calls = gw.calls();
        // W0 (session + split + command + focus) strictly before W1
        assert!(calls[0].starts_with("new-session proj-abc123 main /home/u/proj"));
        assert!(calls[1].starts_with("create-pane proj-abc123:0 /home/u/proj/sub horizontal"));
        assert_eq!(calls[2], "send-command proj-abc123:0.0 vim");
        assert_eq!(calls[3], "rename-window proj-abc123:0 main");
        assert_eq!(calls[4], "select-pane proj-abc123:0.1");
        assert!(calls[5].starts_with("create-window proj-abc123 logs"));
    }

    #[test]
    fn test_commands_sent_only_where_recorded() {
        let gw = FakeGateway::new();
        Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();

        let sends: Vec<String> = gw
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("send-command"))
            .collect();
        // Pane 0:1 was an idle shell; nothing is sent to it
        assert_eq!(
            sends,
            vec![
                "send-command proj-abc123:0.0 vim".to_string(),
                "send-command proj-abc123:1.0 tail -f app.log".to_string(),
            ]
        );
    }

    #[test]
    fn test_existing_session_only_gains_windows() {
        let mut gw = FakeGateway::new();
        gw.existing_sessions.insert("proj-abc123".to_string());
        Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();

        let calls = gw.calls();
        assert!(calls.iter().all(|c| !c.starts_with("new-session")));
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.starts_with("create-window"))
                .count(),
            2
        );
    }

    #[test]
    fn test_partial_failure_keeps_going() {
        let mut gw = FakeGateway::new();
        gw.existing_sessions.insert("proj-abc123".to_string());
        gw.fail_windows.insert("main".to_string());
        let report = Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();

        assert_eq!(report.state, RestoreState::PartiallyFailed);
        assert_eq!(report.succeeded(), 1);
        assert!(report.windows[0].error.is_some());
        assert!(report.windows[1].error.is_none());
        // W1's command was still applied (whatever index it ended up at)
        assert!(gw
            .calls()
            .iter()
            .any(|c| c.starts_with("send-command") && c.contains("tail -f app.log")));
        // The summary names the failed window and carries the reason
        let summary = report.summary();
        assert!(summary.contains("1 failed"));
        assert!(summary.contains("window 0 'main'"));
        assert!(summary.contains("scripted failure creating window 'main'"));
    }

    #[test]
    fn test_pane_less_window_fails_without_panicking() {
        let mut snap = two_window_snapshot();
        snap.session.windows[0].panes.clear();

        let gw = FakeGateway::new();
        let report = Restorer::apply(&gw, &snap, false).unwrap();

        assert_eq!(report.state, RestoreState::PartiallyFailed);
        assert!(report.windows[0]
            .error
            .as_deref()
            .unwrap()
            .contains("no panes"));
        // The valid window still went through, creating the session itself
        assert!(report.windows[1].error.is_none());
        assert!(gw.calls().iter().any(|c| c.starts_with("new-session")));
        assert!(gw
            .calls()
            .iter()
            .any(|c| c.starts_with("send-command") && c.contains("tail -f app.log")));
    }

    #[test]
    fn test_all_windows_failed() {
        let mut gw = FakeGateway::new();
        gw.existing_sessions.insert("proj-abc123".to_string());
        gw.fail_windows.insert("main".to_string());
        gw.fail_windows.insert("logs".to_string());
        let report = Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();

        assert_eq!(report.state, RestoreState::PartiallyFailed);
        assert!(!report.any_succeeded());
    }

    #[test]
    fn test_dry_run_never_mutates_and_is_stable() {
        let gw = FakeGateway::new();
        let snap = two_window_snapshot();

        let first = Restorer::apply(&gw, &snap, true).unwrap();
        let second = Restorer::apply(&gw, &snap, true).unwrap();

        assert_eq!(gw.mutation_count(), 0);
        assert_eq!(first.state, RestoreState::Reported);
        assert_eq!(first.rendered, second.rendered);
        assert!(first.rendered[1].contains("create window 0 'main'"));
        assert!(first.rendered.iter().any(|l| l.contains("run `vim` in pane 0")));
        assert!(first.rendered.iter().any(|l| l.contains("focus pane 1")));
    }

    #[test]
    fn test_active_window_selected_last() {
        let gw = FakeGateway::new();
        Restorer::apply(&gw, &two_window_snapshot(), false).unwrap();
        let calls = gw.calls();
        assert_eq!(calls.last().unwrap(), "select-window proj-abc123:0");
    }

    #[test]
    fn test_split_direction_from_layout_hints() {
        let full_height = pane(1, "/a", None, false);
        assert_eq!(split_for(&full_height).direction, SplitDirection::Horizontal);

        let mut stacked = pane(1, "/a", None, false);
        stacked.height_pct = 50;
        stacked.width_pct = 100;
        let split = split_for(&stacked);
        assert_eq!(split.direction, SplitDirection::Vertical);
        assert_eq!(split.size_pct, Some(50));
    }
}
