use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

mod error;
mod key;
mod restore;
mod snapshot;
mod store;
mod tmux;

use key::DirKey;
use restore::Restorer;
use snapshot::TopologySnapshot;
use store::StateStore;
use tmux::{Gateway, TmuxGateway};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to key the saved session by (default: current directory)
    #[arg(short = 'd', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// Print what would happen without touching tmux or disk
    #[arg(short = 'n', long = "dry-run", global = true)]
    dry_run: bool,

    /// Where session records are kept (default: ~/.tmux-here)
    #[arg(long = "state-dir", env = "TMUX_HERE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Save the current tmux session's layout for this directory
    Save,

    /// Recreate the layout saved for this directory (default)
    Restore,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let dir = resolve_dir(cli.dir)?;
    let key = DirKey::for_path(&dir)?;
    let store = StateStore::new(match cli.state_dir {
        Some(dir) => dir,
        None => StateStore::default_dir()?,
    });

    match cli.command.unwrap_or(Mode::Restore) {
        Mode::Save => save(&store, &key, &dir, cli.dry_run),
        Mode::Restore => restore(&store, &key, cli.dry_run),
    }
}

/// Resolve the key directory: the `-d` override (made absolute against the
/// cwd) or the cwd itself.
fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    match dir {
        Some(path) => {
            let absolute = if path.is_relative() { cwd.join(path) } else { path };
            absolute
                .canonicalize()
                .with_context(|| format!("Failed to resolve directory {}", absolute.display()))
        }
        None => Ok(cwd),
    }
}

fn save(store: &StateStore, key: &DirKey, dir: &Path, dry_run: bool) -> Result<()> {
    let gateway = TmuxGateway::new();
    let snapshot = TopologySnapshot::capture(&gateway, dir, &key.session_name())?;

    if dry_run {
        print!("{snapshot}");
        println!("Would save to: {}", store.record_path(key).display());
        return Ok(());
    }

    let path = store.write(key, &snapshot)?;
    println!("Session saved to: {}", path.display());
    Ok(())
}

fn restore(store: &StateStore, key: &DirKey, dry_run: bool) -> Result<()> {
    // Read before touching tmux: a missing record must not cost a gateway
    // call.
    let snapshot = store.read(key)?;
    let gateway = TmuxGateway::new();

    let report = Restorer::apply(&gateway, &snapshot, dry_run)?;

    if dry_run {
        for line in &report.rendered {
            println!("{line}");
        }
        return Ok(());
    }

    for window in report.windows.iter().filter(|w| w.error.is_some()) {
        warn!(
            window = window.index,
            name = %window.name,
            "{}",
            window.error.as_deref().unwrap_or("unknown failure")
        );
    }
    println!("{}", report.summary());

    if !report.any_succeeded() {
        anyhow::bail!("restore failed: no window could be created");
    }

    // Jump to the restored session when inside tmux; otherwise tell the
    // user how to get there.
    if std::env::var("TMUX").is_ok() {
        gateway.switch_client(&snapshot.session.name)?;
    } else {
        println!(
            "Attach with: {}",
            gateway.attach_command(&snapshot.session.name).join(" ")
        );
    }
    Ok(())
}
