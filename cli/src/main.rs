//! fcs CLI - inspect scripts and run test definitions against the engine.
//!
//! The binary is a minimal tree host: it drives [`fcs_explorer`] trees the way
//! an editor would (expand, redraw, expand again), and prints the result.
//!
//! ```text
//! main() -> FcsConfig -> SessionPool -> ResultTree | TestTree -> render
//! ```

mod render;

use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fcs_config::{FcsConfig, config_path};
use fcs_explorer::{NodeKey, Notifier, ResultTree, TestNodeId, TestTree, TreeEvent};
use fcs_session::{EngineBackend, EngineLauncher, SessionPool};
use fcs_types::EngineSettings;

use crate::render::{Row, render_rows};

/// Exit code for configuration errors; no session is attempted.
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "fcs", version, about = "Evaluate fcs scripts against the CAD engine")]
struct Cli {
    /// Engine executable (overrides FCS_ENGINE_PATH and engine.path).
    #[arg(long, global = true, value_name = "PATH")]
    engine: Option<String>,

    /// Also log to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a script and print its model tree.
    Inspect {
        script: PathBuf,
        /// Levels to expand below the script.
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Re-evaluate instead of reusing cached results.
        #[arg(long)]
        force: bool,
    },
    /// Discover test definition files and run them.
    Test {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Only run definitions whose name contains this text.
        #[arg(long, value_name = "NAME")]
        filter: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(verbose.then(|| fmt::layer().with_writer(std::io::stderr)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(verbose.then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(env_filter)
        .init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.fcs/logs/fcs.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("fcs.log"));
    }

    // Fallback: ./.fcs/logs/fcs.log
    candidates.push(PathBuf::from(".fcs").join("logs").join("fcs.log"));

    candidates
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match FcsConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("fcs: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let settings = match config.resolve_engine(cli.engine.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("fcs: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let result = match cli.command {
        Command::Inspect {
            script,
            depth,
            force,
        } => inspect(settings, &script, depth, force).await,
        Command::Test { dir, filter } => {
            run_tests(settings, &dir, config.test_pattern(), filter.as_deref()).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("fcs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn pool(settings: EngineSettings) -> SessionPool<EngineLauncher> {
    SessionPool::new(EngineLauncher::new(settings.binary()), settings)
}

/// Print pending user-visible messages; true when any `NodeChanged` named `key`.
fn drain_events<K: PartialEq>(rx: &mut UnboundedReceiver<TreeEvent<K>>, key: Option<&K>) -> bool {
    let mut changed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            TreeEvent::Message(text) => eprintln!("{}", fcs_utils::sanitize_display_text(&text)),
            TreeEvent::NodeChanged(k) if key == Some(&k) => changed = true,
            TreeEvent::NodeChanged(_) | TreeEvent::RootsChanged => {}
        }
    }
    changed
}

async fn inspect(
    settings: EngineSettings,
    script: &Path,
    depth: usize,
    force: bool,
) -> Result<ExitCode> {
    let (notifier, mut rx) = Notifier::channel();
    let mut tree = ResultTree::new(pool(settings), notifier);
    let root = tree.open(script);
    if force {
        tree.request_evaluation(&root);
    }
    drain_events(&mut rx, None);

    let mut queue = VecDeque::from([(root.clone(), 0usize)]);
    while let Some((key, level)) = queue.pop_front() {
        if level > depth {
            continue;
        }
        let mut children = tree.children(&key).await;
        // A redrawn node is expanded again, as a host would on redraw.
        if drain_events(&mut rx, Some(&key)) && children.is_empty() {
            children = tree.children(&key).await;
            drain_events(&mut rx, None);
        }
        if level == 0 && !tree.backend().contains(root.root) {
            tree.close_all().await;
            return Ok(ExitCode::FAILURE);
        }
        queue.extend(children.into_iter().map(|child| (child, level + 1)));
    }

    tree.sync_sessions().await;
    drain_events(&mut rx, None);

    let mut rows = Vec::new();
    collect_result_rows(&tree, &root, 0, depth, &mut rows);
    print!("{}", render_rows(&rows));

    tree.close_all().await;
    Ok(ExitCode::SUCCESS)
}

fn collect_result_rows<B: EngineBackend>(
    tree: &ResultTree<B>,
    key: &NodeKey,
    level: usize,
    depth: usize,
    rows: &mut Vec<Row>,
) {
    let Some(view) = tree.item(key) else {
        return;
    };
    rows.push(Row {
        depth: level,
        view,
        detail: None,
    });
    if level >= depth {
        return;
    }
    let children = tree
        .node(key)
        .and_then(|node| node.children())
        .map(<[NodeKey]>::to_vec)
        .unwrap_or_default();
    for child in &children {
        collect_result_rows(tree, child, level + 1, depth, rows);
    }
}

async fn run_tests(
    settings: EngineSettings,
    dir: &Path,
    pattern: &str,
    filter: Option<&str>,
) -> Result<ExitCode> {
    let (notifier, mut rx) = Notifier::channel();
    let mut tree = TestTree::new(pool(settings), notifier);
    let loaded = tree
        .load(dir, pattern)
        .with_context(|| format!("cannot discover tests under {}", dir.display()))?;
    drain_events(&mut rx, None);

    if loaded == 0 {
        println!("No test definition files matching {pattern} under {}", dir.display());
        return Ok(ExitCode::SUCCESS);
    }

    let roots = tree.roots().to_vec();
    let mut selected = HashSet::new();
    for root in &roots {
        let definitions = tree.child_ids(*root).to_vec();
        for definition in definitions {
            let matches = tree
                .node(definition)
                .is_some_and(|n| filter.is_none_or(|f| n.name().contains(f)));
            if !matches {
                continue;
            }
            tree.run(definition);
            tree.children(definition).await;
            drain_events(&mut rx, None);
            selected.insert(definition);
        }
    }

    let mut rows = Vec::new();
    let mut failed = false;
    for root in &roots {
        let visible: Vec<TestNodeId> = tree
            .child_ids(*root)
            .iter()
            .copied()
            .filter(|d| selected.contains(d))
            .collect();
        if visible.is_empty() {
            continue;
        }
        failed |= tree.tally(*root).fail > 0;
        if let Some(view) = tree.item(*root) {
            rows.push(Row {
                depth: 0,
                view,
                detail: None,
            });
        }
        for definition in visible {
            collect_test_rows(&tree, definition, 1, &mut rows);
        }
    }
    print!("{}", render_rows(&rows));

    if selected.is_empty()
        && let Some(filter) = filter
    {
        println!("No test definitions match '{filter}'");
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn collect_test_rows<B: EngineBackend>(
    tree: &TestTree<B>,
    id: TestNodeId,
    level: usize,
    rows: &mut Vec<Row>,
) {
    let (Some(node), Some(view)) = (tree.node(id), tree.item(id)) else {
        return;
    };
    let failed_leaf = node.is_evaluated() && !node.is_ok() && tree.child_ids(id).is_empty();
    let detail = if failed_leaf {
        tree.diff(id)
            .filter(|diff| !diff.is_empty())
            .or_else(|| node.message().map(str::to_string))
    } else {
        None
    };
    rows.push(Row {
        depth: level,
        view,
        detail,
    });
    for child in tree.child_ids(id) {
        collect_test_rows(tree, *child, level + 1, rows);
    }
}
