//! runbar: run a Node project's package scripts with a live status bar.
//!
//! This is the entry point. It parses command-line arguments, loads
//! configuration, and either executes a one-shot command (start, stop,
//! status, logs, open, set-path) or enters the TUI monitor loop. Multiple
//! runbar instances coordinate through the shared state store.

mod app;
mod config;
mod detect;
mod events;
mod manifest;
mod output;
mod runner;
mod state;
mod tui;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::app::{App, AppAction};
use crate::config::{Config, ConfigScope};
use crate::detect::detect_package_manager;
use crate::events::Event;
use crate::manifest::ProjectScript;
use crate::output::{OutputBuffer, OutputChunk, StreamKind};
use crate::runner::{kill_process_tree, pid_alive, ScriptRunner};
use crate::state::{RunState, ScriptInfo, StateStore, StoreBlob};

const TICK_RATE: Duration = Duration::from_millis(150);

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "runbar",
    version,
    about = "Run a Node project's package-manager scripts with a live status bar",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Project root, overriding the configured path.
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    /// Use plain ASCII in the status indicator.
    #[arg(long)]
    no_symbols: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a script without the TUI, streaming output until it exits.
    Start {
        /// Script name; picked interactively when omitted and several exist.
        script: Option<String>,
    },
    /// Stop the active run and its whole process tree.
    Stop,
    /// Show the current run state.
    Status,
    /// Print the shared output buffer.
    Logs,
    /// Open the project folder in the system file manager.
    Open,
    /// Persist the project root path setting.
    SetPath {
        path: PathBuf,
        /// Write to the global config instead of the workspace file.
        #[arg(long)]
        global: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace = std::env::current_dir().context("cannot determine working directory")?;
    let config = config::load_config(&workspace)?;

    match cli.command {
        Some(Commands::Start { ref script }) => {
            cmd_start(&cli, &workspace, &config, script.clone()).await
        }
        Some(Commands::Stop) => cmd_stop(),
        Some(Commands::Status) => cmd_status(),
        Some(Commands::Logs) => cmd_logs(&config),
        Some(Commands::Open) => cmd_open(&cli, &config),
        Some(Commands::SetPath { ref path, global }) => {
            cmd_set_path(&workspace, path, global)
        }
        None => run_monitor(cli, workspace, config).await,
    }
}

// ---------------------------------------------------------------------------
// One-shot commands
// ---------------------------------------------------------------------------

fn cmd_status() -> Result<()> {
    let mut store = StateStore::open_default()?;
    let blob = reconcile_stale(&mut store)?;
    if blob.run_state.is_running {
        let script = blob
            .run_state
            .script_info
            .as_ref()
            .map(|info| info.script.as_str())
            .unwrap_or("script");
        let path = blob
            .run_state
            .script_info
            .as_ref()
            .map(|info| info.path.display().to_string())
            .unwrap_or_default();
        println!(
            "running: {} (pid {}) in {}",
            script,
            blob.run_state.pid.unwrap_or(0),
            path
        );
    } else {
        println!("idle");
    }
    Ok(())
}

fn cmd_logs(config: &Config) -> Result<()> {
    let store = StateStore::open_default()?;
    let blob = store.load();
    let buffer = OutputBuffer::from_chunks(config.max_output_chars(), blob.output_buffer);
    for chunk in buffer.iter() {
        println!("{}", chunk.text);
    }
    Ok(())
}

fn cmd_stop() -> Result<()> {
    let mut store = StateStore::open_default()?;
    // Record the stop for whichever instance owns the process, then kill the
    // recorded tree ourselves as well; state goes to idle no matter what.
    store.signal_stop()?;
    let blob = store.load();
    if blob.run_state.is_running {
        if let Some(pid) = blob.run_state.pid {
            if pid_alive(pid) {
                kill_process_tree(pid);
            }
        }
        let script = blob
            .run_state
            .script_info
            .as_ref()
            .map(|info| info.script.as_str())
            .unwrap_or("script");
        println!("stopped {}", script);
    } else {
        println!("nothing is running");
    }
    let ts = store.next_timestamp();
    store.commit(StoreBlob {
        run_state: RunState::idle(ts),
        output_buffer: blob.output_buffer,
        stop_signal: 0,
    })?;
    Ok(())
}

fn cmd_open(cli: &Cli, config: &Config) -> Result<()> {
    let store = StateStore::open_default()?;
    let blob = store.load();
    let path = cli
        .project
        .clone()
        .or_else(|| blob.run_state.script_info.map(|info| info.path))
        .or_else(|| config.project_path.clone())
        .ok_or_else(|| anyhow!("no project configured (use runbar set-path)"))?;
    opener::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(())
}

fn cmd_set_path(workspace: &Path, path: &Path, global: bool) -> Result<()> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let scope = if global {
        ConfigScope::Global
    } else {
        ConfigScope::Workspace
    };
    let written = config::store_project_path(workspace, path, scope)?;
    println!("project path saved to {}", written.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// No-UI start flow
// ---------------------------------------------------------------------------

async fn cmd_start(
    cli: &Cli,
    workspace: &Path,
    config: &Config,
    script_arg: Option<String>,
) -> Result<()> {
    let project = match resolve_project_path(cli, workspace, config)? {
        Some(path) => path,
        None => return Ok(()),
    };
    let scripts = manifest::load_scripts(&project)?;
    let script = match script_arg {
        Some(name) => {
            if !scripts.iter().any(|s| s.name == name) {
                bail!("script {:?} is not defined in package.json", name);
            }
            name
        }
        None => match choose_script(&scripts)? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let mut store = StateStore::open_default()?;
    let blob = reconcile_stale(&mut store)?;
    if blob.run_state.is_running {
        let current = blob
            .run_state
            .script_info
            .as_ref()
            .map(|info| info.script.as_str())
            .unwrap_or("a script");
        if !confirm(&format!("{} is still running. Stop it first?", current))? {
            return Ok(());
        }
        if let Some(pid) = blob.run_state.pid {
            if pid_alive(pid) {
                kill_process_tree(pid);
            }
        }
        let ts = store.next_timestamp();
        store.commit(StoreBlob {
            run_state: RunState::idle(ts),
            output_buffer: Vec::new(),
            stop_signal: 0,
        })?;
    }

    run_script_cli(&mut store, config, &project, &script).await
}

/// Streams one script run to stdout/stderr, mirroring output and state into
/// the shared store, until the process ends or a stop arrives.
async fn run_script_cli(
    store: &mut StateStore,
    config: &Config,
    project: &Path,
    script: &str,
) -> Result<()> {
    let manager = detect_package_manager(project);
    let info = ScriptInfo {
        path: project.to_path_buf(),
        script: script.to_string(),
    };

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut runner = ScriptRunner::new(event_tx);
    // A fresh start clears the shared buffer before anything else lands.
    let mut output = OutputBuffer::new(config.max_output_chars());
    let starting = format!("starting: {} run {}", manager, script);
    println!("{}", starting);
    output.push(OutputChunk {
        text: starting,
        stream: StreamKind::Stdout,
    });

    let stop_signal_baseline = store.load().stop_signal;
    runner.start(project, manager, script).await;

    let mut ticker = tokio::time::interval(TICK_RATE);
    let mut current = RunState::idle(store.next_timestamp());
    let mut output_dirty = false;
    let mut exit_result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::RunStarted { pid } => {
                    let ts = store.next_timestamp();
                    current = RunState::running(info.clone(), pid, ts);
                    store.commit(StoreBlob {
                        run_state: current.clone(),
                        output_buffer: output.to_chunks(),
                        stop_signal: 0,
                    })?;
                }
                Event::RunOutput { text, stream } => {
                    match stream {
                        StreamKind::Stdout => println!("{}", text),
                        StreamKind::Stderr => eprintln!("{}", text),
                    }
                    output.push(OutputChunk { text, stream });
                    output_dirty = true;
                }
                Event::RunExited { code } => {
                    let message = exit_message(code);
                    println!("{}", message);
                    output.push(OutputChunk { text: message, stream: StreamKind::Stdout });
                    if code.unwrap_or(1) != 0 {
                        exit_result = Err(anyhow!("script exited with code {}", code.unwrap_or(1)));
                    }
                    break;
                }
                Event::RunFailed { error } => {
                    eprintln!("{}", error);
                    output.push(OutputChunk { text: error.clone(), stream: StreamKind::Stderr });
                    exit_result = Err(anyhow!(error));
                    break;
                }
                _ => {}
            },
            _ = ticker.tick() => {
                runner.poll_exit().await;
                if output_dirty && current.is_running {
                    output_dirty = false;
                    current.timestamp = store.next_timestamp();
                    store.commit(StoreBlob {
                        run_state: current.clone(),
                        output_buffer: output.to_chunks(),
                        stop_signal: 0,
                    })?;
                }
                // A stop recorded by another instance applies to us too.
                if store.load().stop_signal > stop_signal_baseline && runner.is_active() {
                    runner.stop().await;
                    let message = "script stopped".to_string();
                    println!("{}", message);
                    output.push(OutputChunk { text: message, stream: StreamKind::Stdout });
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                runner.stop().await;
                let message = "script stopped manually".to_string();
                println!("{}", message);
                output.push(OutputChunk { text: message, stream: StreamKind::Stdout });
                break;
            }
        }
    }

    let ts = store.next_timestamp();
    store.commit(StoreBlob {
        run_state: RunState::idle(ts),
        output_buffer: output.to_chunks(),
        stop_signal: 0,
    })?;
    exit_result
}

// ---------------------------------------------------------------------------
// TUI monitor
// ---------------------------------------------------------------------------

async fn run_monitor(cli: Cli, workspace: PathBuf, config: Config) -> Result<()> {
    let mut store = StateStore::open_default()?;
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut runner = ScriptRunner::new(event_tx.clone());
    let mut app = App::new(
        config.max_output_chars(),
        Duration::from_millis(config.debounce_ms()),
        !cli.no_symbols,
    );
    let mut project_override = cli.project.clone();

    // Adopt whatever the store holds, correcting a record whose process is
    // gone (editor restarts leave those behind).
    let blob = store.load();
    let blob = if blob.run_state.is_running
        && !pid_alive(blob.run_state.pid.unwrap_or(0))
    {
        app.set_notice("previous run is no longer alive; state reset");
        let ts = store.next_timestamp();
        store.commit(StoreBlob {
            run_state: RunState::idle(ts),
            output_buffer: blob.output_buffer,
            stop_signal: 0,
        })?
    } else {
        blob
    };
    let mut seen_ts = blob.run_state.timestamp;
    let mut seen_stop = blob.stop_signal;
    app.output = OutputBuffer::from_chunks(config.max_output_chars(), blob.output_buffer.clone());
    app.set_run_state(blob.run_state, false);

    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx.clone());
    let mut terminal = tui::init_terminal()?;
    let mut ticker = tokio::time::interval(TICK_RATE);
    let mut output_dirty = false;
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::RunStarted { pid } => {
                    if let Some(project) = effective_project(&project_override, &config) {
                        if let Some(script) = app.pending_script() {
                            let ts = store.next_timestamp();
                            let state = RunState::running(
                                ScriptInfo { path: project, script },
                                pid,
                                ts,
                            );
                            persist(&mut app, &mut store, &runner, state, &mut seen_ts, &mut seen_stop)?;
                        }
                    }
                }
                Event::RunOutput { text, stream } => {
                    app.on_output(text, stream);
                    output_dirty = true;
                }
                Event::RunExited { code } => {
                    app.on_output(exit_message(code), StreamKind::Stdout);
                    let ts = store.next_timestamp();
                    persist(&mut app, &mut store, &runner, RunState::idle(ts), &mut seen_ts, &mut seen_stop)?;
                    app.set_notice(exit_message(code));
                }
                Event::RunFailed { error } => {
                    app.on_output(error.clone(), StreamKind::Stderr);
                    let ts = store.next_timestamp();
                    persist(&mut app, &mut store, &runner, RunState::idle(ts), &mut seen_ts, &mut seen_stop)?;
                    app.set_notice(error);
                }
                Event::Key(key) => {
                    match app.handle_key(key) {
                        AppAction::Quit => {
                            teardown(&mut app, &mut runner, &mut store, &mut seen_ts, &mut seen_stop).await?;
                            break;
                        }
                        AppAction::RequestStart => {
                            if app.accept_start_request(Instant::now()) {
                                if app.run_state.is_running {
                                    app.open_confirm_stop();
                                } else if let Some(name) =
                                    begin_start_flow(&mut app, &project_override, &config)
                                {
                                    start_run(&mut app, &mut runner, &project_override, &config, &name).await;
                                }
                            }
                        }
                        AppAction::RequestStop => {
                            stop_run(&mut app, &mut runner, &mut store, &mut seen_ts, &mut seen_stop).await?;
                        }
                        AppAction::StopThenStart => {
                            stop_run(&mut app, &mut runner, &mut store, &mut seen_ts, &mut seen_stop).await?;
                            if let Some(name) = begin_start_flow(&mut app, &project_override, &config) {
                                start_run(&mut app, &mut runner, &project_override, &config, &name).await;
                            }
                        }
                        AppAction::ScriptChosen(name) => {
                            start_run(&mut app, &mut runner, &project_override, &config, &name).await;
                        }
                        AppAction::OpenProject => {
                            match effective_project(&project_override, &config) {
                                Some(path) => {
                                    if let Err(err) = opener::open(&path) {
                                        app.set_notice(format!("failed to open project: {}", err));
                                    }
                                }
                                None => app.set_notice("no project configured"),
                            }
                        }
                        AppAction::ProjectPathEntered(path) => {
                            if path.is_dir() {
                                let scope = if workspace.join(config::WORKSPACE_FILE).exists() {
                                    ConfigScope::Workspace
                                } else {
                                    ConfigScope::Global
                                };
                                match config::store_project_path(&workspace, &path, scope) {
                                    Ok(_) => {
                                        project_override = Some(path);
                                        if let Some(name) =
                                            begin_start_flow(&mut app, &project_override, &config)
                                        {
                                            start_run(&mut app, &mut runner, &project_override, &config, &name).await;
                                        }
                                    }
                                    Err(err) => app.set_notice(format!("could not save path: {}", err)),
                                }
                            } else {
                                app.set_notice(format!("{} is not a directory", path.display()));
                            }
                        }
                        AppAction::None => {}
                    }
                }
                Event::Resize { .. } => {
                    let _ = terminal.autoresize();
                }
                Event::Shutdown => {
                    teardown(&mut app, &mut runner, &mut store, &mut seen_ts, &mut seen_stop).await?;
                    break;
                }
            },
            _ = ticker.tick() => {
                runner.poll_exit().await;
                if output_dirty && app.owns_process && app.run_state.is_running {
                    output_dirty = false;
                    let mut state = app.run_state.clone();
                    state.timestamp = store.next_timestamp();
                    persist(&mut app, &mut store, &runner, state, &mut seen_ts, &mut seen_stop)?;
                }
                reconcile_tick(&mut app, &mut runner, &mut store, &config, &mut seen_ts, &mut seen_stop).await?;
            }
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    tui::restore_terminal(terminal)?;
    result
}

/// Resolves scripts for the configured project and either opens the picker
/// or hands back the lone script to start straight away.
fn begin_start_flow(
    app: &mut App,
    project_override: &Option<PathBuf>,
    config: &Config,
) -> Option<String> {
    let Some(project) = effective_project(project_override, config) else {
        app.set_notice("enter the project directory to run");
        app.open_path_entry();
        return None;
    };
    match manifest::load_scripts(&project) {
        // Single script: skip the picker entirely.
        Ok(scripts) if scripts.len() == 1 => Some(scripts[0].name.clone()),
        Ok(scripts) => {
            app.open_picker(scripts);
            None
        }
        Err(err) => {
            app.set_notice(err.to_string());
            None
        }
    }
}

/// Spawns the chosen script and records which one is pending until the
/// `RunStarted` event carries its pid back.
async fn start_run(
    app: &mut App,
    runner: &mut ScriptRunner,
    project_override: &Option<PathBuf>,
    config: &Config,
    script: &str,
) {
    let Some(project) = effective_project(project_override, config) else {
        app.set_notice("no project configured");
        return;
    };
    let manager = detect_package_manager(&project);
    app.clear_output();
    app.on_output(
        format!("starting: {} run {}", manager, script),
        StreamKind::Stdout,
    );
    app.queue_script(script.to_string());
    runner.start(&project, manager, script).await;
}

async fn stop_run(
    app: &mut App,
    runner: &mut ScriptRunner,
    store: &mut StateStore,
    seen_ts: &mut u64,
    seen_stop: &mut u64,
) -> Result<()> {
    if !app.run_state.is_running {
        app.set_notice("nothing is running");
        return Ok(());
    }
    // Propagate the stop to other instances, then terminate locally.
    *seen_stop = store.signal_stop()?;
    if app.owns_process {
        runner.stop().await;
    } else if let Some(pid) = app.run_state.pid {
        if pid_alive(pid) {
            kill_process_tree(pid);
        }
    }
    app.on_output("script stopped manually".to_string(), StreamKind::Stdout);
    let ts = store.next_timestamp();
    persist(app, store, runner, RunState::idle(ts), seen_ts, seen_stop)?;
    app.set_notice("stopped");
    Ok(())
}

async fn teardown(
    app: &mut App,
    runner: &mut ScriptRunner,
    store: &mut StateStore,
    seen_ts: &mut u64,
    seen_stop: &mut u64,
) -> Result<()> {
    if app.owns_process && runner.is_active() {
        runner.stop().await;
        let ts = store.next_timestamp();
        persist(app, store, runner, RunState::idle(ts), seen_ts, seen_stop)?;
    }
    app.should_quit = true;
    Ok(())
}

/// Commits our record and adopts whatever survives reconciliation.
fn persist(
    app: &mut App,
    store: &mut StateStore,
    runner: &ScriptRunner,
    state: RunState,
    seen_ts: &mut u64,
    seen_stop: &mut u64,
) -> Result<()> {
    let committed = store.commit(StoreBlob {
        run_state: state,
        output_buffer: app.output.to_chunks(),
        stop_signal: *seen_stop,
    })?;
    *seen_ts = committed.run_state.timestamp;
    *seen_stop = committed.stop_signal;
    let owned = committed.run_state.is_running
        && runner.pid().is_some()
        && committed.run_state.pid == runner.pid();
    app.set_run_state(committed.run_state, owned);
    Ok(())
}

/// Tick-time cross-instance reconciliation: adopt newer records, honor stop
/// signals, and silently fix records whose process died with nobody around.
async fn reconcile_tick(
    app: &mut App,
    runner: &mut ScriptRunner,
    store: &mut StateStore,
    config: &Config,
    seen_ts: &mut u64,
    seen_stop: &mut u64,
) -> Result<()> {
    let blob = store.load();

    if blob.stop_signal > *seen_stop {
        *seen_stop = blob.stop_signal;
        if app.owns_process && runner.is_active() {
            runner.stop().await;
            app.on_output("script stopped from another window".to_string(), StreamKind::Stdout);
            let ts = store.next_timestamp();
            persist(app, store, runner, RunState::idle(ts), seen_ts, seen_stop)?;
            app.set_notice("stopped from another window");
            return Ok(());
        }
    }

    if blob.run_state.timestamp > *seen_ts {
        // Someone else wrote a newer record; the larger timestamp wins.
        *seen_ts = blob.run_state.timestamp;
        if !app.owns_process {
            app.output =
                OutputBuffer::from_chunks(config.max_output_chars(), blob.output_buffer);
            if app.follow {
                app.scroll_to_end();
            }
        }
        let owned = runner.pid().is_some() && blob.run_state.pid == runner.pid();
        app.set_run_state(blob.run_state.clone(), owned);
    }

    // Stale record with no live process behind it: fail open to idle.
    if app.run_state.is_running
        && !app.owns_process
        && !pid_alive(app.run_state.pid.unwrap_or(0))
    {
        let ts = store.next_timestamp();
        persist(app, store, runner, RunState::idle(ts), seen_ts, seen_stop)?;
        app.set_notice("previous run is no longer alive; state reset");
    }
    Ok(())
}

fn effective_project(project_override: &Option<PathBuf>, config: &Config) -> Option<PathBuf> {
    project_override
        .clone()
        .or_else(|| config.project_path.clone())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Loads the blob, correcting a running record whose pid has vanished.
fn reconcile_stale(store: &mut StateStore) -> Result<StoreBlob> {
    let blob = store.load();
    if blob.run_state.is_running && !pid_alive(blob.run_state.pid.unwrap_or(0)) {
        eprintln!("note: recorded run is no longer alive; state reset");
        let ts = store.next_timestamp();
        return store.commit(StoreBlob {
            run_state: RunState::idle(ts),
            output_buffer: blob.output_buffer,
            stop_signal: 0,
        });
    }
    Ok(blob)
}

fn resolve_project_path(
    cli: &Cli,
    workspace: &Path,
    config: &Config,
) -> Result<Option<PathBuf>> {
    if let Some(path) = cli.project.clone().or_else(|| config.project_path.clone()) {
        if !path.is_dir() {
            bail!("project path {} is not a directory", path.display());
        }
        return Ok(Some(path));
    }
    // Interactive fallback: ask once and persist the answer.
    eprint!("Project directory: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let typed = line.trim();
    if typed.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(typed);
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let scope = if workspace.join(config::WORKSPACE_FILE).exists() {
        ConfigScope::Workspace
    } else {
        ConfigScope::Global
    };
    config::store_project_path(workspace, &path, scope)?;
    Ok(Some(path))
}

/// Auto-selects a lone script; otherwise prompts with a numbered list.
/// Empty or unrecognized input cancels the flow silently.
fn choose_script(scripts: &[ProjectScript]) -> Result<Option<String>> {
    if scripts.len() == 1 {
        return Ok(Some(scripts[0].name.clone()));
    }
    for (idx, script) in scripts.iter().enumerate() {
        println!("  {}. {}  ({})", idx + 1, script.name, script.command);
    }
    eprint!("Run which script? [1-{}] ", scripts.len());
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(parse_script_choice(scripts, line.trim()))
}

/// Accepts either a 1-based index or an exact script name.
fn parse_script_choice(scripts: &[ProjectScript], input: &str) -> Option<String> {
    if input.is_empty() {
        return None;
    }
    if let Ok(index) = input.parse::<usize>() {
        return scripts.get(index.checked_sub(1)?).map(|s| s.name.clone());
    }
    scripts
        .iter()
        .find(|s| s.name == input)
        .map(|s| s.name.clone())
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn exit_message(code: Option<i32>) -> String {
    match code {
        Some(0) => "script ended successfully".to_string(),
        Some(code) => format!("script ended with code {}", code),
        None => "script ended".to_string(),
    }
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => {
                    let _ = tx.blocking_send(Event::Key(key));
                }
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    let _ = tx.blocking_send(Event::Resize { width, height });
                }
                _ => {}
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
                _ = sigterm.recv() => {
                    let _ = tx.send(Event::Shutdown).await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Event::Shutdown).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts() -> Vec<ProjectScript> {
        vec![
            ProjectScript {
                name: "build".into(),
                command: "tsc".into(),
            },
            ProjectScript {
                name: "dev".into(),
                command: "vite".into(),
            },
        ]
    }

    #[test]
    fn script_choice_accepts_index_or_name() {
        let scripts = scripts();
        assert_eq!(parse_script_choice(&scripts, "1"), Some("build".into()));
        assert_eq!(parse_script_choice(&scripts, "2"), Some("dev".into()));
        assert_eq!(parse_script_choice(&scripts, "dev"), Some("dev".into()));
    }

    #[test]
    fn script_choice_cancels_on_empty_or_bogus_input() {
        let scripts = scripts();
        assert_eq!(parse_script_choice(&scripts, ""), None);
        assert_eq!(parse_script_choice(&scripts, "0"), None);
        assert_eq!(parse_script_choice(&scripts, "3"), None);
        assert_eq!(parse_script_choice(&scripts, "deploy"), None);
    }

    #[test]
    fn exit_messages_carry_the_code() {
        assert_eq!(exit_message(Some(0)), "script ended successfully");
        assert_eq!(exit_message(Some(1)), "script ended with code 1");
        assert_eq!(exit_message(None), "script ended");
    }

    #[test]
    fn stale_records_are_reset_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::at(dir.path().join("state.json"));
        let ts = store.next_timestamp();
        // i32::MAX is above any plausible live pid.
        let state = RunState::running(
            ScriptInfo {
                path: "/tmp/demo".into(),
                script: "dev".into(),
            },
            i32::MAX as u32,
            ts,
        );
        store
            .commit(StoreBlob {
                run_state: state,
                output_buffer: Vec::new(),
                stop_signal: 0,
            })
            .unwrap();

        let blob = reconcile_stale(&mut store).unwrap();
        assert!(!blob.run_state.is_running);
        assert!(!store.load().run_state.is_running);
    }

    #[tokio::test]
    async fn stop_forces_idle_even_when_no_kill_can_land() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::at(dir.path().join("state.json"));
        let ts = store.next_timestamp();
        let state = RunState::running(
            ScriptInfo {
                path: "/tmp/demo".into(),
                script: "dev".into(),
            },
            i32::MAX as u32,
            ts,
        );
        store
            .commit(StoreBlob {
                run_state: state.clone(),
                output_buffer: Vec::new(),
                stop_signal: 0,
            })
            .unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let mut runner = ScriptRunner::new(tx);
        let mut app = App::new(10_000, Duration::from_millis(500), true);
        app.set_run_state(state, false);
        let mut seen_ts = ts;
        let mut seen_stop = 0;
        stop_run(&mut app, &mut runner, &mut store, &mut seen_ts, &mut seen_stop)
            .await
            .unwrap();

        // The pid was never killable, yet the record still went idle and the
        // stop signal was raised for other instances.
        let blob = store.load();
        assert!(!blob.run_state.is_running);
        assert!(blob.stop_signal > 0);
        assert!(!app.run_state.is_running);
    }

    #[test]
    fn failed_exit_keeps_its_message_until_the_next_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::at(dir.path().join("state.json"));
        let info = ScriptInfo {
            path: "/tmp/demo".into(),
            script: "dev".into(),
        };

        let mut output = OutputBuffer::new(10_000);
        output.push(OutputChunk {
            text: "starting: npm run dev".into(),
            stream: StreamKind::Stdout,
        });
        let ts = store.next_timestamp();
        store
            .commit(StoreBlob {
                run_state: RunState::running(info.clone(), std::process::id(), ts),
                output_buffer: output.to_chunks(),
                stop_signal: 0,
            })
            .unwrap();

        // Exit with code 1: state goes idle, the exit line stays readable.
        output.push(OutputChunk {
            text: exit_message(Some(1)),
            stream: StreamKind::Stdout,
        });
        let ts = store.next_timestamp();
        let committed = store
            .commit(StoreBlob {
                run_state: RunState::idle(ts),
                output_buffer: output.to_chunks(),
                stop_signal: 0,
            })
            .unwrap();
        assert!(!committed.run_state.is_running);
        assert!(committed
            .output_buffer
            .iter()
            .any(|c| c.text == "script ended with code 1"));

        // The next start clears the buffer before any new output lands.
        output.clear();
        output.push(OutputChunk {
            text: "starting: npm run dev".into(),
            stream: StreamKind::Stdout,
        });
        let ts = store.next_timestamp();
        store
            .commit(StoreBlob {
                run_state: RunState::running(info, std::process::id(), ts),
                output_buffer: output.to_chunks(),
                stop_signal: 0,
            })
            .unwrap();
        let blob = store.load();
        assert!(blob.run_state.is_running);
        assert!(!blob
            .output_buffer
            .iter()
            .any(|c| c.text.contains("ended with code")));
    }

    #[test]
    fn live_records_survive_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::at(dir.path().join("state.json"));
        let ts = store.next_timestamp();
        let state = RunState::running(
            ScriptInfo {
                path: "/tmp/demo".into(),
                script: "dev".into(),
            },
            std::process::id(),
            ts,
        );
        store
            .commit(StoreBlob {
                run_state: state,
                output_buffer: Vec::new(),
                stop_signal: 0,
            })
            .unwrap();

        let blob = reconcile_stale(&mut store).unwrap();
        assert!(blob.run_state.is_running);
        assert_eq!(blob.run_state.pid, Some(std::process::id()));
    }
}
