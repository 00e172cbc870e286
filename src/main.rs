mod app;
mod bridge;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{
    AppCommand, AppEvent, AppModel, CloseOutcome, ConfirmationOutcome, Orchestrator,
    OrchestratorSettings, ReviewOverlay, StartOutcome, run_change_poller,
};
use crate::bridge::{BridgeHandle, BridgeOptions, generate_auth_token, resolve_data_home, start_bridge};
use crate::cli::{CliInvocation, CliRunError, HELP_TEXT};
use crate::infra::{
    Config, ConfigError, GitCli, PtyTerminals, ResolveStateDirError, TokioProcessRunner,
    init_logging, normalize_path, resolve_state_dir, spawn_detached, suggest_work_area,
};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind,
};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{info, warn};

type LiveOrchestrator = Orchestrator<TokioProcessRunner, PtyTerminals>;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    StateDir(#[from] ResolveStateDirError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cli(#[from] CliRunError),

    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
}

struct TuiOverrides {
    agent: Option<String>,
    poll_ms: Option<u64>,
    no_ide_bridge: bool,
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Tui {
            agent,
            poll_ms,
            no_ide_bridge,
        } => run_tui(TuiOverrides {
            agent,
            poll_ms,
            no_ide_bridge,
        }),
        CliInvocation::Command(command) => {
            let (_, config) = load_config()?;
            let cwd = std::env::current_dir()?;
            let git = GitCli::new(TokioProcessRunner, config.git_binary.clone());
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let mut out = io::stdout().lock();
            runtime.block_on(crate::cli::run(
                command,
                &git,
                &cwd,
                config.review_line_cap,
                &mut out,
            ))?;
            Ok(())
        }
    }
}

fn print_help() {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{HELP_TEXT}");
}

/// Config file first, then environment overrides.
fn load_config() -> Result<(PathBuf, Config), MainError> {
    let state_dir = resolve_state_dir()?;
    let mut config = Config::load(&state_dir)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok((state_dir, config))
}

fn run_tui(overrides: TuiOverrides) -> Result<(), MainError> {
    let (state_dir, mut config) = load_config()?;
    if let Some(agent) = overrides.agent {
        config.agent.program = agent;
    }
    if let Some(poll_ms) = overrides.poll_ms {
        config.poll_interval_ms = poll_ms;
    }
    if overrides.no_ide_bridge {
        config.ide_bridge = false;
    }

    let log_notice = match init_logging(&state_dir, &config.log_filter) {
        Ok(path) => {
            info!(log = %path.display(), version = env!("CARGO_PKG_VERSION"), "agentbay starting");
            None
        }
        Err(error) => Some(format!("logging disabled: {error}")),
    };

    let cwd = std::env::current_dir()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();

    let mut terminal = setup_terminal()?;
    let result = local.block_on(&runtime, run(&mut terminal, config, cwd, log_notice));
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, MainError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(EnableBracketedPaste);
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), MainError> {
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), DisableBracketedPaste);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// `crossterm::event::read` blocks, so terminal input gets its own thread.
fn spawn_input_reader(tx: mpsc::UnboundedSender<Event>) {
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "terminal input failed");
                    break;
                }
            }
        }
    });
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    config: Config,
    cwd: PathBuf,
    log_notice: Option<String>,
) -> Result<(), MainError> {
    let size = terminal.size()?;
    let mut screen = Rect::new(0, 0, size.width, size.height);

    let suggested = suggest_work_area(&cwd)
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let mut model = AppModel::new(suggested);
    model.notice = log_notice;

    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let mut pane_size = ui::terminal_size(screen, model.sidebar.visible);
    let terminals = PtyTerminals::new(signal_tx, pane_size.0, pane_size.1);
    let git = GitCli::new(TokioProcessRunner, config.git_binary.clone());
    let mut orchestrator = Orchestrator::new(
        git.clone(),
        terminals,
        OrchestratorSettings {
            agent: config.agent.clone(),
            cwd,
            review_line_cap: config.review_line_cap,
        },
    );

    let (sweep_tx, mut sweep_rx) = mpsc::unbounded_channel();
    let poller = tokio::task::spawn_local(run_change_poller(
        git,
        config.poll_interval(),
        orchestrator.subscribe_poll_targets(),
        sweep_tx,
        orchestrator.subscribe_shutdown(),
    ));

    let bridge = if config.ide_bridge {
        start_ide_bridge(&config, &orchestrator, &mut model).await
    } else {
        None
    };

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    spawn_input_reader(input_tx);

    let result = loop {
        let snapshot = orchestrator.terminals().visible_snapshot();
        if let Err(error) = terminal.draw(|frame| {
            ui::render(frame, &model, orchestrator.registry(), snapshot.as_ref())
        }) {
            break Err(MainError::from(error));
        }

        tokio::select! {
            event = input_rx.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                let app_event = match event {
                    Event::Key(key) if key.kind != KeyEventKind::Release => Some(AppEvent::Key(key)),
                    Event::Paste(text) => Some(AppEvent::Paste(text)),
                    Event::Resize(width, height) => {
                        screen = Rect::new(0, 0, width, height);
                        None
                    }
                    _ => None,
                };
                if let Some(app_event) = app_event {
                    let (next, command) = app::update(model, orchestrator.registry(), app_event);
                    model = next;
                    if command == AppCommand::Quit {
                        break Ok(());
                    }
                    execute_command(command, &mut model, &mut orchestrator, bridge.as_ref(), &config)
                        .await;
                }
            }
            Some(reports) = sweep_rx.recv() => {
                orchestrator.apply_sweep(reports);
            }
            Some(_) = signal_rx.recv() => {
                while signal_rx.try_recv().is_ok() {}
            }
        }

        model.sync(orchestrator.registry(), orchestrator.pending_popup());
        let wanted = ui::terminal_size(screen, model.sidebar.visible);
        if wanted != pane_size {
            pane_size = wanted;
            orchestrator.terminals_mut().resize(wanted.0, wanted.1);
        }
    };

    orchestrator.shutdown();
    if let Err(error) = poller.await {
        warn!(%error, "change poller task failed");
    }
    if let Some(bridge) = bridge {
        bridge.stopped().await;
    }
    info!("agentbay stopped");
    result
}

async fn start_ide_bridge(
    config: &Config,
    orchestrator: &LiveOrchestrator,
    model: &mut AppModel,
) -> Option<BridgeHandle> {
    let data_home = match resolve_data_home() {
        Ok(data_home) => data_home,
        Err(error) => {
            warn!(%error, "IDE bridge disabled");
            model.bridge_status = Some("ide off".to_string());
            return None;
        }
    };
    let options = BridgeOptions {
        data_home,
        auth_token: generate_auth_token(),
        open_command: config.open_command.clone(),
    };
    match start_bridge(
        options,
        orchestrator.subscribe_workspace(),
        orchestrator.subscribe_shutdown(),
    )
    .await
    {
        Ok(handle) => {
            model.bridge_status = Some(format!("ide :{}", handle.port()));
            Some(handle)
        }
        Err(error) => {
            warn!(%error, "IDE bridge disabled");
            model.bridge_status = Some("ide off".to_string());
            None
        }
    }
}

async fn execute_command(
    command: AppCommand,
    model: &mut AppModel,
    orchestrator: &mut LiveOrchestrator,
    bridge: Option<&BridgeHandle>,
    config: &Config,
) {
    match command {
        AppCommand::None | AppCommand::Quit => {}
        AppCommand::StartSession { work_area, prompt } => {
            let home = dirs::home_dir();
            let path = match normalize_path(&work_area, orchestrator.cwd(), home.as_deref()) {
                Ok(path) => path,
                Err(error) => {
                    model.notice = Some(format!("invalid work area: {error}"));
                    return;
                }
            };
            match orchestrator.start_session(path, prompt).await {
                StartOutcome::Created(id) => model.session_created(orchestrator, id),
                StartOutcome::NeedsConfirmation(_) => {}
                StartOutcome::Failed(error) => model.notice = Some(error.to_string()),
            }
        }
        AppCommand::RequestClose(id) => match orchestrator.request_close(id) {
            CloseOutcome::Closed(id) => model.notice = Some(format!("session {id} closed")),
            CloseOutcome::NeedsConfirmation(_) | CloseOutcome::Ignored => {}
        },
        AppCommand::SwitchSession(id) => {
            if orchestrator.switch_session(id) {
                model.session_switched(orchestrator.registry(), id);
            }
        }
        AppCommand::OpenReview(id) => {
            let Some(view) = orchestrator.build_review(id).await else {
                return;
            };
            if view.files.is_empty() {
                model.notice = Some("no changes to review".to_string());
                return;
            }
            if let (Some(bridge), Some(work_area)) = (bridge, orchestrator.work_area_of(id)) {
                bridge.notify_visible_files(&work_area, &view.paths());
            }
            model.review = Some(ReviewOverlay::new(view));
        }
        AppCommand::OpenWorkArea(id) => {
            if let Some(work_area) = orchestrator.work_area_of(id) {
                open_path(model, &config.open_command, &work_area);
            }
        }
        AppCommand::OpenFile { session, path } => {
            if let Some(work_area) = orchestrator.work_area_of(session) {
                open_path(model, &config.open_command, &work_area.join(path));
            }
        }
        AppCommand::ResolveConfirmation { popup, action } => {
            match orchestrator.resolve_confirmation(popup, action).await {
                ConfirmationOutcome::Created(id) => model.session_created(orchestrator, id),
                ConfirmationOutcome::Switched(id) => {
                    model.session_switched(orchestrator.registry(), id);
                }
                ConfirmationOutcome::Closed(id) => {
                    model.notice = Some(format!("session {id} closed"));
                }
                ConfirmationOutcome::Failed(error) => model.notice = Some(error.to_string()),
                ConfirmationOutcome::Cancelled | ConfirmationOutcome::Ignored => {}
            }
        }
        AppCommand::SendToTerminal(bytes) => orchestrator.send_input(&bytes),
    }
}

fn open_path(model: &mut AppModel, open_command: &str, path: &Path) {
    if let Err(error) = spawn_detached(open_command, &path.display().to_string()) {
        warn!(%error, path = %path.display(), "open failed");
        model.notice = Some(format!("{open_command} failed: {error}"));
    }
}
