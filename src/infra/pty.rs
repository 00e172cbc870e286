use crate::domain::TerminalHandle;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

const READ_BUFFER_BYTES: usize = 8192;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TerminalSpec {
    pub cwd: PathBuf,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalSignal {
    Output(TerminalHandle),
    Exited(TerminalHandle),
}

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to create PTY: {0}")]
    OpenPty(String),

    #[error("failed to spawn {program}: {detail}")]
    Spawn { program: String, detail: String },

    #[error("failed to open PTY stream: {0}")]
    Stream(String),

    #[error("terminal {0:?} not found")]
    NotFound(TerminalHandle),

    #[error("failed to write to terminal: {0}")]
    Write(#[from] std::io::Error),

    #[error("terminal worker stopped unexpectedly")]
    Worker,
}

/// Owns interactive terminals. One per session.
pub trait TerminalProvider {
    fn create(
        &mut self,
        spec: TerminalSpec,
    ) -> impl Future<Output = Result<TerminalHandle, TerminalError>>;

    fn send(&mut self, handle: TerminalHandle, bytes: &[u8]) -> Result<(), TerminalError>;

    fn close(&mut self, handle: TerminalHandle);

    fn resize(&mut self, rows: u16, cols: u16);

    fn snapshot(&self, handle: TerminalHandle) -> Option<TerminalSnapshot>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CellStyle {
    pub fg: Option<TermColor>,
    pub bg: Option<TermColor>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TermColor {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StyledRun {
    pub text: String,
    pub style: CellStyle,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TerminalSnapshot {
    pub lines: Vec<Vec<StyledRun>>,
    pub cursor: Option<(u16, u16)>,
    pub exited: bool,
}

pub struct PtyTerminals {
    terminals: HashMap<TerminalHandle, PtyTerminal>,
    next_handle: u64,
    size: (u16, u16),
    signals: UnboundedSender<TerminalSignal>,
}

struct PtyTerminal {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    parser: Arc<Mutex<vt100::Parser>>,
    exited: Arc<AtomicBool>,
}

struct SpawnedPty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtyTerminals {
    pub fn new(signals: UnboundedSender<TerminalSignal>, rows: u16, cols: u16) -> Self {
        Self {
            terminals: HashMap::new(),
            next_handle: 1,
            size: (rows.max(1), cols.max(1)),
            signals,
        }
    }
}

impl TerminalProvider for PtyTerminals {
    async fn create(&mut self, spec: TerminalSpec) -> Result<TerminalHandle, TerminalError> {
        let (rows, cols) = self.size;
        let program = spec.program.clone();
        let spawned = tokio::task::spawn_blocking(move || spawn_pty(spec, rows, cols))
            .await
            .map_err(|_| TerminalError::Worker)??;

        let handle = TerminalHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);

        let parser = Arc::new(Mutex::new(vt100::Parser::new(rows, cols, 0)));
        let exited = Arc::new(AtomicBool::new(false));
        spawn_reader(
            handle,
            spawned.reader,
            parser.clone(),
            exited.clone(),
            self.signals.clone(),
        );
        debug!(?handle, %program, "terminal created");

        self.terminals.insert(
            handle,
            PtyTerminal {
                master: spawned.master,
                writer: spawned.writer,
                child: spawned.child,
                parser,
                exited,
            },
        );
        Ok(handle)
    }

    fn send(&mut self, handle: TerminalHandle, bytes: &[u8]) -> Result<(), TerminalError> {
        let terminal = self
            .terminals
            .get_mut(&handle)
            .ok_or(TerminalError::NotFound(handle))?;
        terminal.writer.write_all(bytes)?;
        terminal.writer.flush()?;
        Ok(())
    }

    fn close(&mut self, handle: TerminalHandle) {
        let Some(terminal) = self.terminals.remove(&handle) else {
            return;
        };
        reap(handle, terminal.child);
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        let size = (rows.max(1), cols.max(1));
        if size == self.size {
            return;
        }
        self.size = size;
        for (handle, terminal) in &mut self.terminals {
            let pty_size = PtySize {
                rows: size.0,
                cols: size.1,
                pixel_width: 0,
                pixel_height: 0,
            };
            if let Err(error) = terminal.master.resize(pty_size) {
                warn!(?handle, %error, "failed to resize terminal");
            }
            if let Ok(mut parser) = terminal.parser.lock() {
                parser.set_size(size.0, size.1);
            }
        }
    }

    fn snapshot(&self, handle: TerminalHandle) -> Option<TerminalSnapshot> {
        let terminal = self.terminals.get(&handle)?;
        let parser = terminal.parser.lock().ok()?;
        let mut snapshot = snapshot_screen(parser.screen());
        snapshot.exited = terminal.exited.load(Ordering::Relaxed);
        Some(snapshot)
    }
}

impl Drop for PtyTerminals {
    fn drop(&mut self) {
        let handles: Vec<_> = self.terminals.keys().copied().collect();
        for handle in handles {
            self.close(handle);
        }
    }
}

fn spawn_pty(spec: TerminalSpec, rows: u16, cols: u16) -> Result<SpawnedPty, TerminalError> {
    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|error| TerminalError::OpenPty(error.to_string()))?;

    let mut command = CommandBuilder::new(&spec.program);
    command.args(&spec.args);
    command.cwd(&spec.cwd);
    command.env("TERM", "xterm-256color");

    let child = pair
        .slave
        .spawn_command(command)
        .map_err(|error| TerminalError::Spawn {
            program: spec.program.clone(),
            detail: error.to_string(),
        })?;
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|error| TerminalError::Stream(error.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|error| TerminalError::Stream(error.to_string()))?;

    Ok(SpawnedPty {
        master: pair.master,
        writer,
        reader,
        child,
    })
}

/// Kills the child and waits for it off the caller's thread, so a slow exit
/// never leaves a zombie behind.
fn reap(handle: TerminalHandle, mut child: Box<dyn Child + Send + Sync>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(error) = child.kill() {
            debug!(?handle, %error, "terminal child already gone");
        }
        match child.wait() {
            Ok(status) => debug!(?handle, ?status, "terminal child reaped"),
            Err(error) => debug!(?handle, %error, "terminal child wait failed"),
        }
    })
}

fn spawn_reader(
    handle: TerminalHandle,
    mut reader: Box<dyn Read + Send>,
    parser: Arc<Mutex<vt100::Parser>>,
    exited: Arc<AtomicBool>,
    signals: UnboundedSender<TerminalSignal>,
) {
    std::thread::spawn(move || {
        let mut buffer = [0u8; READ_BUFFER_BYTES];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    match parser.lock() {
                        Ok(mut parser) => parser.process(&buffer[..read]),
                        Err(_) => break,
                    }
                    if signals.send(TerminalSignal::Output(handle)).is_err() {
                        return;
                    }
                }
            }
        }
        exited.store(true, Ordering::Relaxed);
        let _ = signals.send(TerminalSignal::Exited(handle));
    });
}

fn convert_color(color: vt100::Color) -> Option<TermColor> {
    match color {
        vt100::Color::Default => None,
        vt100::Color::Idx(index) => Some(TermColor::Indexed(index)),
        vt100::Color::Rgb(r, g, b) => Some(TermColor::Rgb(r, g, b)),
    }
}

/// Collapses the visible screen into runs of equally styled cells.
pub fn snapshot_screen(screen: &vt100::Screen) -> TerminalSnapshot {
    let (rows, cols) = screen.size();
    let mut lines = Vec::with_capacity(usize::from(rows));

    for row in 0..rows {
        let mut runs: Vec<StyledRun> = Vec::new();
        for col in 0..cols {
            let Some(cell) = screen.cell(row, col) else {
                continue;
            };
            if cell.is_wide_continuation() {
                continue;
            }
            let style = CellStyle {
                fg: convert_color(cell.fgcolor()),
                bg: convert_color(cell.bgcolor()),
                bold: cell.bold(),
                italic: cell.italic(),
                underline: cell.underline(),
                inverse: cell.inverse(),
            };
            let mut text = String::new();
            if cell.has_contents() {
                text.push_str(&cell.contents());
            } else {
                text.push(' ');
            }
            match runs.last_mut() {
                Some(run) if run.style == style => run.text.push_str(&text),
                _ => runs.push(StyledRun { text, style }),
            }
        }
        lines.push(runs);
    }

    let cursor = (!screen.hide_cursor()).then(|| screen.cursor_position());
    TerminalSnapshot {
        lines,
        cursor,
        exited: false,
    }
}
