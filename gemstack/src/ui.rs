//! Terminal progress indicator for batch runs.

use std::env;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

const REDRAW_INTERVAL: Duration = Duration::from_millis(400);
const DEFAULT_ROWS: u16 = 24;

/// Progress sink used by the batch driver.
pub trait ProgressReporter: Sync {
    fn start_animation(&self);
    fn stop_animation(&self);
    fn set_total_tasks(&self, total: usize);
    fn increment_task_progress(&self);
}

/// Reporter that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start_animation(&self) {}
    fn stop_animation(&self) {}
    fn set_total_tasks(&self, _total: usize) {}
    fn increment_task_progress(&self) {}
}

#[derive(Debug, Default)]
struct Shared {
    animating: AtomicBool,
    shutdown: AtomicBool,
    total: AtomicUsize,
    current: AtomicUsize,
    write_failed: AtomicBool,
}

impl Shared {
    fn label(&self, frame: usize) -> String {
        let dots = ".".repeat(frame % 3 + 1);
        format!(
            "[{}/{}] GemStack Generating{dots}",
            self.current.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed)
        )
    }
}

/// `[i/n] GemStack Generating...` pinned to the bottom row of stderr.
///
/// Drawing happens on a background thread and only when stderr is a terminal.
/// The thread stops when the value is dropped.
#[derive(Debug)]
pub struct StatusLine {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLine {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        let handle = std::io::stderr().is_terminal().then(|| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || draw_loop(&shared, terminal_rows()))
        });
        Self { shared, handle }
    }

    pub fn label(&self) -> String {
        self.shared.label(2)
    }
}

impl ProgressReporter for StatusLine {
    fn start_animation(&self) {
        self.shared.animating.store(true, Ordering::Relaxed);
    }

    fn stop_animation(&self) {
        if self.shared.animating.swap(false, Ordering::Relaxed) && self.handle.is_some() {
            clear_bottom_row(&self.shared, terminal_rows());
        }
    }

    fn set_total_tasks(&self, total: usize) {
        self.shared.total.store(total, Ordering::Relaxed);
    }

    fn increment_task_progress(&self) {
        self.shared.current.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        self.stop_animation();
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

fn terminal_rows() -> u16 {
    env::var("LINES")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|rows| *rows > 0)
        .unwrap_or(DEFAULT_ROWS)
}

fn draw_loop(shared: &Shared, rows: u16) {
    let mut frame = 0usize;
    while !shared.shutdown.load(Ordering::Relaxed) {
        if shared.animating.load(Ordering::Relaxed) {
            // save cursor, jump to the last row, clear it, draw, restore
            let sequence = format!("\x1b7\x1b[{rows};1H\x1b[2K{}\x1b8", shared.label(frame));
            write_sequence(&mut std::io::stderr().lock(), &sequence, shared);
            frame = frame.wrapping_add(1);
        }
        thread::park_timeout(REDRAW_INTERVAL);
    }
}

fn clear_bottom_row(shared: &Shared, rows: u16) {
    let sequence = format!("\x1b7\x1b[{rows};1H\x1b[2K\x1b8");
    write_sequence(&mut std::io::stderr().lock(), &sequence, shared);
}

/// Write and flush `sequence`; the first failure is logged, later ones are not.
fn write_sequence<W: Write>(out: &mut W, sequence: &str, shared: &Shared) {
    let result = out.write_all(sequence.as_bytes()).and_then(|()| out.flush());
    if let Err(e) = result
        && !shared.write_failed.swap(true, Ordering::Relaxed)
    {
        debug!(err = %e, "status line write failed");
    }
}
