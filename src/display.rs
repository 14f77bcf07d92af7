//! Live terminal display for a supervised run
//!
//! The display is an actor: a dedicated thread owns the [`DisplayState`] and
//! is the only code that mutates it. Everything else talks to it through a
//! bounded crossbeam channel via [`DisplayHandle`]. Producers never block on
//! it: a full inbox drops the notification with a warning, so rendering can
//! never stall output draining.
//!
//! ```text
//!   Running ──Stall──▶ Stalled ──Stall──▶ Stalled (fields overwritten)
//!      │                  │
//!      └──────Finish──────┴──────▶ Finished (terminal, loop exits)
//! ```
//!
//! Ticks arrive from a `crossbeam::channel::tick` timer every
//! [`DisplayConfig::tick_period`] and only advance the clock.
//!
//! While the view is live, echoed child output goes through the actor too
//! ([`DisplayHandle::echo`]): the frame is erased, the line is printed where it
//! stood, and the next tick redraws the view below it. Nothing else may write
//! to the terminal between frames, or the redraw erases it.

use crate::classifier::Cause;
use crossbeam::channel::{self, select, Receiver, Sender, TrySendError};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Display timing and queue settings
#[derive(Debug, Clone, Copy)]
pub struct DisplayConfig {
    /// Redraw period
    pub tick_period: Duration,
    /// Inbox capacity for output, stall and finish messages
    pub queue_capacity: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            queue_capacity: 64,
        }
    }
}

/// Terminal stream an echoed child line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Messages handled by the display actor
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayMsg {
    Tick(Instant),
    /// A child line to print above the live view
    Output { stream: Stream, line: String },
    Stall { duration: Duration, cause: Cause },
    Finish(Instant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Stalled,
    Finished,
}

/// Whether the actor loop keeps going after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// UI state owned by the display actor
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    start: Instant,
    now: Instant,
    phase: Phase,
    stall_duration: Duration,
    last_cause: Option<Cause>,
}

impl DisplayState {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            now: start,
            phase: Phase::Running,
            stall_duration: Duration::ZERO,
            last_cause: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn is_stalled(&self) -> bool {
        self.phase == Phase::Stalled
    }

    pub fn stall_duration(&self) -> Duration {
        self.stall_duration
    }

    pub fn last_cause(&self) -> Option<&Cause> {
        self.last_cause.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.now.saturating_duration_since(self.start)
    }

    /// Apply one message. Everything after Finish is ignored.
    pub fn apply(&mut self, msg: DisplayMsg) -> Step {
        if self.is_finished() {
            return Step::Stop;
        }

        match msg {
            DisplayMsg::Tick(now) => {
                self.now = now.max(self.now);
                Step::Continue
            }
            DisplayMsg::Output { .. } => Step::Continue,
            DisplayMsg::Stall { duration, cause } => {
                self.phase = Phase::Stalled;
                self.stall_duration = duration;
                self.last_cause = Some(cause);
                Step::Continue
            }
            DisplayMsg::Finish(now) => {
                self.now = now.max(self.now);
                self.phase = Phase::Finished;
                Step::Stop
            }
        }
    }

    /// Text view of the current state
    pub fn render(&self) -> String {
        let elapsed = format_elapsed(self.elapsed());
        match self.phase {
            Phase::Finished => match &self.last_cause {
                Some(cause) => format!(
                    "✅ Build finished\nElapsed: {}\nLikely cause: {}\n",
                    elapsed, cause
                ),
                None => format!("✅ Build finished\nElapsed: {}\n", elapsed),
            },
            Phase::Stalled => format!(
                "{}\nElapsed: {}\n\n{} ({})\n",
                progress_bar(self.elapsed()),
                elapsed,
                character_line(self.last_cause.as_ref()),
                format_elapsed(self.stall_duration),
            ),
            Phase::Running => format!("{}\nElapsed: {}\n", progress_bar(self.elapsed()), elapsed),
        }
    }
}

/// Cycling activity bar derived from elapsed time alone
///
/// Total work is unknown, so the percentage is NOT a progress estimate: it
/// wraps every ~6.7s purely to show the run is alive.
pub fn progress_bar(elapsed: Duration) -> String {
    const WIDTH: usize = 20;
    let percent = (elapsed.as_secs_f64() * 15.0) as usize % 100;
    let filled = percent * WIDTH / 100;

    format!(
        "⚙️ Building {}{} {}%",
        "█".repeat(filled),
        "░".repeat(WIDTH - filled),
        percent
    )
}

fn character_line(cause: Option<&Cause>) -> &'static str {
    match cause {
        Some(Cause::Network) => "🐌 Network Slug crawling…",
        Some(Cause::Cache) => "🧊 Cache Golem awakening…",
        Some(Cause::Docker) => "🚚 Docker Truck unloading layers…",
        _ => "🤷 Something is slowing things down…",
    }
}

/// Seconds with one decimal, e.g. `12.3s`
pub fn format_elapsed(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

/// Redraws a multi-line view in place using ANSI cursor movement
///
/// Assumes the cursor sits just below the last frame, so every other write to
/// the terminal must go through [`Frame::print_above`].
struct Frame<W: Write, O: Write> {
    out: W,
    /// Writer for echoed child stdout (same terminal, different stream)
    stdout: O,
    drawn_lines: usize,
    broken: bool,
}

impl<W: Write, O: Write> Frame<W, O> {
    fn new(out: W, stdout: O) -> Self {
        Self {
            out,
            stdout,
            drawn_lines: 0,
            broken: false,
        }
    }

    fn draw(&mut self, view: &str) {
        if self.broken {
            return;
        }
        let drawn = self.erase().and_then(|()| {
            self.out.write_all(view.as_bytes())?;
            self.out.flush()
        });
        match drawn {
            Ok(()) => self.drawn_lines = view.lines().count(),
            Err(e) => self.disable(e),
        }
    }

    /// Print a child line where the frame was; the next draw goes below it
    fn print_above(&mut self, stream: Stream, line: &str) {
        if !self.broken {
            if let Err(e) = self.erase() {
                self.disable(e);
            }
        }
        // Echo failures must not stop the actor
        let _ = match stream {
            Stream::Stdout => writeln!(self.stdout, "{}", line).and_then(|()| self.stdout.flush()),
            Stream::Stderr => writeln!(self.out, "{}", line).and_then(|()| self.out.flush()),
        };
    }

    /// Cursor up to the first line of the previous frame, clear to end
    fn erase(&mut self) -> io::Result<()> {
        if self.drawn_lines > 0 {
            write!(self.out, "\x1b[{}A\x1b[J", self.drawn_lines)?;
            self.out.flush()?;
            self.drawn_lines = 0;
        }
        Ok(())
    }

    fn disable(&mut self, e: io::Error) {
        tracing::warn!("display output failed, disabling live view: {}", e);
        self.broken = true;
    }
}

/// Sender side of a running display actor, scoped to one run
///
/// Dropping the handle finishes the actor and waits for it.
pub struct DisplayHandle {
    inbox: Sender<DisplayMsg>,
    worker: Option<JoinHandle<DisplayState>>,
}

impl DisplayHandle {
    /// Start the display actor writing frames to `out`
    ///
    /// Lines passed to [`echo`](Self::echo) are printed to `out` (stderr lines)
    /// or `stdout`.
    pub fn spawn<W, O>(out: W, stdout: O, config: DisplayConfig) -> io::Result<Self>
    where
        W: Write + Send + 'static,
        O: Write + Send + 'static,
    {
        let (inbox, messages) = channel::bounded(config.queue_capacity.max(1));
        let state = DisplayState::new(Instant::now());
        let ticker = channel::tick(config.tick_period);
        let frame = Frame::new(out, stdout);

        let worker = thread::Builder::new()
            .name("display".to_string())
            .spawn(move || run_coordinator(state, messages, ticker, frame))?;

        Ok(Self {
            inbox,
            worker: Some(worker),
        })
    }

    /// Print a child line above the live view
    ///
    /// Blocks while the inbox is full: output is never dropped. If the actor
    /// is gone the line is handed back for the caller to print.
    pub fn echo(&self, stream: Stream, line: String) -> Result<(), String> {
        self.inbox
            .send(DisplayMsg::Output { stream, line })
            .map_err(|e| match e.into_inner() {
                DisplayMsg::Output { line, .. } => line,
                _ => String::new(),
            })
    }

    /// Report an idle gap. Never blocks.
    pub fn notify_stall(&self, duration: Duration, cause: Cause) {
        self.post(DisplayMsg::Stall { duration, cause });
    }

    /// Move the actor to Finished and wait for it to exit
    ///
    /// Returns the final state, or `None` if the actor thread panicked.
    pub fn finish(mut self) -> Option<DisplayState> {
        self.shutdown()
    }

    fn post(&self, msg: DisplayMsg) {
        match self.inbox.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(?msg, "display queue full, notification dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("display already stopped");
            }
        }
    }

    fn shutdown(&mut self) -> Option<DisplayState> {
        let worker = self.worker.take()?;
        // Blocking send: Finish must not be dropped, and the actor is always
        // draining its inbox unless it has already exited.
        let _ = self.inbox.send(DisplayMsg::Finish(Instant::now()));
        match worker.join() {
            Ok(state) => Some(state),
            Err(_) => {
                tracing::warn!("display thread panicked; continuing without it");
                None
            }
        }
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_coordinator<W: Write, O: Write>(
    mut state: DisplayState,
    messages: Receiver<DisplayMsg>,
    ticker: Receiver<Instant>,
    mut frame: Frame<W, O>,
) -> DisplayState {
    frame.draw(&state.render());

    loop {
        let msg = select! {
            recv(messages) -> msg => msg.unwrap_or_else(|_| DisplayMsg::Finish(Instant::now())),
            recv(ticker) -> at => DisplayMsg::Tick(at.unwrap_or_else(|_| Instant::now())),
        };

        // Output leaves the frame erased until the next tick, so a burst of
        // lines is not interleaved with redraws
        if let DisplayMsg::Output { stream, line } = &msg {
            frame.print_above(*stream, line);
            continue;
        }

        let step = state.apply(msg);
        frame.draw(&state.render());
        if step == Step::Stop {
            break;
        }
    }

    state
}
