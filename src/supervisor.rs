//! Child process supervision
//!
//! Spawns the wrapped command with the caller's stdin, drains stdout and stderr
//! on two named threads into the [`Timeline`] while the calling thread waits for
//! the child, then scans the quiesced timeline for idle gaps.
//!
//! The drains MUST run concurrently with `wait()`: draining one pipe to EOF
//! before waiting (or before reading the other pipe) deadlocks as soon as the
//! child fills the other pipe's OS buffer.

use crate::classifier::{Cause, CauseRules};
use crate::display::{DisplayConfig, DisplayHandle, Stream};
use crate::idle_gap::{detect_idle_gaps, GapReport, DEFAULT_THRESHOLD};
use crate::timeline::{EventKind, Timeline};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures of the tool itself. A non-zero child exit is NOT one of these.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Malformed invocation; nothing was spawned
    #[error("{0}")]
    Usage(String),

    /// The OS could not start the child or set up its pipes
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the child failed after a successful spawn
    #[error("I/O error while supervising child: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    /// Exit code the tool should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Usage(_) => 2,
            SupervisorError::Spawn { .. } | SupervisorError::Io(_) => 1,
        }
    }
}

/// Where drained child output is echoed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Echo {
    /// stdout to stdout, stderr to stderr
    #[default]
    Passthrough,
    /// Both streams to stderr (keeps stdout free for JSON)
    Stderr,
    /// Record only
    Off,
}

#[derive(Debug, Clone, Copy)]
enum Sink {
    Stdout,
    Stderr,
    Null,
}

impl Sink {
    /// Echo one line, through the live display when one is attached so its
    /// redraw cannot erase the line
    fn write_line(self, line: &str, display: Option<&DisplayHandle>) {
        let stream = match self {
            Sink::Stdout => Stream::Stdout,
            Sink::Stderr => Stream::Stderr,
            Sink::Null => return,
        };
        let line = match display.map(|d| d.echo(stream, line.to_string())) {
            Some(Ok(())) => return,
            Some(Err(line)) => line,
            None => line.to_string(),
        };
        // Echo failures (closed terminal, broken pipe) must not stop draining
        let _ = match stream {
            Stream::Stdout => writeln!(io::stdout().lock(), "{}", line),
            Stream::Stderr => writeln!(io::stderr().lock(), "{}", line),
        };
    }
}

impl Echo {
    fn sinks(self) -> (Sink, Sink) {
        match self {
            Echo::Passthrough => (Sink::Stdout, Sink::Stderr),
            Echo::Stderr => (Sink::Stderr, Sink::Stderr),
            Echo::Off => (Sink::Null, Sink::Null),
        }
    }
}

/// Settings for one supervised run
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Gaps strictly longer than this are classified
    pub threshold: Duration,
    /// Attach the live display (rendered on stderr)
    pub display: bool,
    pub echo: Echo,
    pub rules: CauseRules,
    pub display_config: DisplayConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            display: false,
            echo: Echo::default(),
            rules: CauseRules::builtin(),
            display_config: DisplayConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Build a config from a threshold given in seconds
    pub fn with_threshold_secs(mut self, seconds: f64) -> Result<Self, SupervisorError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SupervisorError::Usage(format!(
                "threshold must be a finite number of seconds >= 0, got {}",
                seconds
            )));
        }
        self.threshold = Duration::try_from_secs_f64(seconds).map_err(|e| {
            SupervisorError::Usage(format!("threshold {} is out of range: {}", seconds, e))
        })?;
        Ok(self)
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Child's exit code, or 128 + signal when it was killed (unix)
    pub exit_code: i32,
    /// Wall time from just before spawn to after the child was reaped
    pub elapsed: Duration,
    pub report: GapReport,
    /// Number of events recorded, including start and end markers
    pub event_count: usize,
}

impl RunOutcome {
    /// Cause of the last idle gap, or Unknown
    pub fn cause(&self) -> Cause {
        self.report.last_cause()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `argv[0]` with `argv[1..]` and explain its idle gaps
///
/// # Errors
/// - [`SupervisorError::Usage`] if `argv` is empty (nothing is spawned)
/// - [`SupervisorError::Spawn`] if the executable cannot be started
/// - [`SupervisorError::Io`] if waiting on the child fails
///
/// # Example
/// ```no_run
/// use whyismybuildslow::supervisor::{run, SupervisorConfig};
///
/// let argv = vec!["cargo".to_string(), "build".to_string()];
/// let outcome = run(&argv, &SupervisorConfig::default())?;
/// println!("exit {} after {:?}, cause: {}", outcome.exit_code, outcome.elapsed, outcome.cause());
/// # Ok::<(), whyismybuildslow::supervisor::SupervisorError>(())
/// ```
pub fn run(argv: &[String], config: &SupervisorConfig) -> Result<RunOutcome, SupervisorError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SupervisorError::Usage("missing command after '--'".to_string()))?;

    let timeline = Timeline::new();
    let start = Instant::now();
    timeline.record(EventKind::Start, "build started");

    let spawn_error = |source: io::Error| SupervisorError::Spawn {
        program: program.clone(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let pipes = child.stdout.take().zip(child.stderr.take());
    let Some((stdout, stderr)) = pipes else {
        return Err(abandon(
            &mut child,
            program,
            io::Error::new(io::ErrorKind::BrokenPipe, "child output pipes were not created"),
        ));
    };
    info!(program = %program, pid = child.id(), "spawned child");

    let display = if config.display {
        DisplayHandle::spawn(io::stderr(), io::stdout(), config.display_config)
            .map_err(|e| warn!("live display unavailable: {}", e))
            .ok()
    } else {
        None
    };

    let (out_sink, err_sink) = config.echo.sinks();
    let display_ref = display.as_ref();
    let status = thread::scope(|scope| -> Result<ExitStatus, SupervisorError> {
        let drains = [
            spawn_drain(scope, "drain-stdout", stdout, &timeline, out_sink, display_ref),
            spawn_drain(scope, "drain-stderr", stderr, &timeline, err_sink, display_ref),
        ];
        // A pipe whose drain never started would leave the child writing into
        // a closed pipe; stop it instead of reporting a normal run
        let drains = match drains.into_iter().collect::<io::Result<Vec<_>>>() {
            Ok(drains) => drains,
            Err(source) => return Err(abandon(&mut child, program, source)),
        };

        let status = child.wait();

        // Barrier: the timeline is only scanned once both drains hit EOF
        for drain in drains {
            let name = drain.thread().name().unwrap_or("drain").to_string();
            match drain.join() {
                Ok(Ok(lines)) => debug!(drain = %name, lines, "drain finished"),
                Ok(Err(e)) => warn!(drain = %name, "drain stopped early: {}", e),
                Err(_) => warn!(drain = %name, "drain thread panicked"),
            }
        }
        status.map_err(SupervisorError::from)
    })?;

    timeline.record(EventKind::End, "build finished");
    let elapsed = start.elapsed();
    let exit_code = exit_code_of(status);
    if exit_code != 0 {
        info!(exit_code, "child exited with non-zero status");
    }

    let events = timeline.into_events();
    let report = detect_idle_gaps(&events, config.threshold, &config.rules);
    debug!(
        events = events.len(),
        gaps = report.gaps.len(),
        "timeline scanned"
    );

    if let Some(display) = display {
        for gap in &report.gaps {
            display.notify_stall(gap.gap, gap.result.cause.clone());
        }
        let _ = display.finish();
    }

    Ok(RunOutcome {
        exit_code,
        elapsed,
        report,
        event_count: events.len(),
    })
}

fn spawn_drain<'scope, 'env, R>(
    scope: &'scope Scope<'scope, 'env>,
    name: &str,
    reader: R,
    timeline: &'env Timeline,
    sink: Sink,
    display: Option<&'env DisplayHandle>,
) -> io::Result<ScopedJoinHandle<'scope, io::Result<usize>>>
where
    R: Read + Send + 'scope,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn_scoped(scope, move || drain(reader, timeline, sink, display))
        .inspect_err(|e| warn!(drain = name, "failed to start drain thread: {}", e))
}

/// Kill and reap a child whose output cannot be drained
fn abandon(child: &mut Child, program: &str, source: io::Error) -> SupervisorError {
    warn!(program = %program, pid = child.id(), "stopping child: {}", source);
    let _ = child.kill();
    let _ = child.wait();
    SupervisorError::Spawn {
        program: program.to_string(),
        source,
    }
}

/// Read `reader` line by line until EOF, recording each line as Output
///
/// Lines are split on `\n` (a trailing `\r` is dropped) and decoded lossily,
/// so non-UTF-8 output never aborts the drain.
fn drain<R: Read>(
    reader: R,
    timeline: &Timeline,
    sink: Sink,
    display: Option<&DisplayHandle>,
) -> io::Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(lines);
        }
        let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
        sink.write_line(&line, display);
        timeline.record(EventKind::Output, line);
        lines += 1;
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
