//! Process-level logging and output redirection for a native component
//! embedded in a larger host application.
//!
//! The host owns level policy and final formatting: every non-filtered
//! statement is handed to a host-provided sink callback as a [`Record`].
//! This crate's job is the part the host cannot do safely on its own:
//! bounded formatting that cannot overrun its buffer, a fatal escalation
//! path that logs, runs the host shutdown hook and then terminates, and
//! stdout/stderr redirection that keeps reporting its own failures on a
//! pre-redirection channel (see [`redirect`]).
//!
//! # Quick Start
//!
//! ```
//! use hostlog::{vlogf, Logger};
//!
//! let mut logger = Logger::new(|record| {
//!     eprintln!("[{}:{}] {}", record.file, record.line, record.text);
//! });
//! vlogf!(logger, 1, "listening on port {}", 8080);
//! ```
//!
//! # Level convention
//!
//! Smaller numbers are more important: a statement at level `L` reaches the
//! sink iff `L <= verbose_level`, and [`FATAL_LEVEL`] (`-1`) is reserved for
//! fatal-class messages, which bypass the filter entirely.
//!
//! # Threading
//!
//! The facility is single-threaded by contract. All methods take `&mut self`
//! and hold no locks; callers on multiple threads must serialize externally.

use std::collections::HashMap;
use std::fmt;

mod format;
pub mod redirect;

pub use format::{format_bounded, BoundedFormat};
pub use redirect::{LogWriter, RedirectError, Redirector};

/// Level reserved for fatal-class messages.
pub const FATAL_LEVEL: i32 = -1;

/// Capacity of the formatting buffer behind [`Logger::log`] and friends.
/// Longer statements are truncated, never rejected.
pub const LOG_BUFFER_CAPACITY: usize = 4000;

/// A finalized log statement handed to the host sink.
pub struct Record<'a> {
    pub file: &'a str,
    pub line: u32,
    pub level: i32,
    pub text: &'a str,
}

/// The logging facility: bounded formatting, level filtering, every-N
/// suppression and the fatal escalation path.
///
/// One instance is expected per process, owned by the host and passed to the
/// [`vlogf!`]/[`fatalf!`]/[`vlogf_every_n!`] call-site macros.
pub struct Logger {
    verbose_level: i32,
    sink: Box<dyn FnMut(&Record<'_>)>,
    shutdown: Box<dyn FnMut()>,
    terminate: fn() -> !,
    every_counts: HashMap<(&'static str, u32), u64>,
}

impl Logger {
    /// Creates a facility forwarding finalized statements to `sink`.
    ///
    /// The default verbose level is `1`, the default shutdown hook does
    /// nothing and the default terminate step is [`std::process::abort`].
    pub fn new(sink: impl FnMut(&Record<'_>) + 'static) -> Logger {
        Logger {
            verbose_level: 1,
            sink: Box::new(sink),
            shutdown: Box::new(|| {}),
            terminate: std::process::abort,
            every_counts: HashMap::new(),
        }
    }

    /// Sets the hook run by [`Logger::fatal`] after the message is handed to
    /// the sink and before the process terminates. The host flushes and
    /// closes its open resources here.
    #[must_use]
    pub fn with_shutdown_hook(mut self, hook: impl FnMut() + 'static) -> Logger {
        self.shutdown = Box::new(hook);
        self
    }

    /// Replaces the terminate step of the fatal path. Tests substitute a
    /// panicking stub here; production code has no reason to call this.
    #[must_use]
    pub fn with_terminate(mut self, terminate: fn() -> !) -> Logger {
        self.terminate = terminate;
        self
    }

    pub fn verbose_level(&self) -> i32 {
        self.verbose_level
    }

    pub fn set_verbose_level(&mut self, level: i32) {
        self.verbose_level = level;
    }

    /// Formats and dispatches one statement, unless filtered out by the
    /// verbose level. Trailing newlines are stripped so the sink decides the
    /// line ending exactly once.
    pub fn log(&mut self, file: &str, line: u32, level: i32, args: fmt::Arguments<'_>) {
        if level > self.verbose_level {
            return;
        }
        self.dispatch(file, line, level, args);
    }

    /// Forwards to [`Logger::log`] on every `n`-th call per call site,
    /// starting with the first. The counter advances on every call, including
    /// those the verbose level then filters out.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn log_every_n(
        &mut self,
        n: u64,
        file: &'static str,
        line: u32,
        level: i32,
        args: fmt::Arguments<'_>,
    ) {
        let count = self.every_counts.entry((file, line)).or_insert(0);
        let due = *count % n == 0;
        *count += 1;
        if due {
            self.log(file, line, level, args);
        }
    }

    /// Dispatches at [`FATAL_LEVEL`] regardless of the verbose level, runs
    /// the shutdown hook, then terminates the process. The sink sees the
    /// message before the hook runs; neither step is skipped.
    pub fn fatal(&mut self, file: &str, line: u32, args: fmt::Arguments<'_>) -> ! {
        self.dispatch(file, line, FATAL_LEVEL, args);
        (self.shutdown)();
        (self.terminate)()
    }

    /// Renders `args` into `buf` and returns the byte count written.
    ///
    /// Callers of this primitive assert their buffer is always large enough:
    /// if the rendering would not leave a spare byte in `buf`, that is a
    /// sizing bug and the call escalates to [`Logger::fatal`] naming the
    /// minimum sufficient capacity. For recoverable truncation use
    /// [`format_bounded`] directly.
    pub fn safe_format(&mut self, buf: &mut [u8], args: fmt::Arguments<'_>) -> usize {
        match format::format_bounded(buf, args) {
            BoundedFormat::Fit { len } => len,
            BoundedFormat::Overflow { required, .. } => self.fatal(
                file!(),
                line!(),
                format_args!("Buffer is too small! At least {} is required.", required + 1),
            ),
        }
    }

    /// Logs `data` as an offset-prefixed hex dump at the given level.
    pub fn log_hex_data(&mut self, file: &str, line: u32, level: i32, data: &[u8]) {
        if level > self.verbose_level {
            return;
        }
        use std::fmt::Write;
        let mut text = String::with_capacity(16 + data.len() * 3 + (data.len() / 16 + 1) * 8);
        let mut count = itoa::Buffer::new();
        text.push_str(count.format(data.len()));
        text.push_str(" bytes");
        for (row, chunk) in data.chunks(16).enumerate() {
            write!(text, "\n{:04x} ", row * 16).ok();
            for byte in chunk {
                write!(text, " {byte:02x}").ok();
            }
        }
        self.dispatch(file, line, level, format_args!("{text}"));
    }

    fn dispatch(&mut self, file: &str, line: u32, level: i32, args: fmt::Arguments<'_>) {
        let mut buf = [0u8; LOG_BUFFER_CAPACITY];
        let len = format::format_bounded(&mut buf, args).written();
        // Safety: format_bounded truncates only at char boundaries, so the
        // written prefix is valid UTF-8.
        let text = unsafe { std::str::from_utf8_unchecked(&buf[..len]) };
        let text = text.trim_end_matches('\n');
        (self.sink)(&Record {
            file,
            line,
            level,
            text,
        });
    }
}

/// Logs through a [`Logger`] with the caller's file and line.
#[macro_export]
macro_rules! vlogf {
    ($logger:expr, $level:expr, $($arg:tt)*) => {
        $logger.log(file!(), line!(), $level, format_args!($($arg)*))
    };
}

/// Fatal escalation with the caller's file and line: log, run the shutdown
/// hook, terminate. Never returns.
#[macro_export]
macro_rules! fatalf {
    ($logger:expr, $($arg:tt)*) => {
        $logger.fatal(file!(), line!(), format_args!($($arg)*))
    };
}

/// Like [`vlogf!`] but forwards only every `$n`-th call made from this call
/// site, starting with the first.
#[macro_export]
macro_rules! vlogf_every_n {
    ($logger:expr, $n:expr, $level:expr, $($arg:tt)*) => {
        $logger.log_every_n($n, file!(), line!(), $level, format_args!($($arg)*))
    };
}
