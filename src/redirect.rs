//! Stdout/stderr redirection with pre-redirection error reporting.
//!
//! [`Redirector`] points both standard streams at a destination file and
//! keeps duplicates of the original descriptors. Those saved descriptors
//! exist for one purpose: when redirection or a later flush fails, the
//! diagnostic is written to the pre-redirection error stream, so it is never
//! swallowed by the very stream that just broke.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use crate::format::{self, BoundedFormat};

/// Failure of a redirection or write-through operation, carrying the
/// platform error number.
#[derive(Debug)]
pub struct RedirectError {
    errno: i32,
}

impl RedirectError {
    fn from_io(err: &io::Error) -> RedirectError {
        RedirectError {
            errno: err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// The platform error number.
    pub fn errno(&self) -> i32 {
        self.errno
    }

    /// The negated error number, the return-code convention of the host
    /// interface: always negative.
    pub fn code(&self) -> i32 {
        -self.errno
    }
}

impl fmt::Display for RedirectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.errno))
    }
}

impl std::error::Error for RedirectError {}

/// Process-wide redirection of the primary (stdout) and error (stderr)
/// streams.
///
/// The original descriptors are captured at most once per slot, on the first
/// redirection call; later calls retarget the streams but leave the saved
/// slots alone. The slots are held for the life of the redirector, which the
/// host is expected to keep for the life of the process.
///
/// Single-threaded by contract, like the rest of the crate: descriptor
/// capture and retargeting are process-global effects with no internal
/// locking.
pub struct Redirector {
    saved_stdout: Option<OwnedFd>,
    saved_stderr: Option<OwnedFd>,
}

impl Redirector {
    pub const fn new() -> Redirector {
        Redirector {
            saved_stdout: None,
            saved_stderr: None,
        }
    }

    /// The saved pre-redirection primary descriptor, once captured.
    pub fn saved_primary(&self) -> Option<RawFd> {
        self.saved_stdout.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// The saved pre-redirection error descriptor, once captured.
    pub fn saved_error(&self) -> Option<RawFd> {
        self.saved_stderr.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Redirects both standard streams into `destination`, truncating it.
    ///
    /// The destination is consumed and released exactly once, on every exit
    /// path. On failure the error is announced on the best available error
    /// stream and returned with its negated errno in
    /// [`RedirectError::code`]; the streams are left as far as the sequence
    /// got (a failed open leaves them untouched, a failed merge leaves
    /// stdout redirected).
    pub fn redirect_outputs_to(&mut self, destination: impl AsRef<Path>) -> Result<(), RedirectError> {
        if self.saved_stdout.is_none() {
            self.saved_stdout = dup_fd(libc::STDOUT_FILENO);
        }
        if self.saved_stderr.is_none() {
            self.saved_stderr = dup_fd(libc::STDERR_FILENO);
        }
        let path = destination.as_ref();
        let file = match File::create(path) {
            Ok(file) => file,
            Err(err) => {
                self.announce(format_args!("Failed to open '{}'", path.display()), &err);
                return Err(RedirectError::from_io(&err));
            }
        };
        if unsafe { libc::dup2(file.as_raw_fd(), libc::STDOUT_FILENO) } == -1 {
            let err = io::Error::last_os_error();
            self.announce(
                format_args!("Failed to redirect stdout to '{}'", path.display()),
                &err,
            );
            return Err(RedirectError::from_io(&err));
        }
        if unsafe { libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) } == -1 {
            let err = io::Error::last_os_error();
            self.announce(format_args!("Failed to dup stderr to stdout"), &err);
            return Err(RedirectError::from_io(&err));
        }
        Ok(())
    }

    /// Writes `message` through the (possibly redirected) primary stream's
    /// buffer, then flushes it down to the descriptor.
    ///
    /// A short write returns the short count immediately without flushing; a
    /// write or flush failure is announced on the best available error
    /// stream and returned. Otherwise the accepted byte count comes back.
    pub fn write_through(&self, message: &[u8]) -> Result<usize, RedirectError> {
        self.write_through_to(&mut io::stdout().lock(), message)
    }

    fn write_through_to<W: Write>(&self, out: &mut W, message: &[u8]) -> Result<usize, RedirectError> {
        let accepted = match out.write(message) {
            Ok(accepted) => accepted,
            Err(err) => {
                self.announce(format_args!("Error writing log"), &err);
                return Err(RedirectError::from_io(&err));
            }
        };
        if accepted < message.len() {
            return Ok(accepted);
        }
        if let Err(err) = out.flush() {
            self.announce(format_args!("Error flushing log"), &err);
            return Err(RedirectError::from_io(&err));
        }
        Ok(accepted)
    }

    fn announce(&self, prefix: fmt::Arguments<'_>, err: &io::Error) {
        let fd = self
            .saved_stderr
            .as_ref()
            .map(|fd| fd.as_raw_fd())
            .unwrap_or(libc::STDERR_FILENO);
        announce_to(fd, prefix, err);
    }
}

impl Default for Redirector {
    fn default() -> Redirector {
        Redirector::new()
    }
}

fn dup_fd(fd: RawFd) -> Option<OwnedFd> {
    let duped = unsafe { libc::dup(fd) };
    if duped == -1 {
        None
    } else {
        // Safety: dup returned a fresh descriptor nothing else owns.
        Some(unsafe { OwnedFd::from_raw_fd(duped) })
    }
}

/// One diagnostic line issued as a single write call directly on the
/// descriptor, bypassing every stream buffer that might be broken.
fn announce_to(fd: RawFd, prefix: fmt::Arguments<'_>, err: &io::Error) {
    let mut buf = [0u8; 1024];
    let len = match format::format_bounded(&mut buf, format_args!("{prefix}: {err}\n")) {
        BoundedFormat::Fit { len } => len,
        BoundedFormat::Overflow { len, .. } => len,
    };
    // Best effort; there is no better channel left to report to.
    let _ = unsafe { libc::write(fd, buf.as_ptr().cast(), len) };
}

/// `io::Write` adapter the host hands to its logging framework. Every write
/// goes through [`Redirector::write_through`], so each statement reaches the
/// descriptor before the call returns.
pub struct LogWriter<'a> {
    redirector: &'a Redirector,
}

impl<'a> LogWriter<'a> {
    pub fn new(redirector: &'a Redirector) -> LogWriter<'a> {
        LogWriter { redirector }
    }
}

impl Write for LogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.redirector
            .write_through(buf)
            .map_err(|err| io::Error::from_raw_os_error(err.errno()))
    }

    fn flush(&mut self) -> io::Result<()> {
        // write_through already flushed down to the descriptor.
        Ok(())
    }
}
