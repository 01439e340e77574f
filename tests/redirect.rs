//! Descriptor-level redirection test.
//!
//! Redirection retargets the process's real stdout/stderr, so everything
//! runs in this one test function and the original descriptors are restored
//! before any assertion can fail the run.

use std::fs;
use std::io::Write;
use std::os::fd::AsRawFd;

use hostlog::{LogWriter, Redirector};

/// Restores fds 1 and 2 on drop, including on assertion panics.
struct FdBackup {
    stdout: i32,
    stderr: i32,
}

impl FdBackup {
    fn capture() -> FdBackup {
        unsafe {
            FdBackup {
                stdout: libc::dup(libc::STDOUT_FILENO),
                stderr: libc::dup(libc::STDERR_FILENO),
            }
        }
    }
}

impl Drop for FdBackup {
    fn drop(&mut self) {
        unsafe {
            libc::dup2(self.stdout, libc::STDOUT_FILENO);
            libc::dup2(self.stderr, libc::STDERR_FILENO);
            libc::close(self.stdout);
            libc::close(self.stderr);
        }
    }
}

#[test]
fn redirects_both_streams_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");
    let diag_path = dir.path().join("diag.txt");

    let backup = FdBackup::capture();
    // Point the current stderr at a scratch file so the redirector captures
    // it as the pre-redirection error channel and failure diagnostics become
    // observable.
    let diag = fs::File::create(&diag_path).unwrap();
    unsafe { libc::dup2(diag.as_raw_fd(), libc::STDERR_FILENO) };

    let mut redirector = Redirector::new();
    redirector.redirect_outputs_to(&first).unwrap();
    let saved_out = redirector.saved_primary().unwrap();
    let saved_err = redirector.saved_error().unwrap();

    let n = redirector.write_through(b"hello through\n").unwrap();
    assert_eq!(n, 14);

    // The error stream is merged onto the same destination.
    let merged = b"merged stderr\n";
    unsafe { libc::write(libc::STDERR_FILENO, merged.as_ptr().cast(), merged.len()) };

    // The log writer seam reaches the same file.
    LogWriter::new(&redirector).write_all(b"via writer\n").unwrap();

    // Second call retargets but does not re-capture the saved slots.
    redirector.redirect_outputs_to(&second).unwrap();
    assert_eq!(redirector.saved_primary(), Some(saved_out));
    assert_eq!(redirector.saved_error(), Some(saved_err));
    redirector.write_through(b"second file\n").unwrap();

    // A destination that cannot be opened: negative errno code, diagnostic
    // naming the path on the saved error channel, streams left untouched.
    let missing = dir.path().join("no-such-dir").join("log.txt");
    let err = redirector.redirect_outputs_to(&missing).unwrap_err();
    assert_eq!(err.code(), -libc::ENOENT);
    assert_eq!(redirector.saved_primary(), Some(saved_out));
    redirector.write_through(b"still second\n").unwrap();

    drop(backup);

    let first_contents = fs::read_to_string(&first).unwrap();
    assert!(first_contents.contains("hello through"));
    assert!(first_contents.contains("merged stderr"));
    assert!(first_contents.contains("via writer"));

    let second_contents = fs::read_to_string(&second).unwrap();
    assert!(second_contents.contains("second file"));
    assert!(second_contents.contains("still second"));

    let diag_text = fs::read_to_string(&diag_path).unwrap();
    assert!(diag_text.contains(missing.to_str().unwrap()));
    assert!(diag_text.ends_with('\n'));
}
