//! Bounded text formatting into caller-provided buffers.
//!
//! Rendering never allocates and never overruns the buffer. Whether an
//! overflow is a recoverable condition or a sizing bug is the caller's call;
//! this module only reports it.

use std::fmt;

/// Outcome of rendering into a fixed-capacity buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedFormat {
    /// The rendering fit with at least one byte of capacity to spare.
    ///
    /// The spare byte keeps the terminator reserve of the original C
    /// interface, so a buffer of capacity `C` fits at most `C - 1` bytes
    /// of text.
    Fit { len: usize },
    /// The rendering needs `required` bytes of text; only `len` were written.
    Overflow { len: usize, required: usize },
}

impl BoundedFormat {
    /// Bytes actually written, whether or not the rendering fit.
    pub fn written(&self) -> usize {
        match *self {
            BoundedFormat::Fit { len } => len,
            BoundedFormat::Overflow { len, .. } => len,
        }
    }
}

/// Renders `args` into `buf`, tracking the byte count an unbounded buffer
/// would have received. Truncation never splits a UTF-8 character, so the
/// written prefix is always valid text.
pub fn format_bounded(buf: &mut [u8], args: fmt::Arguments<'_>) -> BoundedFormat {
    let mut writer = BoundedWriter {
        buf,
        len: 0,
        required: 0,
    };
    // BoundedWriter::write_str never errors; truncation is recorded instead.
    let _ = fmt::Write::write_fmt(&mut writer, args);
    if writer.required >= writer.buf.len() {
        BoundedFormat::Overflow {
            len: writer.len,
            required: writer.required,
        }
    } else {
        BoundedFormat::Fit { len: writer.len }
    }
}

struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    required: usize,
}

impl fmt::Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.required += s.len();
        let room = self.buf.len() - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            let mut end = room;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            end
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}
