//! User-facing output sink
//!
//! Progress messages, streamed build lines and the final `RESULT:` line go
//! through an [`Output`] handed to the pipeline. Diagnostics go through
//! `tracing` to stderr instead.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Line-oriented writer for user-facing messages.
pub struct Output {
    sink: Box<dyn Write + Send>,
}

impl Output {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self { sink }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Discard everything.
    pub fn sink() -> Self {
        Self::new(Box::new(io::sink()))
    }

    /// Write one line and flush. Write errors (closed pipe) are ignored.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.sink, "{}", text.as_ref());
        let _ = self.sink.flush();
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

/// In-memory sink whose contents stay readable after the [`Output`] that
/// owns a clone of it has been moved away.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> Output {
        Output::new(Box::new(self.clone()))
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_buffer_collects_lines() {
        let buffer = SharedBuffer::new();
        let mut out = buffer.output();
        out.line("Step 1/5 : FROM python:3.9-slim");
        out.line(String::from("done"));
        assert_eq!(buffer.contents(), "Step 1/5 : FROM python:3.9-slim\ndone\n");
    }
}
