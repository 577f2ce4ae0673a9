use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// A cloneable, thread-safe handle to an output stream.
///
/// Each log line is written with a single `write_all` while holding the
/// lock, so concurrent records never interleave.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Write one complete line.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut w = self.inner.lock();
        w.write_all(line)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWriter").finish_non_exhaustive()
    }
}

static OUTPUT: Lazy<ArcSwap<SharedWriter>> =
    Lazy::new(|| ArcSwap::from_pointee(SharedWriter::stdout()));

/// Replace the process-wide output used by loggers constructed afterwards.
///
/// Loggers that already exist keep writing where they were pointed.
pub fn set_output<W: Write + Send + 'static>(writer: W) {
    OUTPUT.store(Arc::new(SharedWriter::new(writer)));
}

/// The current process-wide output (stdout unless replaced).
pub fn output() -> SharedWriter {
    SharedWriter::clone(&OUTPUT.load())
}
