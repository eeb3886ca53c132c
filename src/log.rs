//! Logging
//!
//! Two channels reach the server console. [`HostLog`] carries the lines
//! scripts rely on (the load banner and parse diagnostics). Everything else
//! goes through `tracing`, whose fmt subscriber is pointed at the same host
//! printer and filtered by the `SAMP_XML_LOG` environment variable.

use std::io;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

/// Sink for console lines
pub trait HostLog: Send {
    fn log(&self, message: &str);
}

impl<F: Fn(&str) + Send> HostLog for F {
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Install the global tracing subscriber writing through `log`.
///
/// Returns false if a subscriber was already installed, which happens when
/// the host loads the plugin a second time in the same process.
pub fn init_tracing<L>(log: L) -> bool
where
    L: HostLog + Clone + Sync + 'static,
{
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(HostWriter { log })
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .try_init()
        .is_ok()
}

/// `MakeWriter` handing each formatted event to a [`HostLog`]
#[derive(Clone)]
pub struct HostWriter<L> {
    log: L,
}

impl<'a, L> MakeWriter<'a> for HostWriter<L>
where
    L: HostLog + Clone + 'a,
{
    type Writer = HostLine<L>;

    fn make_writer(&'a self) -> Self::Writer {
        HostLine {
            log: self.log.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one event and emits it line by line when flushed or dropped
pub struct HostLine<L: HostLog> {
    log: L,
    buf: Vec<u8>,
}

impl<L: HostLog> HostLine<L> {
    fn emit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines().filter(|l| !l.is_empty()) {
            self.log.log(line);
        }
        self.buf.clear();
    }
}

impl<L: HostLog> io::Write for HostLine<L> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl<L: HostLog> Drop for HostLine<L> {
    fn drop(&mut self) {
        self.emit();
    }
}

/// Collects lines in memory
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemoryLog(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

#[cfg(test)]
impl MemoryLog {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.0.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl HostLog for MemoryLog {
    fn log(&self, message: &str) {
        if let Ok(mut lines) = self.0.lock() {
            lines.push(message.to_string());
        }
    }
}
