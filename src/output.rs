//! Output consumers: sinks for container stdout/stderr.
//!
//! When a container is built with an output consumer, its log stream is
//! followed from start until disposal and every chunk is forwarded to the
//! sink. The default is to consume nothing.

use std::sync::Mutex;
use tracing::debug;

/// A sink receiving a container's stdout and stderr.
pub trait OutputConsumer: Send + Sync + 'static {
    /// Called for every stdout chunk.
    fn on_stdout(&self, chunk: &str);

    /// Called for every stderr chunk.
    fn on_stderr(&self, chunk: &str);
}

impl<T: OutputConsumer> OutputConsumer for std::sync::Arc<T> {
    fn on_stdout(&self, chunk: &str) {
        (**self).on_stdout(chunk);
    }

    fn on_stderr(&self, chunk: &str) {
        (**self).on_stderr(chunk);
    }
}

/// Drops all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardConsumer;

impl OutputConsumer for DiscardConsumer {
    fn on_stdout(&self, _chunk: &str) {}
    fn on_stderr(&self, _chunk: &str) {}
}

/// Forwards output to `tracing` at debug level, prefixed with the container
/// name.
#[derive(Debug)]
pub struct TracingConsumer {
    name: String,
}

impl TracingConsumer {
    /// Create a consumer logging under the given container name.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into() }
    }
}

impl OutputConsumer for TracingConsumer {
    fn on_stdout(&self, chunk: &str) {
        debug!("[{}] {}", self.name, chunk.trim_end());
    }

    fn on_stderr(&self, chunk: &str) {
        debug!("[{}!] {}", self.name, chunk.trim_end());
    }
}

/// Buffers output in memory for later inspection, mainly from tests.
#[derive(Debug, Default)]
pub struct BufferConsumer {
    stdout: Mutex<String>,
    stderr: Mutex<String>,
}

impl BufferConsumer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received on stdout so far.
    pub fn stdout(&self) -> String {
        self.stdout.lock().expect("buffer lock poisoned").clone()
    }

    /// Everything received on stderr so far.
    pub fn stderr(&self) -> String {
        self.stderr.lock().expect("buffer lock poisoned").clone()
    }
}

impl OutputConsumer for BufferConsumer {
    fn on_stdout(&self, chunk: &str) {
        self.stdout.lock().expect("buffer lock poisoned").push_str(chunk);
    }

    fn on_stderr(&self, chunk: &str) {
        self.stderr.lock().expect("buffer lock poisoned").push_str(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_consumer_accumulates() {
        let buffer = BufferConsumer::new();
        buffer.on_stdout("ready\n");
        buffer.on_stdout("accepting connections\n");
        buffer.on_stderr("warning\n");

        assert_eq!(buffer.stdout(), "ready\naccepting connections\n");
        assert_eq!(buffer.stderr(), "warning\n");
    }
}
