//! Buffered diagnostic output
//!
//! Lines are appended to an in-memory buffer and written out when the buffer
//! reaches `flush_threshold` bytes, when the periodic flush task fires, or on
//! an explicit [`LogSink::flush`] / [`LogSink::stop`]. The sink doubles as the
//! writer behind the process-wide `tracing` subscriber, so hot-path logging
//! never waits on stdout.

use std::io::{self, Write};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSinkConfig {
    pub flush_threshold: usize,
    pub flush_interval: Duration,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 4096,
            flush_interval: Duration::from_millis(250),
        }
    }
}

struct Buffer {
    pending: Vec<u8>,
    out: Box<dyn Write + Send>,
}

impl Buffer {
    fn drain(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        // Diagnostics are best-effort; a failing sink must not take the
        // session down with it.
        let _ = self.out.write_all(&self.pending);
        let _ = self.out.flush();
        self.pending.clear();
    }
}

struct Inner {
    config: LogSinkConfig,
    buffer: Mutex<Buffer>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn append(&self, bytes: &[u8]) {
        let mut buffer = self.buffer.lock();
        buffer.pending.extend_from_slice(bytes);
        if buffer.pending.len() >= self.config.flush_threshold {
            buffer.drain();
        }
    }

    fn flush(&self) {
        self.buffer.lock().drain();
    }
}

#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl LogSink {
    /// Create a sink writing to `out` and start its periodic flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<W>(out: W, config: LogSinkConfig) -> Self
    where
        W: Write + Send + 'static,
    {
        let inner = Arc::new(Inner {
            config,
            buffer: Mutex::new(Buffer {
                pending: Vec::with_capacity(config.flush_threshold),
                out: Box::new(out),
            }),
            ticker: Mutex::new(None),
        });

        let handle = tokio::spawn(periodic_flush(Arc::downgrade(&inner), config.flush_interval));
        *inner.ticker.lock() = Some(handle);

        Self { inner }
    }

    pub fn stdout(config: LogSinkConfig) -> Self {
        Self::new(io::stdout(), config)
    }

    /// Append one timestamped line.
    pub fn write(&self, text: &str) {
        let line = format!(
            "[{}] {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            text
        );
        self.inner.append(line.as_bytes());
    }

    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Stop the periodic flush task and write out everything still buffered.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.ticker.lock().take() {
            handle.abort();
        }
        self.inner.flush();
    }
}

async fn periodic_flush(inner: Weak<Inner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match inner.upgrade() {
            Some(inner) => inner.flush(),
            None => return,
        }
    }
}

/// `tracing` writer handle; each formatted event is appended verbatim.
pub struct SinkWriter<'a> {
    inner: &'a Inner,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter { inner: &self.inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sink(threshold: usize, interval: Duration) -> (LogSink, Captured) {
        let out = Captured::default();
        let sink = LogSink::new(
            out.clone(),
            LogSinkConfig {
                flush_threshold: threshold,
                flush_interval: interval,
            },
        );
        (sink, out)
    }

    #[tokio::test]
    async fn test_lines_are_buffered_until_flush() {
        let (sink, out) = sink(4096, Duration::from_secs(3600));
        sink.write("hello");
        assert!(out.text().is_empty());

        sink.flush();
        let text = out.text();
        assert!(text.starts_with('['));
        assert!(text.ends_with("] hello\n"));
        sink.stop();
    }

    #[tokio::test]
    async fn test_threshold_triggers_immediate_flush() {
        let (sink, out) = sink(64, Duration::from_secs(3600));
        sink.write("short");
        assert!(out.text().is_empty());

        sink.write("a line long enough to push the buffer over its threshold");
        let text = out.text();
        assert!(text.contains("short"));
        assert!(text.contains("over its threshold"));
        sink.stop();
    }

    #[tokio::test]
    async fn test_stop_writes_every_line_exactly_once() {
        let (sink, out) = sink(128, Duration::from_secs(3600));
        for i in 0..50 {
            sink.write(&format!("line-{i:03}"));
        }
        sink.stop();

        let text = out.text();
        for i in 0..50 {
            assert_eq!(text.matches(&format!("line-{i:03}\n")).count(), 1);
        }
        assert_eq!(text.lines().count(), 50);

        // A second stop has nothing left to write.
        sink.stop();
        assert_eq!(out.text(), text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush() {
        let (sink, out) = sink(4096, Duration::from_millis(250));
        sink.write("tick");
        assert!(out.text().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(out.text().contains("tick"));
        sink.stop();
    }

    #[tokio::test]
    async fn test_tracing_writer_appends_raw_bytes() {
        let (sink, out) = sink(4096, Duration::from_secs(3600));
        let mut writer = sink.make_writer();
        writer.write_all(b"formatted event\n").unwrap();
        sink.stop();
        assert_eq!(out.text(), "formatted event\n");
    }
}
