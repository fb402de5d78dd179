//! Plain-text progress reporting

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use turboretry_core::TelemetryError;
use turboretry_core::stats::StatisticsSnapshot;
use turboretry_core::telemetry::{EventKind, TelemetryEvent, TelemetrySink};

/// [`TelemetrySink`] that writes one line per event.
///
/// Output goes to stdout by default or to any writer. Write failures are
/// returned to the executor, which discards them.
pub struct ConsoleReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    /// Report to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Report to `writer`.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    /// Write a statistics summary.
    pub fn summary(&self, stats: &StatisticsSnapshot) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(
            out,
            "requests: {}  succeeded: {}  failed: {}  cancelled: {}  retries: {}",
            stats.total_invocations,
            stats.eventual_successes,
            stats.eventual_failures,
            stats.eventual_cancellations,
            stats.retries_performed,
        )?;
        if let Some(rate) = stats.success_rate() {
            writeln!(out, "success rate: {:.1}%", rate * 100.0)?;
        }
        out.flush()
    }

    fn format(event: &TelemetryEvent) -> String {
        let attempt = event.attempt.unwrap_or(0);
        match event.kind {
            EventKind::Retry => format!(
                "[retry]   attempt {attempt} failed: {} (waiting {}ms)",
                event.message,
                event.delay_ms.unwrap_or(0)
            ),
            EventKind::Success => format!("[ok]      {}", event.message),
            EventKind::Failure => format!("[failed]  attempt {attempt}: {}", event.message),
            EventKind::Cancelled => format!("[stopped] {}", event.message),
        }
    }
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter").finish_non_exhaustive()
    }
}

impl TelemetrySink for ConsoleReporter {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", Self::format(event))?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    /// Writer whose contents stay readable after being handed to the reporter.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reports_one_line_per_event() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(buffer.clone());

        reporter
            .on_retry(1, "connection refused", Duration::from_secs(1))
            .unwrap();
        reporter.on_success(2).unwrap();

        let output = buffer.contents();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[retry]   attempt 1 failed: connection refused (waiting 1000ms)",
                "[ok]      succeeded on attempt 2",
            ]
        );
    }

    #[test]
    fn test_write_failure_surfaces_as_telemetry_error() {
        let reporter = ConsoleReporter::new(BrokenPipe);
        assert!(matches!(
            reporter.on_failure(3, "boom"),
            Err(TelemetryError::Io(_))
        ));
    }

    #[test]
    fn test_summary() {
        let buffer = SharedBuffer::default();
        let reporter = ConsoleReporter::new(buffer.clone());
        let stats = StatisticsSnapshot {
            total_invocations: 4,
            eventual_successes: 3,
            retries_performed: 5,
            eventual_failures: 1,
            eventual_cancellations: 0,
        };

        reporter.summary(&stats).unwrap();

        let output = buffer.contents();
        assert!(output.contains("requests: 4"));
        assert!(output.contains("success rate: 75.0%"));
    }
}
