//! Capture of the diagnostics a toolchain reports during one
//! compilation.
//!
//! Every reported diagnostic is wrapped, at report time, with a capture
//! timestamp and a call-stack snapshot of the reporting thread, trimmed
//! down to the frames that matter to the test author.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use backtrace::Backtrace;

/// How severe a reported diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Other,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::Other => "other",
        })
    }
}

/// One message emitted by the toolchain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    severity: Severity,
    message: String,
    code: Option<String>,
    path: Option<PathBuf>,
    line: Option<u32>,
    column: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            code: None,
            path: None,
            line: None,
            column: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    /// Attach the toolchain's diagnostic code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the source position the diagnostic points at.
    pub fn at(mut self, path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        self.path = Some(path.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn column(&self) -> Option<u32> {
        self.column
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;

        if let (Some(path), Some(line)) = (&self.path, self.line) {
            write!(f, " ({}:{line}", path.display())?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

/// One frame of the call-stack snapshot attached to a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceFrame {
    symbol: String,
    file: Option<String>,
    line: Option<u32>,
}

impl TraceFrame {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    at {}", self.symbol)?;

        if let (Some(file), Some(line)) = (&self.file, self.line) {
            write!(f, " ({file}:{line})")?;
        }

        Ok(())
    }
}

/// One captured diagnostic: the payload, the capture timestamp in
/// nanoseconds since the Unix epoch, and the trimmed call-stack
/// snapshot of the reporting thread. Immutable once captured.
#[derive(Clone, Debug)]
pub struct DiagnosticRecord {
    diagnostic: Diagnostic,
    captured_at: u64,
    trace: Vec<TraceFrame>,
}

impl DiagnosticRecord {
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    pub fn severity(&self) -> Severity {
        self.diagnostic.severity()
    }

    pub fn message(&self) -> &str {
        self.diagnostic.message()
    }

    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }

    pub fn trace(&self) -> &[TraceFrame] {
        &self.trace
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic)?;

        for frame in &self.trace {
            write!(f, "\n{frame}")?;
        }

        Ok(())
    }
}

/// Decides where a call-stack snapshot stops: the first frame whose
/// symbol matches is cut off, together with everything below it. The
/// exact boundary between test code and runner internals depends on the
/// environment, hence a predicate instead of a fixed list.
pub type StopPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The default boundary: standard-library runtime frames and the test
/// runner.
pub fn default_stop_predicate() -> StopPredicate {
    Arc::new(|symbol| {
        symbol.starts_with("std::")
            || symbol.starts_with("core::ops::function")
            || symbol.starts_with("test::")
            || symbol.starts_with("__rust")
    })
}

/// The sink the toolchain reports diagnostics into.
///
/// `report` is safe to call from whatever thread the toolchain uses
/// internally; the rest of the harness stays single-threaded per
/// instance. Cloning shares the underlying log.
#[derive(Clone)]
pub struct DiagnosticSink {
    records: Arc<Mutex<Vec<DiagnosticRecord>>>,
    stop: StopPredicate,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::with_stop_predicate(default_stop_predicate())
    }

    pub fn with_stop_predicate(stop: StopPredicate) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            stop,
        }
    }

    /// Record `diagnostic` together with the current time and a trimmed
    /// call-stack snapshot of the calling thread.
    pub fn report(&self, diagnostic: Diagnostic) {
        let record = DiagnosticRecord {
            diagnostic,
            captured_at: now(),
            trace: self.capture_trace(),
        };

        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// A snapshot copy of every record captured so far, in report
    /// order. Never a live view, so reporting from another thread
    /// cannot invalidate an iteration.
    pub fn diagnostics(&self) -> Vec<DiagnosticRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capture_trace(&self) -> Vec<TraceFrame> {
        let backtrace = Backtrace::new();
        let mut frames = Vec::new();

        for frame in backtrace.frames() {
            for symbol in frame.symbols() {
                let Some(name) = symbol.name().map(|name| name.to_string()) else {
                    continue;
                };

                // Skip the capture-internal frames sitting above the
                // reporting call-site.
                if name.contains("backtrace::") || name.contains("DiagnosticSink") {
                    continue;
                }

                if (self.stop)(&name) {
                    // Call adapters may sit between the capture and the
                    // call-site; only cut once real frames exist.
                    if frames.is_empty() {
                        continue;
                    }
                    return frames;
                }

                frames.push(TraceFrame {
                    symbol: name,
                    file: symbol
                        .filename()
                        .map(|file| file.display().to_string()),
                    line: symbol.lineno(),
                });
            }
        }

        frames
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("records", &self.len())
            .finish()
    }
}

fn now() -> u64 {
    // SAFETY: the system clock is not expected to sit before `UNIX_EPOCH`.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_sink_is_empty() {
        let sink = DiagnosticSink::new();

        assert!(sink.is_empty());
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn records_keep_report_order() {
        let sink = DiagnosticSink::new();

        sink.report(Diagnostic::error("first"));
        sink.report(Diagnostic::warning("second"));
        sink.report(Diagnostic::note("third"));

        let records = sink.diagnostics();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records
                .iter()
                .map(DiagnosticRecord::message)
                .collect::<Vec<_>>(),
            vec!["first", "second", "third"],
        );
        assert_eq!(records[0].severity(), Severity::Error);
        assert!(
            records.windows(2).all(|w| w[0].captured_at() <= w[1].captured_at()),
            "single-threaded capture times are monotonic",
        );
    }

    #[test]
    fn records_carry_a_call_stack() {
        let sink = DiagnosticSink::new();
        sink.report(Diagnostic::error("boom"));

        let records = sink.diagnostics();
        assert!(
            !records[0].trace().is_empty(),
            "the snapshot reaches the reporting test frame",
        );
        assert!(
            records[0]
                .trace()
                .iter()
                .all(|frame| !frame.symbol().contains("DiagnosticSink")),
            "capture-internal frames are trimmed",
        );
    }

    #[test]
    fn diagnostics_returns_a_snapshot() {
        let sink = DiagnosticSink::new();
        sink.report(Diagnostic::error("first"));

        let snapshot = sink.diagnostics();
        sink.report(Diagnostic::error("second"));

        assert_eq!(snapshot.len(), 1, "an earlier snapshot does not grow");
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn reporting_is_thread_safe() {
        let sink = DiagnosticSink::new();

        std::thread::scope(|scope| {
            for nth in 0..4 {
                let sink = sink.clone();
                scope.spawn(move || {
                    for i in 0..25 {
                        sink.report(Diagnostic::note(format!("{nth}:{i}")));
                    }
                });
            }
        });

        assert_eq!(sink.len(), 100, "every report from every thread landed");
    }

    #[test]
    fn rendering() {
        let diagnostic = Diagnostic::error("cannot find symbol")
            .with_code("compiler.err.cant.resolve")
            .at("/sources/com/example/Hello.java", 3, 14);

        assert_eq!(
            diagnostic.to_string(),
            "error: cannot find symbol (/sources/com/example/Hello.java:3:14)",
        );
        assert_eq!(diagnostic.code(), Some("compiler.err.cant.resolve"));

        let frame = TraceFrame {
            symbol: "my_test::case".into(),
            file: Some("tests/case.rs".into()),
            line: Some(42),
        };
        assert_eq!(frame.to_string(), "    at my_test::case (tests/case.rs:42)");
    }
}
