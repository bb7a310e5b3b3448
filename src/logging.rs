use std::sync::Arc;

use chrono::Local;

/// A push-style log sink injected into the orchestrator and its
/// components. Plain `Fn(&str)` rather than a `log`/`tracing` subscriber
/// because callers (the scheduler, a future GUI shell) want the exact
/// formatted lines, not a structured record they'd have to re-render.
#[derive(Clone)]
pub struct LogSink {
    sink: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self { sink: Arc::new(f) }
    }

    /// Default sink: stdout, teacher's emoji-prefixed style.
    pub fn stdout() -> Self {
        Self::new(|line| println!("{line}"))
    }

    pub fn info(&self, msg: &str) {
        self.emit("[INFO]", msg);
    }

    pub fn ok(&self, msg: &str) {
        self.emit("✓", msg);
    }

    pub fn warn(&self, msg: &str) {
        self.emit("⚠️", msg);
    }

    pub fn error(&self, msg: &str) {
        self.emit("✗", msg);
    }

    fn emit(&self, prefix: &str, msg: &str) {
        let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%:z");
        (self.sink)(&format!("{ts} {prefix} {msg}"));
    }

    /// Progress-prefixed variant: `[<pct>% - <completed>/<total>] <msg>`.
    pub fn progress(&self, completed: usize, total: usize, msg: &str) {
        let pct = if total == 0 {
            100
        } else {
            (completed * 100) / total
        };
        let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%:z");
        (self.sink)(&format!(
            "{ts} [{pct}% - {completed}/{total}] {msg}"
        ));
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::stdout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn custom_sink_receives_formatted_lines() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let sink = LogSink::new(move |line| captured_clone.lock().unwrap().push(line.to_string()));

        sink.info("starting up");
        sink.progress(2, 4, "table users synced");

        let lines = captured.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[INFO] starting up"));
        assert!(lines[1].contains("[50% - 2/4] table users synced"));
    }

    #[test]
    fn progress_with_zero_total_reports_full() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let sink = LogSink::new(move |line| captured_clone.lock().unwrap().push(line.to_string()));
        sink.progress(0, 0, "nothing to do");
        let lines = captured.lock().unwrap();
        assert!(lines[0].contains("[100% - 0/0]"));
    }
}
