use std::io::{self, Write as _};

use crate::error::{RexxError, RunResult};

/// Trait for receiving SAY and TRACE output from a running program.
///
/// Implement this trait to capture or redirect output. The default
/// implementation `StdSink` writes to stdout.
pub trait OutputSink {
    /// Writes text without a trailing newline.
    fn write(&mut self, text: &str) -> RunResult<()>;

    /// Writes one line of output, terminating it with a newline.
    fn write_line(&mut self, text: &str) -> RunResult<()> {
        self.write(text)?;
        self.write("\n")
    }

    /// Writes diagnostic text to the error channel.
    fn write_error(&mut self, text: &str) -> RunResult<()>;

    /// Legacy entry point kept for hosts that predate `write_line`.
    fn output(&mut self, text: &str) -> RunResult<()> {
        self.write_line(text)
    }
}

/// Default `OutputSink` backed by the process stdout and stderr.
///
/// Every SAY line goes out under a single stream lock and is flushed before
/// the engine advances, so output stays interleaved correctly with anything
/// the host writes between instructions. Write failures surface as host
/// errors and can be trapped like any other.
#[derive(Debug, Default)]
pub struct StdSink;

fn stdout_failed(e: &io::Error) -> RexxError {
    RexxError::host(format!("stdout write failed: {e}"))
}

impl OutputSink for StdSink {
    fn write(&mut self, text: &str) -> RunResult<()> {
        io::stdout()
            .lock()
            .write_all(text.as_bytes())
            .map_err(|e| stdout_failed(&e))
    }

    fn write_line(&mut self, text: &str) -> RunResult<()> {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .and_then(|()| stdout.write_all(b"\n"))
            .and_then(|()| stdout.flush())
            .map_err(|e| stdout_failed(&e))
    }

    fn write_error(&mut self, text: &str) -> RunResult<()> {
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(text.as_bytes())
            .and_then(|()| stderr.write_all(b"\n"))
            .map_err(|e| RexxError::host(format!("stderr write failed: {e}")))
    }
}

/// An `OutputSink` that collects all output into strings.
///
/// Useful for testing or capturing SAY output programmatically.
#[derive(Debug, Default)]
pub struct CollectSink {
    output: String,
    errors: String,
}

impl CollectSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected stdout text.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// The collected stdout text split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.output.lines().collect()
    }

    /// The collected error-channel text.
    #[must_use]
    pub fn errors(&self) -> &str {
        &self.errors
    }

    /// Consumes the sink and returns the collected stdout text.
    #[must_use]
    pub fn into_output(self) -> String {
        self.output
    }
}

impl OutputSink for CollectSink {
    fn write(&mut self, text: &str) -> RunResult<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn write_error(&mut self, text: &str) -> RunResult<()> {
        self.errors.push_str(text);
        self.errors.push('\n');
        Ok(())
    }
}

/// `OutputSink` that ignores all output.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _text: &str) -> RunResult<()> {
        Ok(())
    }

    fn write_error(&mut self, _text: &str) -> RunResult<()> {
        Ok(())
    }
}
