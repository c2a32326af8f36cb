//! Exit-code sentinel protocol over a line stream.
//!
//! The remote side ends command output with a line starting with
//! [`EXIT_CODE_PREFIX`]; the code is everything after the first `:`.

use std::fmt;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Prefix of the line carrying the exit code.
pub const EXIT_CODE_PREFIX: &str = "__KOMODO_EXIT_CODE";

/// Finish value when output ends without an exit code line.
pub const EARLY_EXIT: &str = "Early exit without code";

/// How a one-shot execution finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitSignal {
    /// Exit code text, as reported.
    Code(String),
    /// Output ended without an exit code line.
    EarlyExit,
}

impl ExitSignal {
    /// Parse a sentinel line. Returns `None` for ordinary output.
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        if !line.starts_with(EXIT_CODE_PREFIX) {
            return None;
        }
        let code = line.split_once(':').map_or("", |(_, code)| code);
        Some(Self::Code(code.to_string()))
    }

    /// Code text, or [`EARLY_EXIT`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Code(code) => code,
            Self::EarlyExit => EARLY_EXIT,
        }
    }

    /// Numeric exit code, if one was reported and parses.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Code(code) => code.trim().parse().ok(),
            Self::EarlyExit => None,
        }
    }

    /// Exit code `0` was reported.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives command output.
///
/// Both callbacks may suspend; the next line is not read until they return.
#[async_trait]
pub trait OutputHandler: Send {
    /// One output line, in stream order.
    async fn on_line(&mut self, line: String);

    /// Called exactly once, after the last `on_line`.
    async fn on_finish(&mut self, exit: ExitSignal);
}

/// Handler buffering all output in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutput {
    pub lines: Vec<String>,
    pub exit: Option<ExitSignal>,
}

#[async_trait]
impl OutputHandler for CollectOutput {
    async fn on_line(&mut self, line: String) {
        self.lines.push(line);
    }

    async fn on_finish(&mut self, exit: ExitSignal) {
        self.exit = Some(exit);
    }
}

/// Feed `lines` to `handler` until the sentinel line or end of stream.
///
/// Lines after the sentinel are never read. A stream error is returned
/// as-is and `on_finish` is not called.
///
/// # Errors
/// Returns the first error yielded by `lines`.
pub async fn follow_output<S, E, H>(mut lines: S, handler: &mut H) -> Result<ExitSignal, E>
where
    S: Stream<Item = Result<String, E>> + Unpin,
    H: OutputHandler + ?Sized,
{
    while let Some(line) = lines.next().await {
        let line = line?;
        if let Some(exit) = ExitSignal::from_line(&line) {
            handler.on_finish(exit.clone()).await;
            return Ok(exit);
        }
        handler.on_line(line).await;
    }
    handler.on_finish(ExitSignal::EarlyExit).await;
    Ok(ExitSignal::EarlyExit)
}
