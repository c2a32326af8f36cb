//! One-shot command execution for Komodo terminals.
//!
//! Provides:
//! - HTTP transport seam with a `reqwest` implementation
//! - Line-streamed execute requests and their error taxonomy
//! - Exit-code sentinel protocol and output handlers

pub mod execute;
pub mod http;
pub mod sentinel;

pub use execute::{ErrorBody, ExecuteError, ExecuteRequester, REQUEST_FAILED_STATUS};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use sentinel::{
    CollectOutput, EARLY_EXIT, EXIT_CODE_PREFIX, ExitSignal, OutputHandler, follow_output,
};
