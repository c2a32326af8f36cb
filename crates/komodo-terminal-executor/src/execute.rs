//! One-shot command execution over chunked HTTP responses.

use std::sync::Arc;

use futures::TryStreamExt;
use komodo_terminal_core::{ClientConfig, CredentialSource, LineStream, lines};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    http::{BoxError, ByteStream, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport},
    sentinel::{ExitSignal, OutputHandler, follow_output},
};

/// Status reported when no HTTP status was received.
pub const REQUEST_FAILED_STATUS: u16 = 1;

/// Structured error body returned by the server on non-200 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Top-level error message.
    pub error: String,
    /// Cause chain, outermost first.
    #[serde(default)]
    pub trace: Vec<String>,
}

impl ErrorBody {
    fn new(error: impl Into<String>, trace: Vec<String>) -> Self {
        Self {
            error: error.into(),
            trace,
        }
    }
}

/// Execution error.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// No response at all.
    #[error("Request failed: {0}")]
    Request(#[source] BoxError),
    /// Non-200 with a structured error body.
    #[error("HTTP {status}: {}", body.error)]
    Status { status: u16, body: ErrorBody },
    /// Non-200 whose body could not be read as an error body.
    #[error("HTTP {status}: failed to decode error body: {reason}")]
    BodyDecode { status: u16, reason: String },
    /// 200 without a body.
    #[error("No response body")]
    NoResponseBody,
    /// The body broke off while streaming lines.
    #[error("Response stream failed: {0}")]
    Stream(#[source] BoxError),
    #[error("Failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ExecuteError {
    /// HTTP status, or [`REQUEST_FAILED_STATUS`] when none was received.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Status { status, .. } | Self::BodyDecode { status, .. } => *status,
            Self::NoResponseBody => 200,
            Self::Request(_) | Self::Stream(_) | Self::Serialize(_) | Self::Url(_) => {
                REQUEST_FAILED_STATUS
            }
        }
    }

    /// The `{error, trace}` result describing this failure.
    #[must_use]
    pub fn result(&self) -> ErrorBody {
        match self {
            Self::Status { body, .. } => body.clone(),
            Self::BodyDecode { reason, .. } => {
                ErrorBody::new("Failed to get response body", vec![reason.clone()])
            }
            Self::NoResponseBody => ErrorBody::new("No response body", Vec::new()),
            Self::Request(e) => ErrorBody::new("Request failed", vec![e.to_string()]),
            Self::Stream(e) => ErrorBody::new("Response stream failed", vec![e.to_string()]),
            Self::Serialize(e) => ErrorBody::new("Failed to serialize request", vec![e.to_string()]),
            Self::Url(e) => ErrorBody::new("Invalid URL", vec![e.to_string()]),
        }
    }
}

/// Issues one-shot execution requests under one base URL.
#[derive(Clone)]
pub struct ExecuteRequester {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
    http: Arc<dyn HttpTransport>,
}

impl ExecuteRequester {
    /// Requester posting through `http`.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            http,
        }
    }

    /// Requester using a default `reqwest` client.
    #[must_use]
    pub fn with_reqwest(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::new(config, credentials, Arc::new(ReqwestTransport::new()))
    }

    /// POST `request` to `path` and stream the response body as lines.
    ///
    /// # Errors
    /// Returns error on transport failure, on any non-200 status and when a
    /// 200 response carries no body.
    pub async fn execute_stream<T>(
        &self,
        path: &str,
        request: &T,
    ) -> Result<LineStream<ExecuteError>, ExecuteError>
    where
        T: Serialize + ?Sized,
    {
        let execution_id = Uuid::new_v4();
        let url = self.config.http_url(path)?;
        let body = serde_json::to_vec(request)?;

        let mut headers = vec![("content-type", "application/json".to_string())];
        match self.credentials.credentials() {
            Some(credentials) => headers.extend(credentials.headers()),
            None => tracing::debug!(%execution_id, "No credentials held, sending without auth"),
        }

        tracing::debug!(%execution_id, url = %url, "Sending execute request");
        let response = self
            .http
            .post(HttpRequest { url, headers, body })
            .await
            .map_err(|e| {
                tracing::error!(%execution_id, "Execute request failed: {e}");
                ExecuteError::Request(e)
            })?;

        let HttpResponse { status, body } = response;
        if status != 200 {
            let error = error_from_body(status, body).await;
            tracing::debug!(%execution_id, status, "Execute request rejected: {error}");
            return Err(error);
        }
        let body = body.ok_or(ExecuteError::NoResponseBody)?;
        Ok(lines(body.map_err(ExecuteError::Stream)))
    }

    /// Run a command, delivering each output line and then the exit signal.
    ///
    /// # Errors
    /// Returns the errors of [`Self::execute_stream`], and
    /// [`ExecuteError::Stream`] if the body breaks off before the exit code.
    pub async fn execute<T, H>(
        &self,
        path: &str,
        request: &T,
        handler: &mut H,
    ) -> Result<ExitSignal, ExecuteError>
    where
        T: Serialize + ?Sized,
        H: OutputHandler + ?Sized,
    {
        let lines = self.execute_stream(path, request).await?;
        follow_output(lines, handler).await
    }
}

async fn error_from_body(status: u16, body: Option<ByteStream>) -> ExecuteError {
    let Some(body) = body else {
        return ExecuteError::BodyDecode {
            status,
            reason: "No response body".to_string(),
        };
    };
    let bytes = match body
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            return ExecuteError::BodyDecode {
                status,
                reason: e.to_string(),
            };
        }
    };
    match serde_json::from_slice::<ErrorBody>(&bytes) {
        Ok(body) => ExecuteError::Status { status, body },
        Err(e) => {
            tracing::warn!(status, "Undecodable error body: {e}");
            ExecuteError::BodyDecode {
                status,
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{StreamExt, stream};
    use komodo_terminal_core::AuthState;

    use super::*;
    use crate::sentinel::CollectOutput;

    /// Scripted transport: replays one response and records requests.
    struct Scripted {
        status: u16,
        chunks: Option<Vec<Result<&'static str, &'static str>>>,
        unreachable: bool,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn ok(chunks: Vec<&'static str>) -> Self {
            Self::status(200, Some(chunks.into_iter().map(Ok).collect()))
        }

        fn status(status: u16, chunks: Option<Vec<Result<&'static str, &'static str>>>) -> Self {
            Self {
                status,
                chunks,
                unreachable: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn post(&self, request: HttpRequest) -> Result<HttpResponse, BoxError> {
            self.seen.lock().unwrap().push(request);
            if self.unreachable {
                return Err("connection refused".into());
            }
            let body = self.chunks.clone().map(|chunks| {
                stream::iter(chunks.into_iter().map(|chunk| {
                    chunk
                        .map(|s| Bytes::from_static(s.as_bytes()))
                        .map_err(|e| BoxError::from(e.to_string()))
                }))
                .boxed()
            });
            Ok(HttpResponse {
                status: self.status,
                body,
            })
        }
    }

    fn requester(http: Arc<Scripted>, auth: AuthState) -> ExecuteRequester {
        let config = ClientConfig::new("https://komodo.example.com").unwrap();
        ExecuteRequester::new(config, Arc::new(auth), http)
    }

    #[tokio::test]
    async fn test_execute_delivers_lines_then_code() {
        let http = Arc::new(Scripted::ok(vec![
            "hello\nwor",
            "ld\n__KOMODO_EX",
            "IT_CODE:7\n",
            "ignored\n",
        ]));
        let requester = requester(Arc::clone(&http), AuthState::jwt("token"));
        let mut output = CollectOutput::default();
        let exit = requester
            .execute("/terminal/execute", &serde_json::json!({ "command": "ls" }), &mut output)
            .await
            .unwrap();

        assert_eq!(exit, ExitSignal::Code("7".into()));
        assert_eq!(output.lines, vec!["hello", "world"]);
        assert_eq!(output.exit, Some(ExitSignal::Code("7".into())));

        let request = http.last_request();
        assert_eq!(
            request.url.as_str(),
            "https://komodo.example.com/terminal/execute"
        );
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body, br#"{"command":"ls"}"#);
    }

    #[tokio::test]
    async fn test_early_exit_without_sentinel() {
        let http = Arc::new(Scripted::ok(vec!["a\nb"]));
        let mut output = CollectOutput::default();
        let exit = requester(http, AuthState::jwt("token"))
            .execute("/terminal/execute", &(), &mut output)
            .await
            .unwrap();
        assert_eq!(exit, ExitSignal::EarlyExit);
        assert_eq!(output.lines, vec!["a", "b"]);
        assert_eq!(output.exit.unwrap().as_str(), "Early exit without code");
    }

    #[tokio::test]
    async fn test_jwt_header_wins() {
        let http = Arc::new(Scripted::ok(vec![]));
        let auth = AuthState {
            jwt: Some("token".into()),
            ..AuthState::api_keys("k", "s")
        };
        requester(Arc::clone(&http), auth)
            .execute_stream("/terminal/execute", &())
            .await
            .unwrap();
        let request = http.last_request();
        assert_eq!(request.header("authorization"), Some("token"));
        assert_eq!(request.header("x-api-key"), None);
        assert_eq!(request.header("x-api-secret"), None);
    }

    #[tokio::test]
    async fn test_api_key_headers_and_no_auth() {
        let http = Arc::new(Scripted::ok(vec![]));
        requester(Arc::clone(&http), AuthState::api_keys("k", "s"))
            .execute_stream("/terminal/execute", &())
            .await
            .unwrap();
        let request = http.last_request();
        assert_eq!(request.header("x-api-key"), Some("k"));
        assert_eq!(request.header("x-api-secret"), Some("s"));
        assert_eq!(request.header("authorization"), None);

        requester(Arc::clone(&http), AuthState::default())
            .execute_stream("/terminal/execute", &())
            .await
            .unwrap();
        let request = http.last_request();
        assert_eq!(request.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_status_error_with_structured_body() {
        let http = Arc::new(Scripted::status(
            403,
            Some(vec![Ok(r#"{"error":"de"#), Ok(r#"nied","trace":[]}"#)]),
        ));
        let Err(error) = requester(http, AuthState::jwt("token"))
            .execute_stream("/terminal/execute", &())
            .await
        else {
            panic!("expected rejection");
        };
        assert_eq!(error.status(), 403);
        assert_eq!(
            error.result(),
            ErrorBody {
                error: "denied".into(),
                trace: Vec::new()
            }
        );
        assert!(matches!(error, ExecuteError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_status_error_with_garbage_body() {
        let http = Arc::new(Scripted::status(502, Some(vec![Ok("<html>bad gateway")])));
        let Err(error) = requester(http, AuthState::jwt("token"))
            .execute_stream("/terminal/execute", &())
            .await
        else {
            panic!("expected rejection");
        };
        assert!(matches!(error, ExecuteError::BodyDecode { status: 502, .. }));
        let result = error.result();
        assert_eq!(result.error, "Failed to get response body");
        assert_eq!(result.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_body_is_an_error() {
        let http = Arc::new(Scripted::status(200, None));
        let result = requester(http, AuthState::jwt("token"))
            .execute_stream("/terminal/execute", &())
            .await;
        let Err(error) = result else {
            panic!("expected rejection");
        };
        assert!(matches!(error, ExecuteError::NoResponseBody));
        assert_eq!(error.status(), 200);
    }

    #[tokio::test]
    async fn test_transport_failure_reports_status_one() {
        let http = Arc::new(Scripted {
            unreachable: true,
            ..Scripted::ok(vec![])
        });
        let Err(error) = requester(http, AuthState::jwt("token"))
            .execute_stream("/terminal/execute", &())
            .await
        else {
            panic!("expected rejection");
        };
        assert!(matches!(error, ExecuteError::Request(_)));
        assert_eq!(error.status(), REQUEST_FAILED_STATUS);
        assert_eq!(error.result().trace, vec!["connection refused"]);
    }

    #[tokio::test]
    async fn test_body_failure_mid_stream() {
        let http = Arc::new(Scripted::status(
            200,
            Some(vec![Ok("partial\nout"), Err("connection reset")]),
        ));
        let mut output = CollectOutput::default();
        let result = requester(http, AuthState::jwt("token"))
            .execute("/terminal/execute", &(), &mut output)
            .await;
        assert!(matches!(result, Err(ExecuteError::Stream(_))));
        assert_eq!(output.lines, vec!["partial"]);
        assert!(output.exit.is_none());
    }
}
