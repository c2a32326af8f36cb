//! Per-target entry points over the duplex connector and execute requester.

use std::sync::Arc;

use komodo_terminal_core::{
    ClientConfig, CredentialSource, ExecBody, ExecQuery, LineStream,
    target::{
        ConnectContainerExecQuery, ConnectDeploymentExecQuery, ConnectStackExecQuery,
        ConnectTerminalQuery, ExecuteContainerExecBody, ExecuteDeploymentExecBody,
        ExecuteStackExecBody, ExecuteTerminalBody, TERMINAL_EXECUTE_PATH, TERMINAL_WS_PATH,
        query_pairs,
    },
};
use komodo_terminal_executor::{
    ExecuteError, ExecuteRequester, ExitSignal, HttpTransport, OutputHandler, ReqwestTransport,
};
use komodo_terminal_transport::{ChannelError, DuplexChannel, DuplexConnector};

/// Client error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Terminal client for one API base URL.
///
/// Plain terminals use `/ws/terminal` and `/terminal/execute` with the
/// query or body as-is. Containers, deployments and stacks are routed by
/// target type to `/ws/<type>/terminal` and `/terminal/execute/<type>`.
#[derive(Clone)]
pub struct TerminalClient {
    duplex: DuplexConnector,
    requester: ExecuteRequester,
}

impl TerminalClient {
    /// Client using a default `reqwest` transport.
    #[must_use]
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_transport(config, credentials, Arc::new(ReqwestTransport::new()))
    }

    /// Client sending one-shot requests through `http`.
    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            duplex: DuplexConnector::new(config.clone(), Arc::clone(&credentials)),
            requester: ExecuteRequester::new(config, credentials, http),
        }
    }

    // Duplex

    /// Open a server terminal.
    ///
    /// # Errors
    /// Returns error if the query cannot be encoded or the channel cannot
    /// be opened.
    pub async fn connect_terminal(
        &self,
        query: &ConnectTerminalQuery,
    ) -> Result<DuplexChannel, ClientError> {
        let pairs = query_pairs(query).map_err(ChannelError::from)?;
        tracing::debug!(server = %query.server, terminal = %query.terminal, "Connecting terminal");
        Ok(self.duplex.connect(TERMINAL_WS_PATH, &pairs).await?)
    }

    /// Open an exec session on any wrapped target.
    ///
    /// # Errors
    /// Returns error if the query cannot be encoded or the channel cannot
    /// be opened.
    pub async fn connect_exec(&self, query: ExecQuery) -> Result<DuplexChannel, ClientError> {
        let kind = query.kind();
        let pairs = query.query_pairs().map_err(ChannelError::from)?;
        tracing::debug!(target_type = kind.as_str(), "Connecting exec session");
        Ok(self.duplex.connect(&kind.ws_path(), &pairs).await?)
    }

    /// # Errors
    /// See [`Self::connect_exec`].
    pub async fn connect_container(
        &self,
        query: ConnectContainerExecQuery,
    ) -> Result<DuplexChannel, ClientError> {
        self.connect_exec(ExecQuery::Container(query)).await
    }

    /// # Errors
    /// See [`Self::connect_exec`].
    pub async fn connect_deployment(
        &self,
        query: ConnectDeploymentExecQuery,
    ) -> Result<DuplexChannel, ClientError> {
        self.connect_exec(ExecQuery::Deployment(query)).await
    }

    /// # Errors
    /// See [`Self::connect_exec`].
    pub async fn connect_stack(
        &self,
        query: ConnectStackExecQuery,
    ) -> Result<DuplexChannel, ClientError> {
        self.connect_exec(ExecQuery::Stack(query)).await
    }

    // One-shot

    /// Run a command on a server terminal, streaming raw output lines.
    ///
    /// The exit code line is part of the stream; see [`Self::execute_terminal`].
    ///
    /// # Errors
    /// Returns error if the request is rejected.
    pub async fn execute_terminal_stream(
        &self,
        body: &ExecuteTerminalBody,
    ) -> Result<LineStream<ExecuteError>, ClientError> {
        Ok(self
            .requester
            .execute_stream(TERMINAL_EXECUTE_PATH, body)
            .await?)
    }

    /// Run a command on a server terminal.
    ///
    /// # Errors
    /// Returns error if the request is rejected or the output breaks off.
    pub async fn execute_terminal<H>(
        &self,
        body: &ExecuteTerminalBody,
        handler: &mut H,
    ) -> Result<ExitSignal, ClientError>
    where
        H: OutputHandler + ?Sized,
    {
        Ok(self
            .requester
            .execute(TERMINAL_EXECUTE_PATH, body, handler)
            .await?)
    }

    /// Run a command on any wrapped target, streaming raw output lines.
    ///
    /// # Errors
    /// Returns error if the body cannot be serialized or the request is
    /// rejected.
    pub async fn execute_exec_stream(
        &self,
        body: ExecBody,
    ) -> Result<LineStream<ExecuteError>, ClientError> {
        let path = body.kind().execute_path();
        let payload = body.payload().map_err(ExecuteError::from)?;
        Ok(self.requester.execute_stream(&path, &payload).await?)
    }

    /// Run a command on any wrapped target.
    ///
    /// # Errors
    /// Returns error if the body cannot be serialized, the request is
    /// rejected or the output breaks off.
    pub async fn execute_exec<H>(
        &self,
        body: ExecBody,
        handler: &mut H,
    ) -> Result<ExitSignal, ClientError>
    where
        H: OutputHandler + ?Sized,
    {
        let path = body.kind().execute_path();
        let payload = body.payload().map_err(ExecuteError::from)?;
        Ok(self.requester.execute(&path, &payload, handler).await?)
    }

    /// # Errors
    /// See [`Self::execute_exec_stream`].
    pub async fn execute_container_stream(
        &self,
        body: ExecuteContainerExecBody,
    ) -> Result<LineStream<ExecuteError>, ClientError> {
        self.execute_exec_stream(ExecBody::Container(body)).await
    }

    /// # Errors
    /// See [`Self::execute_exec`].
    pub async fn execute_container<H>(
        &self,
        body: ExecuteContainerExecBody,
        handler: &mut H,
    ) -> Result<ExitSignal, ClientError>
    where
        H: OutputHandler + ?Sized,
    {
        self.execute_exec(ExecBody::Container(body), handler).await
    }

    /// # Errors
    /// See [`Self::execute_exec_stream`].
    pub async fn execute_deployment_stream(
        &self,
        body: ExecuteDeploymentExecBody,
    ) -> Result<LineStream<ExecuteError>, ClientError> {
        self.execute_exec_stream(ExecBody::Deployment(body)).await
    }

    /// # Errors
    /// See [`Self::execute_exec`].
    pub async fn execute_deployment<H>(
        &self,
        body: ExecuteDeploymentExecBody,
        handler: &mut H,
    ) -> Result<ExitSignal, ClientError>
    where
        H: OutputHandler + ?Sized,
    {
        self.execute_exec(ExecBody::Deployment(body), handler).await
    }

    /// # Errors
    /// See [`Self::execute_exec_stream`].
    pub async fn execute_stack_stream(
        &self,
        body: ExecuteStackExecBody,
    ) -> Result<LineStream<ExecuteError>, ClientError> {
        self.execute_exec_stream(ExecBody::Stack(body)).await
    }

    /// # Errors
    /// See [`Self::execute_exec`].
    pub async fn execute_stack<H>(
        &self,
        body: ExecuteStackExecBody,
        handler: &mut H,
    ) -> Result<ExitSignal, ClientError>
    where
        H: OutputHandler + ?Sized,
    {
        self.execute_exec(ExecBody::Stack(body), handler).await
    }
}
