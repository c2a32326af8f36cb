//! Komodo terminal client.
//!
//! `TerminalClient` routes terminal, container, deployment and stack
//! sessions to the right duplex channel or one-shot execute request.

pub mod router;

pub use router::{ClientError, TerminalClient};

pub use komodo_terminal_core::{
    AuthState, ClientConfig, CredentialSource, Credentials, ExecBody, ExecKind, ExecQuery,
    LineStream,
    target::{
        ConnectContainerExecQuery, ConnectDeploymentExecQuery, ConnectStackExecQuery,
        ConnectTerminalQuery, ExecuteContainerExecBody, ExecuteDeploymentExecBody,
        ExecuteStackExecBody, ExecuteTerminalBody,
    },
};
pub use komodo_terminal_executor::{
    CollectOutput, ErrorBody, ExecuteError, ExitSignal, HttpTransport, OutputHandler,
};
pub use komodo_terminal_transport::{
    ChannelError, ChannelEvent, ChannelHandler, CloseReason, ConnectionState, DuplexChannel,
    DuplexSender, Frame,
};
