//! Core building blocks for Komodo terminal clients.
//!
//! This crate provides the pieces shared by the duplex and one-shot paths:
//! - `AuthState` / `Credentials` / `LoginMessage` - Caller-held auth and the login frame
//! - `ExecQuery` / `ExecBody` - Typed target payloads
//! - `LineSplitter` / `lines` - Chunk-tolerant line reconstruction
//! - `ClientConfig` - Base URL handling

pub mod auth;
pub mod config;
pub mod lines;
pub mod target;

pub use auth::{AuthState, CredentialSource, Credentials, LoginMessage};
pub use config::{ClientConfig, ConfigError};
pub use lines::{LineSplitter, LineStream, lines};
pub use target::{ExecBody, ExecKind, ExecQuery, QueryError};
