//! Command-line demo for the Komodo terminal client.
//!
//! Run a command and exit with its code:
//!   cargo run -p exec-cli -- --address http://localhost:9120 \
//!     execute --command uptime terminal --server edge --terminal main
//!
//! Or open an interactive session, piping stdin lines as text frames:
//!   cargo run -p exec-cli -- connect container --server edge --container web

use std::{
    io::Write,
    process::ExitCode,
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use komodo_terminal_client::{
    AuthState, ChannelHandler, ClientConfig, CloseReason, ConnectContainerExecQuery,
    ConnectDeploymentExecQuery, ConnectStackExecQuery, ConnectTerminalQuery,
    ExecuteContainerExecBody, ExecuteDeploymentExecBody, ExecuteStackExecBody,
    ExecuteTerminalBody, ExitSignal, Frame, OutputHandler, TerminalClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "exec-cli", about = "Run commands on Komodo terminals")]
struct Cli {
    /// Komodo API base URL.
    #[arg(long, env = "KOMODO_ADDRESS", default_value = "http://localhost:9120")]
    address: String,
    /// JWT; takes precedence over the API key pair.
    #[arg(long, env = "KOMODO_JWT")]
    jwt: Option<String>,
    #[arg(long, env = "KOMODO_API_KEY")]
    key: Option<String>,
    #[arg(long, env = "KOMODO_API_SECRET")]
    secret: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one command and print its output.
    Execute {
        #[arg(long)]
        command: String,
        #[command(subcommand)]
        target: Target,
    },
    /// Open an interactive session.
    Connect {
        #[command(subcommand)]
        target: Target,
    },
}

#[derive(Subcommand)]
enum Target {
    Terminal {
        #[arg(long)]
        server: String,
        #[arg(long)]
        terminal: String,
    },
    Container {
        #[arg(long)]
        server: String,
        #[arg(long)]
        container: String,
        #[arg(long, default_value = "sh")]
        shell: String,
    },
    Deployment {
        #[arg(long)]
        deployment: String,
        #[arg(long, default_value = "sh")]
        shell: String,
    },
    Stack {
        #[arg(long)]
        stack: String,
        #[arg(long)]
        service: String,
        #[arg(long, default_value = "sh")]
        shell: String,
    },
}

struct PrintOutput;

#[async_trait]
impl OutputHandler for PrintOutput {
    async fn on_line(&mut self, line: String) {
        println!("{line}");
    }

    async fn on_finish(&mut self, exit: ExitSignal) {
        tracing::info!(exit = %exit, "Command finished");
    }
}

struct PrintFrames;

impl ChannelHandler for PrintFrames {
    fn on_login(&mut self) {
        tracing::info!("Logged in");
    }

    fn on_message(&mut self, frame: Frame) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(frame.as_bytes());
        let _ = stdout.flush();
    }

    fn on_close(&mut self, reason: Option<CloseReason>) {
        match reason {
            Some(reason) => tracing::info!(code = reason.code, "Closed: {}", reason.reason),
            None => tracing::info!("Closed"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.address).context("invalid --address")?;
    let auth = AuthState {
        jwt: cli.jwt,
        key: cli.key,
        secret: cli.secret,
    };
    let client = TerminalClient::new(config, Arc::new(auth));

    match cli.command {
        Command::Execute { command, target } => execute(&client, command, target).await,
        Command::Connect { target } => connect(&client, target).await,
    }
}

async fn execute(
    client: &TerminalClient,
    command: String,
    target: Target,
) -> anyhow::Result<ExitCode> {
    let mut output = PrintOutput;
    let exit = match target {
        Target::Terminal { server, terminal } => {
            let body = ExecuteTerminalBody {
                server,
                terminal,
                command,
            };
            client.execute_terminal(&body, &mut output).await
        }
        Target::Container {
            server,
            container,
            shell,
        } => {
            let body = ExecuteContainerExecBody {
                server,
                container,
                shell,
                command,
            };
            client.execute_container(body, &mut output).await
        }
        Target::Deployment { deployment, shell } => {
            let body = ExecuteDeploymentExecBody {
                deployment,
                shell,
                command,
            };
            client.execute_deployment(body, &mut output).await
        }
        Target::Stack {
            stack,
            service,
            shell,
        } => {
            let body = ExecuteStackExecBody {
                stack,
                service,
                shell,
                command,
            };
            client.execute_stack(body, &mut output).await
        }
    }
    .context("execute failed")?;

    let code = exit.code().and_then(|code| u8::try_from(code).ok());
    Ok(code.map_or(ExitCode::FAILURE, ExitCode::from))
}

async fn connect(client: &TerminalClient, target: Target) -> anyhow::Result<ExitCode> {
    let channel = match target {
        Target::Terminal { server, terminal } => {
            client
                .connect_terminal(&ConnectTerminalQuery { server, terminal })
                .await
        }
        Target::Container {
            server,
            container,
            shell,
        } => {
            client
                .connect_container(ConnectContainerExecQuery {
                    server,
                    container,
                    shell,
                })
                .await
        }
        Target::Deployment { deployment, shell } => {
            client
                .connect_deployment(ConnectDeploymentExecQuery { deployment, shell })
                .await
        }
        Target::Stack {
            stack,
            service,
            shell,
        } => {
            client
                .connect_stack(ConnectStackExecQuery {
                    stack,
                    service,
                    shell,
                })
                .await
        }
    }
    .context("connect failed")?;

    let sender = channel.sender();
    let input = tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if let Err(e) = sender.send_text(format!("{line}\n")).await {
                tracing::warn!("Failed to send input: {e}");
                return;
            }
        }
        let _ = sender.close().await;
    });

    channel.run(&mut PrintFrames).await;
    input.abort();
    Ok(ExitCode::SUCCESS)
}
