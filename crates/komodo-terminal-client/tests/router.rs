use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{
        Query, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{StreamExt, TryStreamExt, stream};
use komodo_terminal_client::{
    AuthState, ChannelEvent, ClientError, ClientConfig, CollectOutput, ConnectStackExecQuery,
    ConnectionState, ExecuteContainerExecBody, ExecuteDeploymentExecBody, ExecuteError,
    ExecuteStackExecBody, ExecuteTerminalBody, ExitSignal, Frame, TerminalClient,
};
use serde_json::{Value, json};

fn chunked(chunks: Vec<String>) -> Response {
    Body::from_stream(stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>))).into_response()
}

fn field(body: &Value, name: &str) -> String {
    body[name].as_str().unwrap_or_default().to_string()
}

async fn execute_terminal(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "token");
    if !authorized {
        let error = json!({ "error": "unauthorized", "trace": ["no jwt"] });
        return (StatusCode::UNAUTHORIZED, Json(error)).into_response();
    }
    chunked(vec![
        format!("server={}\n", field(&body, "server")),
        format!("ran {}\nsecond li", field(&body, "command")),
        "ne\n__KOMODO_EX".into(),
        "IT_CODE:0\n".into(),
        "after exit\n".into(),
    ])
}

async fn execute_container(Json(body): Json<Value>) -> Response {
    assert!(body.get("type").is_none(), "wrapper must not reach the wire");
    chunked(vec![
        format!("{}/{}\n", field(&body, "server"), field(&body, "container")),
        "__KOMODO_EXIT_CODE:3".into(),
    ])
}

async fn execute_deployment() -> Response {
    let error = json!({ "error": "denied", "trace": [] });
    (StatusCode::FORBIDDEN, Json(error)).into_response()
}

async fn execute_stack(Json(body): Json<Value>) -> Response {
    chunked(vec![format!("{}\n", field(&body, "service")), "b".into()])
}

async fn stack_terminal(
    ws: WebSocketUpgrade,
    Query(query): Query<BTreeMap<String, String>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stack_session(socket, query))
}

async fn stack_session(mut socket: WebSocket, query: BTreeMap<String, String>) {
    let Some(Ok(Message::Text(login))) = socket.recv().await else {
        return;
    };
    socket.send(Message::Text("LOGGED_IN".into())).await.unwrap();
    socket.send(Message::Text(login)).await.unwrap();
    let query = serde_json::to_string(&query).unwrap();
    socket.send(Message::Text(query.into())).await.unwrap();
    let _ = socket.send(Message::Close(None)).await;
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/terminal/execute", post(execute_terminal))
        .route("/terminal/execute/container", post(execute_container))
        .route("/terminal/execute/deployment", post(execute_deployment))
        .route("/terminal/execute/stack", post(execute_stack))
        .route("/ws/stack/terminal", get(stack_terminal));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, auth: AuthState) -> TerminalClient {
    let config = ClientConfig::new(&format!("http://{addr}")).unwrap();
    TerminalClient::new(config, Arc::new(auth))
}

fn terminal_body() -> ExecuteTerminalBody {
    ExecuteTerminalBody {
        server: "edge".into(),
        terminal: "main".into(),
        command: "uptime".into(),
    }
}

#[tokio::test]
async fn test_execute_terminal_sentinel_protocol() {
    let addr = spawn_server().await;
    let mut output = CollectOutput::default();
    let exit = client(addr, AuthState::jwt("token"))
        .execute_terminal(&terminal_body(), &mut output)
        .await
        .unwrap();

    assert_eq!(exit, ExitSignal::Code("0".into()));
    assert_eq!(output.lines, vec!["server=edge", "ran uptime", "second line"]);
    assert_eq!(output.exit, Some(ExitSignal::Code("0".into())));
}

#[tokio::test]
async fn test_execute_terminal_stream_is_raw() {
    let addr = spawn_server().await;
    let lines: Vec<String> = client(addr, AuthState::jwt("token"))
        .execute_terminal_stream(&terminal_body())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        lines,
        vec![
            "server=edge",
            "ran uptime",
            "second line",
            "__KOMODO_EXIT_CODE:0",
            "after exit",
        ]
    );
}

#[tokio::test]
async fn test_unauthorized_rejection_carries_body() {
    let addr = spawn_server().await;
    let result = client(addr, AuthState::api_keys("k", "s"))
        .execute_terminal_stream(&terminal_body())
        .await;
    let Err(ClientError::Execute(error)) = result else {
        panic!("expected rejection");
    };
    assert_eq!(error.status(), 401);
    assert_eq!(error.result().error, "unauthorized");
    assert_eq!(error.result().trace, vec!["no jwt"]);
}

#[tokio::test]
async fn test_container_exec_routes_unwrapped_body() {
    let addr = spawn_server().await;
    let mut output = CollectOutput::default();
    let exit = client(addr, AuthState::api_keys("k", "s"))
        .execute_container(
            ExecuteContainerExecBody {
                server: "edge".into(),
                container: "web".into(),
                shell: "sh".into(),
                command: "ls".into(),
            },
            &mut output,
        )
        .await
        .unwrap();
    assert_eq!(output.lines, vec!["edge/web"]);
    assert_eq!(exit.code(), Some(3));
}

#[tokio::test]
async fn test_deployment_forbidden() {
    let addr = spawn_server().await;
    let mut output = CollectOutput::default();
    let result = client(addr, AuthState::jwt("token"))
        .execute_deployment(
            ExecuteDeploymentExecBody {
                deployment: "api".into(),
                shell: "sh".into(),
                command: "ls".into(),
            },
            &mut output,
        )
        .await;
    match result {
        Err(ClientError::Execute(ExecuteError::Status { status, body })) => {
            assert_eq!(status, 403);
            assert_eq!(body.error, "denied");
            assert!(body.trace.is_empty());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(output.lines.is_empty());
    assert!(output.exit.is_none());
}

#[tokio::test]
async fn test_stack_exec_early_exit() {
    let addr = spawn_server().await;
    let mut output = CollectOutput::default();
    let exit = tokio_test::assert_ok!(
        client(addr, AuthState::jwt("token"))
            .execute_stack(
                ExecuteStackExecBody {
                    stack: "app".into(),
                    service: "db".into(),
                    shell: "sh".into(),
                    command: "true".into(),
                },
                &mut output,
            )
            .await
    );
    assert_eq!(exit, ExitSignal::EarlyExit);
    assert_eq!(output.lines, vec!["db", "b"]);
}

#[tokio::test]
async fn test_connect_stack_uses_target_path_and_query() {
    let addr = spawn_server().await;
    let channel = client(addr, AuthState::api_keys("k", "s"))
        .connect_stack(ConnectStackExecQuery {
            stack: "app".into(),
            service: "db".into(),
            shell: "bash".into(),
        })
        .await
        .unwrap();
    assert_eq!(channel.state(), ConnectionState::AwaitingLogin);

    let events: Vec<ChannelEvent> = channel.into_events().collect().await;
    let mut events = events.into_iter();
    assert!(matches!(events.next(), Some(ChannelEvent::Open)));
    assert!(matches!(events.next(), Some(ChannelEvent::Login)));
    match events.next() {
        Some(ChannelEvent::Message(Frame::Text(login))) => {
            assert_eq!(login, r#"{"type":"ApiKeys","params":{"key":"k","secret":"s"}}"#);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.next() {
        Some(ChannelEvent::Message(Frame::Text(query))) => {
            assert_eq!(query, r#"{"service":"db","shell":"bash","stack":"app"}"#);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(events.next(), Some(ChannelEvent::Closed(None))));
    assert!(events.next().is_none());
}
