use std::time::Duration;

use futures::{SinkExt, StreamExt};
use repopanel_core::{
    CopyMode, CopyTarget, ExecutionState, HostMessage, Protocol, UiMessage, decode, encode_text,
};
use repopanel_host::{HostFixture, HostState, build_router};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;
type WsRead = futures::stream::SplitStream<WsStream>;

struct TestPanel {
    write: WsWrite,
    read: WsRead,
}

impl TestPanel {
    async fn send(&mut self, request: UiMessage) {
        let message = request.to_message().expect("encode request");
        let text = encode_text(&message).expect("encode text");
        self.send_raw(&text).await;
    }

    async fn send_raw(&mut self, text: &str) {
        self.write
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("send frame");
    }

    async fn recv(&mut self, wait: Duration) -> Option<HostMessage> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;
            let next = timeout(remaining, self.read.next()).await.ok()??;
            match next.ok()? {
                Message::Text(text) => {
                    let envelope = decode(text.as_str()).ok()?;
                    return HostMessage::from_message(&envelope).ok()?;
                }
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    async fn expect(&mut self) -> HostMessage {
        self.recv(Duration::from_secs(2))
            .await
            .expect("host replies in time")
    }
}

fn demo_fixture() -> HostFixture {
    HostFixture::from_json(include_str!("../fixtures/demo.json")).expect("demo fixture parses")
}

#[tokio::test]
async fn webview_loaded_yields_version_and_bundles() {
    let (address, shutdown_tx) = start_host(demo_fixture()).await;
    let mut panel = connect_panel(&address).await;

    panel.send(UiMessage::WebviewLoaded).await;

    assert_eq!(
        panel.expect().await,
        HostMessage::UpdateVersion {
            version: "1.4.0".to_owned()
        }
    );
    match panel.expect().await {
        HostMessage::UpdateBundles { bundles } => {
            let ids: Vec<&str> = bundles.iter().map(|b| b.id.as_str()).collect();
            assert_eq!(ids, vec!["api", "docs"]);
            assert!(bundles[0].output_file_exists);
        }
        other => panic!("expected updateBundles, got {other:?}"),
    }
    assert!(matches!(
        panel.expect().await,
        HostMessage::UpdateDefaultRun { data } if data.output_file_exists
    ));
    assert!(matches!(
        panel.expect().await,
        HostMessage::UpdateDebugRuns { runs } if runs.len() == 2
    ));
    assert_eq!(
        panel.expect().await,
        HostMessage::UpdateCopyMode {
            mode: CopyMode::File
        }
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn set_copy_mode_is_echoed() {
    let (address, shutdown_tx) = start_host(demo_fixture()).await;
    let mut panel = connect_panel(&address).await;

    panel
        .send(UiMessage::SetCopyMode {
            mode: CopyMode::Content,
        })
        .await;
    assert_eq!(
        panel.expect().await,
        HostMessage::UpdateCopyMode {
            mode: CopyMode::Content
        }
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn bundle_output_is_byte_identical_to_fixture() {
    let fixture = demo_fixture();
    let expected = fixture.bundle_outputs["api"].clone();
    let (address, shutdown_tx) = start_host(fixture).await;
    let mut panel = connect_panel(&address).await;

    panel
        .send(UiMessage::CopyBundleOutput {
            bundle_id: "api".to_owned(),
        })
        .await;
    assert_eq!(
        panel.expect().await,
        HostMessage::OutputContent {
            target: CopyTarget::Bundle("api".to_owned()),
            content: expected,
        }
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn output_beyond_one_mebibyte_arrives_whole() {
    let mut fixture = demo_fixture();
    let content: String = (0..60_000)
        .map(|line| format!("line {line:05}: \"quoted\" \\ tab\t\n"))
        .collect();
    assert!(content.len() > 1024 * 1024);
    fixture.bundle_outputs.insert("api".to_owned(), content.clone());
    let (address, shutdown_tx) = start_host(fixture).await;
    let mut panel = connect_panel(&address).await;

    panel
        .send(UiMessage::CopyBundleOutput {
            bundle_id: "api".to_owned(),
        })
        .await;
    assert_eq!(
        panel.expect().await,
        HostMessage::OutputContent {
            target: CopyTarget::Bundle("api".to_owned()),
            content,
        }
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn agent_run_reports_progress_then_completion() {
    let (address, shutdown_tx) = start_host(demo_fixture()).await;
    let mut panel = connect_panel(&address).await;

    panel
        .send(UiMessage::RunSmartAgent {
            query: "session checks".to_owned(),
        })
        .await;
    assert_eq!(
        panel.expect().await,
        HostMessage::AgentStateChange {
            status: ExecutionState::Running
        }
    );
    let output_path = match panel.expect().await {
        HostMessage::AgentRunComplete {
            output_path,
            file_count,
            query,
            ..
        } => {
            assert_eq!(file_count, 2);
            assert_eq!(query, "session checks");
            output_path
        }
        other => panic!("expected agentRunComplete, got {other:?}"),
    };
    assert_eq!(
        panel.expect().await,
        HostMessage::AgentStateChange {
            status: ExecutionState::Idle
        }
    );

    panel.send(UiMessage::GetAgentHistory).await;
    assert!(matches!(
        panel.expect().await,
        HostMessage::AgentHistory { history }
            if history.len() == 2 && history[0].output_path.as_deref() == Some(output_path.as_str())
    ));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn unknown_and_malformed_frames_do_not_close_the_connection() {
    let (address, shutdown_tx) = start_host(demo_fixture()).await;
    let mut panel = connect_panel(&address).await;

    panel.send_raw("not json at all").await;
    panel.send_raw(r#"["an","array"]"#).await;
    panel.send_raw(r#"{"command":"openFile","path":"/etc/hosts"}"#).await;
    panel.send_raw(r#"{"command":"checkSecret","key":7}"#).await;

    assert!(
        panel.recv(Duration::from_millis(300)).await.is_none(),
        "host replied to a frame it should have dropped"
    );

    panel
        .send(UiMessage::CheckSecret {
            key: "googleApiKey".to_owned(),
        })
        .await;
    assert_eq!(
        panel.expect().await,
        HostMessage::SecretStatus {
            key: "googleApiKey".to_owned(),
            exists: true
        }
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn saved_secret_and_selection_are_shared_across_connections() {
    let state = HostState::new(demo_fixture());
    let (address, shutdown_tx) = start_host_with_state(state.clone()).await;

    let mut first = connect_panel(&address).await;
    first
        .send(UiMessage::SaveSecret {
            key: "pineconeApiKey".to_owned(),
            value: "pc-demo".to_owned(),
        })
        .await;
    assert_eq!(
        first.expect().await,
        HostMessage::SecretStatus {
            key: "pineconeApiKey".to_owned(),
            exists: true
        }
    );
    first
        .send(UiMessage::SavePineconeIndex {
            index: "repo-main".to_owned(),
        })
        .await;
    assert_eq!(
        first.expect().await,
        HostMessage::UpdateSelectedIndex {
            index: "repo-main".to_owned()
        }
    );

    let mut second = connect_panel(&address).await;
    second.send(UiMessage::FetchPineconeIndexes).await;
    assert!(matches!(
        second.expect().await,
        HostMessage::UpdatePineconeIndexes { indexes, error: None } if indexes.len() == 2
    ));
    second.send(UiMessage::GetPineconeIndex).await;
    assert_eq!(
        second.expect().await,
        HostMessage::UpdateSelectedIndex {
            index: "repo-main".to_owned()
        }
    );

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.selected_index.as_deref(), Some("repo-main"));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn healthz_reports_ok() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral host socket");
    let address = listener.local_addr().expect("host local addr");
    let server = axum::serve(listener, build_router(HostState::default()));
    tokio::spawn(async move {
        let _ = server.await;
    });

    let mut stream = tokio::net::TcpStream::connect(address)
        .await
        .expect("connect");
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
        .await
        .expect("response in time")
        .expect("read response");
    assert!(response.starts_with("HTTP/1.1 200"), "unexpected: {response}");
    assert!(response.contains(r#"{"ok":true}"#));
}

async fn start_host(fixture: HostFixture) -> (String, oneshot::Sender<()>) {
    start_host_with_state(HostState::new(fixture)).await
}

async fn start_host_with_state(state: HostState) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral host socket");
    let address = listener.local_addr().expect("host local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, build_router(state)).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("ws://{}/ws", address), shutdown_tx)
}

async fn connect_panel(ws_url: &str) -> TestPanel {
    let (ws_stream, _) = connect_async(ws_url).await.expect("connect websocket");
    let (write, read) = ws_stream.split();
    TestPanel { write, read }
}
