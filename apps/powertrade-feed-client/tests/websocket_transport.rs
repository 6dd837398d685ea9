//! WebSocket Transport Integration Tests
//!
//! Runs the transport against a local `tokio-tungstenite` server to check
//! frame delivery and close handling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

use powertrade_feed_client::application::ports::{FeedTransport, TransportError};
use powertrade_feed_client::{FeedEndpoint, FeedKind, ProbeConfig, WebSocketTransport};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept one WebSocket client and hand it to `script`.
async fn serve_once<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    addr
}

/// Read until the client goes away so the close handshake completes.
async fn drain(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn endpoint(addr: SocketAddr) -> FeedEndpoint {
    FeedEndpoint::new(FeedKind::TopOfBook, format!("ws://{addr}/v1/feeds"))
}

fn transport() -> WebSocketTransport {
    WebSocketTransport::new(ProbeConfig::default())
}

#[tokio::test]
async fn delivers_text_frames_until_normal_close() {
    let addr = serve_once(|mut ws| async move {
        ws.send(Message::text(r#"{"top_of_book": {}}"#)).await.unwrap();
        ws.send(Message::binary(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::text("second")).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        drain(ws).await;
    })
    .await;

    let mut conn = transport().connect(&endpoint(addr)).await.unwrap();

    let first = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(first.unwrap().as_deref(), Some(r#"{"top_of_book": {}}"#));

    let second = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(second.unwrap().as_deref(), Some("second"));

    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(end, Ok(None));
}

#[tokio::test]
async fn going_away_is_graceful() {
    let addr = serve_once(|mut ws| async move {
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restart".into(),
        }))
        .await
        .unwrap();
        drain(ws).await;
    })
    .await;

    let mut conn = transport().connect(&endpoint(addr)).await.unwrap();
    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(end, Ok(None));
}

#[tokio::test]
async fn other_close_codes_are_abnormal() {
    let addr = serve_once(|mut ws| async move {
        ws.close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "internal error".into(),
        }))
        .await
        .unwrap();
        drain(ws).await;
    })
    .await;

    let mut conn = transport().connect(&endpoint(addr)).await.unwrap();
    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(
        end,
        Err(TransportError::AbnormalClose {
            code: 1011,
            reason: "internal error".to_string(),
        })
    );
}

#[tokio::test]
async fn close_without_status_is_abnormal() {
    let addr = serve_once(|mut ws| async move {
        ws.close(None).await.unwrap();
        drain(ws).await;
    })
    .await;

    let mut conn = transport().connect(&endpoint(addr)).await.unwrap();
    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert!(matches!(
        end,
        Err(TransportError::AbnormalClose { code: 1005, .. })
    ));
}

#[tokio::test]
async fn dropped_socket_is_an_error() {
    let addr = serve_once(|ws| async move {
        drop(ws);
    })
    .await;

    let mut conn = transport().connect(&endpoint(addr)).await.unwrap();
    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert!(end.is_err());
}

#[tokio::test]
async fn unanswered_ping_times_out() {
    // Holding the stream without reading means no pong is ever sent.
    let addr = serve_once(|ws| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(ws);
    })
    .await;

    let probe = ProbeConfig::new(Duration::from_millis(50), Duration::from_millis(100));
    let mut conn = WebSocketTransport::new(probe)
        .connect(&endpoint(addr))
        .await
        .unwrap();

    let end = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(
        end,
        Err(TransportError::ProbeTimeout(Duration::from_millis(100)))
    );
}

#[tokio::test]
async fn answered_pings_keep_connection_alive() {
    let addr = serve_once(|mut ws| async move {
        // Reading lets tungstenite answer pings automatically.
        let reader = async {
            while let Some(Ok(_)) = ws.next().await {}
        };
        let _ = timeout(Duration::from_millis(400), reader).await;
        ws.send(Message::text("still here")).await.unwrap();
        drain(ws).await;
    })
    .await;

    let probe = ProbeConfig::new(Duration::from_millis(50), Duration::from_millis(100));
    let mut conn = WebSocketTransport::new(probe)
        .connect(&endpoint(addr))
        .await
        .unwrap();

    let frame = timeout(TEST_TIMEOUT, conn.next_frame()).await.unwrap();
    assert_eq!(frame.unwrap().as_deref(), Some("still here"));
    conn.close().await;
}

#[tokio::test]
async fn refused_connection_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = transport().connect(&endpoint(addr)).await;
    assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
}
