//! Integration tests: boot an in-process WebSocket server standing in for
//! the panel's console socket, connect a real [`Connection`], and check the
//! auth handshake, event decoding, outbound frames and the reconnect loop.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use pt_domain::error::Error;
use pt_domain::models::PowerSignal;
use pt_websocket::{Connection, Event, Frame, ReconnectPolicy};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const TOKEN: &str = "jwt.console.token";

// ── Mini console server ─────────────────────────────────────────────────

/// One accepted websocket session, as seen by the test.
struct PanelConn {
    /// The first frame the client sent.
    auth: Frame,
    /// Push raw messages to the client. Dropping this closes the socket.
    send: mpsc::Sender<Message>,
    /// Frames the client sent after auth.
    recv: mpsc::Receiver<Frame>,
}

impl PanelConn {
    async fn push(&self, event: &str, arg: &str) {
        let text = Frame::new(event, arg).to_json();
        self.send.send(Message::Text(text)).await.unwrap();
    }

    async fn push_raw(&self, text: &str) {
        self.send.send(Message::Text(text.into())).await.unwrap();
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(5), self.recv.recv())
            .await
            .expect("timeout waiting for client frame")
    }
}

type Dials = Arc<Mutex<Vec<Instant>>>;

/// Boots a server on an ephemeral port. The first `ws_accepts` TCP
/// connections complete the websocket handshake; later ones are dropped
/// right after accept so the client's dial fails.
async fn start_console_server(
    ws_accepts: usize,
) -> (SocketAddr, mpsc::Receiver<PanelConn>, Dials) {
    start_scripted_server(vec![true; ws_accepts]).await
}

/// Like [`start_console_server`], but `plan[n]` decides whether the n-th
/// TCP connection completes the handshake. Connections past the end of the
/// plan are dropped. Every accept time is recorded in the returned `Dials`.
async fn start_scripted_server(plan: Vec<bool>) -> (SocketAddr, mpsc::Receiver<PanelConn>, Dials) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dials: Dials = Arc::default();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    let dial_log = dials.clone();
    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((stream, _peer)) = listener.accept().await {
            dial_log.lock().unwrap().push(Instant::now());
            let complete = plan.get(index).copied().unwrap_or(false);
            index += 1;
            if !complete {
                drop(stream);
                continue;
            }

            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut sink, mut stream) = ws.split();

                let auth = loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            break serde_json::from_str::<Frame>(&text).unwrap();
                        }
                        Some(Ok(_)) => continue,
                        _ => return,
                    }
                };

                let (to_client, mut outbound) = mpsc::channel::<Message>(16);
                let (from_client, recv) = mpsc::channel::<Frame>(16);
                let _ = conn_tx
                    .send(PanelConn {
                        auth,
                        send: to_client,
                        recv,
                    })
                    .await;

                let read_task = tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(frame) = serde_json::from_str::<Frame>(&text) {
                                let _ = from_client.send(frame).await;
                            }
                        }
                    }
                });

                let write_task = tokio::spawn(async move {
                    while let Some(msg) = outbound.recv().await {
                        if sink.send(msg).await.is_err() {
                            return;
                        }
                    }
                    let _ = sink.close().await;
                });

                let _ = tokio::join!(read_task, write_task);
            });
        }
    });

    (addr, conn_rx, dials)
}

/// Set `RUST_LOG=pt_websocket=debug` to see the reconnect loop.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn socket_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/api/servers/d3aac109/ws")
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_secs(1),
        multiplier: 2.0,
    }
}

async fn accept(conns: &mut mpsc::Receiver<PanelConn>) -> PanelConn {
    tokio::time::timeout(Duration::from_secs(5), conns.recv())
        .await
        .expect("timeout waiting for client to connect")
        .expect("server stopped")
}

async fn next_event(conn: &mut Connection) -> Option<Event> {
    tokio::time::timeout(Duration::from_secs(5), conn.next_event())
        .await
        .expect("timeout waiting for event")
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn auth_then_events_in_order() {
    let (addr, mut conns, _) = start_console_server(1).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, None).await.unwrap();

    let server = accept(&mut conns).await;
    assert_eq!(server.auth, Frame::auth(TOKEN));

    server.push("console output", "Server marked as running").await;
    server.push("daemon message", "ignored").await;
    server.push_raw("{not json").await;
    server
        .push("stats", r#"{"memory_bytes":1024,"cpu_absolute":12.5,"uptime":60}"#)
        .await;
    server.push("status", "running").await;
    server.push("token expiring", "").await;

    assert_eq!(
        next_event(&mut conn).await,
        Some(Event::ConsoleOutput {
            line: "Server marked as running".into()
        })
    );
    match next_event(&mut conn).await {
        Some(Event::Stats { resources }) => {
            assert_eq!(resources.memory_bytes, 1024);
            assert_eq!(resources.uptime, 60);
        }
        other => panic!("expected stats, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut conn).await,
        Some(Event::StatusChange {
            state: "running".into()
        })
    );
    assert_eq!(next_event(&mut conn).await, Some(Event::AuthExpired));

    conn.close().await;
}

#[tokio::test]
async fn commands_and_power_signals_reach_the_server() {
    let (addr, mut conns, _) = start_console_server(1).await;
    let conn = Connection::connect(socket_url(addr), TOKEN, None).await.unwrap();
    let mut server = accept(&mut conns).await;

    conn.send_command("say hello").await.unwrap();
    conn.set_state(PowerSignal::Restart).await.unwrap();

    assert_eq!(server.next_frame().await, Some(Frame::send_command("say hello")));
    let state = server.next_frame().await.unwrap();
    assert_eq!(state.event, "set state");
    assert_eq!(state.args, vec!["restart".to_string()]);

    conn.close().await;
}

#[tokio::test]
async fn initial_dial_failure_is_returned() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Connection::connect(socket_url(addr), TOKEN, Some(fast_policy(3)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WebSocket(_)), "{err:?}");
}

#[tokio::test]
async fn stream_failure_without_reconnect_closes_channel() {
    let (addr, mut conns, dials) = start_console_server(5).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, None).await.unwrap();
    let server = accept(&mut conns).await;

    drop(server);

    assert_eq!(next_event(&mut conn).await, None);
    assert!(matches!(
        conn.send_command("list").await,
        Err(Error::ConnectionClosed)
    ));
    assert_eq!(dials.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reconnects_and_resumes_delivery() {
    init_tracing();
    let (addr, mut conns, _) = start_console_server(2).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, Some(fast_policy(5)))
        .await
        .unwrap();

    let first = accept(&mut conns).await;
    first.push("console output", "before").await;
    assert_eq!(
        next_event(&mut conn).await,
        Some(Event::ConsoleOutput {
            line: "before".into()
        })
    );
    drop(first);

    // The new session authenticates with the same token.
    let mut second = accept(&mut conns).await;
    assert_eq!(second.auth, Frame::auth(TOKEN));

    second.push("console output", "after").await;
    assert_eq!(
        next_event(&mut conn).await,
        Some(Event::ConsoleOutput {
            line: "after".into()
        })
    );
    assert!(!conn.is_reconnecting());

    conn.send_command("list").await.unwrap();
    assert_eq!(second.next_frame().await, Some(Frame::send_command("list")));

    conn.close().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    init_tracing();
    let (addr, mut conns, dials) = start_console_server(1).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, Some(fast_policy(3)))
        .await
        .unwrap();
    let server = accept(&mut conns).await;

    let killed = Instant::now();
    drop(server);

    assert_eq!(next_event(&mut conn).await, None);
    assert!(killed.elapsed() >= Duration::from_millis(70));

    // One initial dial plus three failed reconnects.
    let dials = dials.lock().unwrap().clone();
    assert_eq!(dials.len(), 4, "dials: {dials:?}");
    assert!(dials[1] - killed >= Duration::from_millis(10));
    assert!(dials[2] - dials[1] >= Duration::from_millis(20));
    assert!(dials[3] - dials[2] >= Duration::from_millis(40));

    assert!(!conn.is_reconnecting());
    assert!(matches!(
        conn.set_state(PowerSignal::Stop).await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn close_is_idempotent_across_handles() {
    let (addr, mut conns, _) = start_console_server(1).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, Some(fast_policy(3)))
        .await
        .unwrap();
    let mut server = accept(&mut conns).await;

    let a = conn.handle();
    let b = conn.handle();
    tokio::join!(a.close(), b.close());
    conn.close().await;

    assert!(conn.is_closed());
    assert_eq!(next_event(&mut conn).await, None);
    assert!(matches!(
        a.send_command("list").await,
        Err(Error::ConnectionClosed)
    ));
    // Server side sees the socket go away rather than a reconnect.
    assert_eq!(server.next_frame().await, None);
}

#[tokio::test]
async fn close_during_backoff_returns_promptly() {
    let (addr, mut conns, dials) = start_console_server(1).await;
    let slow = ReconnectPolicy {
        initial_delay: Duration::from_secs(10),
        ..fast_policy(0)
    };
    let mut conn = Connection::connect(socket_url(addr), TOKEN, Some(slow))
        .await
        .unwrap();
    let server = accept(&mut conns).await;
    drop(server);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !conn.is_reconnecting() {
        assert!(Instant::now() < deadline, "never started reconnecting");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(matches!(
        conn.send_command("list").await,
        Err(Error::ConnectionClosed)
    ));

    let started = Instant::now();
    conn.close().await;
    assert_eq!(next_event(&mut conn).await, None);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(dials.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn close_unblocks_a_full_channel() {
    let (addr, mut conns, _) = start_console_server(1).await;
    let mut conn = Connection::connect_with_buffer(socket_url(addr), TOKEN, None, 1)
        .await
        .unwrap();
    let server = accept(&mut conns).await;

    for i in 0..5 {
        server.push("console output", &format!("line {i}")).await;
    }
    // Give the read loop time to fill the channel and park on it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    conn.close().await;

    let mut drained = 0;
    while next_event(&mut conn).await.is_some() {
        drained += 1;
    }
    assert!(drained <= 1, "drained {drained}");
}

#[tokio::test]
async fn successful_redial_restores_the_attempt_budget() {
    init_tracing();
    // initial, refused, accepted, refused, refused
    let (addr, mut conns, dials) = start_scripted_server(vec![true, false, true]).await;
    let policy = fast_policy(2);
    let mut conn = Connection::connect(socket_url(addr), TOKEN, Some(policy.clone()))
        .await
        .unwrap();

    drop(accept(&mut conns).await);

    // One refused redial, then the second attempt gets through.
    let second = accept(&mut conns).await;
    assert_eq!(second.auth, Frame::auth(TOKEN));
    second.push("console output", "back").await;
    assert_eq!(
        next_event(&mut conn).await,
        Some(Event::ConsoleOutput {
            line: "back".into()
        })
    );

    let killed = Instant::now();
    drop(second);

    // A fresh budget of two attempts is spent before giving up.
    assert_eq!(next_event(&mut conn).await, None);
    let dials = dials.lock().unwrap().clone();
    assert_eq!(dials.len(), 5, "dials: {dials:?}");

    // The first delay after the reset is the initial one again, not the
    // grown delay of the earlier outage.
    let first_delay = dials[3] - killed;
    assert!(first_delay >= policy.initial_delay, "{first_delay:?}");
    assert!(first_delay < policy.base_delay(2), "{first_delay:?}");
    assert!(dials[4] - dials[3] >= policy.base_delay(1));
}

#[tokio::test]
async fn dead_session_is_closed_before_the_backoff() {
    let (addr, mut conns, dials) = start_console_server(1).await;
    let slow = ReconnectPolicy {
        initial_delay: Duration::from_secs(10),
        ..fast_policy(0)
    };
    let conn = Connection::connect(socket_url(addr), TOKEN, Some(slow))
        .await
        .unwrap();
    let mut server = accept(&mut conns).await;

    server.send.send(Message::Close(None)).await.unwrap();

    // The old session ends on the server side while the client is still
    // sleeping before its first redial.
    let ended = tokio::time::timeout(Duration::from_secs(2), server.recv.recv())
        .await
        .expect("old session still open during back-off");
    assert_eq!(ended, None);
    assert!(conn.is_reconnecting());
    assert_eq!(dials.lock().unwrap().len(), 1);

    conn.close().await;
}

#[tokio::test]
async fn oversized_message_fails_the_stream() {
    let (addr, mut conns, _) = start_console_server(1).await;
    let mut conn = Connection::connect(socket_url(addr), TOKEN, None).await.unwrap();
    let server = accept(&mut conns).await;

    let large = "x".repeat(1024 * 1024);
    server.push("console output", &large).await;
    match next_event(&mut conn).await {
        Some(Event::ConsoleOutput { line }) => assert_eq!(line.len(), large.len()),
        other => panic!("expected console output, got {other:?}"),
    }

    // Past the 10 MiB read limit the stream is torn down.
    let oversized = "x".repeat(11 * 1024 * 1024);
    server.push("console output", &oversized).await;
    assert_eq!(next_event(&mut conn).await, None);
}
