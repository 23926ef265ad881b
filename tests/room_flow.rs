//! End-to-end room flow over real websockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dice_room::network::protocol::{ClientMessage, ErrorCode, ServerMessage, ThrowVector};
use dice_room::{DeterministicRng, DieKind, RoomServer, ServerConfig};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COOLDOWN: Duration = Duration::from_millis(300);

async fn start_server() -> (Arc<RoomServer>, SocketAddr) {
    let config = ServerConfig {
        roll_cooldown: COOLDOWN,
        ..ServerConfig::default()
    };
    let server = Arc::new(RoomServer::with_rng(config, Box::new(DeterministicRng::new(42))));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, msg: ClientMessage) {
    ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

/// Skip messages until one matches.
async fn recv_until(ws: &mut Ws, mut wanted: impl FnMut(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let msg = recv(ws).await;
        if wanted(&msg) {
            return msg;
        }
    }
}

#[tokio::test]
async fn test_table_scenario() {
    let (server, addr) = start_server().await;

    let mut a = connect(addr).await;
    assert!(matches!(recv(&mut a).await, ServerMessage::RoomList { rooms } if rooms.is_empty()));

    send(&mut a, ClientMessage::CreateRoom { room_name: "table1".into(), password: String::new() }).await;
    let created = recv_until(&mut a, |m| matches!(m, ServerMessage::CreateSuccess { .. })).await;
    assert_eq!(created, ServerMessage::CreateSuccess { room_name: "table1".into() });

    send(&mut a, ClientMessage::JoinRoom { room_name: "table1".into(), password: String::new() }).await;
    let initial = recv_until(&mut a, |m| matches!(m, ServerMessage::NotationUpdate { .. })).await;
    assert_eq!(initial, ServerMessage::NotationUpdate { notation: "1d6".into() });

    send(&mut a, ClientMessage::SetNotation { notation: "2d6+3".into() }).await;
    recv_until(&mut a, |m| matches!(m, ServerMessage::NotationUpdate { notation } if notation == "2d6+3")).await;

    let mut b = connect(addr).await;
    let lobby = recv(&mut b).await;
    match lobby {
        ServerMessage::RoomList { rooms } => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].name, "table1");
            assert!(!rooms[0].is_private);
        }
        other => panic!("expected room list, got {other:?}"),
    }

    send(&mut b, ClientMessage::JoinRoom { room_name: "table1".into(), password: String::new() }).await;
    assert_eq!(recv(&mut b).await, ServerMessage::NotationUpdate { notation: "2d6+3".into() });
    match recv(&mut b).await {
        ServerMessage::DiceSetUpdate { dice } => {
            assert_eq!(dice.len(), 2);
            assert!(dice.iter().all(|d| d.kind == DieKind::D6));
        }
        other => panic!("expected dice set, got {other:?}"),
    }
    recv_until(&mut a, |m| matches!(m, ServerMessage::UserJoined { .. })).await;

    send(&mut b, ClientMessage::RequestRoll { vector: Some(ThrowVector { x: 12.0, y: -4.0 }) }).await;
    let roll = match recv_until(&mut b, |m| matches!(m, ServerMessage::NewRoll(_))).await {
        ServerMessage::NewRoll(roll) => roll,
        _ => unreachable!(),
    };
    assert_eq!(roll.result.result.len(), 2);
    assert!(roll.result.result.iter().all(|v| (1..=6).contains(v)));
    assert_eq!(roll.result.result_total, roll.result.result.iter().sum::<i32>() + 3);
    assert_eq!(roll.vector, Some(ThrowVector { x: 12.0, y: -4.0 }));

    // A sees the same roll, then its own request during cooldown is dropped.
    let seen = recv_until(&mut a, |m| matches!(m, ServerMessage::NewRoll(_))).await;
    assert_eq!(seen, ServerMessage::NewRoll(roll.clone()));
    send(&mut a, ClientMessage::RequestRoll { vector: None }).await;

    let mut extra_rolls = 0;
    loop {
        match recv(&mut a).await {
            ServerMessage::NewRoll(_) => extra_rolls += 1,
            ServerMessage::EnableRoll => break,
            _ => {}
        }
    }
    assert_eq!(extra_rolls, 0);
    recv_until(&mut b, |m| *m == ServerMessage::EnableRoll).await;

    send(&mut a, ClientMessage::RequestRoll { vector: None }).await;
    recv_until(&mut a, |m| matches!(m, ServerMessage::NewRoll(_))).await;

    server.shutdown();
}

#[tokio::test]
async fn test_private_room_password() {
    let (server, addr) = start_server().await;

    let mut host = connect(addr).await;
    recv(&mut host).await;
    send(&mut host, ClientMessage::CreateRoom { room_name: "vault".into(), password: "hunter2".into() }).await;
    recv_until(&mut host, |m| matches!(m, ServerMessage::CreateSuccess { .. })).await;

    let mut guest = connect(addr).await;
    match recv(&mut guest).await {
        ServerMessage::RoomList { rooms } => assert!(rooms[0].is_private),
        other => panic!("expected room list, got {other:?}"),
    }

    send(&mut guest, ClientMessage::JoinRoom { room_name: "vault".into(), password: "wrong".into() }).await;
    assert!(matches!(recv(&mut guest).await, ServerMessage::JoinError { .. }));

    send(&mut guest, ClientMessage::JoinRoom { room_name: "nowhere".into(), password: String::new() }).await;
    assert_eq!(recv(&mut guest).await, ServerMessage::RoomNotFound);

    send(&mut guest, ClientMessage::JoinRoom { room_name: "vault".into(), password: "hunter2".into() }).await;
    assert!(matches!(recv(&mut guest).await, ServerMessage::NotationUpdate { .. }));

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (server, addr) = start_server().await;

    let mut ws = connect(addr).await;
    recv(&mut ws).await;
    ws.send(Message::Text("{\"type\":\"teleport\"}".into())).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::InvalidInput),
        other => panic!("expected error, got {other:?}"),
    }

    send(&mut ws, ClientMessage::Ping { timestamp: 77 }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Pong { timestamp: 77, .. }));

    server.shutdown();
}
