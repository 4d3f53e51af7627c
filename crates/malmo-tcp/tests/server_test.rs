use malmo_tcp::{
    send_and_get_short_reply, send_message, ClientTimeouts, CommandConnection, Framing,
    MessageHandler, ServerOptions, TcpError, TcpServer,
};
use malmo_types::TimestampedBytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

#[derive(Default)]
struct Collector {
    messages: Mutex<Vec<Vec<u8>>>,
}

impl MessageHandler for Collector {
    fn on_message(&self, message: TimestampedBytes) {
        self.messages.lock().unwrap().push(message.data);
    }
}

impl Collector {
    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }
}

async fn wait_for(collector: &Collector, count: usize) -> Vec<Vec<u8>> {
    for _ in 0..200 {
        let messages = collector.snapshot();
        if messages.len() >= count {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    collector.snapshot()
}

#[tokio::test]
async fn length_prefixed_server_replies_before_delivering() {
    let server = TcpServer::bind(0, ServerOptions::default().with_fixed_reply("MALMOOK"))
        .await
        .unwrap();
    let collector = Arc::new(Collector::default());
    server.start(collector.clone());

    let reply = send_and_get_short_reply(
        "127.0.0.1",
        server.port(),
        b"<ping/>",
        Framing::LengthPrefixed,
        ClientTimeouts::default(),
    )
    .await
    .unwrap();
    assert_eq!(reply, "MALMOOK");

    let messages = wait_for(&collector, 1).await;
    assert_eq!(messages, vec![b"<ping/>".to_vec()]);
    assert!((10000..=11000).contains(&server.port()));
}

#[tokio::test]
async fn line_delimited_server_delivers_each_line() {
    let server = TcpServer::bind(
        0,
        ServerOptions::default().with_framing(Framing::LineDelimited),
    )
    .await
    .unwrap();
    let collector = Arc::new(Collector::default());
    server.start(collector.clone());

    for line in ["first", "second"] {
        send_message(
            "127.0.0.1",
            server.port(),
            line.as_bytes(),
            Framing::LineDelimited,
            ClientTimeouts::default(),
        )
        .await
        .unwrap();
    }

    let messages = wait_for(&collector, 2).await;
    assert_eq!(messages.len(), 2);
    assert!(messages.contains(&b"first\n".to_vec()));
    assert!(messages.contains(&b"second\n".to_vec()));
}

#[tokio::test]
async fn exhausted_port_range_fails() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let result = TcpServer::bind(0, ServerOptions::default().with_port_range(port, port)).await;
    match result {
        Err(TcpError::NoPortAvailable { start, end }) => {
            assert_eq!((start, end), (port, port));
        }
        other => panic!("expected NoPortAvailable, got {:?}", other),
    }
}

#[tokio::test]
async fn explicit_port_in_use_fails() {
    let first = TcpServer::bind(0, ServerOptions::default()).await.unwrap();
    let result = TcpServer::bind(first.port(), ServerOptions::default()).await;
    match result {
        Err(TcpError::PortInUse(port)) => assert_eq!(port, first.port()),
        other => panic!("expected PortInUse, got {:?}", other),
    }
}

#[tokio::test]
async fn closed_server_delivers_nothing() {
    let server = TcpServer::bind(0, ServerOptions::default()).await.unwrap();
    let collector = Arc::new(Collector::default());
    server.start(collector.clone());
    let port = server.port();
    server.close();

    let _ = send_message(
        "127.0.0.1",
        port,
        b"late",
        Framing::LengthPrefixed,
        ClientTimeouts::default(),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(collector.snapshot().is_empty());
}

#[tokio::test]
async fn oversized_short_reply_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(&mut stream);
        let _ = malmo_tcp::read_message(&mut reader, Framing::LineDelimited).await;
        let body = vec![b'x'; 2048];
        malmo_tcp::write_message(&mut stream, &body, Framing::LengthPrefixed)
            .await
            .unwrap();
    });

    let result = send_and_get_short_reply(
        "127.0.0.1",
        port,
        b"MALMO_FIND_SERVERabc",
        Framing::LineDelimited,
        ClientTimeouts::default(),
    )
    .await;
    assert!(matches!(result, Err(TcpError::ReplyTooLong(2048))));
}

#[tokio::test]
async fn command_connection_writes_lines_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reader = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line);
        }
        received
    });

    let connection = CommandConnection::open("127.0.0.1", port, Duration::from_secs(2));
    connection.send("move 1").unwrap();
    connection.send("turn -0.5").unwrap();
    connection.send("jump 1").unwrap();
    connection.close().await;

    let received = reader.await.unwrap();
    assert_eq!(received, vec!["move 1", "turn -0.5", "jump 1"]);
}
