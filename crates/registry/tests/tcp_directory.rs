use std::time::Duration;

use framesink_protocol::messages::RegisterSinkRequest;
use framesink_protocol::{Message, MessageType};
use framesink_registry::{Directory, RegistryError, TcpDirectory};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn request() -> RegisterSinkRequest {
    RegisterSinkRequest {
        address: "10.0.0.5:15003".into(),
        id: "summit".into(),
        credential: "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79".into(),
    }
}

/// Accepts one connection, records the request and answers with `reply`.
async fn one_shot_directory(
    reply: impl Fn(&Message) -> Message + Send + 'static,
) -> (u16, mpsc::Receiver<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (rd, mut wr) = stream.into_split();
        let mut line = String::new();
        BufReader::new(rd).read_line(&mut line).await.unwrap();
        let msg: Message = serde_json::from_str(&line).unwrap();
        let answer = serde_json::to_string(&reply(&msg)).unwrap();
        tx.send(msg).await.unwrap();
        wr.write_all(answer.as_bytes()).await.unwrap();
        wr.write_all(b"\n").await.unwrap();
    });

    (port, rx)
}

#[tokio::test]
async fn register_sends_envelope() {
    let (port, mut seen) = one_shot_directory(|msg| {
        msg.reply(MessageType::Ack, Some(&serde_json::json!({"status": 0})))
            .unwrap()
    })
    .await;

    let dir = TcpDirectory::new("127.0.0.1", port);
    dir.register(&request()).await.unwrap();

    let msg = seen.recv().await.unwrap();
    assert_eq!(msg.msg_type, MessageType::RegisterSink);
    let payload: RegisterSinkRequest = msg.require_payload().unwrap();
    assert_eq!(payload, request());
}

#[tokio::test]
async fn unregister_uses_its_own_type() {
    let (port, mut seen) =
        one_shot_directory(|msg| msg.reply(MessageType::Ack, None::<&()>).unwrap()).await;

    let dir = TcpDirectory::new("127.0.0.1", port);
    dir.unregister(&request()).await.unwrap();
    assert_eq!(
        seen.recv().await.unwrap().msg_type,
        MessageType::UnregisterSink
    );
}

#[tokio::test]
async fn error_reply_is_unavailable() {
    let (port, _seen) = one_shot_directory(|msg| msg.reply_error(401, "bad credential")).await;

    let dir = TcpDirectory::new("127.0.0.1", port);
    let err = dir.register(&request()).await.unwrap_err();
    match err {
        RegistryError::DirectoryUnavailable(detail) => assert!(detail.contains("bad credential")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn refused_connection_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TcpDirectory::new("127.0.0.1", port);
    assert!(matches!(
        dir.register(&request()).await,
        Err(RegistryError::DirectoryUnavailable(_))
    ));
}

#[tokio::test]
async fn silent_directory_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _keep = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let dir = TcpDirectory::new("127.0.0.1", port).with_timeout(Duration::from_millis(200));
    let err = dir.register(&request()).await.unwrap_err();
    assert!(err.to_string().contains("did not answer"));
}
