//! Request-reply integration tests over loopback TCP.

use bytes::Bytes;
use wiremq::{RepSocket, ReqSocket, WireError};

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[compio::test]
async fn ping_pong_roundtrip() {
    init_logging();

    let rep = RepSocket::new();
    rep.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", rep.local_addr().unwrap());

    let client = compio::runtime::spawn(async move {
        let req = ReqSocket::new();
        req.connect(&addr).await.unwrap();

        req.send(&[Bytes::from("ping"), Bytes::from("extra")])
            .await
            .unwrap();
        let reply = req.recv().await.unwrap();
        assert_eq!(reply, vec![Bytes::from("pong")]);
    });

    let request = rep.recv().await.unwrap().unwrap();
    assert_eq!(
        request.parts(),
        &[Bytes::from("ping"), Bytes::from("extra")]
    );
    rep.send(&[Bytes::from("pong")]).await.unwrap();

    client.await;
}

#[compio::test]
async fn replies_route_to_their_own_peer() {
    init_logging();

    let rep = RepSocket::new();
    rep.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", rep.local_addr().unwrap());

    let spawn_client = |name: &'static str| {
        let addr = addr.clone();
        compio::runtime::spawn(async move {
            let req = ReqSocket::new();
            req.connect(&addr).await.unwrap();
            req.send(&[Bytes::from(name)]).await.unwrap();

            let reply = req.recv().await.unwrap();
            assert_eq!(reply.len(), 1);
            assert_eq!(reply[0], format!("{name}: done"));
        })
    };
    let first = spawn_client("first");
    let second = spawn_client("second");

    // Replying through the chunk pins each reply to its own peer no
    // matter which request was received last.
    for _ in 0..2 {
        let request = rep.recv().await.unwrap().unwrap();
        let name = String::from_utf8_lossy(&request.parts()[0]).into_owned();
        request
            .reply(&[Bytes::from(format!("{name}: done"))])
            .await
            .unwrap();
    }

    first.await;
    second.await;
}

#[compio::test]
async fn empty_parts_are_dropped_in_transit() {
    init_logging();

    let rep = RepSocket::new();
    rep.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", rep.local_addr().unwrap());

    let client = compio::runtime::spawn(async move {
        let req = ReqSocket::new();
        req.connect(&addr).await.unwrap();

        req.send(&[Bytes::from("head"), Bytes::new(), Bytes::from("tail")])
            .await
            .unwrap();

        // Empty reply parts vanish on the receiving side too.
        let reply = req.recv().await.unwrap();
        assert_eq!(reply, vec![Bytes::from("pong")]);
    });

    let request = rep.recv().await.unwrap().unwrap();
    assert_eq!(request.parts(), &[Bytes::from("head"), Bytes::from("tail")]);

    rep.send(&[Bytes::new(), Bytes::from("pong"), Bytes::new()])
        .await
        .unwrap();

    client.await;
}

#[compio::test]
async fn invalid_endpoint_is_rejected() {
    let req = ReqSocket::new();
    let err = req.connect("ipc:///tmp/nope").await.unwrap_err();
    assert!(matches!(err, WireError::Endpoint(_)));

    // A failed connect does not use up the socket.
    let err = req.connect("tcp://not an address").await.unwrap_err();
    assert!(matches!(err, WireError::Endpoint(_)));
}

#[compio::test]
async fn use_before_connect_fails() {
    let req = ReqSocket::new();
    assert!(matches!(
        req.send(&[Bytes::from("x")]).await.unwrap_err(),
        WireError::NotConnected
    ));
    assert!(matches!(
        req.recv().await.unwrap_err(),
        WireError::NotConnected
    ));
}

#[compio::test]
async fn reply_before_any_request_fails() {
    let rep = RepSocket::new();
    rep.bind("tcp://127.0.0.1:0").await.unwrap();
    assert!(matches!(
        rep.send(&[Bytes::from("x")]).await.unwrap_err(),
        WireError::NoActiveConnection
    ));
}

#[compio::test]
async fn sockets_are_single_use() {
    let rep = RepSocket::new();
    rep.bind("tcp://127.0.0.1:0").await.unwrap();
    assert!(matches!(
        rep.bind("tcp://127.0.0.1:0").await.unwrap_err(),
        WireError::AlreadyBound
    ));

    let addr = format!("tcp://{}", rep.local_addr().unwrap());
    let req = ReqSocket::new();
    req.connect(&addr).await.unwrap();
    assert!(matches!(
        req.connect(&addr).await.unwrap_err(),
        WireError::AlreadyConnected
    ));
}
