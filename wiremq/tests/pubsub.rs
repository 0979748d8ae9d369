//! Publish-subscribe integration tests over loopback TCP.

use std::time::Duration;

use bytes::Bytes;
use wiremq::{PubSocket, SubSocket};

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Subscriptions travel asynchronously; poll the publisher's registry
/// until they land instead of sleeping a fixed amount.
async fn await_subscribers(publisher: &PubSocket, topic: &str, want: usize) {
    for _ in 0..200 {
        if publisher.subscribers(topic) == want {
            return;
        }
        compio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {want} subscribers for {topic:?}, saw {}",
        publisher.subscribers(topic)
    );
}

#[compio::test]
async fn publish_reaches_subscribed_topic() {
    init_logging();

    let publisher = PubSocket::new();
    publisher.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", publisher.local_addr().unwrap());

    let sub = SubSocket::new();
    sub.connect(&addr).await.unwrap();
    sub.subscribe("weather").await.unwrap();
    await_subscribers(&publisher, "weather", 1).await;

    publisher
        .send(&[Bytes::from("weather"), Bytes::from("sunny")])
        .await
        .unwrap();

    let msg = sub.recv().await.unwrap().unwrap();
    assert_eq!(msg, vec![Bytes::from("weather"), Bytes::from("sunny")]);
}

#[compio::test]
async fn unmatched_topic_is_a_silent_noop() {
    init_logging();

    let publisher = PubSocket::new();
    publisher.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", publisher.local_addr().unwrap());

    let sub = SubSocket::new();
    sub.connect(&addr).await.unwrap();
    sub.subscribe("weather").await.unwrap();
    await_subscribers(&publisher, "weather", 1).await;

    // Nobody listens to sports; this must not error and must not leak
    // into the weather subscriber.
    publisher
        .send(&[Bytes::from("sports"), Bytes::from("overtime")])
        .await
        .unwrap();
    publisher
        .send(&[Bytes::from("weather"), Bytes::from("rain")])
        .await
        .unwrap();

    let msg = sub.recv().await.unwrap().unwrap();
    assert_eq!(msg, vec![Bytes::from("weather"), Bytes::from("rain")]);
}

#[compio::test]
async fn one_subscriber_per_topic_each() {
    init_logging();

    let publisher = PubSocket::new();
    publisher.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", publisher.local_addr().unwrap());

    let weather = SubSocket::new();
    weather.connect(&addr).await.unwrap();
    weather.subscribe("weather").await.unwrap();

    let sports = SubSocket::new();
    sports.connect(&addr).await.unwrap();
    sports.subscribe("sports").await.unwrap();

    await_subscribers(&publisher, "weather", 1).await;
    await_subscribers(&publisher, "sports", 1).await;

    publisher
        .send(&[Bytes::from("sports"), Bytes::from("3-1")])
        .await
        .unwrap();
    publisher
        .send(&[Bytes::from("weather"), Bytes::from("hail")])
        .await
        .unwrap();

    let msg = sports.recv().await.unwrap().unwrap();
    assert_eq!(msg, vec![Bytes::from("sports"), Bytes::from("3-1")]);
    let msg = weather.recv().await.unwrap().unwrap();
    assert_eq!(msg, vec![Bytes::from("weather"), Bytes::from("hail")]);
}

#[compio::test]
async fn disconnect_unsubscribes() {
    init_logging();

    let publisher = PubSocket::new();
    publisher.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", publisher.local_addr().unwrap());

    let sub = SubSocket::new();
    sub.connect(&addr).await.unwrap();
    sub.subscribe("weather").await.unwrap();
    await_subscribers(&publisher, "weather", 1).await;

    drop(sub);
    await_subscribers(&publisher, "weather", 0).await;
}

#[compio::test]
async fn only_the_first_subscription_frame_counts() {
    init_logging();

    let publisher = PubSocket::new();
    publisher.bind("tcp://127.0.0.1:0").await.unwrap();
    let addr = format!("tcp://{}", publisher.local_addr().unwrap());

    let sub = SubSocket::new();
    sub.connect(&addr).await.unwrap();
    sub.subscribe("weather").await.unwrap();
    sub.subscribe("sports").await.unwrap();
    await_subscribers(&publisher, "weather", 1).await;

    // The second frame arrives behind the first on the same stream;
    // give the publisher time to have drained it, then check it was
    // never registered.
    compio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(publisher.subscribers("sports"), 0);

    // Only the registered topic is delivered.
    publisher
        .send(&[Bytes::from("sports"), Bytes::from("overtime")])
        .await
        .unwrap();
    publisher
        .send(&[Bytes::from("weather"), Bytes::from("fog")])
        .await
        .unwrap();

    let msg = sub.recv().await.unwrap().unwrap();
    assert_eq!(msg, vec![Bytes::from("weather"), Bytes::from("fog")]);
}
