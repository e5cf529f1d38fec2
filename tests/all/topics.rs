use crate::helpers::{get_config, get_fresh_topic, get_work_queue, pull_within, LOCAL_BROKER};
use fake::{Fake, Faker};
use hopper::{Publishing, WorkQueue, PERSISTENT, TRANSIENT};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn getting_the_same_topic_twice_yields_handles_on_the_same_queue() {
    // Arrange
    let queue = get_work_queue().await;
    let name = Uuid::new_v4().to_string();
    let first = queue.topic(&name).await.unwrap();
    let second = queue.topic(&name).await.unwrap();
    let body: Vec<u8> = Faker.fake();

    // Act
    first.put(body.clone()).await.unwrap();
    let job = second.pull().await.unwrap();

    // Assert
    assert_eq!(name, first.name());
    assert_eq!(first.name(), second.name());
    assert_eq!(body, job.body());
    assert_eq!(name, job.topic());
    job.done().await.unwrap();
}

#[tokio::test]
async fn topics_on_the_same_exchange_are_isolated() {
    let queue = get_work_queue().await;
    let emails = get_fresh_topic(&queue).await;
    let invoices = get_fresh_topic(&queue).await;

    emails.put("email").await.unwrap();

    assert!(pull_within(&invoices, Duration::from_millis(500))
        .await
        .is_none());
    let job = emails.pull().await.unwrap();
    assert_eq!(b"email", job.body());
    job.done().await.unwrap();
}

#[tokio::test]
async fn put_uses_the_delivery_mode_of_the_work_queue() {
    for persistent in [false, true] {
        let config = get_config()
            .with_exchange_name(format!("hop.exchange.persistent.{persistent}"))
            .persistent(persistent);
        let queue = WorkQueue::connect(LOCAL_BROKER, config).await.unwrap();
        let topic = get_fresh_topic(&queue).await;

        topic.put("payload").await.unwrap();
        let job = topic.pull().await.unwrap();

        let expected = if persistent { PERSISTENT } else { TRANSIENT };
        assert_eq!(Some(expected), *job.delivery().properties.delivery_mode());
        job.done().await.unwrap();
        queue.close().await.unwrap();
    }
}

#[tokio::test]
async fn put_publishing_preserves_message_properties() {
    let queue = get_work_queue().await;
    let topic = get_fresh_topic(&queue).await;
    let correlation_id = Uuid::new_v4().to_string();

    topic
        .put_publishing(
            Publishing::new("payload")
                .with_content_type("text/plain".into())
                .with_correlation_id(correlation_id.clone().into()),
        )
        .await
        .unwrap();

    let job = topic.pull().await.unwrap();
    let properties = &job.delivery().properties;
    assert_eq!(
        Some("text/plain"),
        properties.content_type().as_ref().map(|s| s.as_str())
    );
    assert_eq!(
        Some(correlation_id.as_str()),
        properties.correlation_id().as_ref().map(|s| s.as_str())
    );
    job.done().await.unwrap();
}

#[tokio::test]
async fn publisher_confirms_can_be_enabled() {
    let config = get_config()
        .with_exchange_name("hop.exchange.confirms")
        .with_publisher_confirms(true);
    let queue = WorkQueue::connect(LOCAL_BROKER, config).await.unwrap();
    let topic = get_fresh_topic(&queue).await;

    topic.put("confirmed").await.unwrap();

    let job = topic.pull().await.unwrap();
    assert_eq!(b"confirmed", job.body());
    job.done().await.unwrap();
}

#[tokio::test]
async fn pulling_with_an_interval_still_picks_up_late_messages() {
    let config = get_config().with_pull_interval(Duration::from_millis(50));
    let queue = WorkQueue::connect(LOCAL_BROKER, config).await.unwrap();
    let topic = get_fresh_topic(&queue).await;

    let producer = topic.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        producer.put("late").await.unwrap();
    });

    let job = pull_within(&topic, Duration::from_secs(5)).await.unwrap();
    assert_eq!(b"late", job.body());
    job.done().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_put_pull_done_cycles_observe_every_body_exactly_once() {
    const N: usize = 100;

    // Arrange
    let queue = get_work_queue().await;
    let topic = get_fresh_topic(&queue).await;
    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Default::default();
    // Channels held by unresolved jobs.
    let in_flight: Arc<Mutex<HashSet<u16>>> = Default::default();

    // Act
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let topic = topic.clone();
            let seen = Arc::clone(&seen);
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                topic.put(format!("job-{i}")).await.unwrap();
                let job = topic.pull().await.unwrap();
                let channel_id = job.channel_id();
                assert!(in_flight.lock().unwrap().insert(channel_id));
                seen.lock().unwrap().push(job.body().to_vec());
                tokio::task::yield_now().await;
                // Released before `done` hands the channel back to the pool.
                in_flight.lock().unwrap().remove(&channel_id);
                job.done().await.unwrap();
            })
        })
        .collect();
    futures_util::future::try_join_all(handles).await.unwrap();

    // Assert
    let seen = seen.lock().unwrap();
    assert_eq!(N, seen.len());
    let distinct: HashSet<_> = seen.iter().cloned().collect();
    assert_eq!(N, distinct.len());
    for i in 0..N {
        assert!(distinct.contains(format!("job-{i}").as_bytes()));
    }
    assert!(pull_within(&topic, Duration::from_millis(500))
        .await
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idle_pullers_do_not_starve_producers_of_channels() {
    const PULLERS: usize = 6;

    // Arrange
    let config = get_config()
        .with_max_channels(2)
        .with_pull_interval(Duration::from_millis(20));
    let queue = WorkQueue::connect(LOCAL_BROKER, config).await.unwrap();
    let topic = get_fresh_topic(&queue).await;
    let pullers: Vec<_> = (0..PULLERS)
        .map(|_| {
            let topic = topic.clone();
            tokio::spawn(async move {
                let job = topic.pull().await.unwrap();
                let body = job.body().to_vec();
                job.done().await.unwrap();
                body
            })
        })
        .collect();
    // Every pooled channel is now busy polling an empty queue.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Act
    let puts = (0..PULLERS).map(|i| topic.put(format!("job-{i}")));
    tokio::time::timeout(Duration::from_secs(5), futures_util::future::try_join_all(puts))
        .await
        .expect("put waited for a channel held by a puller")
        .unwrap();

    // Assert
    let bodies = tokio::time::timeout(
        Duration::from_secs(5),
        futures_util::future::try_join_all(pullers),
    )
    .await
    .unwrap()
    .unwrap();
    let distinct: HashSet<_> = bodies.into_iter().collect();
    assert_eq!(PULLERS, distinct.len());
    queue.close().await.unwrap();
}
