//! Dispatch engine behavior across topics and shards.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trace_analytics::bus::{topics, AnalyticsMessage};
use trace_analytics::engine::AnalyticsEngine;
use trace_analytics::lifecycle::Shutdown;

mod common;
use common::{Observation, ObservationLog, RecordingHandler};

const WAIT: Duration = Duration::from_secs(5);

fn engine(num_workers: usize) -> AnalyticsEngine {
    AnalyticsEngine::new(num_workers, 16, Shutdown::new())
}

fn log() -> ObservationLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn entity(key: i64) -> AnalyticsMessage {
    AnalyticsMessage::custom(key, "entity", key)
}

#[tokio::test]
async fn test_chain_runs_in_priority_order() {
    let engine = engine(2);
    let log = log();
    for priority in [3, 2, 0, 1] {
        engine.register_handler(
            topics::ENTITY,
            Arc::new(RecordingHandler::new(&format!("p{priority}"), priority, log.clone())),
        );
    }

    engine.publish(topics::ENTITY, entity(7)).await.unwrap();
    assert!(common::wait_until(WAIT, || log.lock().len() == 4).await);

    let seen: Vec<(String, usize)> = log
        .lock()
        .iter()
        .map(|o| (o.handler.clone(), o.annotations_in))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("p0".to_string(), 0),
            ("p1".to_string(), 1),
            ("p2".to_string(), 2),
            ("p3".to_string(), 3),
        ]
    );
    engine.stop().await;
}

#[tokio::test]
async fn test_cross_topic_republish_runs_each_handler_once() {
    let engine = engine(3);
    let log = log();
    engine.register_handler(
        topics::TRACE,
        Arc::new(RecordingHandler::new("forwarder", 0, log.clone()).republishing(topics::ENTITY)),
    );
    engine.register_handler(topics::ENTITY, Arc::new(RecordingHandler::new("receiver", 0, log.clone())));

    let message = common::trace(1, 42, "GET", "/pets");
    engine.publish(topics::TRACE, AnalyticsMessage::trace(message)).await.unwrap();

    assert!(common::wait_until(WAIT, || log.lock().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert_eq!(log.iter().filter(|o| o.handler == "forwarder").count(), 1);
    assert_eq!(log.iter().filter(|o| o.handler == "receiver").count(), 1);
    // The republished message keeps the partition key, so it lands on the
    // matching shard of the second topic.
    assert!(log.iter().all(|o| o.partition_key == 42 && o.shard_id == 0));
}

#[tokio::test]
async fn test_same_key_preserves_publish_order() {
    let engine = engine(4);
    let received = Arc::new(Mutex::new(Vec::new()));

    struct Sequence(Arc<Mutex<Vec<u32>>>);

    #[async_trait::async_trait]
    impl trace_analytics::engine::AnalyzerHandler for Sequence {
        fn name(&self) -> &str {
            "sequence"
        }

        fn priority(&self) -> i32 {
            0
        }

        async fn process(
            &self,
            _ctx: trace_analytics::engine::ProcessContext<'_>,
            message: &AnalyticsMessage,
            annotations: trace_analytics::engine::Annotations,
        ) -> Result<trace_analytics::engine::Annotations, trace_analytics::engine::HandlerError> {
            if let AnalyticsMessage::Custom(custom) = message {
                if let Some(seq) = custom.payload_as::<u32>() {
                    self.0.lock().push(*seq);
                }
            }
            Ok(annotations)
        }
    }

    engine.register_handler(topics::OBJECT, Arc::new(Sequence(received.clone())));
    for seq in 0..200u32 {
        engine
            .publish(topics::OBJECT, AnalyticsMessage::custom(9, "seq", seq))
            .await
            .unwrap();
    }

    assert!(common::wait_until(WAIT, || received.lock().len() == 200).await);
    assert_eq!(*received.lock(), (0..200).collect::<Vec<_>>());
    engine.stop().await;
}

#[tokio::test]
async fn test_handler_failure_skips_rest_of_chain_only_for_that_message() {
    let engine = engine(1);
    let log = log();
    engine.register_handler(topics::API, Arc::new(RecordingHandler::new("first", 0, log.clone()).failing()));
    engine.register_handler(topics::API, Arc::new(RecordingHandler::new("second", 1, log.clone())));

    engine.publish(topics::API, entity(1)).await.unwrap();
    engine.publish(topics::API, entity(2)).await.unwrap();

    assert!(common::wait_until(WAIT, || log.lock().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(log.lock().iter().all(|o| o.handler == "first"));
    engine.stop().await;
}

#[tokio::test]
async fn test_shard_survives_handler_panic() {
    let engine = engine(1);
    let log = log();
    engine.register_handler(
        topics::API_ENDPOINT,
        Arc::new(RecordingHandler::new("fragile", 0, log.clone()).panicking_once()),
    );
    engine.register_handler(topics::API_ENDPOINT, Arc::new(RecordingHandler::new("after", 1, log.clone())));

    engine.publish(topics::API_ENDPOINT, entity(1)).await.unwrap();
    engine.publish(topics::API_ENDPOINT, entity(2)).await.unwrap();

    assert!(common::wait_until(WAIT, || log.lock().len() == 3).await);
    let handlers: Vec<String> = log.lock().iter().map(|o| o.handler.clone()).collect();
    assert_eq!(handlers, vec!["fragile", "fragile", "after"]);
    engine.stop().await;
}

#[tokio::test]
async fn test_added_workers_serve_new_shards() {
    let engine = engine(2);
    let log = log();
    engine.register_handler(topics::ENTITY, Arc::new(RecordingHandler::new("h", 0, log.clone())));

    assert_eq!(engine.add_workers(2), 2);
    assert_eq!(engine.num_workers(), 4);
    assert_eq!(engine.bus().num_partitions(topics::ENTITY), 4);

    engine.publish(topics::ENTITY, entity(3)).await.unwrap();
    assert!(common::wait_until(WAIT, || log.lock().len() == 1).await);
    assert_eq!(
        log.lock()[0],
        Observation {
            handler: "h".to_string(),
            shard_id: 3,
            partition_key: 3,
            annotations_in: 0,
        }
    );
    engine.stop().await;
}

#[tokio::test]
async fn test_new_topic_gets_shards_and_unknown_topic_is_rejected() {
    let engine = engine(2);
    assert!(engine.publish("audit", entity(1)).await.is_err());

    let log = log();
    engine.init_topic("audit");
    engine.register_handler("audit", Arc::new(RecordingHandler::new("audit", 0, log.clone())));
    engine.publish("audit", entity(1)).await.unwrap();

    assert!(common::wait_until(WAIT, || log.lock().len() == 1).await);
    assert!(engine.topics().contains(&"audit".to_string()));
    engine.stop().await;
}

#[tokio::test]
async fn test_stop_ends_all_shard_loops() {
    let shutdown = Shutdown::new();
    let engine = AnalyticsEngine::new(2, 16, shutdown.clone());
    assert_eq!(shutdown.receiver_count(), 2 * topics::DEFAULT_TOPICS.len());

    engine.stop().await;
    assert_eq!(shutdown.receiver_count(), 0);

    // No loops come back after stop.
    engine.add_workers(1);
    assert_eq!(shutdown.receiver_count(), 0);
}
