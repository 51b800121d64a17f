//! End-to-end pipeline tests: source -> dispatcher -> router -> batching
//! sink -> delivery writer.

use std::sync::Arc;
use std::time::Duration;

use hec_sink::{BatchingSink, SinkConfig};
use integration_tests::fixtures::{counter_envelope, log_envelope, wire_log_envelope};
use integration_tests::mocks::{CountingResolver, MemoryEventSource, MemoryStreamer, MemoryWriter};
use metadata::{CacheConfig, MetadataCache};
use nozzle::{
    parse_extra_fields, parse_ownership_fields, Nozzle, NozzleConfig, Router, RouterConfig,
};
use nozzle_core::{EventKind, Sink};
use serde_json::json;

fn sink_config() -> SinkConfig {
    SinkConfig {
        batch_size: 10,
        flush_interval_ms: 50,
        queue_size: 1000,
        delivery_queue_capacity: 100,
        workers: 2,
        retries: 0,
    }
}

/// Polls until the condition holds or a generous deadline passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn test_pipeline_delivers_enriched_records() {
    let source = MemoryEventSource::new();
    let resolver = CountingResolver::new().with_workload("app-1", "billing");
    let cache = Arc::new(MetadataCache::new(resolver.clone(), CacheConfig::default()));
    let writer = MemoryWriter::new();
    let sink = Arc::new(BatchingSink::new(writer.clone(), sink_config()));
    sink.open().await.unwrap();

    let router = Arc::new(Router::new(
        RouterConfig {
            wanted_kinds: vec![EventKind::LogMessage],
            ownership_fields: parse_ownership_fields("WorkloadName,OrgName").unwrap(),
            ignore_missing_workloads: false,
            extra_fields: parse_extra_fields("env:test").unwrap(),
        },
        cache,
        sink.clone(),
    ));
    let dispatcher = Arc::new(Nozzle::new(source.clone(), router, NozzleConfig::default()));

    let running = dispatcher.clone();
    let pipeline = tokio::spawn(async move { running.start().await });

    // Sent one at a time so the second lookup observes the cached entry.
    source.send(log_envelope("app-1", "hello world")).await;
    wait_for(|| writer.record_count() == 1).await;

    source.send(log_envelope("app-1", "hello mars")).await;
    // Filtered out by the allow-list, never delivered.
    source.send(counter_envelope("app-1", "requests")).await;

    wait_for(|| writer.record_count() == 2).await;

    dispatcher.close().await.unwrap();
    sink.close().await.unwrap();
    assert!(pipeline.await.unwrap().is_ok());
    assert!(source.was_closed());

    let records = writer.all_records();
    assert_eq!(records.len(), 2);
    for record in &records {
        let event = record.event();
        assert_eq!(event["workload_name"], json!("billing"));
        assert_eq!(event["org_name"], json!("acme"));
        assert_eq!(event["env"], json!("test"));
        assert_eq!(event["event_kind"], json!("LogMessage"));
    }
    let messages: Vec<_> = records
        .iter()
        .map(|r| r.event()["msg"].as_str().unwrap().to_string())
        .collect();
    assert!(messages.contains(&"hello world".to_string()));
    assert!(messages.contains(&"hello mars".to_string()));

    // Both log envelopes share a workload; the cache kept it to one call.
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_pipeline_forwards_unresolved_without_ownership() {
    let source = MemoryEventSource::new();
    let resolver = CountingResolver::new();
    let cache = Arc::new(MetadataCache::new(resolver, CacheConfig::default()));
    let writer = MemoryWriter::new();
    let sink = Arc::new(BatchingSink::new(writer.clone(), sink_config()));
    sink.open().await.unwrap();

    let router = Arc::new(Router::new(
        RouterConfig {
            wanted_kinds: vec![EventKind::LogMessage],
            ownership_fields: parse_ownership_fields("WorkloadName").unwrap(),
            ignore_missing_workloads: false,
            extra_fields: Default::default(),
        },
        cache,
        sink.clone(),
    ));
    let dispatcher = Arc::new(Nozzle::new(source.clone(), router, NozzleConfig::default()));

    let running = dispatcher.clone();
    let pipeline = tokio::spawn(async move { running.start().await });

    source.send(log_envelope("ghost", "still here")).await;
    wait_for(|| writer.record_count() == 1).await;

    dispatcher.close().await.unwrap();
    sink.close().await.unwrap();
    pipeline.await.unwrap().unwrap();

    let record = &writer.all_records()[0];
    assert!(record.event().get("workload_name").is_none());
    assert_eq!(record.event()["msg"], json!("still here"));
}

#[tokio::test]
async fn test_pipeline_drops_unresolved_when_ignoring_missing() {
    let source = MemoryEventSource::new();
    let cache = Arc::new(MetadataCache::new(
        CountingResolver::new(),
        CacheConfig::default(),
    ));
    let writer = MemoryWriter::new();
    let sink = Arc::new(BatchingSink::new(writer.clone(), sink_config()));
    sink.open().await.unwrap();

    let router = Arc::new(Router::new(
        RouterConfig {
            wanted_kinds: vec![EventKind::LogMessage],
            ownership_fields: parse_ownership_fields("WorkloadName").unwrap(),
            ignore_missing_workloads: true,
            extra_fields: Default::default(),
        },
        cache,
        sink.clone(),
    ));
    let dispatcher = Arc::new(Nozzle::new(source.clone(), router, NozzleConfig::default()));

    let running = dispatcher.clone();
    let pipeline = tokio::spawn(async move { running.start().await });

    source.send(log_envelope("ghost", "dropped")).await;
    source.send(log_envelope("other-ghost", "also dropped")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    dispatcher.close().await.unwrap();
    sink.close().await.unwrap();
    pipeline.await.unwrap().unwrap();

    assert_eq!(writer.record_count(), 0);
}

#[tokio::test]
async fn test_streamer_backed_source_feeds_dispatcher() {
    use firehose::StreamerSource;

    let streamer = MemoryStreamer::new(vec![vec![wire_log_envelope("test-source", "test-payload")]]);
    let source = Arc::new(StreamerSource::new(
        streamer.clone(),
        firehose::FirehoseConfig {
            subscription_id: "e2e-sub".to_string(),
            ..firehose::FirehoseConfig::default()
        },
    ));

    let writer = MemoryWriter::new();
    let sink = Arc::new(BatchingSink::new(writer.clone(), sink_config()));
    sink.open().await.unwrap();

    let router = Arc::new(Router::new(
        RouterConfig {
            wanted_kinds: vec![EventKind::LogMessage],
            ownership_fields: Vec::new(),
            ignore_missing_workloads: false,
            extra_fields: Default::default(),
        },
        Arc::new(MetadataCache::disabled()),
        sink.clone(),
    ));
    let dispatcher = Arc::new(Nozzle::new(source, router, NozzleConfig::default()));

    // The stream ends after one batch, so the dispatcher exits on its own.
    let result = dispatcher.start().await;
    assert!(result.is_ok());

    // Routing workers drain asynchronously after the read loop exits.
    wait_for(|| writer.record_count() == 1).await;
    sink.close().await.unwrap();

    let records = writer.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event()["source_id"], json!("test-source"));
    assert_eq!(records[0].event()["msg"], json!("test-payload"));

    let request = streamer.captured_request().expect("subscription sent");
    assert_eq!(request.shard_id, "e2e-sub");
    assert_eq!(request.selectors.len(), 5);
}
