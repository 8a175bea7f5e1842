use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;
use streamql::streamql::sql::execution::aggregation::AggregateType;
use streamql::streamql::sql::execution::config::{StreamConfig, WindowConfig, WindowSpec};
use streamql::streamql::sql::execution::stream::Stream;
use streamql::streamql::sql::execution::types::{FieldValue, Record, ResultBatch};
use tokio::time::timeout;

fn record(pairs: &[(&str, FieldValue)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn tumbling_config(select: &[(&str, AggregateType)]) -> StreamConfig {
    let mut config = StreamConfig::new(WindowConfig::new(WindowSpec::Tumbling {
        size: Duration::from_secs(1),
        offset: Duration::ZERO,
    }));
    config.group_fields = vec!["device".to_string()];
    for (alias, kind) in select {
        config.select_fields.insert(alias.to_string(), *kind);
    }
    config
}

fn float_field(result: &Record, key: &str) -> f64 {
    match result.get(key) {
        Some(FieldValue::Float(v)) => *v,
        other => panic!("expected float for '{}', got {:?}", key, other),
    }
}

#[tokio::test]
async fn test_stream_process_with_filter() {
    let config = tumbling_config(&[("age", AggregateType::Avg), ("score", AggregateType::Sum)]);
    let mut stream = Stream::new(config).expect("stream should build");
    stream
        .register_filter("device == 'aa' && age > 10")
        .expect("filter should compile");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    let test_data = [
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(15.0)),
            ("score", FieldValue::Integer(100)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(20.0)),
            ("score", FieldValue::Integer(200)),
        ]),
        record(&[
            ("device", FieldValue::String("bb".into())),
            ("age", FieldValue::Float(25.0)),
            ("score", FieldValue::Integer(300)),
        ]),
    ];
    for data in test_data {
        stream.add_data(data).await.expect("add_data");
    }

    let batch = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no results within 5 seconds")
        .expect("results channel open");

    // only device='aa' with age>10 survives the filter
    assert_eq!(batch.len(), 1);
    assert_eq!(
        batch[0].get("device"),
        Some(&FieldValue::String("aa".into()))
    );
    assert!((float_field(&batch[0], "age_avg") - 17.5).abs() < 1e-4);
    assert!((float_field(&batch[0], "score_sum") - 300.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_stream_without_filter_sliding_window() {
    let mut config = StreamConfig::new(WindowConfig::new(WindowSpec::Sliding {
        size: Duration::from_secs(2),
        slide: Duration::from_secs(1),
        offset: Duration::ZERO,
    }));
    config.group_fields = vec!["device".to_string()];
    config
        .select_fields
        .insert("age".to_string(), AggregateType::Max);
    config
        .select_fields
        .insert("score".to_string(), AggregateType::Min);

    let mut stream = Stream::new(config).expect("stream should build");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    let test_data = [
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(5.0)),
            ("score", FieldValue::Integer(100)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(10.0)),
            ("score", FieldValue::Integer(200)),
        ]),
        record(&[
            ("device", FieldValue::String("bb".into())),
            ("age", FieldValue::Float(3.0)),
            ("score", FieldValue::Integer(300)),
        ]),
    ];
    for data in test_data {
        stream.add_data(data).await.expect("add_data");
    }

    let batch = timeout(Duration::from_secs(10), results.recv())
        .await
        .expect("no results within 10 seconds")
        .expect("results channel open");

    assert_eq!(batch.len(), 2);
    let expectations: HashMap<&str, (f64, f64)> =
        [("aa", (10.0, 100.0)), ("bb", (3.0, 300.0))].into();
    for result in &batch {
        let device = match result.get("device") {
            Some(FieldValue::String(device)) => device.as_str(),
            other => panic!("expected device string, got {:?}", other),
        };
        let (age_max, score_min) = expectations[device];
        assert!((float_field(result, "age_max") - age_max).abs() < 1e-4);
        assert!((float_field(result, "score_min") - score_min).abs() < 1e-4);
    }
}

#[tokio::test]
async fn test_stream_tolerates_incomplete_records() {
    let config = tumbling_config(&[("age", AggregateType::Avg), ("score", AggregateType::Sum)]);
    let mut stream = Stream::new(config).expect("stream should build");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    let test_data = [
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(15.0)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("score", FieldValue::Integer(100)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(20.0)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("score", FieldValue::Integer(200)),
        ]),
    ];
    for data in test_data {
        stream.add_data(data).await.expect("add_data");
    }

    let batch = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no results within 5 seconds")
        .expect("results channel open");

    // records missing a field contribute nothing to that aggregate
    assert_eq!(batch.len(), 1);
    assert!((float_field(&batch[0], "age_avg") - 17.5).abs() < 1e-4);
    assert!((float_field(&batch[0], "score_sum") - 300.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_predicate_evaluation_failure_drops_record() {
    let config = tumbling_config(&[("age", AggregateType::Avg)]);
    let mut stream = Stream::new(config).expect("stream should build");
    stream
        .register_filter("age > 10")
        .expect("filter should compile");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    // first record has no age: the predicate cannot evaluate, so the
    // record is dropped rather than failing the pipeline
    stream
        .add_data(record(&[("device", FieldValue::String("aa".into()))]))
        .await
        .expect("add_data");
    stream
        .add_data(record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(15.0)),
        ]))
        .await
        .expect("add_data");

    let batch = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no results within 5 seconds")
        .expect("results channel open");

    assert_eq!(batch.len(), 1);
    assert!((float_field(&batch[0], "age_avg") - 15.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_sliding_window_with_timestamp_field() {
    let mut config = StreamConfig::new(WindowConfig::new(WindowSpec::Sliding {
        size: Duration::from_secs(2),
        slide: Duration::from_secs(1),
        offset: Duration::ZERO,
    }));
    config.window.ts_prop = Some("ts".to_string());
    config.group_fields = vec!["device".to_string()];
    config
        .select_fields
        .insert("age".to_string(), AggregateType::Max);
    config
        .select_fields
        .insert("score".to_string(), AggregateType::Min);
    config
        .select_fields
        .insert("start".to_string(), AggregateType::WindowStart);
    config
        .select_fields
        .insert("end".to_string(), AggregateType::WindowEnd);

    let mut stream = Stream::new(config).expect("stream should build");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    let base_time = Utc.with_ymd_and_hms(2025, 4, 7, 16, 46, 0).unwrap();
    let test_data = [
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(5.0)),
            ("score", FieldValue::Integer(100)),
            ("ts", FieldValue::Timestamp(base_time)),
        ]),
        record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(10.0)),
            ("score", FieldValue::Integer(200)),
            ("ts", FieldValue::Timestamp(base_time + chrono::Duration::seconds(1))),
        ]),
        record(&[
            ("device", FieldValue::String("bb".into())),
            ("age", FieldValue::Float(3.0)),
            ("score", FieldValue::Integer(300)),
            ("ts", FieldValue::Timestamp(base_time)),
        ]),
    ];
    for data in test_data {
        stream.add_data(data).await.expect("add_data");
    }

    let batch = timeout(Duration::from_secs(10), results.recv())
        .await
        .expect("no results within 10 seconds")
        .expect("results channel open");

    let start_nanos = base_time.timestamp_nanos_opt().unwrap();
    let end_nanos = (base_time + chrono::Duration::seconds(2))
        .timestamp_nanos_opt()
        .unwrap();

    assert_eq!(batch.len(), 2);
    let expectations: HashMap<&str, (f64, f64)> =
        [("aa", (10.0, 100.0)), ("bb", (3.0, 300.0))].into();
    for result in &batch {
        let device = match result.get("device") {
            Some(FieldValue::String(device)) => device.as_str(),
            other => panic!("expected device string, got {:?}", other),
        };
        let (age_max, score_min) = expectations[device];
        assert!((float_field(result, "age_max") - age_max).abs() < 1e-4);
        assert!((float_field(result, "score_min") - score_min).abs() < 1e-4);
        assert_eq!(result.get("start"), Some(&FieldValue::Integer(start_nanos)));
        assert_eq!(result.get("end"), Some(&FieldValue::Integer(end_nanos)));
    }
}

#[tokio::test]
async fn test_stream_from_query_end_to_end() {
    let mut stream = Stream::from_query(
        "select device, avg(age) as age from Input \
         where device = 'aa' group by device, TumblingWindow('1s')",
    )
    .expect("query should compile");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    stream
        .add_data(record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(30.0)),
        ]))
        .await
        .expect("add_data");
    stream
        .add_data(record(&[
            ("device", FieldValue::String("bb".into())),
            ("age", FieldValue::Float(99.0)),
        ]))
        .await
        .expect("add_data");

    let batch = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no results within 5 seconds")
        .expect("results channel open");

    assert_eq!(batch.len(), 1);
    assert_eq!(
        batch[0].get("device"),
        Some(&FieldValue::String("aa".into()))
    );
    assert!((float_field(&batch[0], "age_avg") - 30.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_sinks_receive_emissions() {
    let config = tumbling_config(&[("age", AggregateType::Avg)]);
    let mut stream = Stream::new(config).expect("stream should build");
    let (sink_tx, mut sink_rx) = tokio::sync::mpsc::unbounded_channel();
    stream.add_sink(move |results| {
        let _ = sink_tx.send(results.to_vec());
    });
    stream.start();

    stream
        .add_data(record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(40.0)),
        ]))
        .await
        .expect("add_data");

    let delivered = timeout(Duration::from_secs(5), sink_rx.recv())
        .await
        .expect("no sink delivery within 5 seconds")
        .expect("sink channel open");
    assert_eq!(delivered.len(), 1);
    assert!((float_field(&delivered[0], "age_avg") - 40.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_results_serialize_to_json() {
    let config = tumbling_config(&[("age", AggregateType::Avg)]);
    let mut stream = Stream::new(config).expect("stream should build");
    let mut results = stream.get_results_channel().expect("results channel");
    stream.start();

    stream
        .add_data(record(&[
            ("device", FieldValue::String("aa".into())),
            ("age", FieldValue::Float(12.0)),
        ]))
        .await
        .expect("add_data");

    let batch = timeout(Duration::from_secs(5), results.recv())
        .await
        .expect("no results within 5 seconds")
        .expect("results channel open");

    let json = serde_json::to_value(ResultBatch(&batch)).expect("serializable");
    assert_eq!(json[0]["device"], serde_json::json!("aa"));
    assert_eq!(json[0]["age_avg"], serde_json::json!(12.0));
}

#[tokio::test]
async fn test_stop_cancels_ingestion() {
    let config = tumbling_config(&[("age", AggregateType::Avg)]);
    let mut stream = Stream::new(config).expect("stream should build");
    stream.start();
    stream.stop();

    // give the cancelled loops a moment to wind down
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = stream
        .add_data(record(&[("device", FieldValue::String("aa".into()))]))
        .await;
    assert!(result.is_err());
}
