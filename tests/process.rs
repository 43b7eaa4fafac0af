mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use procvisor::{CallError, ExitValue, MetricKind, Registry, RemoteError, Scripts, Target};
use serde_json::{Value, json};

use common::{Captured, config, eventually, shared, worker_bin};

fn scripts() -> Scripts {
    Scripts::new(&config(Duration::from_secs(60))).unwrap()
}

#[tokio::test]
async fn single_value_call_then_clean_exit() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();
    assert_eq!(worker.name(), format!("test.{target}.1"));
    assert!(worker.connected());

    let five: i64 = worker.call_value("Test", "echo", vec![json!(5)]).await.unwrap();
    assert_eq!(five, 5);
    let doubled: i64 = worker.call_value("Test", "double", vec![json!(21)]).await.unwrap();
    assert_eq!(doubled, 42);

    worker.disconnect();
    assert_eq!(worker.exit().await, ExitValue::Code(0));
    assert!(!worker.connected());
}

#[tokio::test]
async fn streaming_call_yields_every_value() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();

    let values = worker.caller().call_all("Test", "count", vec![json!(3)]).await.unwrap();
    assert_eq!(values, vec![json!(0), json!(1), json!(2)]);

    let nothing = worker.caller().call_all("Test", "count", vec![json!(0)]).await.unwrap();
    assert!(nothing.is_empty());

    worker.disconnect();
    worker.exit().await;
}

#[tokio::test]
async fn remote_errors_keep_name_message_and_stack() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();

    let err = worker
        .call_value::<Value>("Test", "fail", vec![json!("nope")])
        .await
        .unwrap_err();
    let remote = err.as_remote().expect("remote error");
    assert_eq!(remote.name, "TestError");
    assert_eq!(remote.message, "nope");
    assert_eq!(remote.stack, "at Test.fail");

    let err = worker.call_value::<Value>("Test", "missing", vec![]).await.unwrap_err();
    assert_eq!(err.as_remote().map(|e| e.name.as_str()), Some("MethodNotFound"));

    let err = worker.call_value::<Value>("Nope", "echo", vec![]).await.unwrap_err();
    let remote = err.as_remote().expect("remote error");
    assert_eq!(remote.name, "TargetNotFound");
    assert!(remote.message.contains("Nope"));

    worker.disconnect();
    worker.exit().await;
}

#[tokio::test]
async fn timeout_does_not_disturb_concurrent_call() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();

    let started = Instant::now();
    let mut hanging = worker.call_with_timeout("Test", "hang", vec![], Duration::from_millis(100));
    let echo = worker.call_value::<String>("Test", "echo", vec![json!("still here")]);

    let (timed_out, echoed) = tokio::join!(hanging.next(), echo);
    let err = timed_out.expect("terminal item").unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(echoed.unwrap(), "still here");

    worker.disconnect();
    worker.exit().await;
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();

    let mut pongs = Box::pin(worker.listen("pong"));
    worker.event("ping", json!({ "n": 1 }));
    let data = tokio::time::timeout(common::WAIT, pongs.next()).await.unwrap();
    assert_eq!(data, Some(json!({ "n": 1 })));

    worker.disconnect();
    worker.exit().await;
    assert_eq!(pongs.next().await, None);
}

#[tokio::test]
async fn worker_calls_back_into_parent() {
    let registry = Registry::builder()
        .target(Target::new("Test").unary("echo", |args: Vec<Value>| async move {
            Ok::<_, RemoteError>(args.into_iter().next().unwrap_or(Value::Null))
        }))
        .target(Target::new("Repeat").streaming("echo", |args: Vec<Value>| {
            let value = args.into_iter().next().unwrap_or(Value::Null);
            stream::iter((0..3).map(move |_| Ok::<_, RemoteError>(value.clone())))
        }))
        .build()
        .unwrap();
    let (_, target) = worker_bin();
    let worker = scripts().with_registry(registry).fork(&target, &[]).unwrap();

    for parent_target in ["Test", "Repeat"] {
        let out: i64 = worker
            .call_value("Test", "callParent", vec![json!(parent_target), json!("echo"), json!(5)])
            .await
            .unwrap();
        assert_eq!(out, 5, "via {parent_target}");
    }

    let err = worker
        .call_value::<Value>("Test", "callParent", vec![json!("Missing"), json!("echo"), json!(5)])
        .await
        .unwrap_err();
    assert_eq!(err.as_remote().map(|e| e.name.as_str()), Some("TargetNotFound"));

    worker.disconnect();
    worker.exit().await;
}

#[tokio::test]
async fn logs_and_metrics_reach_parent_sink() {
    let captured = Arc::new(Captured::default());
    let (_, target) = worker_bin();
    let worker = scripts().with_sink(shared(&captured)).fork(&target, &[]).unwrap();
    let source = worker.name().to_string();

    worker.call_value::<Value>("Test", "log", vec![json!("hello parent")]).await.unwrap();
    worker.call_value::<Value>("Test", "metric", vec![json!("jobs")]).await.unwrap();

    assert!(
        eventually(|| captured
            .logs
            .lock()
            .iter()
            .any(|(src, r)| src == &source && r.message == "hello parent"))
        .await
    );
    assert!(
        eventually(|| captured.metrics.lock().iter().any(|(src, m)| {
            src == &source && m.name == "jobs" && m.kind == MetricKind::Increment
        }))
        .await
    );

    worker.disconnect();
    worker.exit().await;
}

#[tokio::test]
async fn exit_code_is_reported_and_pending_calls_close() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();

    let mut hanging = worker.call("Test", "hang", vec![]);
    worker.call_value::<Value>("Test", "exit", vec![json!(7)]).await.unwrap();

    assert_eq!(worker.exit().await, ExitValue::Code(7));
    let err = hanging.next().await.expect("terminal item").unwrap_err();
    assert!(matches!(err, CallError::Closed { .. }), "{err}");
}

#[cfg(unix)]
#[tokio::test]
async fn kill_reports_sigterm() {
    let (_, target) = worker_bin();
    let worker = scripts().fork(&target, &[]).unwrap();
    let _: i64 = worker.call_value("Test", "echo", vec![json!(1)]).await.unwrap();

    worker.kill();
    assert_eq!(worker.exit().await, ExitValue::Signal("SIGTERM".into()));
    worker.kill();
}
