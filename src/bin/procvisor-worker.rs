//! Reference worker executable.
//!
//! Serves the `Test` target to its parent and answers `ping` events with `pong`.
//! Local diagnostics go to stderr; stdout carries the channel.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use futures::{StreamExt, stream};
use procvisor::{ChildProcess, Registry, RemoteError, Target};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Null)
}

fn registry(parent: Arc<OnceLock<ChildProcess>>) -> anyhow::Result<Arc<Registry>> {
    let relay = Arc::clone(&parent);
    let emitter = Arc::clone(&parent);
    let metrics = parent;

    let test = Target::new("Test")
        .unary("echo", |args| async move { Ok::<_, RemoteError>(first(args)) })
        .typed("double", |(n,): (i64,)| async move { Ok::<_, RemoteError>(n * 2) })
        .streaming("count", |args| {
            let n = first(args).as_u64().unwrap_or(0);
            stream::iter((0..n).map(|i| Ok::<_, RemoteError>(Value::from(i))))
        })
        .typed("fail", |(message,): (String,)| async move {
            Err::<Value, _>(RemoteError::new("TestError", message).with_stack("at Test.fail"))
        })
        .unary("hang", |_args| async move {
            futures::future::pending::<Result<Value, RemoteError>>().await
        })
        .typed("callParent", move |(target, method, value): (String, String, Value)| {
            let relay = Arc::clone(&relay);
            async move {
                let child = relay
                    .get()
                    .ok_or_else(|| RemoteError::new("NotReady", "worker is starting"))?;
                let out: Value = child.call_value(&target, &method, vec![value]).await?;
                Ok::<_, RemoteError>(out)
            }
        })
        .typed("emit", move |(name, data): (String, Value)| {
            let emitter = Arc::clone(&emitter);
            async move {
                if let Some(child) = emitter.get() {
                    child.event(&name, data);
                }
                Ok::<_, RemoteError>(Value::Null)
            }
        })
        .typed("log", |(message,): (String,)| async move {
            tracing::info!(origin = "Test.log", "{message}");
            Ok::<_, RemoteError>(Value::Null)
        })
        .typed("metric", move |(name,): (String,)| {
            let metrics = Arc::clone(&metrics);
            async move {
                if let Some(child) = metrics.get() {
                    child.increment(&name);
                }
                Ok::<_, RemoteError>(Value::Null)
            }
        })
        .typed("exit", |(code,): (i32,)| async move {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                std::process::exit(code);
            });
            Ok::<_, RemoteError>(Value::Null)
        });

    Ok(Registry::builder().target(test).build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parent = Arc::new(OnceLock::new());
    let child = ChildProcess::from_env(registry(Arc::clone(&parent))?)
        .context("worker must be started by a procvisor parent")?;
    let _ = parent.set(child.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(child.forward_layer())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let mut pings = Box::pin(child.listen("ping"));
    let responder = child.clone();
    tokio::spawn(async move {
        while let Some(data) = pings.next().await {
            responder.event("pong", data);
        }
    });

    tracing::debug!(name = child.name(), "worker ready");
    child.run().await;
    Ok(())
}
