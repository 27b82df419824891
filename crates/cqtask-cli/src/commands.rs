use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::{parse_pair, Commands};
use cqtask_core::{ChangeEvent, ChangeType, ChannelListener, ListenerEvent, QueryFilter, StorageAdapter};
use cqtask_worker::{spawn_worker, InMemoryStore, TaskDispatcher, WorkerConfig};

pub async fn execute(command: Commands, config: WorkerConfig) -> Result<()> {
    match command {
        Commands::Watch {
            filters,
            returning,
            publish,
            disconnect,
        } => watch(config, filters, returning, publish, disconnect).await,

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn watch(
    config: WorkerConfig,
    filters: Vec<(String, String)>,
    returning: Vec<String>,
    publish: Vec<String>,
    disconnect: bool,
) -> Result<()> {
    let mut builder = QueryFilter::builder();
    for (attribute, value) in filters {
        builder = builder.equals(attribute, value);
    }
    for attribute in returning {
        builder = builder.returning(attribute);
    }
    let filter = builder.build()?;

    // Parse everything up front so a typo fails before the worker starts.
    let changes = publish
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let attributes = parse_attributes(raw)?;
            Ok(ChangeEvent {
                attributes,
                ..ChangeEvent::new(format!("token-{}", i + 1), ChangeType::Added)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let store = Arc::new(InMemoryStore::new());
    let worker = spawn_worker(&config, store.clone())?;
    let (listener, mut events) = ChannelListener::new();

    println!("Submitting continuous query {}", filter);
    let query = worker
        .queue()
        .continuous_query(filter, Arc::new(listener))
        .await?;

    // The promise only ever succeeds; failures show up on the listener.
    let live = tokio::select! {
        live = query.wait() => live,
        event = events.recv() => match event {
            Some(ListenerEvent::Error(e)) => bail!("Continuous query failed to start: {}", e),
            Some(ListenerEvent::Result(_)) | None => {
                bail!("Listener closed before the query went live")
            }
        },
    };
    println!("✓ Query live: {} (started {})", live.id, live.started_at.to_rfc3339());

    for change in &changes {
        let delivered = store.publish(change);
        tracing::debug!("Published {} to {} queries", change.token_id, delivered);
    }

    if disconnect {
        store.disconnect("disconnect requested");
    } else {
        store.stop_continuous_query(&live.id)?;
    }

    let stats = worker.shutdown().await?;

    let mut results = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ListenerEvent::Result(change) => {
                results += 1;
                println!("{}", serde_json::to_string(&change)?);
            }
            ListenerEvent::Error(e) => println!("✗ {}", e),
        }
    }

    println!();
    println!("Received {} of {} published changes", results, changes.len());
    println!("Worker: {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn parse_attributes(raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_pair(part).map_err(anyhow::Error::msg))
        .collect()
}
