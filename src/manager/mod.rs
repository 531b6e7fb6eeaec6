/// Manager module - check registration, result publication and event
/// consumption
///
/// The producer path (`monitor`) and the consumer path (`consume_events`)
/// share nothing but the bus topic; they run as separate tasks and fail on
/// separate axes. The consumer never holds a reference to any check.


use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::database::Store;
use crate::monitoring::types::{CheckResult, epoch_now};
use crate::monitoring::{Check, ResultCallback};

/// Wire envelope carried on the bus topic.
#[derive(Serialize)]
struct EventEnvelope<'a> {
    check_id: i64,
    result: &'a CheckResult,
}

/// Coordinates checks with the event bus and the durable store.
#[derive(Clone)]
pub struct CheckManager {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl CheckManager {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self { store, bus, topic: topic.into() }
    }

    /// Persist a check's configuration, then run its probe loop with the
    /// result callback bound to the identity the store assigned.
    ///
    /// Does not return until the loop exits: on cancellation of the owning
    /// task, or with the error of a failed publish. A failed registration
    /// is fatal to this invocation and the check is never started.
    pub async fn monitor(&self, kind: &str, check: Arc<dyn Check>) -> Result<()> {
        let config = check.config_document()?;
        let check_id = self
            .store
            .insert_check(kind, &config)
            .await
            .with_context(|| format!("failed to register {kind} check"))?;
        info!(check_id, kind, "registered check");

        let manager = self.clone();
        let callback: ResultCallback = Box::new(move |result| {
            let manager = manager.clone();
            Box::pin(async move { manager.publish_event(check_id, &result).await })
        });

        check.start(callback).await
    }

    /// Publish one check result to the bus topic.
    pub async fn publish_event(&self, check_id: i64, result: &CheckResult) -> Result<()> {
        info!(check_id, "publishing check event");
        let payload = serde_json::to_vec(&EventEnvelope { check_id, result })?;
        self.bus.publish(&self.topic, payload).await
    }

    /// Drain the bus topic, persisting each event against its check.
    ///
    /// Runs until the owning task is cancelled; a store write failure
    /// propagates out and terminates only this loop.
    pub async fn consume_events(&self) -> Result<()> {
        let mut messages = self.bus.subscribe(&self.topic).await?;

        while let Some(payload) = messages.recv().await {
            let envelope: serde_json::Value = serde_json::from_slice(&payload)?;
            debug!(topic = %self.topic, %envelope, "consumed message");

            let check_id = envelope
                .get("check_id")
                .and_then(serde_json::Value::as_i64)
                .context("bus message without check_id")?;
            let mut result = match envelope.get("result") {
                Some(serde_json::Value::Object(map)) => map.clone(),
                _ => bail!("bus message without result document"),
            };
            let timestamp = result
                .remove("timestamp")
                .and_then(|v| v.as_f64())
                .unwrap_or_else(epoch_now);

            let event_id = self
                .store
                .insert_event(timestamp, check_id, &serde_json::Value::Object(result))
                .await?;
            info!(event_id, check_id, "persisted check event");
        }

        Ok(())
    }
}
