use crate::{
    Error,
    cache::ResultCache,
    client::ServiceApi,
    manager,
    models::ReceiptRecord,
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::warn;

pub(crate) enum PollerCommand {
    Shutdown,
}

/// Identifiers currently being reconciled, plus the ones that already
/// reached a terminal state. Settling is one-way: a retired identifier
/// is never polled again.
#[derive(Default)]
pub(crate) struct PollRegistry {
    pub(crate) in_flight: HashSet<String>,
    pub(crate) retired: HashSet<String>,
}

impl PollRegistry {
    pub(crate) fn register(&mut self, uuid: &str) {
        if self.retired.contains(uuid) {
            warn!(uuid, "receipt already settled; not re-registering for polling");
            return;
        }
        self.in_flight.insert(uuid.to_owned());
    }

    pub(crate) fn unregister(&mut self, uuid: &str) {
        self.in_flight.remove(uuid);
        self.retired.insert(uuid.to_owned());
    }
}

/// Handle over the in-flight registry and the interval worker that
/// reconciles it. Dropping the handle closes the command channel, which
/// stops the worker.
pub struct StatusPoller {
    registry: Arc<Mutex<PollRegistry>>,
    cmd_tx: mpsc::UnboundedSender<PollerCommand>,
}

impl StatusPoller {
    /// Spawns the interval worker. Must be called within a Tokio runtime.
    pub(crate) fn spawn<Api: ServiceApi>(
        api: Api,
        cache: ResultCache,
        period: Duration,
    ) -> Self {
        let registry = Arc::new(Mutex::new(PollRegistry::default()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(poll_worker(api, cache, Arc::clone(&registry), period, cmd_rx));
        Self { registry, cmd_tx }
    }

    pub(crate) fn register(&self, uuid: &str) {
        self.registry.lock().unwrap().register(uuid);
    }

    pub(crate) fn unregister(&self, uuid: &str) {
        self.registry.lock().unwrap().unregister(uuid);
    }

    pub fn is_in_flight(&self, uuid: &str) -> bool {
        self.registry.lock().unwrap().in_flight.contains(uuid)
    }

    pub fn in_flight(&self) -> Vec<String> {
        let registry = self.registry.lock().unwrap();
        let mut ids: Vec<String> = registry.in_flight.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Empties the in-flight set. Registration history stays so settled
    /// identifiers remain barred from re-registration.
    pub(crate) fn clear(&self) {
        self.registry.lock().unwrap().in_flight.clear();
    }

    /// Stops the interval worker.
    pub(crate) fn halt(&self) {
        let _ = self.cmd_tx.send(PollerCommand::Shutdown);
    }

    pub(crate) fn registry(&self) -> &Mutex<PollRegistry> {
        &self.registry
    }
}

/// Overwrites the cached record and retires its identifier as one step.
/// The registry lock is held across the cache write so no reader can see
/// a retired identifier paired with a stale non-terminal record.
pub(crate) fn settle(
    registry: &Mutex<PollRegistry>,
    cache: &ResultCache,
    record: &ReceiptRecord,
) {
    let mut registry = registry.lock().unwrap();
    cache.set_receipt(record.clone());
    registry.unregister(&record.uuid);
}

async fn poll_worker<Api: ServiceApi>(
    api: Api,
    cache: ResultCache,
    registry: Arc<Mutex<PollRegistry>>,
    period: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<PollerCommand>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    // A slow batch delays the next tick instead of bursting, so two batch
    // processings never overlap.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            // Teardown wins over a tick that became due at the same moment.
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(PollerCommand::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                if let Err(err) = poll_once(&api, &cache, &registry).await {
                    warn!(%err, "status poll failed");
                }
            }
        }
    }
}

/// One batched status query for everything in flight. An empty set skips
/// the network call entirely.
async fn poll_once<Api: ServiceApi>(
    api: &Api,
    cache: &ResultCache,
    registry: &Mutex<PollRegistry>,
) -> crate::Result<()> {
    let ids: Vec<String> = {
        let registry = registry.lock().unwrap();
        registry.in_flight.iter().cloned().collect()
    };
    if ids.is_empty() {
        return Ok(());
    }
    let raw = api.poll_status(&ids).await?;
    let records: Vec<ReceiptRecord> = raw.decode().map_err(Error::Poll)?;
    manager::process_batch(cache, registry, records);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn register__twice__keeps_single_entry() {
        let mut registry = PollRegistry::default();
        registry.register("r-1");
        registry.register("r-1");
        assert_eq!(registry.in_flight.len(), 1);
    }

    #[test]
    fn unregister__unknown_identifier__is_a_noop() {
        let mut registry = PollRegistry::default();
        registry.unregister("r-9");
        assert!(registry.in_flight.is_empty());
        assert!(registry.retired.contains("r-9"));
    }

    #[test]
    fn register__after_unregister__is_refused() {
        let mut registry = PollRegistry::default();
        registry.register("r-1");
        registry.unregister("r-1");
        registry.register("r-1");
        assert!(!registry.in_flight.contains("r-1"));
    }

    #[test]
    fn clear__empties_in_flight_but_keeps_retired() {
        let mut registry = PollRegistry::default();
        registry.register("r-1");
        registry.register("r-2");
        registry.unregister("r-2");

        registry.in_flight.clear();

        assert!(registry.in_flight.is_empty());
        assert!(registry.retired.contains("r-2"));
    }
}
