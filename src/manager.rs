use crate::{
    Error,
    cache::ResultCache,
    client::ServiceApi,
    models::{
        Product,
        PurchaseRequest,
        ReceiptRecord,
        ReceiptStatus,
        Store,
        TxStatus,
    },
    poller::{
        PollRegistry,
        StatusPoller,
        settle,
    },
};
use std::{
    sync::Mutex,
    time::Duration,
};
use tracing::{
    error,
    info,
    warn,
};


pub const DEFAULT_PRODUCTS_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug)]
pub struct ManagerConfig {
    pub products_cache_ttl: Duration,
    pub poll_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            products_cache_ttl: DEFAULT_PRODUCTS_CACHE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Orchestrates the IAP reconciliation flow: health-probed
/// initialization, the TTL-cached product catalog, purchase submission,
/// and the background poller that tracks every pending receipt until its
/// status settles.
///
/// The manager is the only writer of the [`ResultCache`]; the poll worker
/// writes through the same settle path. Dropping the manager stops the
/// worker, but [`IapManager::shutdown`] tears it down deterministically.
pub struct IapManager<Api> {
    api: Api,
    cache: ResultCache,
    poller: StatusPoller,
    initialized: bool,
    shut_down: bool,
}

impl<Api: ServiceApi> IapManager<Api> {
    /// Spawns the poll worker; must be called within a Tokio runtime.
    pub fn new(api: Api) -> Self {
        Self::with_config(api, ManagerConfig::default())
    }

    pub fn with_config(api: Api, config: ManagerConfig) -> Self {
        let cache = ResultCache::new(config.products_cache_ttl);
        let poller = StatusPoller::spawn(api.clone(), cache.clone(), config.poll_interval);
        Self {
            api,
            cache,
            poller,
            initialized: false,
            shut_down: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Health-probes the service. Until this succeeds every other
    /// operation fails with [`Error::NotInitialized`]. Calling it again
    /// once initialized is a reported no-op.
    pub async fn initialize(
        &mut self,
        products_cache_ttl: Option<Duration>,
    ) -> crate::Result<()> {
        if self.initialized {
            warn!("IAP service manager is already initialized");
            return Ok(());
        }

        let res = self.api.ping().await?;
        if let Err(err) = res.check() {
            warn!(%err, "health probe rejected");
            return Err(Error::Connect(format!("health probe rejected: {err}")));
        }

        if let Some(ttl) = products_cache_ttl {
            self.cache.set_ttl(ttl);
        }
        self.initialized = true;
        Ok(())
    }

    /// Returns the cached catalog when it is present, fresh and not
    /// forced; otherwise fetches, replaces the cache wholesale and
    /// returns the new catalog. A rejected or malformed response leaves
    /// the previous cache untouched.
    pub async fn get_products(
        &self,
        agent_address: &str,
        force: bool,
    ) -> crate::Result<Vec<Product>> {
        if !self.initialized {
            warn!("IAP service manager is not initialized");
            return Err(Error::NotInitialized);
        }

        if !force && !self.cache.is_stale() {
            if let Some(products) = self.cache.products() {
                return Ok(products);
            }
        }

        let raw = self.api.fetch_products(agent_address).await?;
        let products: Vec<Product> = raw.decode().map_err(|err| {
            warn!(%err, "product catalog fetch rejected");
            Error::Fetch(err)
        })?;
        self.cache.set_products(products.clone());
        Ok(products)
    }

    /// Submits a store receipt for validation. On success the resulting
    /// record is cached and, unless its status is already terminal, its
    /// identifier is registered with the poller for reconciliation. An
    /// out-of-range status aborts before anything is stored.
    pub async fn submit_purchase(
        &self,
        receipt_data: &str,
        store: Store,
        agent_address: &str,
        avatar_address: &str,
    ) -> crate::Result<ReceiptRecord> {
        if !self.initialized {
            warn!("IAP service manager is not initialized");
            return Err(Error::NotInitialized);
        }

        let request = PurchaseRequest {
            store,
            data: receipt_data.to_string(),
            agent_address: agent_address.to_string(),
            avatar_address: avatar_address.to_string(),
        };
        let raw = self.api.request_purchase(&request).await?;
        let record: ReceiptRecord = raw.decode().map_err(|err| {
            warn!(%err, "purchase submission rejected");
            Error::Submit(err)
        })?;

        let disposition = reconcile(&record).map_err(|err| {
            error!(%err, "purchase response carried an out-of-range status");
            err
        })?;
        match disposition {
            Disposition::KeepPolling => {
                self.cache.set_receipt(record.clone());
                self.poller.register(&record.uuid);
            }
            // Already terminal on arrival; settling also bars the
            // identifier from any later registration.
            Disposition::Settled => {
                settle(self.poller.registry(), &self.cache, &record);
            }
        }
        Ok(record)
    }

    /// Most recent known record for a receipt, terminal ones included.
    pub fn receipt(&self, uuid: &str) -> Option<ReceiptRecord> {
        self.cache.receipt(uuid)
    }

    /// Sorted view of the identifiers currently being polled.
    pub fn in_flight(&self) -> Vec<String> {
        self.poller.in_flight()
    }

    /// Halts the poll worker, then clears the in-flight set. The order
    /// guarantees no batch delivered after teardown begins can touch the
    /// cache. Calling it again is a reported no-op.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            warn!("IAP service manager is already shut down");
            return;
        }
        self.poller.halt();
        self.poller.clear();
        self.shut_down = true;
    }
}

pub(crate) enum Disposition {
    KeepPolling,
    Settled,
}

/// The two-level, short-circuiting status check: validation status first,
/// transaction status only when validation reached `Valid`. Values outside
/// either enumeration are a contract violation, not a business outcome.
pub(crate) fn reconcile(record: &ReceiptRecord) -> crate::Result<Disposition> {
    match record.status {
        ReceiptStatus::Init | ReceiptStatus::ValidationRequest => {
            return Ok(Disposition::KeepPolling);
        }
        ReceiptStatus::Valid => {}
        ReceiptStatus::Invalid => {
            warn!(uuid = %record.uuid, "invalid receipt");
            return Ok(Disposition::Settled);
        }
        ReceiptStatus::Unknown => {
            warn!(uuid = %record.uuid, "receipt in unknown state");
            return Ok(Disposition::Settled);
        }
        ReceiptStatus::Unrecognized(raw) => {
            return Err(Error::LogicFault {
                uuid: record.uuid.clone(),
                field: "status",
                raw,
            });
        }
    }

    match record.tx_status {
        TxStatus::Created | TxStatus::Staged => Ok(Disposition::KeepPolling),
        TxStatus::Success => {
            info!(uuid = %record.uuid, "purchase transaction succeeded");
            Ok(Disposition::Settled)
        }
        TxStatus::Failure => {
            warn!(uuid = %record.uuid, "purchase transaction failed");
            Ok(Disposition::Settled)
        }
        TxStatus::Invalid => {
            warn!(uuid = %record.uuid, "purchase transaction invalid");
            Ok(Disposition::Settled)
        }
        TxStatus::NotFound => {
            warn!(uuid = %record.uuid, "purchase transaction not found");
            Ok(Disposition::Settled)
        }
        TxStatus::FailToCreate => {
            warn!(uuid = %record.uuid, "purchase transaction could not be created");
            Ok(Disposition::Settled)
        }
        TxStatus::Unknown => {
            warn!(uuid = %record.uuid, "purchase transaction in unknown state");
            Ok(Disposition::Settled)
        }
        TxStatus::Unrecognized(raw) => Err(Error::LogicFault {
            uuid: record.uuid.clone(),
            field: "tx_status",
            raw,
        }),
    }
}

/// Applies the transition policy to one poll batch, in the order the
/// records arrived. A logic fault aborts only the offending record: it is
/// logged loudly and neither cached nor unregistered.
pub(crate) fn process_batch(
    cache: &ResultCache,
    registry: &Mutex<PollRegistry>,
    records: Vec<ReceiptRecord>,
) {
    for record in records {
        match reconcile(&record) {
            Ok(Disposition::KeepPolling) => {}
            Ok(Disposition::Settled) => settle(registry, cache, &record),
            Err(err) => {
                error!(%err, "aborting reconciliation for receipt");
            }
        }
    }
}
