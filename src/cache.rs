use crate::models::{
    Product,
    ReceiptRecord,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::time::Instant;

/// Shared result store: the last-fetched product catalog with a TTL stamp
/// and the most recent known record per receipt identifier.
///
/// Handles are cheap clones over the same state. Reads and writes arrive
/// both from caller-driven operations and from the poll worker, so every
/// field carries its own lock. Receipt records are never removed; terminal
/// records stay readable after the poller retires them.
#[derive(Clone)]
pub struct ResultCache {
    catalog: Arc<Mutex<Option<CatalogEntry>>>,
    receipts: Arc<Mutex<HashMap<String, ReceiptRecord>>>,
    ttl: Arc<Mutex<Duration>>,
}

#[derive(Clone)]
struct CatalogEntry {
    products: Vec<Product>,
    fetched_at: Instant,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(None)),
            receipts: Arc::new(Mutex::new(HashMap::new())),
            ttl: Arc::new(Mutex::new(ttl)),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    pub fn products(&self) -> Option<Vec<Product>> {
        let guard = self.catalog.lock().unwrap();
        guard.as_ref().map(|entry| entry.products.clone())
    }

    /// Replaces the catalog wholesale and restamps its fetch time.
    pub fn set_products(&self, products: Vec<Product>) {
        let mut guard = self.catalog.lock().unwrap();
        *guard = Some(CatalogEntry {
            products,
            fetched_at: Instant::now(),
        });
    }

    /// An absent catalog counts as stale.
    pub fn is_stale(&self) -> bool {
        let ttl = *self.ttl.lock().unwrap();
        let guard = self.catalog.lock().unwrap();
        match &*guard {
            Some(entry) => entry.fetched_at.elapsed() > ttl,
            None => true,
        }
    }

    pub fn receipt(&self, uuid: &str) -> Option<ReceiptRecord> {
        let guard = self.receipts.lock().unwrap();
        guard.get(uuid).cloned()
    }

    /// Upsert with last-write-wins semantics; no merging.
    pub fn set_receipt(&self, record: ReceiptRecord) {
        let mut guard = self.receipts.lock().unwrap();
        guard.insert(record.uuid.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ReceiptStatus,
        Store,
        TxStatus,
    };
    use tokio::time;

    fn product(id: &str) -> Product {
        Product {
            id: id.to_string(),
            name: format!("product {id}"),
            description: String::new(),
            price: 0.99,
            currency: "USD".to_string(),
            active: true,
        }
    }

    fn record(uuid: &str, status: ReceiptStatus) -> ReceiptRecord {
        ReceiptRecord {
            uuid: uuid.to_string(),
            store: Store::Test,
            agent_address: "0xagent".to_string(),
            avatar_address: "0xavatar".to_string(),
            status,
            tx_status: TxStatus::Created,
            tx_id: None,
            purchased_at: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn is_stale__empty_cache__is_stale() {
        let cache = ResultCache::new(Duration::from_secs(600));
        assert!(cache.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn is_stale__within_ttl__is_fresh() {
        let cache = ResultCache::new(Duration::from_secs(600));
        cache.set_products(vec![product("p1")]);

        time::advance(Duration::from_secs(599)).await;

        assert!(!cache.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn is_stale__past_ttl__is_stale_until_refetched() {
        let cache = ResultCache::new(Duration::from_secs(600));
        cache.set_products(vec![product("p1")]);

        time::advance(Duration::from_secs(601)).await;
        assert!(cache.is_stale());

        cache.set_products(vec![product("p2")]);
        assert!(!cache.is_stale());
    }

    #[tokio::test]
    async fn set_receipt__same_uuid__last_write_wins() {
        let cache = ResultCache::new(Duration::from_secs(600));
        cache.set_receipt(record("r-1", ReceiptStatus::Init));
        cache.set_receipt(record("r-1", ReceiptStatus::Valid));

        let stored = cache.receipt("r-1").unwrap();
        assert_eq!(stored.status, ReceiptStatus::Valid);
        assert_eq!(cache.receipt("r-2"), None);
    }
}
