//! Merchant resolver: idempotent lookup-or-create.

use std::sync::Arc;

use tillsync_infra::Store;
use tillsync_merchants::{ExternalMerchantRef, Merchant};

use crate::error::SyncError;

/// Maps an external merchant identity onto the canonical internal record.
///
/// Invoked lazily the first time an order references an unseen merchant.
/// Concurrency is delegated entirely to the store's upsert: two callers
/// racing on the same (external_id, channel) converge on one row without any
/// application-level locking here.
pub struct MerchantResolver {
    store: Arc<dyn Store>,
}

impl MerchantResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, external: &ExternalMerchantRef) -> Result<Merchant, SyncError> {
        let merchant = self.store.upsert_merchant(external).await?;
        tracing::debug!(
            merchant_id = %merchant.id,
            external_id = %external.external_id,
            channel = %external.channel,
            "resolved merchant"
        );
        Ok(merchant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillsync_core::Channel;
    use tillsync_infra::MemoryStore;

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let resolver = MerchantResolver::new(store);
        let external = ExternalMerchantRef::new("MER1", Channel::Clover).unwrap();

        let first = resolver.resolve(&external).await.unwrap();
        let second = resolver.resolve(&external).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.external_id, "MER1");
    }
}
