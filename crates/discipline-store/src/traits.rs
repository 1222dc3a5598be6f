//! Store trait definitions

use async_trait::async_trait;

use crate::StoreResult;

/// A store holding exactly one value.
#[async_trait]
pub trait ValueStore<V: Send + Sync + 'static>: Send + Sync {
    /// Read the stored value. When nothing is stored yet the codec's fallback
    /// is written and returned.
    async fn read(&self) -> StoreResult<V>;

    /// Replace the stored value, creating the backing storage if needed
    async fn write(&self, value: &V) -> StoreResult<()>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
