//! Local pictogram asset cache
//!
//! Owns every pictogram file on disk. Entries are created by the fetch coordinator, verified
//! by checksum, kept in LRU order and removed by eviction, expiry or an explicit clear.

pub mod entry;
pub mod maintenance;
pub mod metadata;
pub mod store;

pub use entry::IncomingAsset;
pub use maintenance::CacheMaintenanceService;
pub use metadata::CachedPictogramMetadata;
pub use store::{
    AssetPin, CacheStats, CacheStore, EvictionPolicy, EvictionStats, PinnedAsset, StoreOutcome,
};
