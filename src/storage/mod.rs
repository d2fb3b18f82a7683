//! Persistence for content items, node state and assets
//!
//! - [`repository`]: the content store with its write hooks
//! - [`dedup`]: identity resolution over the content store
//! - [`checkpoint`]: durable per-node state, including import jobs
//! - [`assets`]: imported featured images

pub mod assets;
pub mod checkpoint;
pub mod dedup;
pub mod repository;

pub use assets::{AssetStore, FsAssetStore, MemoryAssetStore};
pub use checkpoint::{JsonNodeStateStore, MemoryNodeStateStore, NodeStateStore};
pub use dedup::DedupResolver;
pub use repository::{
    ContentStore, HookChain, MemoryContentStore, SqliteContentStore, WriteContext, WriteHook,
    WriteOp,
};
