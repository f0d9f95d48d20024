//! Local Reconstruction Code Module
//!
//! Repair of single lost shards in a two-dimensional LRC with the fewest
//! bytes fetched, plus full-set encode and decode.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      LrcEngine (registry)                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌──────────────────┐   ┌──────────────┐   ┌──────────────────────┐ │
//! │  │  RepairSession   │   │   Encoder    │   │    DecodeSession     │ │
//! │  └────────┬─────────┘   └──────┬───────┘   └──────────┬───────────┘ │
//! │           │                    │                      │             │
//! │  ┌────────┴─────────┐          │                      │             │
//! │  │ StageController  │          │                      │             │
//! │  │RequestListBuilder│          │                      │             │
//! │  │ ShardStatusTable │          │                      │             │
//! │  └────────┬─────────┘          │                      │             │
//! │           └────────────────────┼──────────────────────┘             │
//! │                      ┌─────────┴─────────┐                          │
//! │                      │    CodeLayout     │                          │
//! │                      └───────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Layout** (`layout.rs`): index space, row/column/global groups and the
//!   coefficient vector of every parity shard
//! - **Status** (`status.rs`): per-shard status with a strict transition table
//! - **Request** (`request.rs`): what each stage still needs
//! - **Stage** (`stage.rs`): forward-only stage machine
//! - **Rebuild** (`rebuild.rs`): the incremental repair protocol
//! - **Encode / Decode** (`encode.rs`, `decode.rs`): framed full-set operations
//! - **Registry** (`registry.rs`): handles, session limit, exclusive access
//!
//! # Usage
//!
//! ```rust,ignore
//! use lrc_repair::{LrcConfig, LrcEngine, RebuildProgress};
//!
//! let engine = LrcEngine::init(LrcConfig::default())?;
//! let handle = engine.begin_rebuild(110, 6, 16384)?;
//!
//! loop {
//!     let list = engine.next_request_list(handle)?;
//!     if list.is_empty() {
//!         break;
//!     }
//!     for index in list {
//!         match fetch(index) {
//!             Some(block) => {
//!                 if engine.add_shard(handle, index, &block)? == RebuildProgress::Complete {
//!                     break;
//!                 }
//!             }
//!             None => engine.declare_lost(handle, index)?,
//!         }
//!     }
//! }
//!
//! let shard = engine.get_result(handle)?;
//! engine.free_handle(handle)?;
//! ```

pub mod decode;
pub mod encode;
pub mod layout;
pub mod rebuild;
pub mod registry;
pub mod request;
pub mod stage;
pub mod status;

#[cfg(test)]
mod proptest;

pub use decode::{DecodeProgress, DecodeSession};
pub use encode::{Encoder, ParitySet};
pub use layout::{CodeLayout, ShardIndex, ShardKind, DEFAULT_SHARD_SIZE, MAX_SHARDS};
pub use rebuild::{RebuildProgress, RepairSession};
pub use registry::{LrcEngine, SessionHandle};
pub use request::{Plan, RequestListBuilder};
pub use stage::{Stage, StageController};
pub use status::{ShardStatus, ShardStatusTable};
