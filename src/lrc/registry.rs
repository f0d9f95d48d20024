//! Session Registry
//!
//! Hands out opaque handles for repair and decode sessions, bounds how many
//! may be open at once, and guarantees a session is driven by one caller at
//! a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument};

use crate::adapters::GaloisAlgebra;
use crate::config::LrcConfig;
use crate::domain::ports::AlgebraEngine;
use crate::error::{Error, Result};
use crate::lrc::decode::{DecodeProgress, DecodeSession};
use crate::lrc::encode::{Encoder, ParitySet};
use crate::lrc::layout::ShardIndex;
use crate::lrc::rebuild::{RebuildProgress, RepairSession};
use crate::lrc::stage::Stage;

/// Opaque session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Raw handle value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug)]
enum Session {
    Rebuild(RepairSession),
    Decode(DecodeSession),
}

impl Session {
    fn free(&mut self) -> bool {
        match self {
            Session::Rebuild(s) => s.free(),
            Session::Decode(s) => s.free(),
        }
    }
}

/// Registered session holding one of the `max_sessions` permits
struct SessionSlot {
    session: Mutex<Session>,
    _permit: OwnedSemaphorePermit,
}

/// Registry of open sessions sharing one algebra engine
pub struct LrcEngine {
    config: LrcConfig,
    engine: Arc<dyn AlgebraEngine>,
    sessions: DashMap<SessionHandle, SessionSlot>,
    /// Bounds open sessions; a permit is released when its slot is dropped
    permits: Arc<Semaphore>,
    next_handle: AtomicU64,
}

impl std::fmt::Debug for LrcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LrcEngine")
            .field("config", &self.config)
            .field("engine", &self.engine.name())
            .field("active_sessions", &self.sessions.len())
            .finish()
    }
}

impl LrcEngine {
    /// Create a registry backed by the GF(256) engine.
    pub fn init(config: LrcConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(GaloisAlgebra::new()))
    }

    /// Create a registry backed by `engine`.
    pub fn with_engine(config: LrcConfig, engine: Arc<dyn AlgebraEngine>) -> Result<Self> {
        config.validate()?;
        info!(
            max_parity_shards = config.max_parity_shards,
            max_sessions = config.max_sessions,
            engine = engine.name(),
            "LRC engine initialized"
        );
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_sessions)),
            config,
            engine,
            sessions: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &LrcConfig {
        &self.config
    }

    /// Number of open sessions
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    /// Open a repair session for `lost_index`.
    #[instrument(skip(self))]
    pub fn begin_rebuild(
        &self,
        original_count: usize,
        lost_index: ShardIndex,
        shard_size: usize,
    ) -> Result<SessionHandle> {
        let permit = self.acquire_slot()?;
        let session = RepairSession::begin(
            self.engine.clone(),
            self.config.global_count(),
            original_count,
            lost_index,
            shard_size,
        )?;
        Ok(self.register(Session::Rebuild(session), permit))
    }

    /// Shards the session needs next.
    pub fn next_request_list(&self, handle: SessionHandle) -> Result<Vec<ShardIndex>> {
        self.with_rebuild(handle, |s| s.next_request_list())
    }

    /// Supply a shard block to a repair session.
    pub fn add_shard(
        &self,
        handle: SessionHandle,
        index: ShardIndex,
        data: &[u8],
    ) -> Result<RebuildProgress> {
        self.with_rebuild(handle, |s| s.add_shard(index, data))
    }

    /// Report a shard the caller cannot supply.
    pub fn declare_lost(&self, handle: SessionHandle, index: ShardIndex) -> Result<()> {
        self.with_rebuild(handle, |s| s.declare_lost(index))
    }

    /// Current stage of a repair session.
    pub fn stage(&self, handle: SessionHandle) -> Result<Stage> {
        self.with_rebuild(handle, |s| Ok(s.stage()))
    }

    /// Copy of the rebuilt shard.
    pub fn get_result(&self, handle: SessionHandle) -> Result<Vec<u8>> {
        self.with_rebuild(handle, |s| s.result())
    }

    // =========================================================================
    // Encode / Decode
    // =========================================================================

    /// Encode framed originals into a framed parity set.
    pub fn encode(
        &self,
        original_count: usize,
        shard_size: usize,
        originals: &[u8],
    ) -> Result<ParitySet> {
        Encoder::new(
            self.engine.clone(),
            self.config.global_count(),
            original_count,
            shard_size,
        )?
        .encode(originals)
    }

    /// Open a decode session.
    #[instrument(skip(self))]
    pub fn begin_decode(&self, original_count: usize, shard_size: usize) -> Result<SessionHandle> {
        let permit = self.acquire_slot()?;
        let session = DecodeSession::begin(
            self.engine.clone(),
            self.config.global_count(),
            original_count,
            shard_size,
        )?;
        Ok(self.register(Session::Decode(session), permit))
    }

    /// Feed one framed shard to a decode session.
    ///
    /// The session leaves the registry once it completes or fails.
    pub fn decode(&self, handle: SessionHandle, shard: &[u8]) -> Result<DecodeProgress> {
        let (outcome, finished) = {
            let entry = self.sessions.get(&handle).ok_or(Error::StaleHandle)?;
            let mut guard = entry.session.try_lock().ok_or(Error::ConcurrentAccess)?;
            let Session::Decode(session) = &mut *guard else {
                return Err(Error::InvalidArgument(format!(
                    "{} is not a decode session",
                    handle
                )));
            };
            let outcome = session.decode(shard);
            (outcome, session.is_released())
        };

        if finished {
            self.sessions.remove(&handle);
            debug!(%handle, "Decode session retired");
        }
        outcome
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Free a session. Returns `false` for unknown or already freed handles.
    pub fn free_handle(&self, handle: SessionHandle) -> Result<bool> {
        {
            let Some(entry) = self.sessions.get(&handle) else {
                return Ok(false);
            };
            if entry.session.try_lock().is_none() {
                return Err(Error::ConcurrentAccess);
            }
        }

        match self.sessions.remove(&handle) {
            Some((_, slot)) => {
                let freed = slot.session.into_inner().free();
                debug!(%handle, "Session freed");
                Ok(freed)
            }
            None => Ok(false),
        }
    }

    fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::SessionLimit {
                max: self.config.max_sessions,
            })
    }

    fn register(&self, session: Session, permit: OwnedSemaphorePermit) -> SessionHandle {
        let handle = SessionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.sessions.insert(
            handle,
            SessionSlot {
                session: Mutex::new(session),
                _permit: permit,
            },
        );
        debug!(%handle, active = self.sessions.len(), "Session registered");
        handle
    }

    fn with_rebuild<T>(
        &self,
        handle: SessionHandle,
        f: impl FnOnce(&mut RepairSession) -> Result<T>,
    ) -> Result<T> {
        let entry = self.sessions.get(&handle).ok_or(Error::StaleHandle)?;
        let mut guard = entry.session.try_lock().ok_or(Error::ConcurrentAccess)?;
        match &mut *guard {
            Session::Rebuild(session) => f(session),
            Session::Decode(_) => Err(Error::InvalidArgument(format!(
                "{} is not a repair session",
                handle
            ))),
        }
    }
}
