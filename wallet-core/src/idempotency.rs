//! Idempotency guard
//!
//! Every posting carries a caller-supplied UUIDv4 key. A key that has
//! already committed replays the stored result instead of processing the
//! operation again; the replayed payload is trusted by key alone and is
//! not compared against the original.

use crate::storage::Storage;
use crate::types::LedgerEntry;
use crate::{Error, Result};
use std::sync::Arc;
use uuid::{Uuid, Version};

/// Validate an idempotency key: it must be a UUID version 4.
pub fn validate_key(key: &Uuid) -> Result<()> {
    if key.get_version() != Some(Version::Random) {
        return Err(Error::Validation(format!(
            "idempotency key {} is not a UUIDv4",
            key
        )));
    }
    Ok(())
}

/// Parse a raw idempotency key as supplied by a routing layer.
///
/// Missing or malformed keys are rejected before any state is touched.
pub fn parse_key(raw: Option<&str>) -> Result<Uuid> {
    let raw = raw.ok_or_else(|| Error::Validation("idempotency key is required".to_string()))?;
    let key = Uuid::parse_str(raw)
        .map_err(|_| Error::Validation(format!("idempotency key {:?} is not a UUID", raw)))?;
    validate_key(&key)?;
    Ok(key)
}

/// Replay lookup over the ledger store.
pub struct Guard {
    storage: Arc<Storage>,
}

impl Guard {
    /// Create a guard over the given store.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Find the committed entry for a key, if any.
    pub fn find_replay(&self, key: Uuid) -> Result<Option<LedgerEntry>> {
        self.storage.find_by_idempotency_key(key)
    }
}
