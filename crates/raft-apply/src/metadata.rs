//! # metadata
//!
//! why: persist the two singleton records the node needs across restarts
//! relations: the applier writes the last applied index, the election layer owns voted_for
//! what: MetadataStore, reserved keys in the meta namespace, index codec

use crate::error::{Result, StorageError};
use crate::store::{DurableStore, Namespace};
use std::sync::Arc;

/// Reserved key of the last applied index, in the meta namespace
pub(crate) const LAST_APPLIED_KEY: &[u8] = b"last_applied_index";

/// Reserved key of the voted-for candidate, in the meta namespace
pub(crate) const VOTED_FOR_KEY: &[u8] = b"voted_for";

/// Accessor for the last applied index and voted-for records
#[derive(Debug, Clone)]
pub struct MetadataStore {
    store: Arc<DurableStore>,
}

impl MetadataStore {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// Highest index durably applied, 0 when nothing has been applied yet
    ///
    /// A record that exists but is not a decimal integer is an error, never 0.
    pub fn last_applied_index(&self) -> Result<u64> {
        let bytes = self.store.get(Namespace::Meta, LAST_APPLIED_KEY)?;
        decode_index(bytes.as_deref())
    }

    /// Record the candidate this node voted for
    ///
    /// `None` is rejected without touching the stored value. `Some("")` is a
    /// real value meaning "has not voted" and is written.
    pub fn set_voted_for(&self, candidate: Option<&str>) -> Result<()> {
        let Some(candidate) = candidate else {
            tracing::error!("refusing to store an absent voted_for candidate");
            return Err(StorageError::InvalidArgument(
                "voted_for candidate must be present".to_string(),
            ));
        };
        self.store
            .put(Namespace::Meta, VOTED_FOR_KEY, candidate.as_bytes())
    }

    /// The stored candidate, or "" when none is stored
    ///
    /// A read error is logged and also reported as "".
    pub fn voted_for(&self) -> String {
        match self.store.get(Namespace::Meta, VOTED_FOR_KEY) {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::error!(error = %e, "failed to read voted_for");
                String::new()
            }
        }
    }
}

pub(crate) fn encode_index(index: u64) -> Vec<u8> {
    index.to_string().into_bytes()
}

pub(crate) fn decode_index(bytes: Option<&[u8]>) -> Result<u64> {
    let bytes = match bytes {
        None => return Ok(0),
        Some(b) if b.is_empty() => return Ok(0),
        Some(b) => b,
    };

    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| StorageError::Corrupt {
            key: String::from_utf8_lossy(LAST_APPLIED_KEY).into_owned(),
            reason: format!("not a decimal index: {:?}", String::from_utf8_lossy(bytes)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::tempdir;

    #[test]
    fn index_codec_is_decimal_text() {
        assert_eq!(encode_index(42), b"42".to_vec());
        assert_eq!(decode_index(Some(b"42")).unwrap(), 42);
        assert_eq!(decode_index(Some(b"18446744073709551615")).unwrap(), u64::MAX);
    }

    #[test]
    fn missing_or_empty_index_is_zero() {
        assert_eq!(decode_index(None).unwrap(), 0);
        assert_eq!(decode_index(Some(b"")).unwrap(), 0);
    }

    #[test]
    fn garbage_index_is_corrupt() {
        let err = decode_index(Some(b"twelve")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
        assert!(decode_index(Some(b"-1")).is_err());
    }

    #[test]
    fn corrupt_record_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DurableStore::open(&StoreConfig::new(dir.path(), "n1")).unwrap());
        store.put(Namespace::Meta, LAST_APPLIED_KEY, b"not-a-number").unwrap();

        let metadata = MetadataStore::new(store);
        assert!(matches!(
            metadata.last_applied_index(),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn voted_for_round_trip_and_rejection() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DurableStore::open(&StoreConfig::new(dir.path(), "n1")).unwrap());
        let metadata = MetadataStore::new(store);

        assert_eq!(metadata.voted_for(), "");

        metadata.set_voted_for(Some("N1")).unwrap();
        assert_eq!(metadata.voted_for(), "N1");

        let err = metadata.set_voted_for(None).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(metadata.voted_for(), "N1");

        metadata.set_voted_for(Some("")).unwrap();
        assert_eq!(metadata.voted_for(), "");
    }
}
