//! Options shared by the caching writer and the entry formatter.

use crate::codec::HeaderTable;
use crate::error::CacheError;
use crate::utils::ensure;
use serde::Deserialize;
use std::time::Duration;

/// Largest body buffered for caching by default, 64 MiB
pub const DEFAULT_MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Default size of one pooled body segment, 80 KiB
pub const DEFAULT_SEGMENT_SIZE: usize = 80 * 1024;

/// Default time to live, in seconds
pub const DEFAULT_EXPIRATION_SECS: u64 = 60;

/// Output cache settings.
///
/// Every field has a default, so a partial JSON document such as
/// `{"max_body_size": 1048576}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Responses whose body grows past this many bytes are not cached.
    pub max_body_size: u64,
    /// Size of the pooled segments the body is buffered into.
    pub segment_size: usize,
    /// Time to live applied when the caller does not pick one, in seconds.
    pub default_expiration: u64,
    /// Header names and values stored as table indices. Append only, see [`HeaderTable`].
    pub interned_headers: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            segment_size: DEFAULT_SEGMENT_SIZE,
            default_expiration: DEFAULT_EXPIRATION_SECS,
            interned_headers: Vec::new(),
        }
    }
}

impl CacheOptions {
    /// Parses and validates options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let options: Self = serde_json::from_str(json).map_err(|e| CacheError::invalid_argument(format!("invalid cache options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        ensure!(self.max_body_size > 0, CacheError::invalid_argument("max_body_size must be greater than 0"));
        ensure!(self.segment_size > 0, CacheError::invalid_argument("segment_size must be greater than 0"));
        Ok(())
    }

    pub fn default_expiration(&self) -> Duration {
        Duration::from_secs(self.default_expiration)
    }

    pub fn header_table(&self) -> HeaderTable {
        HeaderTable::new(self.interned_headers.iter().cloned())
    }
}
