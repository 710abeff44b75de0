pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

pub const BUFFER_BYTES_ENV: &str = "BSGS_CACHE_BUFFER_BYTES";
pub const SYNC_ENV: &str = "BSGS_CACHE_SYNC";

/// I/O tuning for cache streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagCacheConfig {
    /// Capacity of the buffered reader/writer wrapped around the cache file.
    pub buffer_capacity: usize,
    /// `fsync` the file when a writer is closed.
    pub sync_on_close: bool,
}

impl Default for DiagCacheConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            sync_on_close: false,
        }
    }
}

impl DiagCacheConfig {
    /// Reads `BSGS_CACHE_BUFFER_BYTES` and `BSGS_CACHE_SYNC`. Unset or
    /// unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(BUFFER_BYTES_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => config.buffer_capacity = bytes,
                _ => tracing::warn!(
                    target: "bsgs.cache",
                    value = %raw,
                    "ignoring invalid {BUFFER_BYTES_ENV}"
                ),
            }
        }

        if let Some(raw) = lookup(SYNC_ENV) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.sync_on_close = true,
                "0" | "false" | "no" | "" => config.sync_on_close = false,
                _ => tracing::warn!(
                    target: "bsgs.cache",
                    value = %raw,
                    "ignoring invalid {SYNC_ENV}"
                ),
            }
        }

        config
    }
}
