//! Flat `key:value` configuration, as passed to encoder/decoder constructors.
//!
//! The accepted syntax is `"{key1:value1,key2:value2}"`; the braces are optional
//! and whitespace around keys and values is ignored. Unknown keys are kept but
//! nobody asks for them, missing keys fall back to the caller's default.
//!
//! # Example
//! ```rust
//! # use decxor::config::CodecConfig;
//! let config = CodecConfig::parse("{batch_size:500, rho:4}");
//! assert_eq!(config.get_or("batch_size", 1000_usize).unwrap(), 500);
//! assert_eq!(config.get_or("buffer_bits", 0_u32).unwrap(), 0);
//! ```
use std::collections::BTreeMap;
use std::str::FromStr;
use crate::error::{CodecError, Result};

/// EL contraction threshold of the escape coder
pub const RHO: &str = "rho";
/// number of values per batch (BDeXOR)
pub const BATCH_SIZE: &str = "batch_size";
/// number of values per window (ElfStar, SElfStar)
pub const WINDOW: &str = "window";
/// DeXOR: log2 of the reference window; >0 selects the buffered strategy
pub const BUFFER_BITS: &str = "buffer_bits";
/// DeXOR: consecutive exceptions before switching to escape-only coding
pub const SKIP_AVAILABLE: &str = "skip_available";
/// DPF: log2 of the batch size
pub const BATCH_BITS: &str = "batch_bits";
/// ALP: rows per sampled block
pub const ROWS: &str = "rows";

/// Parsed configuration map. Cheap to clone, immutable after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecConfig {
    entries: BTreeMap<String, String>,
}

impl CodecConfig {
    /// Parse a config string. Never fails: malformed entries without a `:`
    /// are skipped, numeric validation happens in [`CodecConfig::get_or`].
    pub fn parse(s: &str) -> Self {
        let body = s.trim();
        let body = body.strip_prefix('{').unwrap_or(body);
        let body = body.strip_suffix('}').unwrap_or(body);

        let entries = body
            .split(',')
            .filter_map(|kv| kv.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        CodecConfig { entries }
    }

    /// raw string value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    /// Typed lookup with a default for missing keys.
    /// A present but unparsable value is a [`CodecError::Config`].
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| CodecError::Config(key.to_string(), raw.to_string())),
        }
    }

    /// Set a key (builder style), mostly handy in tests and benches
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

impl FromStr for CodecConfig {
    type Err = CodecError;
    fn from_str(s: &str) -> Result<Self> {
        Ok(CodecConfig::parse(s))
    }
}
