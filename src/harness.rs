//! Running a codec over a series: compress into a file, measure, verify.
//!
//! The data side is abstracted as a [`ValueSource`] (any `Iterator<Item = f64>` is one),
//! results go to a [`MetricsSink`] as string maps, keyed `total`, `comp_speed`
//! (values per millisecond) and `comp_bits` (bits per value).
//!
//! # Example
//! ```rust
//! # use decxor::codec::Algorithm;
//! # use decxor::harness::{run_compression, verify_stream};
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("series.bin");
//! let values = vec![20.5, 20.25, 20.75, 21.0];
//!
//! let report = run_compression(Algorithm::DeXor, "", &mut values.iter().copied(), &path).unwrap();
//! assert_eq!(report.total, 4);
//! assert_eq!(verify_stream(Algorithm::DeXor, "", &path, &mut values.iter().copied()).unwrap(), None);
//! ```
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;
use crate::codec::{open_decoder, open_encoder, Algorithm};
use crate::error::Result;

/// Where the values to compress come from
pub trait ValueSource {
    /// next value, `None` at the end
    fn next_value(&mut self) -> Option<f64>;
}

impl<I: Iterator<Item = f64>> ValueSource for I {
    fn next_value(&mut self) -> Option<f64> {
        self.next()
    }
}

/// Receives the metrics of a run
pub trait MetricsSink {
    /// one call per run
    fn report(&mut self, algorithm: &str, metrics: &BTreeMap<String, String>);
}

/// collects everything in memory
impl MetricsSink for Vec<(String, BTreeMap<String, String>)> {
    fn report(&mut self, algorithm: &str, metrics: &BTreeMap<String, String>) {
        self.push((algorithm.to_string(), metrics.clone()));
    }
}

/// Outcome of [`run_compression`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// number of values encoded
    pub total: usize,
    /// bits produced (before padding)
    pub bits: u64,
    /// encoding time, file I/O included
    pub elapsed: Duration,
}

impl RunReport {
    /// 0 for an empty run
    pub fn bits_per_value(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.bits as f64 / self.total as f64 }
    }

    /// throughput, values per millisecond
    pub fn values_per_ms(&self) -> f64 {
        let ms = self.elapsed.as_secs_f64() * 1000.0;
        if ms > 0.0 { self.total as f64 / ms } else { 0.0 }
    }

    /// `total`, `comp_speed`, `comp_bits`
    pub fn metrics(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("total".to_string(), self.total.to_string()),
            ("comp_speed".to_string(), format!("{:.3}", self.values_per_ms())),
            ("comp_bits".to_string(), format!("{:.4}", self.bits_per_value())),
        ])
    }

    /// hand the metrics to a sink
    pub fn report_to(&self, algorithm: Algorithm, sink: &mut impl MetricsSink) {
        sink.report(algorithm.name(), &self.metrics());
    }
}

/// Encode everything `source` yields into the file at `path` (created or truncated).
pub fn run_compression(
    algorithm: Algorithm,
    config: &str,
    source: &mut impl ValueSource,
    path: impl AsRef<Path>,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut enc = open_encoder(algorithm, path, config)?;
    let mut total = 0;
    let mut bits = 0;
    while let Some(v) = source.next_value() {
        bits += enc.encode(v)? as u64;
        total += 1;
    }
    bits += enc.close()? as u64;
    enc.into_inner()?;

    let report = RunReport { total, bits, elapsed: start.elapsed() };
    info!(
        %algorithm,
        values = report.total,
        bits_per_value = report.bits_per_value(),
        values_per_ms = report.values_per_ms(),
        "compressed"
    );
    Ok(report)
}

/// Decode the file at `path` against the values of `source`.
/// Returns the index of the first value whose bits differ, `None` if all match.
pub fn verify_stream(
    algorithm: Algorithm,
    config: &str,
    path: impl AsRef<Path>,
    source: &mut impl ValueSource,
) -> Result<Option<usize>> {
    let mut dec = open_decoder(algorithm, path, config)?;
    let mut index = 0;
    while let Some(expected) = source.next_value() {
        if dec.decode_next()?.to_bits() != expected.to_bits() {
            info!(%algorithm, index, "mismatch");
            return Ok(Some(index));
        }
        index += 1;
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::decimal_walk;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_and_verify_every_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let values = decimal_walk(3000, 61);
        for algorithm in Algorithm::ALL {
            let path = dir.path().join(format!("{algorithm}.bin"));
            let report = run_compression(algorithm, "", &mut values.iter().copied(), &path).unwrap();
            assert_eq!(report.total, values.len());
            let file_len = std::fs::metadata(&path).unwrap().len();
            assert_eq!(file_len, report.bits.div_ceil(8), "{algorithm}");
            assert_eq!(verify_stream(algorithm, "", &path, &mut values.iter().copied()).unwrap(), None, "{algorithm}");
        }
    }

    #[test]
    fn test_verify_finds_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gorilla.bin");
        let values = vec![1.0, 2.0, 3.0, 4.0];
        run_compression(Algorithm::Gorilla, "", &mut values.iter().copied(), &path).unwrap();
        let other = vec![1.0, 2.0, 3.5, 4.0];
        assert_eq!(verify_stream(Algorithm::Gorilla, "", &path, &mut other.into_iter()).unwrap(), Some(2));
    }

    #[test]
    fn test_metrics() {
        let report = RunReport { total: 4, bits: 130, elapsed: Duration::from_millis(2) };
        let m = report.metrics();
        assert_eq!(m.get("total").map(String::as_str), Some("4"));
        assert_eq!(m.get("comp_bits").map(String::as_str), Some("32.5000"));
        assert_eq!(m.get("comp_speed").map(String::as_str), Some("2.000"));

        let mut sink: Vec<(String, BTreeMap<String, String>)> = Vec::new();
        report.report_to(Algorithm::BDeXor, &mut sink);
        assert_eq!(sink, vec![("BDeXOR".to_string(), m)]);
    }

    #[test]
    fn test_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let report = run_compression(Algorithm::Chimp, "", &mut std::iter::empty::<f64>(), &path).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.bits, 0);
        assert_eq!(report.bits_per_value(), 0.0);
    }

    #[test]
    fn test_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        assert!(run_compression(Algorithm::Dpf, "{batch_bits:lots}", &mut std::iter::once(1.0), &path).is_err());
    }
}
