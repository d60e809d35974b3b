//! helpers shared by the unit tests
use std::io::Cursor;
use pretty_assertions::assert_eq;
use crate::codec::{Algorithm, Decoder, Encoder};
use crate::config::CodecConfig;

/// Encode, check the cost accounting, decode and compare bit patterns.
/// Returns the encoded bytes.
pub(crate) fn check_roundtrip<E, D>(values: &[f64], enc: E, dec: impl Fn(Cursor<Vec<u8>>) -> D) -> Vec<u8>
where
    E: Encoder<Vec<u8>>,
    D: Decoder,
{
    let mut enc = Box::new(enc);
    let mut total = 0;
    for &v in values {
        total += enc.encode(v).unwrap();
    }
    total += enc.close().unwrap();
    assert_eq!(total as u64, enc.bits_written());
    let bytes = enc.into_inner().unwrap();
    assert_eq!(bytes.len(), total.div_ceil(8));

    let mut dec = dec(Cursor::new(bytes.clone()));
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(dec.decode_next().unwrap().to_bits(), v.to_bits(), "value #{i} ({v})");
    }
    bytes
}

/// same, through the registry
pub(crate) fn check_algorithm(algorithm: Algorithm, config: &str, values: &[f64]) -> Vec<u8> {
    let config = CodecConfig::parse(config);
    let mut enc = algorithm.encoder(Vec::new(), &config).unwrap();
    let mut total = 0;
    for &v in values {
        total += enc.encode(v).unwrap();
    }
    total += enc.close().unwrap();
    assert_eq!(total as u64, enc.bits_written());
    let bytes = enc.into_inner().unwrap();

    let mut dec = algorithm.decoder(Cursor::new(bytes.clone()), &config).unwrap();
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(dec.decode_next().unwrap().to_bits(), v.to_bits(), "{algorithm}: value #{i} ({v})");
    }
    bytes
}

/// a sensor-ish series: a random walk on a 2 decimal grid
pub(crate) fn decimal_walk(n: usize, seed: u64) -> Vec<f64> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut level: i64 = 2000;
    (0..n)
        .map(|_| {
            level += rng.gen_range(-30..=30);
            level as f64 / 100.0
        })
        .collect()
}
