//! Compression ratio and speed of every codec on a few synthetic series.
//!
//! `cargo run --release [n_values]`, log level via `RUST_LOG` (`info` by default).
use std::io::Cursor;
use std::time::Instant;
use decxor::{Algorithm, CodecConfig, Result};
use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_distr::{StandardNormal, Uniform};
use tracing::{info, Level};

/// random walk with gaussian steps, rounded to `decimals` places
fn sensor_series(n: usize, decimals: i32, seed: u64) -> Vec<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let scale = 10_f64.powi(decimals);
    let mut level = 100.0;
    (0..n)
        .map(|_| {
            let step: f64 = StandardNormal.sample(&mut rng);
            level += 0.5 * step;
            (level * scale).round() / scale
        })
        .collect()
}

/// uniform doubles, no decimal structure at all
fn noise_series(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let dist = Uniform::new(-1000.0, 1000.0);
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}

fn run(algorithm: Algorithm, values: &[f64]) -> Result<()> {
    let config = CodecConfig::default();

    let now = Instant::now();
    let mut enc = algorithm.encoder(Vec::new(), &config)?;
    let mut bits = 0;
    for &v in values {
        bits += enc.encode(v)?;
    }
    bits += enc.close()?;
    let bytes = enc.into_inner()?;
    let encode_time = now.elapsed();

    let now = Instant::now();
    let mut dec = algorithm.decoder(Cursor::new(bytes), &config)?;
    let mut mismatches = 0;
    for &v in values {
        if dec.decode_next()?.to_bits() != v.to_bits() {
            mismatches += 1;
        }
    }
    let decode_time = now.elapsed();

    println!(
        "{:<10}\t{:>7.3} bits/value\tencode {:?}\tdecode {:?}",
        algorithm.name(),
        bits as f64 / values.len() as f64,
        encode_time,
        decode_time
    );
    if mismatches > 0 {
        tracing::error!(%algorithm, mismatches, "round trip failed");
    }
    Ok(())
}

/// runs every codec over every series
pub fn main() -> Result<()> {
    let level = std::env::var("RUST_LOG").ok().and_then(|l| l.parse::<Level>().ok()).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let n = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let series = [
        ("sensor, 2 decimals", sensor_series(n, 2, 1)),
        ("sensor, 4 decimals", sensor_series(n, 4, 2)),
        ("uniform noise", noise_series(n, 3)),
    ];
    for (name, values) in series.iter() {
        info!(series = name, values = values.len(), "running all codecs");
        for algorithm in Algorithm::ALL {
            run(algorithm, values)?;
        }
    }
    Ok(())
}
