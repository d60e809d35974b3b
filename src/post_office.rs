//! Choosing which leading/trailing zero counts get a code of their own.
//!
//! The Elf* XOR stage doesn't store exact zero-run lengths. It stores the index of
//! a *position* and rounds every run length down to the nearest chosen position,
//! paying for that with a few extra center bits. Picking the positions is a
//! small facility location ("post office") problem over the run-length histogram:
//! minimise `sum(freq[i] * (i - round(i))) + total * ceil(log2(#positions))`.
//! Solved exactly with a DP over the nonzero histogram entries.
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

/// at most 2^5 positions
const MAX_POSITIONS: usize = 32;

/// bits to index one of `n` positions
pub fn position_bits(n: usize) -> u32 {
    if n <= 1 { 0 } else { usize::BITS - (n - 1).leading_zeros() }
}

/// A set of positions plus the derived rounding/representation tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positions {
    positions: Vec<u32>,
    round: [u32; 64],
    representation: [u32; 64],
    bits: u32,
}

impl Positions {
    /// Tables for sorted positions (the first one should be 0).
    pub fn from_positions(positions: Vec<u32>) -> Self {
        let mut round = [0_u32; 64];
        let mut representation = [0_u32; 64];
        for (index, &p) in positions.iter().enumerate() {
            if (p as usize) < 64 {
                representation[p as usize] = index as u32;
            }
        }
        let mut current = 0;
        for (i, r) in round.iter_mut().enumerate() {
            if positions.contains(&(i as u32)) {
                current = i as u32;
            }
            *r = current;
        }
        let bits = position_bits(positions.len());
        Positions { positions, round, representation, bits }
    }

    /// Optimal positions for a histogram of run lengths (`distribution[len]`).
    pub fn solve(distribution: &[u64; 64]) -> Self {
        // 0 is always a candidate so every length has somewhere to round to
        let candidates: Vec<usize> = std::iter::once(0)
            .chain((1..64).filter(|&i| distribution[i] > 0))
            .collect();
        let m = candidates.len();

        // prefix sums over candidates: weights and weight*position
        let mut s = vec![0_u64; m + 1];
        let mut w = vec![0_u64; m + 1];
        for (t, &c) in candidates.iter().enumerate() {
            s[t + 1] = s[t] + distribution[c];
            w[t + 1] = w[t] + distribution[c] * c as u64;
        }
        // cost of one office at candidates[a] serving candidates[a..b]
        let seg = |a: usize, b: usize| (w[b] - w[a]) - candidates[a] as u64 * (s[b] - s[a]);

        let max_k = m.min(MAX_POSITIONS);
        // cost[k][b]: best cost of candidates[..b] with k offices; parent[k][b]: where the k-th office sits
        let mut cost = vec![vec![u64::MAX; m + 1]; max_k + 1];
        let mut parent = vec![vec![0_usize; m + 1]; max_k + 1];
        for b in 1..=m {
            cost[1][b] = seg(0, b);
        }
        for k in 2..=max_k {
            for b in k..=m {
                for a in (k - 1)..b {
                    if cost[k - 1][a] == u64::MAX {
                        continue;
                    }
                    let c = cost[k - 1][a] + seg(a, b);
                    if c < cost[k][b] {
                        cost[k][b] = c;
                        parent[k][b] = a;
                    }
                }
            }
        }

        let total = s[m];
        let best_k = (1..=max_k)
            .min_by_key(|&k| cost[k][m].saturating_add(total * position_bits(k) as u64))
            .unwrap_or(1);

        let mut positions = Vec::with_capacity(best_k);
        let (mut k, mut b) = (best_k, m);
        while k > 1 {
            let a = parent[k][b];
            positions.push(candidates[a] as u32);
            b = a;
            k -= 1;
        }
        positions.push(0);
        positions.reverse();
        Self::from_positions(positions)
    }

    /// run length rounded down to a position
    #[inline]
    pub fn round(&self, len: u32) -> u32 {
        self.round[len as usize]
    }

    /// index of a position (as written to the stream)
    #[inline]
    pub fn representation(&self, position: u32) -> u64 {
        self.representation[position as usize] as u64
    }

    /// position for an index read from the stream
    #[inline]
    pub fn position(&self, index: u64) -> u32 {
        self.positions.get(index as usize).copied().unwrap_or(0)
    }

    /// width of an index
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// the positions themselves
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// count-1 in 5 bits, then 6 bits per position
    pub fn write<W: Write>(&self, out: &mut BitWriter<W>) {
        out.write(self.positions.len() as u64 - 1, 5);
        for &p in self.positions.iter() {
            out.write(p as u64, 6);
        }
    }

    /// inverse of [`Positions::write`]
    pub fn read<R: Read>(input: &mut BitReader<R>) -> Result<Self> {
        let n = input.read(5)? as usize + 1;
        let positions = (0..n)
            .map(|_| input.read(6).map(|p| p as u32))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_positions(positions))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    /// brute force the cost of a position set
    fn cost_of(distribution: &[u64; 64], positions: &[u32]) -> u64 {
        let p = Positions::from_positions(positions.to_vec());
        let total: u64 = distribution.iter().sum();
        let rounding: u64 = (0..64).map(|i| distribution[i] * (i as u64 - p.round(i as u32) as u64)).sum();
        rounding + total * position_bits(positions.len()) as u64
    }

    #[test]
    fn test_position_bits() {
        assert_eq!(position_bits(1), 0);
        assert_eq!(position_bits(2), 1);
        assert_eq!(position_bits(3), 2);
        assert_eq!(position_bits(4), 2);
        assert_eq!(position_bits(5), 3);
        assert_eq!(position_bits(32), 5);
    }

    #[test]
    fn test_tables() {
        let p = Positions::from_positions(vec![0, 8, 12, 16, 18, 20, 22, 24]);
        assert_eq!(p.bits(), 3);
        assert_eq!(p.round(7), 0);
        assert_eq!(p.round(8), 8);
        assert_eq!(p.round(13), 12);
        assert_eq!(p.round(63), 24);
        assert_eq!(p.representation(12), 2);
        assert_eq!(p.position(2), 12);
    }

    #[test]
    fn test_empty_histogram() {
        let p = Positions::solve(&[0; 64]);
        assert_eq!(p.positions(), &[0]);
        assert_eq!(p.bits(), 0);
    }

    #[test]
    fn test_single_spike() {
        let mut d = [0_u64; 64];
        d[12] = 1000;
        let p = Positions::solve(&d);
        // one extra bit per value beats 12 wasted bits
        assert_eq!(p.positions(), &[0, 12]);
    }

    #[test]
    fn test_optimal_against_brute_force() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut d = [0_u64; 64];
            for _ in 0..6 {
                d[rng.gen_range(0..10)] += rng.gen_range(1..100);
            }
            let solved = Positions::solve(&d);
            let best = cost_of(&d, solved.positions());

            // every subset of 1..10 containing 0
            for mask in 0_u32..(1 << 9) {
                let mut pos = vec![0];
                pos.extend((1..10).filter(|i| mask & (1 << (i - 1)) != 0));
                assert!(best <= cost_of(&d, &pos), "{:?} beats {:?}", pos, solved.positions());
            }
        }
    }

    #[test]
    fn test_write_read() {
        let p = Positions::from_positions(vec![0, 22, 28, 32, 36, 40, 42, 46]);
        let mut w = BitWriter::new(Vec::new());
        p.write(&mut w);
        assert_eq!(w.bits_written(), 5 + 8 * 6);
        let bytes = w.into_inner().unwrap();
        let q = Positions::read(&mut BitReader::new(bytes.as_slice())).unwrap();
        assert_eq!(p, q);
    }
}
