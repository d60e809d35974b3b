//! Minimum-redundancy prefix codes for the windowed codecs.
//!
//! Built from a histogram of symbol frequencies (zero-frequency symbols get no code).
//! Construction is the classic priority-queue merge, ties are broken by insertion order
//! so the same histogram always gives the same code, which matters since some
//! codecs rebuild the code on the decoder side without ever transmitting it.
//!
//! # Table format
//! Pre-order walk over the tree; each node writes a left-exists and a right-exists bit,
//! a leaf (no children) is followed by its symbol in `symbol_bits` bits.
//! A lone symbol is a single leaf, and its code is empty (zero bits per value).
//!
//! # Example
//! ```rust
//! # use decxor::huffman::HuffmanCode;
//! # use decxor::bitstream::{BitWriter, BitReader};
//! let h = HuffmanCode::from_frequencies(&[10, 0, 3, 3]).unwrap();
//! let mut w = BitWriter::new(Vec::new());
//! h.write_table(&mut w, 2);
//! h.encode(2, &mut w);
//! let bytes = w.into_inner().unwrap();
//!
//! let mut r = BitReader::new(bytes.as_slice());
//! let h2 = HuffmanCode::read_table(&mut r, 2).unwrap();
//! assert_eq!(h2.decode(&mut r).unwrap(), 2);
//! ```
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// deeper tables can't come from any histogram we build
const MAX_DEPTH: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(usize),
    Inner(usize, usize),
}

/// A prefix code over symbols `0..n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanCode {
    nodes: Vec<Node>,
    root: usize,
    /// (code, length) per symbol, `None` for symbols without a code
    codes: Vec<Option<(u64, u32)>>,
}

impl HuffmanCode {
    /// Build from `frequencies[symbol]`. `None` if every frequency is zero.
    pub fn from_frequencies(frequencies: &[u64]) -> Option<Self> {
        let mut nodes = Vec::with_capacity(2 * frequencies.len());
        // (weight, insertion order, node index)
        let mut heap = BinaryHeap::new();
        for (symbol, &f) in frequencies.iter().enumerate() {
            if f > 0 {
                heap.push(Reverse((f, nodes.len(), nodes.len())));
                nodes.push(Node::Leaf(symbol));
            }
        }

        let mut order = nodes.len();
        while heap.len() > 1 {
            let Reverse((w1, _, a)) = heap.pop()?;
            let Reverse((w2, _, b)) = heap.pop()?;
            nodes.push(Node::Inner(a, b));
            heap.push(Reverse((w1 + w2, order, nodes.len() - 1)));
            order += 1;
        }
        let Reverse((_, _, root)) = heap.pop()?;
        Some(Self::from_tree(nodes, root, frequencies.len()))
    }

    /// walk the tree once to get the codes
    fn from_tree(nodes: Vec<Node>, root: usize, alphabet: usize) -> Self {
        let mut codes = vec![None; alphabet];
        let mut stack = vec![(root, 0_u64, 0_u32)];
        while let Some((n, code, len)) = stack.pop() {
            match nodes[n] {
                Node::Leaf(s) => {
                    if s >= codes.len() {
                        codes.resize(s + 1, None);
                    }
                    codes[s] = Some((code, len));
                }
                Node::Inner(l, r) => {
                    stack.push((r, (code << 1) | 1, len + 1));
                    stack.push((l, code << 1, len + 1));
                }
            }
        }
        HuffmanCode { nodes, root, codes }
    }

    /// `(code, length)` of a symbol
    pub fn code(&self, symbol: usize) -> Option<(u64, u32)> {
        self.codes.get(symbol).copied().flatten()
    }

    /// Write the code of `symbol`. The symbol must have a code (nonzero frequency).
    pub fn encode<W: Write>(&self, symbol: usize, out: &mut BitWriter<W>) {
        debug_assert!(self.code(symbol).is_some(), "symbol {symbol} has no code");
        if let Some((code, len)) = self.code(symbol) {
            out.write(code, len);
        }
    }

    /// read bits until a leaf is reached
    pub fn decode<R: Read>(&self, input: &mut BitReader<R>) -> Result<usize> {
        let mut n = self.root;
        loop {
            match self.nodes[n] {
                Node::Leaf(s) => return Ok(s),
                Node::Inner(l, r) => n = if input.read_bool()? { r } else { l },
            }
        }
    }

    /// serialize the tree (see module docs)
    pub fn write_table<W: Write>(&self, out: &mut BitWriter<W>, symbol_bits: u32) {
        let mut stack = vec![self.root];
        while let Some(n) = stack.pop() {
            match self.nodes[n] {
                Node::Leaf(s) => {
                    out.write(0b00, 2);
                    out.write(s as u64, symbol_bits);
                }
                Node::Inner(l, r) => {
                    out.write(0b11, 2);
                    stack.push(r);
                    stack.push(l);
                }
            }
        }
    }

    /// inverse of [`HuffmanCode::write_table`]
    pub fn read_table<R: Read>(input: &mut BitReader<R>, symbol_bits: u32) -> Result<Self> {
        let mut nodes = Vec::new();
        let root = Self::read_node(input, symbol_bits, &mut nodes, 0)?;
        let alphabet = 1_usize << symbol_bits;
        Ok(Self::from_tree(nodes, root, alphabet))
    }

    fn read_node<R: Read>(input: &mut BitReader<R>, symbol_bits: u32, nodes: &mut Vec<Node>, depth: usize) -> Result<usize> {
        if depth > MAX_DEPTH {
            return Err(CodecError::MalformedTable("code tree too deep"));
        }
        let has_left = input.read_bool()?;
        let has_right = input.read_bool()?;
        let node = match (has_left, has_right) {
            (false, false) => Node::Leaf(input.read(symbol_bits)? as usize),
            (true, true) => {
                let l = Self::read_node(input, symbol_bits, nodes, depth + 1)?;
                let r = Self::read_node(input, symbol_bits, nodes, depth + 1)?;
                Node::Inner(l, r)
            }
            _ => return Err(CodecError::MalformedTable("inner node with a single child")),
        };
        nodes.push(node);
        Ok(nodes.len() - 1)
    }

    /// expected bits to code a histogram with this code (symbols without code are skipped)
    pub fn cost(&self, frequencies: &[u64]) -> u64 {
        frequencies
            .iter()
            .enumerate()
            .filter_map(|(s, &f)| self.code(s).map(|(_, len)| f * len as u64))
            .sum()
    }
}
