//! Per-symbol two-step block interleaver
//!
//! The first permutation spreads adjacent coded bits onto non-adjacent
//! subcarriers, the second alternates them between more and less significant
//! constellation bits.

use crate::error::{Result, WlanError};
use crate::rate::Rate;
use std::sync::OnceLock;

/// Moves the bit at (`p0`, `mask0`) of the input to (`p1`, `mask1`) of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleaverEntry {
    pub p0: u16,
    pub mask0: u8,
    pub p1: u16,
    pub mask1: u8,
}

#[derive(Debug, Clone)]
pub struct InterleaverTable {
    ncbps: usize,
    nbpsc: usize,
    entries: Vec<InterleaverEntry>,
}

static TABLES: OnceLock<Vec<InterleaverTable>> = OnceLock::new();

impl InterleaverTable {
    pub fn new(ncbps: usize, nbpsc: usize) -> Result<Self> {
        if ncbps == 0 || ncbps % 16 != 0 || nbpsc == 0 {
            return Err(WlanError::InvalidConfig(format!(
                "interleaver needs ncbps divisible by 16, got ncbps={} nbpsc={}",
                ncbps, nbpsc
            )));
        }
        Ok(Self::build(ncbps, nbpsc))
    }

    // ncbps must be a non-zero multiple of 16
    fn build(ncbps: usize, nbpsc: usize) -> Self {
        let s = (nbpsc / 2).max(1);
        let entries = (0..ncbps)
            .map(|k| {
                let i = (ncbps / 16) * (k % 16) + k / 16;
                let j = s * (i / s) + (i + ncbps - 16 * i / ncbps) % s;
                InterleaverEntry {
                    p0: (k / 8) as u16,
                    mask0: 0x80 >> (k % 8),
                    p1: (j / 8) as u16,
                    mask1: 0x80 >> (j % 8),
                }
            })
            .collect();

        Self { ncbps, nbpsc, entries }
    }

    /// Shared table for a data rate; the SIGNAL field uses the 6 Mbps table
    pub fn for_rate(rate: Rate) -> &'static InterleaverTable {
        let tables = TABLES.get_or_init(|| {
            Rate::ALL
                .iter()
                .map(|r| {
                    let p = r.profile();
                    InterleaverTable::build(p.ncbps, p.nbpsc)
                })
                .collect()
        });
        &tables[rate as usize]
    }

    pub fn ncbps(&self) -> usize {
        self.ncbps
    }

    pub fn nbpsc(&self) -> usize {
        self.nbpsc
    }

    /// Bytes per interleaved OFDM symbol
    pub fn symbol_bytes(&self) -> usize {
        self.ncbps / 8
    }

    pub fn entries(&self) -> &[InterleaverEntry] {
        &self.entries
    }

    fn check(&self, input: &[u8], output: &[u8]) -> Result<()> {
        let n = self.symbol_bytes();
        if input.len() != n {
            return Err(WlanError::InvalidInputSize { expected: n, actual: input.len() });
        }
        if output.len() != n {
            return Err(WlanError::InvalidInputSize { expected: n, actual: output.len() });
        }
        Ok(())
    }

    pub fn encode_symbol(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        self.check(input, output)?;
        output.fill(0);
        for e in &self.entries {
            if input[e.p0 as usize] & e.mask0 != 0 {
                output[e.p1 as usize] |= e.mask1;
            }
        }
        Ok(())
    }

    pub fn decode_symbol(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        self.check(input, output)?;
        output.fill(0);
        for e in &self.entries {
            if input[e.p1 as usize] & e.mask1 != 0 {
                output[e.p0 as usize] |= e.mask0;
            }
        }
        Ok(())
    }

    /// Interleaves every symbol of a buffer holding a whole number of symbols
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.apply(input, Self::encode_symbol)
    }

    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.apply(input, Self::decode_symbol)
    }

    fn apply(&self, input: &[u8], op: fn(&Self, &[u8], &mut [u8]) -> Result<()>) -> Result<Vec<u8>> {
        let n = self.symbol_bytes();
        if input.len() % n != 0 {
            return Err(WlanError::InvalidInputSize {
                expected: input.len().div_ceil(n) * n,
                actual: input.len(),
            });
        }
        let mut output = vec![0u8; input.len()];
        for (src, dst) in input.chunks_exact(n).zip(output.chunks_exact_mut(n)) {
            op(self, src, dst)?;
        }
        Ok(output)
    }
}
