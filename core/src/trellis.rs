use crate::error::{Result, WlanError};

/// K=7 convolutional code trellis (64 states)
///
/// Generator polynomials 133/171 (octal), written with the newest input bit in
/// the LSB of the 7-bit shift register: G0 = 0x6d, G1 = 0x4f.
pub const CONSTRAINT_LEN: usize = 7;
pub const NUM_STATES: usize = 1 << (CONSTRAINT_LEN - 1);
pub const POLYS: [u8; 2] = [0x6d, 0x4f];

/// Soft-decision input scale
pub const SOFTBIT_0: u8 = 0;
pub const SOFTBIT_1: u8 = 255;
pub const SOFTBIT_ERASURE: u8 = 127;

const METRIC_INIT: u32 = 1 << 20;

/// Even parity of the set bits
pub(crate) fn parity(byte: u8) -> u8 {
    (byte.count_ones() & 1) as u8
}

/// Expected encoder outputs for a 7-bit register value
#[inline]
fn branch_outputs(register: u8) -> [u8; 2] {
    [parity(register & POLYS[0]), parity(register & POLYS[1])]
}

#[inline]
fn branch_cost(register: u8, soft: &[u8]) -> u32 {
    let [e0, e1] = branch_outputs(register);
    let d0 = (soft[0] as i32 - (e0 as i32) * SOFTBIT_1 as i32).unsigned_abs();
    let d1 = (soft[1] as i32 - (e1 as i32) * SOFTBIT_1 as i32).unsigned_abs();
    d0 + d1
}

/// Soft-decision Viterbi decoder for the rate-1/2 K=7 code
///
/// State `s` holds the last six input bits with the newest in the LSB, so the
/// predecessors of state `n` are `n >> 1` and `(n >> 1) | 32`.
pub struct ViterbiDecoder {
    metrics: [u32; NUM_STATES],
    // bit n set: survivor into state n came from the upper predecessor
    decisions: Vec<u64>,
}

impl ViterbiDecoder {
    pub fn new() -> Self {
        let mut decoder = Self {
            metrics: [METRIC_INIT; NUM_STATES],
            decisions: Vec::new(),
        };
        decoder.init(0);
        decoder
    }

    /// Clears all decisions and starts the trellis in `start_state`
    pub fn init(&mut self, start_state: usize) {
        self.metrics = [METRIC_INIT; NUM_STATES];
        self.metrics[start_state % NUM_STATES] = 0;
        self.decisions.clear();
    }

    /// Number of trellis steps recorded so far
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Advances the trellis by one step per soft-symbol pair
    pub fn update(&mut self, soft: &[u8]) -> Result<()> {
        if soft.len() % 2 != 0 {
            return Err(WlanError::InvalidInputSize {
                expected: soft.len() + 1,
                actual: soft.len(),
            });
        }

        self.decisions.reserve(soft.len() / 2);
        for pair in soft.chunks_exact(2) {
            let mut next = [0u32; NUM_STATES];
            let mut word = 0u64;

            for i in 0..NUM_STATES / 2 {
                for bit in 0..2 {
                    let n = 2 * i + bit;
                    let lower = self.metrics[i] + branch_cost(n as u8, pair);
                    let upper = self.metrics[i + NUM_STATES / 2] + branch_cost((n | 0x40) as u8, pair);
                    if upper < lower {
                        next[n] = upper;
                        word |= 1 << n;
                    } else {
                        next[n] = lower;
                    }
                }
            }

            // renormalize
            let min = next.iter().copied().min().unwrap_or(0);
            for m in next.iter_mut() {
                *m -= min;
            }

            self.metrics = next;
            self.decisions.push(word);
        }
        Ok(())
    }

    /// State with the lowest path metric
    pub fn best_state(&self) -> usize {
        self.metrics
            .iter()
            .enumerate()
            .min_by_key(|&(_, m)| *m)
            .map(|(s, _)| s)
            .unwrap_or(0)
    }

    /// Traces the survivor path back from `end_state`, returning the first
    /// `nbits` decoded bits packed MSB-first
    pub fn chainback(&self, end_state: usize, nbits: usize) -> Vec<u8> {
        let nbits = nbits.min(self.decisions.len());
        let mut out = vec![0u8; nbits.div_ceil(8)];
        let mut state = end_state % NUM_STATES;

        for t in (0..self.decisions.len()).rev() {
            if t < nbits && state & 1 == 1 {
                out[t / 8] |= 0x80 >> (t % 8);
            }
            let upper = ((self.decisions[t] >> state) & 1) as usize;
            state = (state >> 1) | (upper << (CONSTRAINT_LEN - 2));
        }
        out
    }
}

impl Default for ViterbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}
