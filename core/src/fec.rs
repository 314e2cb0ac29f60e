use crate::bits::{get_bit, set_bit};
use crate::error::{Result, WlanError};
use crate::trellis::{parity, ViterbiDecoder, CONSTRAINT_LEN, POLYS, SOFTBIT_0, SOFTBIT_1, SOFTBIT_ERASURE};

/// Convolutional code rate after puncturing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecScheme {
    /// r1/2, no puncturing
    Half,
    /// r2/3
    TwoThirds,
    /// r3/4
    ThreeQuarters,
}

/// Generator polynomials plus puncturing matrix
///
/// `puncture` holds two rows of `period` flags each (row 0 for the G0 output,
/// row 1 for G1); a zero drops that output bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvCodeProfile {
    pub polys: [u8; 2],
    pub constraint_len: usize,
    pub period: usize,
    pub puncture: &'static [u8],
}

const PUNCTURE_R1_2: [u8; 2] = [1, 1];
const PUNCTURE_R2_3: [u8; 12] = [
    1, 1, 1, 1, 1, 1,
    1, 0, 1, 0, 1, 0,
];
const PUNCTURE_R3_4: [u8; 18] = [
    1, 1, 0, 1, 1, 0, 1, 1, 0,
    1, 0, 1, 1, 0, 1, 1, 0, 1,
];

static PROFILES: [ConvCodeProfile; 3] = [
    ConvCodeProfile { polys: POLYS, constraint_len: CONSTRAINT_LEN, period: 1, puncture: &PUNCTURE_R1_2 },
    ConvCodeProfile { polys: POLYS, constraint_len: CONSTRAINT_LEN, period: 6, puncture: &PUNCTURE_R2_3 },
    ConvCodeProfile { polys: POLYS, constraint_len: CONSTRAINT_LEN, period: 9, puncture: &PUNCTURE_R3_4 },
];

impl FecScheme {
    pub fn profile(self) -> &'static ConvCodeProfile {
        match self {
            FecScheme::Half => &PROFILES[0],
            FecScheme::TwoThirds => &PROFILES[1],
            FecScheme::ThreeQuarters => &PROFILES[2],
        }
    }

    pub fn numerator(self) -> usize {
        match self {
            FecScheme::Half => 1,
            FecScheme::TwoThirds => 2,
            FecScheme::ThreeQuarters => 3,
        }
    }

    pub fn denominator(self) -> usize {
        match self {
            FecScheme::Half => 2,
            FecScheme::TwoThirds => 3,
            FecScheme::ThreeQuarters => 4,
        }
    }

    /// Number of coded bits produced for `nbits` input bits
    pub fn encoded_bits(self, nbits: usize) -> usize {
        let profile = self.profile();
        (0..nbits)
            .map(|t| {
                let p = t % profile.period;
                (profile.keep(0, p) as usize) + (profile.keep(1, p) as usize)
            })
            .sum()
    }
}

impl ConvCodeProfile {
    #[inline]
    pub fn keep(&self, branch: usize, column: usize) -> bool {
        self.puncture[branch * self.period + column] != 0
    }
}

/// Encodes the first `nbits` bits of `input` (MSB-first) and returns the
/// punctured output packed MSB-first
pub fn encode(scheme: FecScheme, input: &[u8], nbits: usize) -> Result<Vec<u8>> {
    if nbits > input.len() * 8 {
        return Err(WlanError::InvalidInputSize {
            expected: nbits.div_ceil(8),
            actual: input.len(),
        });
    }

    let profile = scheme.profile();
    let mut out = vec![0u8; scheme.encoded_bits(nbits).div_ceil(8)];
    let mut n = 0;
    let mut sr = 0u8;
    let mut column = 0;

    for t in 0..nbits {
        sr = ((sr << 1) | get_bit(input, t)) & 0x7f;
        for (branch, &poly) in profile.polys.iter().enumerate() {
            if profile.keep(branch, column) {
                if parity(sr & poly) == 1 {
                    set_bit(&mut out, n);
                }
                n += 1;
            }
        }
        column = (column + 1) % profile.period;
    }
    Ok(out)
}

/// Re-expands punctured positions into erasures, producing two soft symbols
/// per input bit
pub fn depuncture(scheme: FecScheme, encoded: &[u8], nbits: usize) -> Result<Vec<u8>> {
    let required = scheme.encoded_bits(nbits);
    if required > encoded.len() * 8 {
        return Err(WlanError::InvalidInputSize {
            expected: required.div_ceil(8),
            actual: encoded.len(),
        });
    }

    let profile = scheme.profile();
    let mut soft = Vec::with_capacity(2 * nbits);
    let mut n = 0;
    for t in 0..nbits {
        let column = t % profile.period;
        for branch in 0..2 {
            if profile.keep(branch, column) {
                soft.push(if get_bit(encoded, n) == 1 { SOFTBIT_1 } else { SOFTBIT_0 });
                n += 1;
            } else {
                soft.push(SOFTBIT_ERASURE);
            }
        }
    }
    Ok(soft)
}

/// Decodes `nbits` data bits, tracing back from the lowest-cost end state
pub fn decode(scheme: FecScheme, encoded: &[u8], nbits: usize) -> Result<Vec<u8>> {
    let soft = depuncture(scheme, encoded, nbits)?;
    let mut viterbi = ViterbiDecoder::new();
    viterbi.update(&soft)?;
    Ok(viterbi.chainback(viterbi.best_state(), nbits))
}

/// Decodes a block whose tail bits return the encoder to state 0
pub fn decode_terminated(scheme: FecScheme, encoded: &[u8], nbits: usize) -> Result<Vec<u8>> {
    let soft = depuncture(scheme, encoded, nbits)?;
    let mut viterbi = ViterbiDecoder::new();
    viterbi.update(&soft)?;
    Ok(viterbi.chainback(0, nbits))
}
