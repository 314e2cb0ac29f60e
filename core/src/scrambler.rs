use crate::trellis::parity;

/// Tap mask for x^7 + x^4 + 1 over the 7-bit register
pub const SCRAMBLER_TAPS: u8 = 0x48;

const REGISTER_MASK: u8 = 0x7f;

/// 7-bit linear-feedback shift register (x^7 + x^4 + 1)
///
/// Drives both the DATA scrambler and the pilot polarity sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lfsr {
    state: u8,
}

impl Lfsr {
    pub fn new(seed: u8) -> Self {
        Self {
            state: seed & REGISTER_MASK,
        }
    }

    /// Produces the next output bit
    pub fn advance(&mut self) -> u8 {
        let bit = parity(self.state & SCRAMBLER_TAPS);
        self.state = ((self.state << 1) | bit) & REGISTER_MASK;
        bit
    }

    /// Next 8 output bits, first bit in the MSB
    pub fn next_byte(&mut self) -> u8 {
        (0..8).fold(0u8, |acc, _| (acc << 1) | self.advance())
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn reset(&mut self, seed: u8) {
        self.state = seed & REGISTER_MASK;
    }
}

/// XORs `data` in place with the sequence generated from `seed`
pub fn scramble_in_place(data: &mut [u8], seed: u8) {
    let mut lfsr = Lfsr::new(seed);
    for byte in data.iter_mut() {
        *byte ^= lfsr.next_byte();
    }
}

pub fn scramble(data: &[u8], seed: u8) -> Vec<u8> {
    let mut out = data.to_vec();
    scramble_in_place(&mut out, seed);
    out
}

/// Inverse of [`scramble`]; the mask depends only on the seed
pub fn unscramble(data: &[u8], seed: u8) -> Vec<u8> {
    scramble(data, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_SCRAMBLER_SEED, PILOT_SEQUENCE_SEED};

    #[test]
    fn test_all_ones_sequence() {
        // 127-bit period from the all-ones state
        let expected: [u8; 32] = [
            0, 0, 0, 0, 1, 1, 1, 0, 1, 1, 1, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 1, 0,
        ];
        let mut lfsr = Lfsr::new(PILOT_SEQUENCE_SEED);
        for (i, &bit) in expected.iter().enumerate() {
            assert_eq!(lfsr.advance(), bit, "bit {}", i);
        }
    }

    #[test]
    fn test_maximal_length_period() {
        let mut lfsr = Lfsr::new(PILOT_SEQUENCE_SEED);
        let start = lfsr.state();
        let mut period = 0;
        loop {
            lfsr.advance();
            period += 1;
            if lfsr.state() == start {
                break;
            }
        }
        assert_eq!(period, 127);
    }

    #[test]
    fn test_scramble_zero_bytes_exposes_mask() {
        let out = scramble(&[0u8; 2], DEFAULT_SCRAMBLER_SEED);
        assert_eq!(out, vec![0x6c, 0x19]);
    }

    #[test]
    fn test_scramble_involution() {
        let data: Vec<u8> = (0..=255u8).collect();
        for seed in [1u8, 0x5d, 0x7f, 0x40] {
            let scrambled = scramble(&data, seed);
            assert_ne!(scrambled, data);
            assert_eq!(unscramble(&scrambled, seed), data);
        }
    }

    #[test]
    fn test_seed_masked_to_seven_bits() {
        assert_eq!(Lfsr::new(0xff).state(), 0x7f);
        let mut lfsr = Lfsr::new(0x01);
        lfsr.reset(0xdd);
        assert_eq!(lfsr.state(), 0x5d);
    }
}
