//! Gray-coded constellation mapper and hard-decision slicer
//!
//! Symbols are split MSB-first: the upper half of the bits selects the in-phase
//! level and the lower half the quadrature level (BPSK is in-phase only).

use rustfft::num_complex::Complex32;
use std::f32::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Bpsk,
    Qpsk,
    Qam16,
    Qam64,
}

impl Modulation {
    pub fn bits_per_symbol(self) -> usize {
        match self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
        }
    }

    /// Bits carried on each axis
    fn axis_bits(self) -> usize {
        match self {
            Modulation::Bpsk => 1,
            _ => self.bits_per_symbol() / 2,
        }
    }

    /// Normalization giving unit average symbol energy
    fn scale(self) -> f32 {
        match self {
            Modulation::Bpsk => 1.0,
            Modulation::Qpsk => FRAC_1_SQRT_2,
            Modulation::Qam16 => 1.0 / 10f32.sqrt(),
            Modulation::Qam64 => 1.0 / 42f32.sqrt(),
        }
    }

    /// Maps the low `bits_per_symbol()` bits of `symbol` onto the constellation
    pub fn modulate(self, symbol: u8) -> Complex32 {
        let n = self.axis_bits();
        let mask = (1u8 << n) - 1;
        let scale = self.scale();
        match self {
            Modulation::Bpsk => Complex32::new(axis_level(symbol & 1, 1) * scale, 0.0),
            _ => {
                let i_bits = (symbol >> n) & mask;
                let q_bits = symbol & mask;
                Complex32::new(axis_level(i_bits, n) * scale, axis_level(q_bits, n) * scale)
            }
        }
    }

    /// Hard decision: nearest constellation point
    pub fn demodulate(self, sample: Complex32) -> u8 {
        let n = self.axis_bits();
        let scale = self.scale();
        match self {
            Modulation::Bpsk => axis_slice(sample.re / scale, 1),
            _ => (axis_slice(sample.re / scale, n) << n) | axis_slice(sample.im / scale, n),
        }
    }
}

// Gray code -> odd PAM level in [-(2^n - 1), 2^n - 1]
fn axis_level(gray: u8, nbits: usize) -> f32 {
    let mut index = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        index ^= shift;
        shift >>= 1;
    }
    let levels = 1i32 << nbits;
    (2 * index as i32 - (levels - 1)) as f32
}

fn axis_slice(level: f32, nbits: usize) -> u8 {
    let levels = 1i32 << nbits;
    let index = ((level + (levels - 1) as f32) / 2.0).round();
    let index = if index.is_nan() {
        0
    } else {
        (index as i32).clamp(0, levels - 1) as u8
    };
    index ^ (index >> 1)
}
