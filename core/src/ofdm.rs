//! 64-point OFDM symbol engine: subcarrier map, transforms, cyclic prefix and
//! edge windowing, plus the short/long training spectra
//!
//! Subcarriers are addressed by FFT index; index `k >= 32` is frequency `k - 64`.

use crate::error::{Result, WlanError};
use crate::{CP_LEN, FFT_SIZE, NUM_DATA_SUBCARRIERS, NUM_PILOT_SUBCARRIERS, SYMBOL_LEN};
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

/// Pilot FFT indices in ascending frequency (-21, -7, +7, +21)
pub const PILOT_SUBCARRIERS: [usize; NUM_PILOT_SUBCARRIERS] = [43, 57, 7, 21];

/// Pilot values before the per-symbol polarity is applied
pub const PILOT_POLARITY: [f32; NUM_PILOT_SUBCARRIERS] = [1.0, 1.0, 1.0, -1.0];

/// Data FFT indices in ascending frequency (-26..-1, +1..+26 without pilots)
pub const DATA_SUBCARRIERS: [usize; NUM_DATA_SUBCARRIERS] = data_subcarriers();

/// Largest usable edge-window length
pub const MAX_RAMP_LEN: usize = CP_LEN - 1;

const UNITARY_SCALE: f32 = 0.125; // 1/sqrt(64)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcarrierKind {
    Null,
    Pilot,
    Data,
}

const fn is_null(k: usize) -> bool {
    k == 0 || (k >= 27 && k <= 37)
}

const fn is_pilot(k: usize) -> bool {
    k == 7 || k == 21 || k == 43 || k == 57
}

const fn data_subcarriers() -> [usize; NUM_DATA_SUBCARRIERS] {
    let mut out = [0usize; NUM_DATA_SUBCARRIERS];
    let mut n = 0;
    let mut i = 0;
    while i < FFT_SIZE {
        let k = (i + FFT_SIZE / 2) % FFT_SIZE;
        if !is_null(k) && !is_pilot(k) {
            out[n] = k;
            n += 1;
        }
        i += 1;
    }
    out
}

pub fn subcarrier_kind(k: usize) -> SubcarrierKind {
    let k = k % FFT_SIZE;
    if is_null(k) {
        SubcarrierKind::Null
    } else if is_pilot(k) {
        SubcarrierKind::Pilot
    } else {
        SubcarrierKind::Data
    }
}

/// Signed subcarrier frequency of FFT index `k`
pub fn subcarrier_frequency(k: usize) -> i32 {
    let k = (k % FFT_SIZE) as i32;
    if k < FFT_SIZE as i32 / 2 {
        k
    } else {
        k - FFT_SIZE as i32
    }
}

fn fft_index(frequency: i32) -> usize {
    frequency.rem_euclid(FFT_SIZE as i32) as usize
}

/// Pilot tone values for one symbol
pub fn pilot_values(inverted: bool) -> [f32; NUM_PILOT_SUBCARRIERS] {
    let sign = if inverted { -1.0 } else { 1.0 };
    PILOT_POLARITY.map(|p| p * sign)
}

/// Short training spectrum: 12 tones on every fourth subcarrier
pub fn short_sequence() -> [Complex32; FFT_SIZE] {
    const TONES: [(i32, f32); 12] = [
        (-24, 1.0), (-20, -1.0), (-16, 1.0), (-12, -1.0), (-8, -1.0), (-4, 1.0),
        (4, -1.0), (8, -1.0), (12, 1.0), (16, 1.0), (20, 1.0), (24, 1.0),
    ];
    let scale = (13.0f32 / 6.0).sqrt();
    let mut s0 = [Complex32::new(0.0, 0.0); FFT_SIZE];
    for (f, sign) in TONES {
        s0[fft_index(f)] = Complex32::new(sign * scale, sign * scale);
    }
    s0
}

/// Long training spectrum: BPSK on all 52 active subcarriers
pub fn long_sequence() -> [Complex32; FFT_SIZE] {
    const TONES: [i8; 53] = [
        1, 1, -1, -1, 1, 1, -1, 1, -1, 1, 1, 1, 1, 1, 1, -1, -1, 1, 1, -1, 1, -1, 1, 1, 1, 1,
        0,
        1, -1, -1, 1, 1, -1, 1, -1, 1, -1, -1, -1, -1, -1, 1, 1, -1, -1, 1, -1, 1, -1, 1, 1, 1, 1,
    ];
    let mut s1 = [Complex32::new(0.0, 0.0); FFT_SIZE];
    for (n, &v) in TONES.iter().enumerate() {
        s1[fft_index(n as i32 - 26)] = Complex32::new(v as f32, 0.0);
    }
    s1
}

/// Places 48 data values and the signed pilots into a 64-bin spectrum
pub fn map_subcarriers(data: &[Complex32], pilot_inverted: bool) -> Result<[Complex32; FFT_SIZE]> {
    if data.len() != NUM_DATA_SUBCARRIERS {
        return Err(WlanError::InvalidInputSize {
            expected: NUM_DATA_SUBCARRIERS,
            actual: data.len(),
        });
    }

    let mut spectrum = [Complex32::new(0.0, 0.0); FFT_SIZE];
    for (&k, &v) in DATA_SUBCARRIERS.iter().zip(data) {
        spectrum[k] = v;
    }
    for (&k, p) in PILOT_SUBCARRIERS.iter().zip(pilot_values(pilot_inverted)) {
        spectrum[k] = Complex32::new(p, 0.0);
    }
    Ok(spectrum)
}

pub struct OfdmModulator {
    ifft: Arc<dyn Fft<f32>>,
    ramp: Vec<f32>,
    postfix: Vec<Complex32>,
}

pub struct OfdmDemodulator {
    fft: Arc<dyn Fft<f32>>,
}

impl OfdmModulator {
    /// `ramp_len` is the number of leading samples cross-faded with the
    /// previous symbol's tail, in `1..=MAX_RAMP_LEN`
    pub fn new(ramp_len: usize) -> Result<Self> {
        if ramp_len == 0 || ramp_len > MAX_RAMP_LEN {
            return Err(WlanError::InvalidConfig(format!(
                "ramp length {} outside 1..={}",
                ramp_len, MAX_RAMP_LEN
            )));
        }

        let mut fft_planner = FftPlanner::new();
        let ramp = (0..ramp_len)
            .map(|i| {
                let s = (FRAC_PI_2 * (i as f32 + 0.5) / ramp_len as f32).sin();
                s * s
            })
            .collect();

        Ok(Self {
            ifft: fft_planner.plan_fft_inverse(FFT_SIZE),
            ramp,
            postfix: vec![Complex32::new(0.0, 0.0); ramp_len],
        })
    }

    pub fn ramp_len(&self) -> usize {
        self.ramp.len()
    }

    /// Clears the carried-over tail so the next symbol ramps up from silence
    pub fn reset(&mut self) {
        self.postfix.fill(Complex32::new(0.0, 0.0));
    }

    /// Unitary inverse transform of a 64-bin spectrum
    pub fn to_time_domain(&self, spectrum: &[Complex32]) -> Result<[Complex32; FFT_SIZE]> {
        if spectrum.len() != FFT_SIZE {
            return Err(WlanError::InvalidInputSize {
                expected: FFT_SIZE,
                actual: spectrum.len(),
            });
        }
        let mut x = [Complex32::new(0.0, 0.0); FFT_SIZE];
        x.copy_from_slice(spectrum);
        self.ifft.process(&mut x);
        for v in x.iter_mut() {
            *v *= UNITARY_SCALE;
        }
        Ok(x)
    }

    /// Emits `x[48..64] ++ x[0..64]` with the leading edge windowed against
    /// the previous symbol
    pub fn write_time_domain(&mut self, x: &[Complex32], out: &mut [Complex32]) -> Result<()> {
        if x.len() != FFT_SIZE {
            return Err(WlanError::InvalidInputSize { expected: FFT_SIZE, actual: x.len() });
        }
        if out.len() != SYMBOL_LEN {
            return Err(WlanError::InvalidInputSize { expected: SYMBOL_LEN, actual: out.len() });
        }

        out[..CP_LEN].copy_from_slice(&x[FFT_SIZE - CP_LEN..]);
        out[CP_LEN..].copy_from_slice(x);

        let p = self.ramp.len();
        for i in 0..p {
            out[i] = out[i] * self.ramp[i] + self.postfix[i] * self.ramp[p - 1 - i];
        }
        self.postfix.copy_from_slice(&x[..p]);
        Ok(())
    }

    /// Maps data and pilots, transforms and writes one 80-sample symbol
    pub fn synthesize(&mut self, data: &[Complex32], pilot_inverted: bool, out: &mut [Complex32]) -> Result<()> {
        let spectrum = map_subcarriers(data, pilot_inverted)?;
        let x = self.to_time_domain(&spectrum)?;
        self.write_time_domain(&x, out)
    }

    /// All-zero symbol; only the windowed tail of the previous symbol remains
    pub fn write_null(&mut self, out: &mut [Complex32]) -> Result<()> {
        self.write_time_domain(&[Complex32::new(0.0, 0.0); FFT_SIZE], out)
    }
}

impl OfdmDemodulator {
    pub fn new() -> Self {
        let mut fft_planner = FftPlanner::new();
        Self {
            fft: fft_planner.plan_fft_forward(FFT_SIZE),
        }
    }

    /// Unitary forward transform of one de-prefixed 64-sample window
    pub fn analyze(&self, window: &[Complex32]) -> Result<[Complex32; FFT_SIZE]> {
        if window.len() != FFT_SIZE {
            return Err(WlanError::InvalidInputSize {
                expected: FFT_SIZE,
                actual: window.len(),
            });
        }
        let mut spectrum = [Complex32::new(0.0, 0.0); FFT_SIZE];
        spectrum.copy_from_slice(window);
        self.fft.process(&mut spectrum);
        for v in spectrum.iter_mut() {
            *v *= UNITARY_SCALE;
        }
        Ok(spectrum)
    }
}

impl Default for OfdmDemodulator {
    fn default() -> Self {
        Self::new()
    }
}
