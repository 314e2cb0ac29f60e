use crate::bits::{get_bit, read_bits};
use crate::error::{Result, WlanError};
use crate::framing::TxVector;
use crate::modem::Modulation;
use crate::ofdm::{long_sequence, short_sequence, OfdmModulator};
use crate::packet::{self, FrameParams};
use crate::scrambler::Lfsr;
use crate::signal::{SignalField, SIGNAL_ENCODED_BYTES};
use crate::{Complex32, DEFAULT_SCRAMBLER_SEED, FFT_SIZE, NUM_DATA_SUBCARRIERS, PILOT_SEQUENCE_SEED, SYMBOL_LEN};
use log::{debug, trace};
use std::fmt;

/// Preamble, SIGNAL and trailing NULL symbols around the DATA field
const OVERHEAD_SYMBOLS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGenConfig {
    /// Leading-edge window length in samples (1..=15)
    pub ramp_len: usize,
}

impl Default for FrameGenConfig {
    fn default() -> Self {
        Self { ramp_len: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenState {
    ShortA,
    ShortB,
    LongA,
    LongB,
    Signal,
    Data,
    Null,
}

/// Transmitter: emits one 80-sample OFDM symbol per [`FrameGen::write_symbol`]
///
/// Frame layout: two short training symbols, two long training symbols,
/// SIGNAL, `nsym` DATA symbols and a NULL ramp-down symbol.
pub struct FrameGen {
    config: FrameGenConfig,
    modulator: OfdmModulator,
    short_time: [Complex32; FFT_SIZE],
    long_time: [Complex32; FFT_SIZE],
    state: GenState,
    params: Option<FrameParams>,
    tx: Option<TxVector>,
    signal: [u8; SIGNAL_ENCODED_BYTES],
    encoded: Vec<u8>,
    data_symbol: usize,
    pilot: Lfsr,
}

impl FrameGen {
    pub fn new(config: FrameGenConfig) -> Result<Self> {
        let modulator = OfdmModulator::new(config.ramp_len)?;
        let short_time = modulator.to_time_domain(&short_sequence())?;
        let long_time = modulator.to_time_domain(&long_sequence())?;

        Ok(Self {
            config,
            modulator,
            short_time,
            long_time,
            state: GenState::ShortA,
            params: None,
            tx: None,
            signal: [0u8; SIGNAL_ENCODED_BYTES],
            encoded: Vec::new(),
            data_symbol: 0,
            pilot: Lfsr::new(PILOT_SEQUENCE_SEED),
        })
    }

    pub fn config(&self) -> &FrameGenConfig {
        &self.config
    }

    /// Prepares a frame; `payload` must hold at least `tx.length` bytes
    pub fn assemble(&mut self, tx: &TxVector, payload: &[u8]) -> Result<()> {
        let params = tx.validate()?;
        let encoded = packet::encode(&params, payload, DEFAULT_SCRAMBLER_SEED)?;
        let signal = SignalField::new(params.rate, params.length)?.encode()?;

        self.reset();
        self.params = Some(params);
        self.tx = Some(*tx);
        self.signal = signal;
        self.encoded = encoded;

        debug!(
            "framegen: assembled {} bytes @ {}, {} data symbols",
            params.length, params.rate, params.nsym
        );
        Ok(())
    }

    /// Writes the next 80-sample symbol into `out`
    ///
    /// Returns `true` once the trailing NULL symbol has been written, after
    /// which the generator needs a new [`FrameGen::assemble`].
    pub fn write_symbol(&mut self, out: &mut [Complex32]) -> Result<bool> {
        if out.len() != SYMBOL_LEN {
            return Err(WlanError::InvalidInputSize {
                expected: SYMBOL_LEN,
                actual: out.len(),
            });
        }
        let params = self.params.ok_or(WlanError::NotAssembled)?;

        match self.state {
            GenState::ShortA => {
                self.modulator.write_time_domain(&self.short_time, out)?;
                self.state = GenState::ShortB;
            }
            GenState::ShortB => {
                self.modulator.write_time_domain(&self.short_time, out)?;
                self.state = GenState::LongA;
            }
            GenState::LongA => {
                // 32-sample guard interval then the first 48 samples of the body
                let mut x = [Complex32::new(0.0, 0.0); FFT_SIZE];
                x[..16].copy_from_slice(&self.long_time[48..]);
                x[16..].copy_from_slice(&self.long_time[..48]);
                self.modulator.write_time_domain(&x, out)?;
                self.state = GenState::LongB;
            }
            GenState::LongB => {
                self.modulator.write_time_domain(&self.long_time, out)?;
                self.state = GenState::Signal;
            }
            GenState::Signal => {
                let mut values = [Complex32::new(0.0, 0.0); NUM_DATA_SUBCARRIERS];
                for (n, v) in values.iter_mut().enumerate() {
                    *v = Modulation::Bpsk.modulate(get_bit(&self.signal, n));
                }
                let inverted = self.pilot.advance() == 1;
                self.modulator.synthesize(&values, inverted, out)?;
                trace!("framegen: SIGNAL symbol");
                self.state = GenState::Data;
            }
            GenState::Data => {
                let profile = params.profile();
                let bps = params.bytes_per_symbol();
                let start = self.data_symbol * bps;
                let chunk = &self.encoded[start..start + bps];

                let mut values = [Complex32::new(0.0, 0.0); NUM_DATA_SUBCARRIERS];
                for (n, v) in values.iter_mut().enumerate() {
                    let symbol = read_bits(chunk, n * profile.nbpsc, profile.nbpsc);
                    *v = profile.modulation.modulate(symbol);
                }
                let inverted = self.pilot.advance() == 1;
                self.modulator.synthesize(&values, inverted, out)?;
                trace!("framegen: DATA symbol {}/{}", self.data_symbol + 1, params.nsym);

                self.data_symbol += 1;
                if self.data_symbol == params.nsym {
                    self.state = GenState::Null;
                }
            }
            GenState::Null => {
                self.modulator.write_null(out)?;
                self.reset();
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drops the assembled frame and rewinds to the first preamble symbol
    pub fn reset(&mut self) {
        self.state = GenState::ShortA;
        self.params = None;
        self.tx = None;
        self.encoded.clear();
        self.data_symbol = 0;
        self.pilot.reset(PILOT_SEQUENCE_SEED);
        self.modulator.reset();
    }

    pub fn is_assembled(&self) -> bool {
        self.params.is_some()
    }

    pub fn frame_params(&self) -> Option<&FrameParams> {
        self.params.as_ref()
    }

    pub fn tx_vector(&self) -> Option<&TxVector> {
        self.tx.as_ref()
    }

    /// Total symbols in the assembled frame, preamble and NULL included
    pub fn num_symbols(&self) -> usize {
        self.params.map_or(0, |p| p.nsym + OVERHEAD_SYMBOLS)
    }
}

impl fmt::Display for FrameGen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "framegen [ramp {}]: ", self.config.ramp_len)?;
        match self.params {
            Some(p) => write!(
                f,
                "{} bytes @ {}, {} data symbols, state {:?}",
                p.length, p.rate, p.nsym, self.state
            ),
            None => write!(f, "idle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofdm::OfdmDemodulator;
    use crate::rate::Rate;
    use crate::CP_LEN;

    fn generate(frame_gen: &mut FrameGen) -> Vec<Complex32> {
        let mut samples = Vec::new();
        let mut symbol = [Complex32::new(0.0, 0.0); SYMBOL_LEN];
        loop {
            let done = frame_gen.write_symbol(&mut symbol).unwrap();
            samples.extend_from_slice(&symbol);
            if done {
                break;
            }
        }
        samples
    }

    #[test]
    fn test_write_before_assemble_fails() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        let mut symbol = [Complex32::new(0.0, 0.0); SYMBOL_LEN];
        assert_eq!(frame_gen.write_symbol(&mut symbol), Err(WlanError::NotAssembled));
    }

    #[test]
    fn test_wrong_output_size() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        frame_gen.assemble(&TxVector::new(Rate::Mbps6, 10), &[0u8; 10]).unwrap();
        let mut symbol = [Complex32::new(0.0, 0.0); 64];
        assert_eq!(
            frame_gen.write_symbol(&mut symbol),
            Err(WlanError::InvalidInputSize { expected: 80, actual: 64 })
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(FrameGen::new(FrameGenConfig { ramp_len: 0 }).is_err());
        assert!(FrameGen::new(FrameGenConfig { ramp_len: 16 }).is_err());
    }

    #[test]
    fn test_assemble_rejects_bad_tx_vector() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        let tx = TxVector { rate: 9, ..TxVector::new(Rate::Mbps6, 10) };
        assert_eq!(frame_gen.assemble(&tx, &[0u8; 10]), Err(WlanError::InvalidRate(9)));
        assert_eq!(
            frame_gen.assemble(&TxVector::new(Rate::Mbps6, 10), &[0u8; 4]),
            Err(WlanError::PayloadTooShort { expected: 10, actual: 4 })
        );
        assert!(!frame_gen.is_assembled());
    }

    #[test]
    fn test_frame_symbol_count() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        frame_gen.assemble(&TxVector::new(Rate::Mbps36, 100), &[0xa5; 100]).unwrap();
        assert_eq!(frame_gen.frame_params().map(|p| p.nsym), Some(6));
        assert_eq!(frame_gen.num_symbols(), 12);

        let samples = generate(&mut frame_gen);
        assert_eq!(samples.len(), 12 * SYMBOL_LEN);
        assert!(!frame_gen.is_assembled());
        assert_eq!(frame_gen.num_symbols(), 0);
    }

    #[test]
    fn test_preamble_structure() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        frame_gen.assemble(&TxVector::new(Rate::Mbps6, 1), &[0x00]).unwrap();
        let samples = generate(&mut frame_gen);

        // short training repeats every 16 samples (first sample is windowed)
        for i in 1..144 {
            assert!((samples[i] - samples[i + 16]).norm() < 1e-4, "sample {}", i);
        }
        // two identical long training bodies after the 32-sample guard
        for i in 0..FFT_SIZE {
            assert!((samples[192 + i] - samples[256 + i]).norm() < 1e-5);
        }
        // guard interval is the tail of the body
        for i in 1..32 {
            assert!((samples[160 + i] - samples[224 + i]).norm() < 1e-5);
        }
    }

    #[test]
    fn test_signal_symbol_carries_header() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        frame_gen.assemble(&TxVector::new(Rate::Mbps36, 100), &[0u8; 100]).unwrap();
        let samples = generate(&mut frame_gen);

        let demodulator = OfdmDemodulator::new();
        let start = 4 * SYMBOL_LEN + CP_LEN;
        let spectrum = demodulator.analyze(&samples[start..start + FFT_SIZE]).unwrap();
        let mut bits = [0u8; SIGNAL_ENCODED_BYTES];
        for (n, &k) in crate::ofdm::DATA_SUBCARRIERS.iter().enumerate() {
            if Modulation::Bpsk.demodulate(spectrum[k]) == 1 {
                bits[n / 8] |= 0x80 >> (n % 8);
            }
        }
        assert_eq!(bits, [0x94, 0xd0, 0x14, 0x83, 0x24, 0x94]);
    }

    #[test]
    fn test_null_symbol_is_silent_after_ramp() {
        let mut frame_gen = FrameGen::new(FrameGenConfig { ramp_len: 4 }).unwrap();
        frame_gen.assemble(&TxVector::new(Rate::Mbps54, 50), &[0x3c; 50]).unwrap();
        let samples = generate(&mut frame_gen);
        let null = &samples[samples.len() - SYMBOL_LEN..];
        assert!(null[..4].iter().any(|v| v.norm() > 0.0));
        assert!(null[4..].iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_reassemble_after_completion() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        let tx = TxVector::new(Rate::Mbps12, 20);
        frame_gen.assemble(&tx, &[1u8; 20]).unwrap();
        let first = generate(&mut frame_gen);
        frame_gen.assemble(&tx, &[1u8; 20]).unwrap();
        let second = generate(&mut frame_gen);
        assert_eq!(first, second);
    }

    #[test]
    fn test_accessors_follow_assembly() {
        let mut frame_gen = FrameGen::new(FrameGenConfig { ramp_len: 3 }).unwrap();
        assert_eq!(frame_gen.config().ramp_len, 3);
        assert!(frame_gen.tx_vector().is_none());
        assert!(frame_gen.frame_params().is_none());

        let tx = TxVector { service: 0x1234, ..TxVector::new(Rate::Mbps9, 7) };
        frame_gen.assemble(&tx, &[0u8; 7]).unwrap();
        assert_eq!(frame_gen.tx_vector(), Some(&tx));
        assert_eq!(frame_gen.frame_params().map(|p| p.rate), Some(Rate::Mbps9));

        frame_gen.reset();
        assert!(!frame_gen.is_assembled());
        assert!(frame_gen.tx_vector().is_none());
        assert_eq!(frame_gen.num_symbols(), 0);
    }

    #[test]
    fn test_display() {
        let mut frame_gen = FrameGen::new(FrameGenConfig::default()).unwrap();
        assert_eq!(frame_gen.to_string(), "framegen [ramp 1]: idle");
        frame_gen.assemble(&TxVector::new(Rate::Mbps24, 10), &[0u8; 10]).unwrap();
        assert!(frame_gen.to_string().contains("10 bytes @ 24 Mbps"));
    }
}
