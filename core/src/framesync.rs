//! Receiver state machine
//!
//! Samples are mixed down by the carrier-offset NCO, pushed through an
//! 80-sample ring and dispatched on [`SyncState`]. Acquisition runs on the
//! short training sequence (detection, symbol timing mod 16, coarse CFO), the
//! long training sequence locks timing, refines the CFO and yields the channel
//! estimate. SIGNAL then sizes the DATA field.

use crate::bits::write_bits;
use crate::error::{Result, WlanError};
use crate::framing::RxVector;
use crate::modem::Modulation;
use crate::ofdm::{
    long_sequence, pilot_values, short_sequence, subcarrier_frequency, subcarrier_kind, OfdmDemodulator,
    SubcarrierKind, DATA_SUBCARRIERS, PILOT_SUBCARRIERS,
};
use crate::packet::{self, FrameParams};
use crate::polyfit::{polyfit, polyval};
use crate::scrambler::Lfsr;
use crate::signal::{SignalField, SIGNAL_ENCODED_BYTES};
use crate::{
    Complex32, CP_LEN, DEFAULT_SCRAMBLER_SEED, FFT_SIZE, NUM_ACTIVE_SUBCARRIERS, NUM_PILOT_SUBCARRIERS,
    PILOT_SEQUENCE_SEED, SYMBOL_LEN,
};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;

/// Expected short-sequence window energy at unit channel gain
const SHORT_WINDOW_ENERGY: f32 = NUM_ACTIVE_SUBCARRIERS as f32;
/// Tone pairs 4 bins apart in the short sequence
const SHORT_PAIRS: f32 = 10.0;
/// Adjacent active tone pairs in the long sequence
const LONG_PAIRS: f32 = 50.0;
/// Short training period in samples
const SHORT_PERIOD: usize = 16;

const EPSILON: f32 = 1e-12;

pub const DEBUG_CAPTURE_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSyncConfig {
    /// Short-sequence detection level for |s_hat|
    pub detect_threshold: f32,
    /// Long-sequence metric magnitude level
    pub long_threshold: f32,
    /// Largest long-sequence metric phase accepted, in radians
    pub long_phase_threshold: f32,
    /// Samples the FFT window is pulled back into the cyclic prefix
    pub backoff: usize,
    /// Per-sample long-sequence polls before acquisition is abandoned
    pub long_search_limit: usize,
}

impl Default for FrameSyncConfig {
    fn default() -> Self {
        Self {
            detect_threshold: 0.4,
            long_threshold: 0.5,
            long_phase_threshold: 0.2,
            backoff: 2,
            long_search_limit: 320,
        }
    }
}

impl FrameSyncConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.detect_threshold) || !positive(self.long_threshold) {
            return Err(WlanError::InvalidConfig(
                "detection thresholds must be positive".to_string(),
            ));
        }
        if !positive(self.long_phase_threshold) || self.long_phase_threshold > PI {
            return Err(WlanError::InvalidConfig(format!(
                "long phase threshold {} outside (0, pi]",
                self.long_phase_threshold
            )));
        }
        if self.backoff >= CP_LEN {
            return Err(WlanError::InvalidConfig(format!(
                "backoff {} must be shorter than the {}-sample prefix",
                self.backoff, CP_LEN
            )));
        }
        if self.long_search_limit == 0 {
            return Err(WlanError::InvalidConfig(
                "long search limit must be at least one poll".to_string(),
            ));
        }
        Ok(())
    }

    /// Short-sequence detection test (strict)
    pub fn short_detected(&self, s_hat: Complex32) -> bool {
        s_hat.norm() > self.detect_threshold
    }

    /// Long-sequence timing test: magnitude and phase both strict
    pub fn long_detected(&self, metric: Complex32) -> bool {
        metric.norm() > self.long_threshold && metric.arg().abs() < self.long_phase_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    SeekPlcp,
    RxShort0,
    RxShort1,
    RxLong0,
    RxLong1,
    RxSignal,
    RxData,
}

impl SyncState {
    /// Samples between evaluations in this state
    fn period(self) -> usize {
        match self {
            SyncState::SeekPlcp => FFT_SIZE,
            SyncState::RxShort0 | SyncState::RxShort1 | SyncState::RxLong0 => SHORT_PERIOD,
            SyncState::RxLong1 => FFT_SIZE,
            SyncState::RxSignal | SyncState::RxData => SYMBOL_LEN,
        }
    }
}

/// Numerically-controlled oscillator for carrier offset removal
#[derive(Debug, Clone, Copy, Default)]
struct Nco {
    phase: f32,
    frequency: f32,
}

impl Nco {
    fn mix_down(&self, x: Complex32) -> Complex32 {
        x * Complex32::from_polar(1.0, -self.phase)
    }

    fn step(&mut self) {
        self.phase += self.frequency;
        if self.phase > PI {
            self.phase -= 2.0 * PI;
        } else if self.phase < -PI {
            self.phase += 2.0 * PI;
        }
    }
}

/// Recent mixed-down input and per-sample RSSI estimate, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugCapture {
    pub samples: Vec<Complex32>,
    pub rssi: Vec<f32>,
}

#[derive(Debug, Default)]
struct DebugHistory {
    samples: VecDeque<Complex32>,
    rssi: VecDeque<f32>,
}

impl DebugHistory {
    fn push(&mut self, x: Complex32, rssi: f32) {
        if self.samples.len() == DEBUG_CAPTURE_LEN {
            self.samples.pop_front();
            self.rssi.pop_front();
        }
        self.samples.push_back(x);
        self.rssi.push_back(rssi);
    }
}

/// Receiver: feeds samples through acquisition and decoding, invoking the
/// callback once per frame attempt that reaches the SIGNAL field
///
/// The callback gets `(header_valid, payload, rx_vector)`; `payload` is
/// `Some` only for frames whose header passed.
pub struct FrameSync<F>
where
    F: FnMut(bool, Option<&[u8]>, RxVector),
{
    config: FrameSyncConfig,
    callback: F,
    demodulator: OfdmDemodulator,
    s0: [Complex32; FFT_SIZE],
    s1: [Complex32; FFT_SIZE],

    state: SyncState,
    timer: usize,
    long_polls: usize,
    ring: [Complex32; SYMBOL_LEN],
    nco: Nco,

    g0: f32,
    rssi_estimate: f32,
    rssi: f32,
    cfo: f32,
    g0a: [Complex32; FFT_SIZE],
    g0b: [Complex32; FFT_SIZE],
    g1a: [Complex32; FFT_SIZE],
    g1b: [Complex32; FFT_SIZE],
    gain: [Complex32; FFT_SIZE],
    correction: [Complex32; FFT_SIZE],
    pilot: Lfsr,

    params: Option<FrameParams>,
    data_symbol: usize,
    encoded: Vec<u8>,
    rx: RxVector,

    debug: Option<DebugHistory>,
}

impl<F> FrameSync<F>
where
    F: FnMut(bool, Option<&[u8]>, RxVector),
{
    pub fn new(config: FrameSyncConfig, callback: F) -> Result<Self> {
        config.validate()?;
        let zeros = [Complex32::new(0.0, 0.0); FFT_SIZE];

        Ok(Self {
            config,
            callback,
            demodulator: OfdmDemodulator::new(),
            s0: short_sequence(),
            s1: long_sequence(),
            state: SyncState::SeekPlcp,
            timer: 0,
            long_polls: 0,
            ring: [Complex32::new(0.0, 0.0); SYMBOL_LEN],
            nco: Nco::default(),
            g0: 0.0,
            rssi_estimate: 0.0,
            rssi: 0.0,
            cfo: 0.0,
            g0a: zeros,
            g0b: zeros,
            g1a: zeros,
            g1b: zeros,
            gain: zeros,
            correction: zeros,
            pilot: Lfsr::new(PILOT_SEQUENCE_SEED),
            params: None,
            data_symbol: 0,
            encoded: Vec::new(),
            rx: RxVector::default(),
            debug: None,
        })
    }

    pub fn config(&self) -> &FrameSyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// RSSI of the most recently detected short sequence in dB
    pub fn rssi(&self) -> f32 {
        self.rssi
    }

    /// Carrier offset estimate of the current or last acquired frame, in
    /// radians per sample
    pub fn cfo(&self) -> f32 {
        self.cfo
    }

    /// Channel gain per FFT bin from the last long-sequence fit
    pub fn channel_gain(&self) -> &[Complex32; FFT_SIZE] {
        &self.gain
    }

    pub fn debug_enable(&mut self) {
        if self.debug.is_none() {
            self.debug = Some(DebugHistory::default());
        }
    }

    pub fn debug_disable(&mut self) {
        self.debug = None;
    }

    /// Snapshot of the capture history, `None` while capture is disabled
    pub fn debug_capture(&self) -> Option<DebugCapture> {
        self.debug.as_ref().map(|h| DebugCapture {
            samples: h.samples.iter().copied().collect(),
            rssi: h.rssi.iter().copied().collect(),
        })
    }

    /// Clears all acquisition state, estimates and buffered input
    pub fn reset(&mut self) {
        self.restart();
        self.ring = [Complex32::new(0.0, 0.0); SYMBOL_LEN];
        self.g0 = 0.0;
        self.rssi_estimate = 0.0;
        self.rssi = 0.0;
        self.cfo = 0.0;
        let zeros = [Complex32::new(0.0, 0.0); FFT_SIZE];
        self.g0a = zeros;
        self.g0b = zeros;
        self.g1a = zeros;
        self.g1b = zeros;
        self.gain = zeros;
        self.correction = zeros;
        if let Some(history) = self.debug.as_mut() {
            *history = DebugHistory::default();
        }
    }

    // Back to preamble search; estimates survive for rssi()/cfo()
    fn restart(&mut self) {
        self.state = SyncState::SeekPlcp;
        self.timer = 0;
        self.long_polls = 0;
        self.nco = Nco::default();
        self.pilot.reset(PILOT_SEQUENCE_SEED);
        self.params = None;
        self.data_symbol = 0;
        self.encoded.clear();
        self.rx = RxVector::default();
    }

    /// Consumes a block of received samples
    pub fn execute(&mut self, samples: &[Complex32]) -> Result<()> {
        for &x in samples {
            self.push_sample(x)?;
        }
        Ok(())
    }

    fn push_sample(&mut self, x: Complex32) -> Result<()> {
        let x = self.nco.mix_down(x);
        self.nco.step();

        self.ring.copy_within(1.., 0);
        self.ring[SYMBOL_LEN - 1] = x;

        if let Some(history) = self.debug.as_mut() {
            history.push(x, self.rssi_estimate);
        }

        self.timer += 1;
        if self.timer < self.state.period() {
            return Ok(());
        }
        self.timer = 0;

        match self.state {
            SyncState::SeekPlcp => self.execute_seekplcp(),
            SyncState::RxShort0 => self.execute_rxshort0(),
            SyncState::RxShort1 => self.execute_rxshort1(),
            SyncState::RxLong0 => self.execute_rxlong0(),
            SyncState::RxLong1 => self.execute_rxlong1(),
            SyncState::RxSignal => self.execute_rxsignal(),
            SyncState::RxData => self.execute_rxdata(),
        }
    }

    fn nominal_window(&self) -> &[Complex32] {
        &self.ring[CP_LEN..]
    }

    fn backoff_window(&self) -> &[Complex32] {
        let b = self.config.backoff;
        &self.ring[CP_LEN - b..SYMBOL_LEN - b]
    }

    /// Per-bin gain against a reference spectrum, zero where it has no energy
    fn estimate_gain(&self, window: &[Complex32], reference: &[Complex32; FFT_SIZE]) -> Result<[Complex32; FFT_SIZE]> {
        let x = self.demodulator.analyze(window)?;
        let mut g = [Complex32::new(0.0, 0.0); FFT_SIZE];
        for k in 0..FFT_SIZE {
            let e = reference[k].norm_sqr();
            if e > 0.0 {
                g[k] = x[k] * reference[k].conj() / e;
            }
        }
        Ok(g)
    }

    fn short_metric(&self, g: &[Complex32; FFT_SIZE]) -> Complex32 {
        let mut s_hat = Complex32::new(0.0, 0.0);
        for k in 0..FFT_SIZE {
            s_hat += g[(k + 4) % FFT_SIZE] * g[k].conj();
        }
        s_hat * self.g0 / SHORT_PAIRS
    }

    fn long_metric(&self, g: &[Complex32; FFT_SIZE]) -> Complex32 {
        let mut metric = Complex32::new(0.0, 0.0);
        for k in 0..FFT_SIZE {
            let k1 = (k + 1) % FFT_SIZE;
            if self.s1[k].norm_sqr() > 0.0 && self.s1[k1].norm_sqr() > 0.0 {
                metric += g[k1] * g[k].conj();
            }
        }
        // undo the linear phase of the backed-off window
        let rotation = Complex32::from_polar(1.0, 2.0 * PI * self.config.backoff as f32 / FFT_SIZE as f32);
        metric * self.g0 / LONG_PAIRS * rotation
    }

    fn execute_seekplcp(&mut self) -> Result<()> {
        let energy: f32 = self.nominal_window().iter().map(|v| v.norm_sqr()).sum();
        self.g0 = SHORT_WINDOW_ENERGY / energy.max(EPSILON);
        self.rssi_estimate = 10.0 * (energy / FFT_SIZE as f32 + EPSILON).log10();

        let g = self.estimate_gain(self.nominal_window(), &self.s0)?;
        let s_hat = self.short_metric(&g);
        if !self.config.short_detected(s_hat) {
            return Ok(());
        }

        // window start relative to the 16-sample period boundary
        let dt = (s_hat.arg() * SHORT_PERIOD as f32 / (2.0 * PI)).round() as i32;
        self.timer = dt.rem_euclid(SHORT_PERIOD as i32) as usize;
        self.rssi = self.rssi_estimate;
        self.rx = RxVector {
            rssi: self.rssi,
            ..RxVector::default()
        };
        self.state = SyncState::RxShort0;

        debug!(
            "framesync: short sequence detected, |s_hat| {:.3}, dt {}, rssi {:.1} dB",
            s_hat.norm(),
            dt,
            self.rssi
        );
        Ok(())
    }

    fn execute_rxshort0(&mut self) -> Result<()> {
        self.g0a = self.estimate_gain(self.nominal_window(), &self.s0)?;
        self.state = SyncState::RxShort1;
        Ok(())
    }

    fn execute_rxshort1(&mut self) -> Result<()> {
        self.g0b = self.estimate_gain(self.nominal_window(), &self.s0)?;

        let mut t = Complex32::new(0.0, 0.0);
        for k in 0..FFT_SIZE {
            t += self.g0b[k] * self.g0a[k].conj();
        }
        let nu_hat = t.arg() / SHORT_PERIOD as f32;
        self.nco.frequency = nu_hat;
        self.cfo = nu_hat;

        self.long_polls = 0;
        self.state = SyncState::RxLong0;
        debug!("framesync: coarse cfo {:.5} rad/sample", nu_hat);
        Ok(())
    }

    fn execute_rxlong0(&mut self) -> Result<()> {
        self.g1a = self.estimate_gain(self.backoff_window(), &self.s1)?;
        let metric = self.long_metric(&self.g1a);

        if self.config.long_detected(metric) {
            trace!(
                "framesync: long sequence |metric| {:.3} arg {:.3} after {} polls",
                metric.norm(),
                metric.arg(),
                self.long_polls
            );
            self.state = SyncState::RxLong1;
            return Ok(());
        }

        self.long_polls += 1;
        if self.long_polls > self.config.long_search_limit {
            warn!(
                "framesync: long sequence not found within {} polls",
                self.config.long_search_limit
            );
            self.restart();
            return Ok(());
        }

        // poll again on the next sample
        self.timer = self.state.period() - 1;
        Ok(())
    }

    fn execute_rxlong1(&mut self) -> Result<()> {
        self.g1b = self.estimate_gain(self.backoff_window(), &self.s1)?;
        let metric = self.long_metric(&self.g1b);

        // timing is already locked, only the level is re-checked here
        if metric.norm() <= self.config.long_threshold {
            warn!("framesync: second long symbol rejected, |metric| {:.3}", metric.norm());
            self.restart();
            return Ok(());
        }

        let mut t = Complex32::new(0.0, 0.0);
        for k in 0..FFT_SIZE {
            t += self.g1b[k] * self.g1a[k].conj();
        }
        let nu_fine = t.arg() / FFT_SIZE as f32;
        self.nco.frequency += nu_fine;
        self.cfo = self.nco.frequency;

        self.estimate_equalizer();
        self.pilot.reset(PILOT_SEQUENCE_SEED);
        self.state = SyncState::RxSignal;

        debug!("framesync: fine cfo {:.6}, total {:.5} rad/sample", nu_fine, self.cfo);
        Ok(())
    }

    /// Smooths the averaged long-sequence gains with quadratic fits to
    /// magnitude and unwrapped phase over the active subcarriers
    fn estimate_equalizer(&mut self) {
        let mut bins = Vec::with_capacity(NUM_ACTIVE_SUBCARRIERS);
        let mut freq = Vec::with_capacity(NUM_ACTIVE_SUBCARRIERS);
        let mut mag = Vec::with_capacity(NUM_ACTIVE_SUBCARRIERS);
        let mut phase = Vec::with_capacity(NUM_ACTIVE_SUBCARRIERS);

        for i in 0..FFT_SIZE {
            let k = (i + FFT_SIZE / 2) % FFT_SIZE;
            if subcarrier_kind(k) == SubcarrierKind::Null {
                continue;
            }
            let g = (self.g1a[k] + self.g1b[k]) * 0.5;
            bins.push(k);
            freq.push(subcarrier_frequency(k) as f32);
            mag.push(g.norm());
            phase.push(g.arg());
        }
        unwrap_phase(&mut phase);

        let pm = polyfit(&freq, &mag, 2);
        let pp = polyfit(&freq, &phase, 2);

        self.gain = [Complex32::new(0.0, 0.0); FFT_SIZE];
        self.correction = [Complex32::new(0.0, 0.0); FFT_SIZE];
        for (&k, &f) in bins.iter().zip(&freq) {
            let g = Complex32::from_polar(polyval(&pm, f), polyval(&pp, f));
            self.gain[k] = g;
            self.correction[k] = g.conj() / g.norm_sqr().max(EPSILON);
        }
    }

    /// Analyzes the current symbol, equalizes it and removes the residual
    /// phase tracked on the pilots
    fn rx_symbol(&mut self) -> Result<[Complex32; FFT_SIZE]> {
        let mut x = self.demodulator.analyze(self.backoff_window())?;
        for (v, c) in x.iter_mut().zip(&self.correction) {
            *v *= *c;
        }

        let pilots = pilot_values(self.pilot.advance() == 1);
        let mut freq = [0f32; NUM_PILOT_SUBCARRIERS];
        let mut phase = [0f32; NUM_PILOT_SUBCARRIERS];
        for (i, &k) in PILOT_SUBCARRIERS.iter().enumerate() {
            freq[i] = subcarrier_frequency(k) as f32;
            phase[i] = (x[k] * pilots[i]).arg();
        }
        unwrap_phase(&mut phase);
        let p = polyfit(&freq, &phase, 1);

        for (k, v) in x.iter_mut().enumerate() {
            if subcarrier_kind(k) != SubcarrierKind::Null {
                *v *= Complex32::from_polar(1.0, -polyval(&p, subcarrier_frequency(k) as f32));
            }
        }
        Ok(x)
    }

    fn execute_rxsignal(&mut self) -> Result<()> {
        let x = self.rx_symbol()?;

        let mut bits = [0u8; SIGNAL_ENCODED_BYTES];
        for (n, &k) in DATA_SUBCARRIERS.iter().enumerate() {
            write_bits(&mut bits, n, 1, Modulation::Bpsk.demodulate(x[k]));
        }

        let (field, parity_ok) = match SignalField::decode(&bits) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("framesync: SIGNAL rejected: {}", e);
                return self.header_invalid();
            }
        };
        self.rx.length = field.length;
        self.rx.rate = Some(field.rate);

        if !parity_ok {
            warn!("framesync: SIGNAL parity mismatch");
            return self.header_invalid();
        }

        let params = match FrameParams::new(field.rate, field.length) {
            Ok(params) => params,
            Err(e) => {
                warn!("framesync: SIGNAL rejected: {}", e);
                return self.header_invalid();
            }
        };

        debug!(
            "framesync: SIGNAL {} bytes @ {}, {} data symbols",
            params.length, params.rate, params.nsym
        );
        self.encoded = vec![0u8; params.enc_msg_len];
        self.params = Some(params);
        self.data_symbol = 0;
        self.state = SyncState::RxData;
        Ok(())
    }

    fn header_invalid(&mut self) -> Result<()> {
        let rx = self.rx;
        (self.callback)(false, None, rx);
        self.restart();
        Ok(())
    }

    fn execute_rxdata(&mut self) -> Result<()> {
        let params = match self.params {
            Some(params) => params,
            None => {
                self.restart();
                return Ok(());
            }
        };
        let x = self.rx_symbol()?;

        let profile = params.profile();
        let base = self.data_symbol * profile.ncbps;
        for (n, &k) in DATA_SUBCARRIERS.iter().enumerate() {
            let symbol = profile.modulation.demodulate(x[k]);
            write_bits(&mut self.encoded, base + n * profile.nbpsc, profile.nbpsc, symbol);
        }
        trace!("framesync: DATA symbol {}/{}", self.data_symbol + 1, params.nsym);

        self.data_symbol += 1;
        if self.data_symbol < params.nsym {
            return Ok(());
        }
        self.finish_frame(&params)
    }

    // always leaves the synchronizer searching, even when decoding fails
    fn finish_frame(&mut self, params: &FrameParams) -> Result<()> {
        let decoded = match packet::decode(params, &self.encoded, DEFAULT_SCRAMBLER_SEED) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.restart();
                return Err(e);
            }
        };
        self.rx.service = decoded.service;
        let rx = self.rx;
        debug!("framesync: frame received, {}", rx);
        (self.callback)(true, Some(decoded.payload.as_slice()), rx);
        self.restart();
        Ok(())
    }
}

impl<F> fmt::Display for FrameSync<F>
where
    F: FnMut(bool, Option<&[u8]>, RxVector),
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "framesync [detect {}, long {}/{} rad, backoff {}]: {:?}, rssi {:.1} dB, cfo {:.5} rad/sample",
            self.config.detect_threshold,
            self.config.long_threshold,
            self.config.long_phase_threshold,
            self.config.backoff,
            self.state,
            self.rssi,
            self.cfo
        )
    }
}

/// Removes 2*pi jumps between consecutive phase samples
pub(crate) fn unwrap_phase(phase: &mut [f32]) {
    for i in 1..phase.len() {
        let mut d = phase[i] - phase[i - 1];
        while d > PI {
            phase[i] -= 2.0 * PI;
            d -= 2.0 * PI;
        }
        while d < -PI {
            phase[i] += 2.0 * PI;
            d += 2.0 * PI;
        }
    }
}
