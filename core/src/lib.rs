//! 802.11a/g OFDM PHY framing
//!
//! Turns payload bytes into 80-sample complex baseband OFDM symbols and recovers
//! them from a received sample stream (preamble acquisition, carrier offset
//! correction, equalization, SIGNAL-driven DATA decoding).

mod bits;

pub mod error;
pub mod rate;
pub mod modem;
pub mod polyfit;
pub mod scrambler;
pub mod trellis;
pub mod fec;
pub mod interleaver;
pub mod signal;
pub mod packet;
pub mod ofdm;
pub mod framing;
pub mod framegen;
pub mod framesync;

pub use error::{Result, WlanError};
pub use framegen::{FrameGen, FrameGenConfig};
pub use framesync::{FrameSync, FrameSyncConfig, SyncState};
pub use framing::{RxVector, TxVector};
pub use packet::FrameParams;
pub use rate::{Rate, RateProfile};
pub use rustfft::num_complex::Complex32;

// OFDM numerology
pub const FFT_SIZE: usize = 64;
pub const CP_LEN: usize = 16;
pub const SYMBOL_LEN: usize = FFT_SIZE + CP_LEN; // 80
pub const NUM_DATA_SUBCARRIERS: usize = 48;
pub const NUM_PILOT_SUBCARRIERS: usize = 4;
pub const NUM_ACTIVE_SUBCARRIERS: usize = NUM_DATA_SUBCARRIERS + NUM_PILOT_SUBCARRIERS; // 52

// Frame configuration
pub const MAX_PAYLOAD_LEN: usize = 4095;
pub const SERVICE_BITS: usize = 16;
pub const TAIL_BITS: usize = 6;

// Sequence generators
pub const DEFAULT_SCRAMBLER_SEED: u8 = 0x5d; // 101 1101
pub const PILOT_SEQUENCE_SEED: u8 = 0x7f; // all ones
