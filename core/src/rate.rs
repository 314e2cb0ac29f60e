use crate::error::{Result, WlanError};
use crate::fec::FecScheme;
use crate::modem::Modulation;
use std::fmt;

/// The eight 802.11a/g data rates, indexed 0..=7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Rate {
    Mbps6 = 0,
    Mbps9 = 1,
    Mbps12 = 2,
    Mbps18 = 3,
    Mbps24 = 4,
    Mbps36 = 5,
    Mbps48 = 6,
    Mbps54 = 7,
}

/// Per-rate modulation and coding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateProfile {
    pub mbps: u32,
    pub modulation: Modulation,
    pub fec: FecScheme,
    /// Coded bits per subcarrier
    pub nbpsc: usize,
    /// Coded bits per OFDM symbol
    pub ncbps: usize,
    /// Data bits per OFDM symbol
    pub ndbps: usize,
}

pub static RATE_TABLE: [RateProfile; 8] = [
    RateProfile { mbps: 6, modulation: Modulation::Bpsk, fec: FecScheme::Half, nbpsc: 1, ncbps: 48, ndbps: 24 },
    RateProfile { mbps: 9, modulation: Modulation::Bpsk, fec: FecScheme::ThreeQuarters, nbpsc: 1, ncbps: 48, ndbps: 36 },
    RateProfile { mbps: 12, modulation: Modulation::Qpsk, fec: FecScheme::Half, nbpsc: 2, ncbps: 96, ndbps: 48 },
    RateProfile { mbps: 18, modulation: Modulation::Qpsk, fec: FecScheme::ThreeQuarters, nbpsc: 2, ncbps: 96, ndbps: 72 },
    RateProfile { mbps: 24, modulation: Modulation::Qam16, fec: FecScheme::Half, nbpsc: 4, ncbps: 192, ndbps: 96 },
    RateProfile { mbps: 36, modulation: Modulation::Qam16, fec: FecScheme::ThreeQuarters, nbpsc: 4, ncbps: 192, ndbps: 144 },
    RateProfile { mbps: 48, modulation: Modulation::Qam64, fec: FecScheme::TwoThirds, nbpsc: 6, ncbps: 288, ndbps: 192 },
    RateProfile { mbps: 54, modulation: Modulation::Qam64, fec: FecScheme::ThreeQuarters, nbpsc: 6, ncbps: 288, ndbps: 216 },
];

// 4-bit SIGNAL RATE field (R1..R4, R1 in the MSB), indexed by rate
const SIGNAL_RATE_CODES: [u8; 8] = [0b1101, 0b1111, 0b0101, 0b0111, 0b1001, 0b1011, 0b0001, 0b0011];

impl Rate {
    pub const ALL: [Rate; 8] = [
        Rate::Mbps6,
        Rate::Mbps9,
        Rate::Mbps12,
        Rate::Mbps18,
        Rate::Mbps24,
        Rate::Mbps36,
        Rate::Mbps48,
        Rate::Mbps54,
    ];

    pub fn from_index(index: u8) -> Result<Rate> {
        Rate::ALL
            .get(index as usize)
            .copied()
            .ok_or(WlanError::InvalidRate(index))
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_mbps(mbps: u32) -> Option<Rate> {
        Rate::ALL.iter().copied().find(|r| r.mbps() == mbps)
    }

    pub fn mbps(self) -> u32 {
        self.profile().mbps
    }

    pub fn profile(self) -> &'static RateProfile {
        &RATE_TABLE[self as usize]
    }

    pub fn signal_code(self) -> u8 {
        SIGNAL_RATE_CODES[self as usize]
    }

    /// Looks up the rate for a received 4-bit RATE field
    pub fn from_signal_code(code: u8) -> Result<Rate> {
        SIGNAL_RATE_CODES
            .iter()
            .position(|&c| c == code)
            .map(|i| Rate::ALL[i])
            .ok_or(WlanError::InvalidRateCode(code))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Mbps", self.mbps())
    }
}
