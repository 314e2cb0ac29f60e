//! SIGNAL field: 24-bit PLCP header carried by the first BPSK symbol
//!
//! ```text
//! bit  0..4   RATE (R1 first)
//! bit  4      reserved
//! bit  5..17  LENGTH, LSB first
//! bit  17     even parity over bits 0..17
//! bit  18..24 tail (zero)
//! ```

use crate::error::{Result, WlanError};
use crate::fec::{self, FecScheme};
use crate::interleaver::InterleaverTable;
use crate::rate::Rate;
use crate::MAX_PAYLOAD_LEN;

pub const SIGNAL_BYTES: usize = 3;
pub const SIGNAL_ENCODED_BYTES: usize = 6;
const SIGNAL_DATA_BITS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalField {
    pub rate: Rate,
    pub reserved: bool,
    pub length: usize,
}

impl SignalField {
    pub fn new(rate: Rate, length: usize) -> Result<Self> {
        if length > MAX_PAYLOAD_LEN {
            return Err(WlanError::InvalidLength(length));
        }
        Ok(Self { rate, reserved: false, length })
    }

    /// Packs RATE, reserved, LENGTH and parity into 24 bits, MSB first
    ///
    /// LENGTH is a 12-bit field: only `length & 0xfff` is packed. [`SignalField::new`]
    /// rejects anything longer, a hand-built field is truncated.
    pub fn pack(&self) -> [u8; SIGNAL_BYTES] {
        let length = self.length & 0x0fff;
        let mut s = [0u8; SIGNAL_BYTES];

        s[0] = self.rate.signal_code() << 4;
        if self.reserved {
            s[0] |= 0x08;
        }
        s[0] |= ((length & 0x001) << 2) as u8;
        s[0] |= (length & 0x002) as u8;
        s[0] |= ((length & 0x004) >> 2) as u8;

        // length bits 3..=10 fill the middle byte, bit 3 first
        for b in 0..8 {
            if length & (0x008 << b) != 0 {
                s[1] |= 0x80 >> b;
            }
        }

        if length & 0x800 != 0 {
            s[2] |= 0x80;
        }
        s[2] |= signal_parity(&s) << 6;
        s
    }

    /// Returns the decoded field and whether its parity bit checks
    ///
    /// An unknown RATE code is an error since no [`Rate`] can represent it.
    pub fn unpack(bytes: &[u8; SIGNAL_BYTES]) -> Result<(SignalField, bool)> {
        let rate = Rate::from_signal_code(bytes[0] >> 4)?;
        let reserved = bytes[0] & 0x08 != 0;

        let mut length = 0usize;
        if bytes[0] & 0x04 != 0 {
            length |= 0x001;
        }
        if bytes[0] & 0x02 != 0 {
            length |= 0x002;
        }
        if bytes[0] & 0x01 != 0 {
            length |= 0x004;
        }
        for b in 0..8 {
            if bytes[1] & (0x80 >> b) != 0 {
                length |= 0x008 << b;
            }
        }
        if bytes[2] & 0x80 != 0 {
            length |= 0x800;
        }

        let parity_ok = signal_parity(bytes) == (bytes[2] >> 6) & 1;
        Ok((SignalField { rate, reserved, length }, parity_ok))
    }

    /// Pack, encode and interleave into the 48 coded bits of the SIGNAL symbol
    pub fn encode(&self) -> Result<[u8; SIGNAL_ENCODED_BYTES]> {
        let encoded = fec_encode(&self.pack())?;
        let mut out = [0u8; SIGNAL_ENCODED_BYTES];
        InterleaverTable::for_rate(Rate::Mbps6).encode_symbol(&encoded, &mut out)?;
        Ok(out)
    }

    pub fn decode(interleaved: &[u8; SIGNAL_ENCODED_BYTES]) -> Result<(SignalField, bool)> {
        let mut encoded = [0u8; SIGNAL_ENCODED_BYTES];
        InterleaverTable::for_rate(Rate::Mbps6).decode_symbol(interleaved, &mut encoded)?;
        SignalField::unpack(&fec_decode(&encoded)?)
    }
}

// even parity over the first 17 bits
fn signal_parity(bytes: &[u8]) -> u8 {
    let ones = bytes[0].count_ones() + bytes[1].count_ones() + (bytes[2] & 0x80).count_ones();
    (ones & 1) as u8
}

pub fn fec_encode(bytes: &[u8; SIGNAL_BYTES]) -> Result<[u8; SIGNAL_ENCODED_BYTES]> {
    let encoded = fec::encode(FecScheme::Half, bytes, SIGNAL_DATA_BITS)?;
    let mut out = [0u8; SIGNAL_ENCODED_BYTES];
    out.copy_from_slice(&encoded);
    Ok(out)
}

/// Half-rate decode of the terminated SIGNAL block
pub fn fec_decode(encoded: &[u8; SIGNAL_ENCODED_BYTES]) -> Result<[u8; SIGNAL_BYTES]> {
    let decoded = fec::decode_terminated(FecScheme::Half, encoded, SIGNAL_DATA_BITS)?;
    let mut out = [0u8; SIGNAL_BYTES];
    out.copy_from_slice(&decoded);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_36mbps_length_100() {
        let field = SignalField::new(Rate::Mbps36, 100).unwrap();
        assert_eq!(field.pack(), [0xb1, 0x30, 0x00]);
    }

    #[test]
    fn test_pack_keeps_low_twelve_length_bits() {
        assert_eq!(SignalField::new(Rate::Mbps6, 5000), Err(WlanError::InvalidLength(5000)));

        let field = SignalField { rate: Rate::Mbps6, reserved: false, length: 5000 };
        let (unpacked, parity_ok) = SignalField::unpack(&field.pack()).unwrap();
        assert!(parity_ok);
        assert_eq!(unpacked.length, 5000 & 0x0fff);
        assert_eq!(unpacked.length, 904);
    }

    #[test]
    fn test_full_signal_chain() {
        let field = SignalField::new(Rate::Mbps36, 100).unwrap();
        assert_eq!(fec_encode(&field.pack()).unwrap(), [0xd1, 0xa1, 0x02, 0x3e, 0x70, 0x00]);
        assert_eq!(field.encode().unwrap(), [0x94, 0xd0, 0x14, 0x83, 0x24, 0x94]);
    }

    #[test]
    fn test_pack_unpack_all_rates_and_lengths() {
        for rate in Rate::ALL {
            for length in [0usize, 1, 2, 7, 100, 1500, 2048, 4095] {
                for reserved in [false, true] {
                    let field = SignalField { rate, reserved, length };
                    let bytes = field.pack();
                    assert_eq!(bytes[2] & 0x3f, 0, "tail must be zero");
                    let (decoded, parity_ok) = SignalField::unpack(&bytes).unwrap();
                    assert!(parity_ok);
                    assert_eq!(decoded, field);
                }
            }
        }
    }

    #[test]
    fn test_parity_mismatch_is_reported() {
        let mut bytes = SignalField::new(Rate::Mbps12, 300).unwrap().pack();
        bytes[1] ^= 0x04;
        let (_, parity_ok) = SignalField::unpack(&bytes).unwrap();
        assert!(!parity_ok);
    }

    #[test]
    fn test_unknown_rate_code_is_error() {
        assert_eq!(
            SignalField::unpack(&[0x01, 0x00, 0x00]),
            Err(WlanError::InvalidRateCode(0))
        );
        assert_eq!(
            SignalField::unpack(&[0xe0, 0x00, 0x00]),
            Err(WlanError::InvalidRateCode(0xe))
        );
    }

    #[test]
    fn test_length_out_of_range() {
        assert_eq!(SignalField::new(Rate::Mbps6, 4096), Err(WlanError::InvalidLength(4096)));
    }

    #[test]
    fn test_single_bit_error_corrected() {
        let field = SignalField::new(Rate::Mbps24, 1234).unwrap();
        let encoded = fec_encode(&field.pack()).unwrap();
        for bit in 0..48 {
            let mut corrupted = encoded;
            corrupted[bit / 8] ^= 0x80 >> (bit % 8);
            assert_eq!(fec_decode(&corrupted).unwrap(), field.pack(), "flipped bit {}", bit);
        }
    }

    #[test]
    fn test_encode_decode_through_interleaver() {
        let field = SignalField::new(Rate::Mbps9, 37).unwrap();
        let (decoded, parity_ok) = SignalField::decode(&field.encode().unwrap()).unwrap();
        assert!(parity_ok);
        assert_eq!(decoded, field);
    }
}
