//! DATA field codec and the frame-length arithmetic shared by both ends
//!
//! Layout before scrambling: two SERVICE bytes, the payload with each byte
//! bit-reversed (so bit 0 goes out first), six tail bits, then pad bits up to
//! a whole number of OFDM symbols.

use crate::error::{Result, WlanError};
use crate::fec;
use crate::interleaver::InterleaverTable;
use crate::rate::{Rate, RateProfile};
use crate::scrambler::scramble_in_place;
use crate::{MAX_PAYLOAD_LEN, SERVICE_BITS, TAIL_BITS};

const SERVICE_BYTES: usize = SERVICE_BITS / 8;

/// Derived sizes of one frame's DATA field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    pub rate: Rate,
    /// Payload length in bytes
    pub length: usize,
    /// Number of DATA OFDM symbols
    pub nsym: usize,
    /// Data bits including SERVICE, tail and pad
    pub ndata: usize,
    /// Pad bits after the tail
    pub npad: usize,
    /// Decoded message buffer size in bytes
    pub dec_msg_len: usize,
    /// Encoded (interleaved) message size in bytes
    pub enc_msg_len: usize,
}

impl FrameParams {
    pub fn new(rate: Rate, length: usize) -> Result<Self> {
        if length == 0 || length > MAX_PAYLOAD_LEN {
            return Err(WlanError::InvalidLength(length));
        }

        let profile = rate.profile();
        let nbits = SERVICE_BITS + 8 * length + TAIL_BITS;
        let nsym = nbits.div_ceil(profile.ndbps);
        let ndata = nsym * profile.ndbps;

        Ok(Self {
            rate,
            length,
            nsym,
            ndata,
            npad: ndata - nbits,
            dec_msg_len: ndata.div_ceil(8),
            enc_msg_len: nsym * profile.ncbps / 8,
        })
    }

    pub fn profile(&self) -> &'static RateProfile {
        self.rate.profile()
    }

    /// Encoded bytes carried by each DATA symbol
    pub fn bytes_per_symbol(&self) -> usize {
        self.profile().ncbps / 8
    }
}

/// Recovered DATA field contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub payload: Vec<u8>,
    pub service: u16,
}

/// Scrambles, encodes and interleaves `payload` into `enc_msg_len` bytes
pub fn encode(params: &FrameParams, payload: &[u8], seed: u8) -> Result<Vec<u8>> {
    if payload.len() < params.length {
        return Err(WlanError::PayloadTooShort {
            expected: params.length,
            actual: payload.len(),
        });
    }

    let mut msg = vec![0u8; params.dec_msg_len];
    for (dst, &b) in msg[SERVICE_BYTES..].iter_mut().zip(&payload[..params.length]) {
        *dst = b.reverse_bits();
    }

    scramble_in_place(&mut msg, seed);

    // tail bits return the encoder to state 0
    msg[SERVICE_BYTES + params.length] &= 0xff >> TAIL_BITS;

    let encoded = fec::encode(params.profile().fec, &msg, params.ndata)?;
    InterleaverTable::for_rate(params.rate).encode(&encoded)
}

/// Inverse of [`encode`]
pub fn decode(params: &FrameParams, encoded: &[u8], seed: u8) -> Result<DecodedPacket> {
    if encoded.len() != params.enc_msg_len {
        return Err(WlanError::InvalidInputSize {
            expected: params.enc_msg_len,
            actual: encoded.len(),
        });
    }

    let deinterleaved = InterleaverTable::for_rate(params.rate).decode(encoded)?;
    let mut msg = fec::decode(params.profile().fec, &deinterleaved, params.ndata)?;
    scramble_in_place(&mut msg, seed);

    let service = u16::from_le_bytes([msg[0].reverse_bits(), msg[1].reverse_bits()]);
    let payload = msg[SERVICE_BYTES..SERVICE_BYTES + params.length]
        .iter()
        .map(|b| b.reverse_bits())
        .collect();

    Ok(DecodedPacket { payload, service })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SCRAMBLER_SEED;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_frame_params_36mbps_100_bytes() {
        let p = FrameParams::new(Rate::Mbps36, 100).unwrap();
        // 16 + 800 + 6 = 822 bits over 144-bit symbols
        assert_eq!(p.nsym, 6);
        assert_eq!(p.ndata, 864);
        assert_eq!(p.npad, 42);
        assert_eq!(p.dec_msg_len, 108);
        assert_eq!(p.enc_msg_len, 144);
        assert_eq!(p.bytes_per_symbol(), 24);
    }

    #[test]
    fn test_frame_params_9mbps_is_bit_exact() {
        // 16 + 8 + 6 = 30 bits fit one 36-bit symbol
        let p = FrameParams::new(Rate::Mbps9, 1).unwrap();
        assert_eq!(p.nsym, 1);
        assert_eq!(p.ndata, 36);
        assert_eq!(p.npad, 6);
        assert_eq!(p.dec_msg_len, 5);
        assert_eq!(p.enc_msg_len, 6);
    }

    #[test]
    fn test_frame_params_consistency() {
        for rate in Rate::ALL {
            for length in [1usize, 2, 17, 100, 1500, 4095] {
                let p = FrameParams::new(rate, length).unwrap();
                let profile = rate.profile();
                assert!(p.npad < profile.ndbps);
                assert_eq!(p.ndata, SERVICE_BITS + 8 * length + TAIL_BITS + p.npad);
                assert_eq!(p.enc_msg_len, p.nsym * p.bytes_per_symbol());
                assert_eq!(profile.fec.encoded_bits(p.ndata), p.enc_msg_len * 8);
            }
        }
    }

    #[test]
    fn test_invalid_lengths() {
        assert_eq!(FrameParams::new(Rate::Mbps6, 0), Err(WlanError::InvalidLength(0)));
        assert_eq!(FrameParams::new(Rate::Mbps6, 4096), Err(WlanError::InvalidLength(4096)));
        assert!(FrameParams::new(Rate::Mbps54, 4095).is_ok());
    }

    #[test]
    fn test_round_trip_all_rates() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for rate in Rate::ALL {
            for length in [1usize, 3, 100, 257] {
                let payload: Vec<u8> = (0..length).map(|_| rng.gen()).collect();
                let params = FrameParams::new(rate, length).unwrap();
                let encoded = encode(&params, &payload, DEFAULT_SCRAMBLER_SEED).unwrap();
                assert_eq!(encoded.len(), params.enc_msg_len);

                let decoded = decode(&params, &encoded, DEFAULT_SCRAMBLER_SEED).unwrap();
                assert_eq!(decoded.payload, payload, "{} length {}", rate, length);
                assert_eq!(decoded.service, 0);
            }
        }
    }

    #[test]
    fn test_extra_payload_bytes_ignored() {
        let params = FrameParams::new(Rate::Mbps12, 4).unwrap();
        let encoded = encode(&params, &[1, 2, 3, 4, 5, 6], DEFAULT_SCRAMBLER_SEED).unwrap();
        let decoded = decode(&params, &encoded, DEFAULT_SCRAMBLER_SEED).unwrap();
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_payload_rejected() {
        let params = FrameParams::new(Rate::Mbps6, 10).unwrap();
        assert_eq!(
            encode(&params, &[0u8; 9], DEFAULT_SCRAMBLER_SEED),
            Err(WlanError::PayloadTooShort { expected: 10, actual: 9 })
        );
        assert!(decode(&params, &[0u8; 5], DEFAULT_SCRAMBLER_SEED).is_err());
    }

    #[test]
    fn test_wrong_seed_corrupts_payload() {
        let payload = vec![0x42u8; 20];
        let params = FrameParams::new(Rate::Mbps24, payload.len()).unwrap();
        let encoded = encode(&params, &payload, DEFAULT_SCRAMBLER_SEED).unwrap();
        let decoded = decode(&params, &encoded, 0x11).unwrap();
        assert_ne!(decoded.payload, payload);
    }
}
