use crate::error::Result;
use crate::packet::FrameParams;
use crate::rate::Rate;
use std::fmt;

/// Transmit parameters for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxVector {
    /// Payload length in bytes (1..=4095)
    pub length: usize,
    /// Rate index (0..=7)
    pub rate: u8,
    /// SERVICE word; carried for the caller only, the DATA field always
    /// transmits zero SERVICE bits
    pub service: u16,
    pub tx_power_level: u8,
}

impl TxVector {
    pub fn new(rate: Rate, length: usize) -> Self {
        Self {
            length,
            rate: rate.index(),
            service: 0,
            tx_power_level: 0,
        }
    }

    /// Checks rate and length and derives the frame sizes
    pub fn validate(&self) -> Result<FrameParams> {
        let rate = Rate::from_index(self.rate)?;
        FrameParams::new(rate, self.length)
    }
}

/// Receive parameters reported with every frame attempt
///
/// Fields are filled as far as the SIGNAL field could be decoded: `rate` is
/// `None` when the RATE code was not recognised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxVector {
    pub length: usize,
    pub rate: Option<Rate>,
    /// Received power of the short training sequence in dB
    pub rssi: f32,
    pub service: u16,
}

impl Default for RxVector {
    fn default() -> Self {
        Self {
            length: 0,
            rate: None,
            rssi: 0.0,
            service: 0,
        }
    }
}

impl fmt::Display for RxVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rate {
            Some(rate) => write!(f, "{} bytes @ {}", self.length, rate)?,
            None => write!(f, "{} bytes @ unknown rate", self.length)?,
        }
        write!(f, ", rssi {:.1} dB, service 0x{:04x}", self.rssi, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WlanError;

    #[test]
    fn test_tx_vector_validation() {
        let tx = TxVector::new(Rate::Mbps48, 1500);
        let params = tx.validate().unwrap();
        assert_eq!(params.rate, Rate::Mbps48);
        assert_eq!(params.length, 1500);
    }

    #[test]
    fn test_tx_vector_rejects_bad_fields() {
        let mut tx = TxVector::new(Rate::Mbps6, 10);
        tx.rate = 8;
        assert_eq!(tx.validate(), Err(WlanError::InvalidRate(8)));

        let tx = TxVector { length: 0, ..TxVector::new(Rate::Mbps6, 10) };
        assert_eq!(tx.validate(), Err(WlanError::InvalidLength(0)));

        let tx = TxVector { length: 4096, ..TxVector::new(Rate::Mbps6, 10) };
        assert_eq!(tx.validate(), Err(WlanError::InvalidLength(4096)));
    }

    #[test]
    fn test_rx_vector_display() {
        let rx = RxVector {
            length: 100,
            rate: Some(Rate::Mbps36),
            rssi: -3.5,
            service: 0,
        };
        assert_eq!(rx.to_string(), "100 bytes @ 36 Mbps, rssi -3.5 dB, service 0x0000");
        assert!(RxVector::default().to_string().contains("unknown rate"));
    }
}
