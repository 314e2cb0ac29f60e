//! MSB-first bit addressing over byte buffers

#[inline]
pub(crate) fn get_bit(data: &[u8], index: usize) -> u8 {
    (data[index / 8] >> (7 - index % 8)) & 1
}

#[inline]
pub(crate) fn set_bit(data: &mut [u8], index: usize) {
    data[index / 8] |= 0x80 >> (index % 8);
}

/// Reads `width` bits starting at `index` as an unsigned value, first bit most significant
pub(crate) fn read_bits(data: &[u8], index: usize, width: usize) -> u8 {
    (0..width).fold(0u8, |acc, i| (acc << 1) | get_bit(data, index + i))
}

/// Writes the low `width` bits of `value` starting at `index`, most significant first
pub(crate) fn write_bits(data: &mut [u8], index: usize, width: usize, value: u8) {
    for i in 0..width {
        if (value >> (width - 1 - i)) & 1 == 1 {
            set_bit(data, index + i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_bit_msb_first() {
        let mut buf = [0u8; 2];
        set_bit(&mut buf, 0);
        set_bit(&mut buf, 9);
        assert_eq!(buf, [0x80, 0x40]);
        assert_eq!(get_bit(&buf, 0), 1);
        assert_eq!(get_bit(&buf, 1), 0);
        assert_eq!(get_bit(&buf, 9), 1);
    }

    #[test]
    fn test_read_write_bits_across_byte_boundary() {
        let mut buf = [0u8; 2];
        write_bits(&mut buf, 6, 4, 0b1011);
        assert_eq!(buf, [0b0000_0010, 0b1100_0000]);
        assert_eq!(read_bits(&buf, 6, 4), 0b1011);
    }
}
