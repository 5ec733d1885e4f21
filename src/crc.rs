//! The two checksums the card protocol uses: CRC7 (x^7 + x^3 + 1) over
//! command frames, shifted left with the end bit set, and CRC16-CCITT
//! (x^16 + x^12 + x^5 + 1) over data blocks. The 16-bit trailer travels
//! big-endian on the wire regardless of host byte order.

pub fn crc7(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in bytes {
        let mut b = byte;
        for _ in 0..8 {
            crc <<= 1;
            if (b ^ crc) & 0x80 != 0 {
                crc ^= 0x09;
            }
            b <<= 1;
        }
    }
    (crc << 1) | 0x01
}

pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in bytes {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
