// Graphics codec. X1 packs graphics in 8-byte groups, each with a bitmask of
// literal bytes and a single fill byte for the rest. The later cartridges use
// LZSS with a 10-bit window offset and 6-bit lengths.

use crate::{error::RomError, variant::GameVariant};

const MAX_LENGTH: usize = 63;
const MIN_LENGTH: usize = 3;
const WINDOW_SIZE: usize = 1023;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Codec {
    Masked,
    Lzss,
}

impl Codec {
    pub fn for_variant(variant: GameVariant) -> Self {
        match variant {
            GameVariant::X1 => Codec::Masked,
            _ => Codec::Lzss,
        }
    }
}

/// Result of a decode. A stream that runs off the end of its source or its
/// destination stops early and reports what it managed to produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub requested: usize,
    pub produced: usize,
    pub consumed: usize,
}

impl Decoded {
    pub fn is_complete(&self) -> bool {
        self.produced >= self.requested
    }

    pub fn complete(self) -> Result<Self, RomError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(RomError::DecodeBudgetExceeded {
                requested: self.requested,
                produced: self.produced,
            })
        }
    }
}

pub fn decompress(src: &[u8], dest: &mut [u8], size: usize, codec: Codec) -> Decoded {
    let (produced, consumed) = match codec {
        Codec::Masked => decompress_masked(src, dest, size),
        Codec::Lzss => decompress_lzss(src, dest, size),
    };
    Decoded {
        requested: size,
        produced,
        consumed,
    }
}

// A short last group only fills up to `size`; the encoder pads it with fill
// bytes so no literals are left unread.
fn decompress_masked(src: &[u8], dest: &mut [u8], size: usize) -> (usize, usize) {
    let mut pos = 0;
    let mut written = 0;
    'groups: for _ in 0..size.div_ceil(8) {
        let (Some(&control), Some(&fill)) = (src.get(pos), src.get(pos + 1)) else {
            break;
        };
        pos += 2;
        let mut control = control;
        for _ in 0..8 {
            if written == size {
                break 'groups;
            }
            let value = if control & 0x80 != 0 {
                let Some(&b) = src.get(pos) else {
                    break 'groups;
                };
                pos += 1;
                b
            } else {
                fill
            };
            let Some(out) = dest.get_mut(written) else {
                break 'groups;
            };
            *out = value;
            written += 1;
            control <<= 1;
        }
    }
    (written, pos)
}

fn decompress_lzss(src: &[u8], dest: &mut [u8], size: usize) -> (usize, usize) {
    let mut pos = 0;
    let mut written = 0;
    let mut control = 0u8;
    let mut bits = 0;
    while written < size {
        if bits == 0 {
            let Some(&c) = src.get(pos) else {
                break;
            };
            control = c;
            pos += 1;
            bits = 8;
        }
        let is_match = control & 0x80 != 0;
        control <<= 1;
        bits -= 1;

        if is_match {
            let (Some(&hi), Some(&lo)) = (src.get(pos), src.get(pos + 1)) else {
                break;
            };
            pos += 2;
            let length = (hi >> 2) as usize;
            let offset = ((hi as usize & 3) << 8) | lo as usize;
            if offset == 0 || offset > written {
                // Reference before the start of output; the stream is corrupt.
                break;
            }
            for _ in 0..length {
                if written >= dest.len() {
                    return (written, pos);
                }
                dest[written] = dest[written - offset];
                written += 1;
            }
        } else {
            let Some(&b) = src.get(pos) else {
                break;
            };
            let Some(out) = dest.get_mut(written) else {
                break;
            };
            *out = b;
            pos += 1;
            written += 1;
        }
    }
    (written, pos)
}

pub fn compress(data: &[u8], codec: Codec) -> Vec<u8> {
    match codec {
        Codec::Masked => compress_masked(data),
        Codec::Lzss => compress_lzss(data),
    }
}

fn compress_masked(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 4);
    for group in data.chunks(8) {
        // Most frequent byte becomes the fill byte; ties go to whichever
        // reaches the top count first.
        let mut counts = [0u8; 0x100];
        let mut max_count = 0;
        let mut fill = 0;
        for &b in group {
            counts[b as usize] += 1;
            if counts[b as usize] > max_count {
                max_count = counts[b as usize];
                fill = b;
            }
        }

        let control_pos = out.len();
        out.extend([0xFF, fill]);
        let mut control = 0xFFu8;
        for j in 0..8 {
            match group.get(j) {
                Some(&b) if b != fill => out.push(b),
                _ => control ^= 0x80 >> j,
            }
        }
        out[control_pos] = control;
    }
    out
}

fn find_match(data: &[u8], pos: usize) -> (usize, usize) {
    let max_len = MAX_LENGTH.min(data.len() - pos);
    let window_start = pos.saturating_sub(WINDOW_SIZE);
    let mut best = (0, 0);
    for cand in (window_start..pos).rev() {
        let len = data[cand..]
            .iter()
            .zip(&data[pos..pos + max_len])
            .take_while(|(a, b)| a == b)
            .count();
        if len > best.0 {
            best = (len, pos - cand);
            if len == max_len {
                break;
            }
        }
    }
    best
}

fn compress_lzss(data: &[u8]) -> Vec<u8> {
    let mut out = vec![];
    let mut pos = 0;
    let mut control_pos = 0;
    let mut flag = 0u8;
    while pos < data.len() {
        if flag == 0 {
            control_pos = out.len();
            out.push(0);
            flag = 0x80;
        }
        let (length, offset) = find_match(data, pos);
        if length >= MIN_LENGTH {
            out[control_pos] |= flag;
            out.push((length << 2) as u8 | (offset >> 8) as u8);
            out.push(offset as u8);
            pos += length;
        } else {
            out.push(data[pos]);
            pos += 1;
        }
        flag >>= 1;
    }
    out
}

/// Expands one planar 4bpp tile (32 bytes) into 64 one-byte pixels.
pub fn tile_4bpp_to_raw(src: &[u8], dst: &mut [u8]) {
    for y in 0..8 {
        let (p0, p1) = (src[2 * y], src[2 * y + 1]);
        let (p2, p3) = (src[2 * y + 16], src[2 * y + 17]);
        for x in 0..8 {
            let s = 7 - x;
            dst[y * 8 + x] =
                (p0 >> s) & 1 | ((p1 >> s) & 1) << 1 | ((p2 >> s) & 1) << 2 | ((p3 >> s) & 1) << 3;
        }
    }
}

/// Expands one planar 2bpp tile (16 bytes) into 64 one-byte pixels.
pub fn tile_2bpp_to_raw(src: &[u8], dst: &mut [u8]) {
    for y in 0..8 {
        let (p0, p1) = (src[2 * y], src[2 * y + 1]);
        for x in 0..8 {
            let s = 7 - x;
            dst[y * 8 + x] = (p0 >> s) & 1 | ((p1 >> s) & 1) << 1;
        }
    }
}

/// Packs 64 one-byte pixels (low nibble used) back into a planar 4bpp tile.
pub fn raw_to_tile_4bpp(src: &[u8], dst: &mut [u8]) {
    dst[..32].fill(0);
    for y in 0..8 {
        for x in 0..8 {
            let px = src[y * 8 + x];
            let bit = 0x80 >> x;
            for (plane, offset) in [0, 1, 16, 17].into_iter().enumerate() {
                if px & (1 << plane) != 0 {
                    dst[2 * y + offset] |= bit;
                }
            }
        }
    }
}

/// Swaps the red and blue channels of a 15-bit BGR color.
pub fn convert_16_color(c: u16) -> u16 {
    (c & 0x1F) << 10 | c & 0x3E0 | (c >> 10) & 0x1F
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tiles() -> Vec<u8> {
        // Mix of flat runs, repeats, and noise, like real tile data.
        let mut data = vec![0u8; 0x40];
        data.extend((0..0x60u32).map(|i| (i * 37 % 11) as u8));
        data.extend([0xF0, 0x0F].repeat(0x30));
        data.extend((0..0x40u32).map(|i| (i * i + 7) as u8));
        data
    }

    #[test]
    fn codecs_round_trip_for_every_variant() {
        let data = sample_tiles();
        for variant in GameVariant::ALL {
            let codec = Codec::for_variant(variant);
            let packed = compress(&data, codec);
            let mut out = vec![0; data.len()];
            let decoded = decompress(&packed, &mut out, data.len(), codec);
            assert!(decoded.is_complete(), "{:?}", variant);
            assert_eq!(decoded.consumed, packed.len());
            assert_eq!(out, data, "{:?}", variant);
        }
    }

    #[test]
    fn masked_groups() {
        let src = [0b1010_0000, 0x11, 0xAA, 0xBB];
        let mut out = [0; 8];
        let decoded = decompress(&src, &mut out, 8, Codec::Masked);
        assert_eq!(out, [0xAA, 0x11, 0xBB, 0x11, 0x11, 0x11, 0x11, 0x11]);
        assert_eq!(decoded.consumed, 4);

        // The fill byte is the most common one; first to reach the top count wins ties.
        let packed = compress(&[1, 2, 2, 1, 3, 4, 5, 6], Codec::Masked);
        assert_eq!(packed, vec![0b1001_1111, 2, 1, 1, 3, 4, 5, 6]);
    }

    #[test]
    fn masked_short_last_group() {
        let data = [1, 2, 2, 1, 3, 4, 5, 6, 9, 7];
        let packed = compress(&data, Codec::Masked);
        assert_eq!(&packed[8..], &[0b0100_0000, 9, 7]);

        let mut out = [0; 10];
        let decoded = decompress(&packed, &mut out, data.len(), Codec::Masked);
        assert!(decoded.is_complete());
        assert_eq!(decoded.consumed, packed.len());
        assert_eq!(out, data);
    }

    #[test]
    fn lzss_overlapping_copy() {
        // Literal 0x55 then copy 5 bytes from offset 1.
        let src = [0b0100_0000, 0x55, 5 << 2, 0x01];
        let mut out = [0; 6];
        let decoded = decompress(&src, &mut out, 6, Codec::Lzss);
        assert_eq!(out, [0x55; 6]);
        assert_eq!(decoded.produced, 6);
    }

    #[test]
    fn lzss_window_limits() {
        let mut data: Vec<u8> = (0..1500u32).map(|i| (i * 7919 % 251) as u8).collect();
        data.extend_from_within(0..200);
        let packed = compress(&data, Codec::Lzss);
        let mut out = vec![0; data.len()];
        decompress(&packed, &mut out, data.len(), Codec::Lzss).complete().unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn truncated_streams_report_partial_size() {
        let mut out = [0; 16];
        let decoded = decompress(&[0xFF, 0x00, 1, 2], &mut out, 16, Codec::Masked);
        assert_eq!(decoded.produced, 2);
        assert_eq!(
            decoded.complete(),
            Err(RomError::DecodeBudgetExceeded { requested: 16, produced: 2 })
        );

        let mut small = [0; 4];
        let decoded = decompress(&[0x00, 1, 2, 3, 4, 5, 6, 7, 8], &mut small, 8, Codec::Lzss);
        assert_eq!(decoded.produced, 4);
        assert_eq!(small, [1, 2, 3, 4]);
    }

    #[test]
    fn planar_tiles() {
        let mut planar = [0u8; 32];
        planar[0] = 0x80; // plane 0, row 0, leftmost pixel
        planar[17] = 0x01; // plane 3, row 0, rightmost pixel
        planar[15] = 0xFF; // plane 1, row 7
        let mut raw = [0u8; 64];
        tile_4bpp_to_raw(&planar, &mut raw);
        assert_eq!(raw[0], 1);
        assert_eq!(raw[7], 8);
        assert!(raw[56..64].iter().all(|&p| p == 2));

        let mut back = [0u8; 32];
        raw_to_tile_4bpp(&raw, &mut back);
        assert_eq!(back, planar);

        let mut font = [0u8; 64];
        tile_2bpp_to_raw(&planar[..16], &mut font);
        assert_eq!(font[0], 1);
        assert_eq!(font[7], 0);
    }

    #[test]
    fn color_channels_swap() {
        assert_eq!(convert_16_color(0x001F), 0x7C00);
        assert_eq!(convert_16_color(0x7C00), 0x001F);
        assert_eq!(convert_16_color(0x03E0), 0x03E0);
    }
}
