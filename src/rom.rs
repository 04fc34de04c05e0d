use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::{cmp::Ordering, io::Read, io::Write, ops::Range, path::Path};

use crate::{
    addr::{FlatAddr, Mapping, RomAddr},
    error::RomError,
};

/// Smallest buffer ever allocated. Several variant tables sit near the top of a
/// 6 MiB window, so smaller images are zero-padded up to this size.
pub const MIN_BUFFER_SIZE: usize = 0x600000;
pub const COPIER_HEADER_SIZE: usize = 0x200;
const MAX_IMAGE_SIZE: u64 = i32::MAX as u64;

const LOROM_HEADER: usize = 0x7FC0;
const HIROM_HEADER: usize = 0xFFC0;

/// Internal cartridge header, as found at $FFC0 of the first bank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnesHeader {
    pub title: [u8; 21],
    pub map_mode: u8,
    pub cart_type: u8,
    pub rom_size: u8,
    pub ram_size: u8,
    pub country: u8,
    pub license: u8,
    pub version: u8,
    pub checksum_complement: u16,
    pub checksum: u16,
}

impl SnesHeader {
    fn parse(window: &[u8], base: usize) -> Self {
        let b = &window[base..base + 0x20];
        let mut title = [0; 21];
        title.copy_from_slice(&b[..21]);
        SnesHeader {
            title,
            map_mode: b[0x15],
            cart_type: b[0x16],
            rom_size: b[0x17],
            ram_size: b[0x18],
            country: b[0x19],
            license: b[0x1A],
            version: b[0x1B],
            checksum_complement: u16::from_le_bytes([b[0x1C], b[0x1D]]),
            checksum: u16::from_le_bytes([b[0x1E], b[0x1F]]),
        }
    }

    fn checksum_valid(&self) -> bool {
        self.checksum as u32 + self.checksum_complement as u32 == 0xFFFF
    }

    fn detect(window: &[u8]) -> (Mapping, Self) {
        let lo = SnesHeader::parse(window, LOROM_HEADER);
        if lo.checksum_valid() {
            return (Mapping::LoRom, lo);
        }
        let hi = SnesHeader::parse(window, HIROM_HEADER);
        if hi.checksum_valid() {
            return (Mapping::HiRom, hi);
        }
        (Mapping::LoRom, lo)
    }

    pub fn title_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.title[offset], self.title[offset + 1]])
    }

    pub fn title_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.title[offset],
            self.title[offset + 1],
            self.title[offset + 2],
            self.title[offset + 3],
        ])
    }

    pub fn title_string(&self) -> String {
        self.title.iter().map(|&b| b as char).collect::<String>().trim_end().to_string()
    }
}

#[derive(Clone)]
pub struct Rom {
    data: Vec<u8>,
    size: usize,
    dummy_header: usize,
    mapping: Mapping,
    header: SnesHeader,
}

impl Rom {
    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self, RomError> {
        let size = data.len();
        if size == 0 {
            return Err(RomError::EmptyImage);
        }
        if size as u64 > MAX_IMAGE_SIZE {
            return Err(RomError::OversizeImage(size as u64));
        }
        let dummy_header = if size % 0x400 == COPIER_HEADER_SIZE {
            COPIER_HEADER_SIZE
        } else {
            0
        };
        data.resize(size.max(MIN_BUFFER_SIZE), 0);
        let (mapping, header) = SnesHeader::detect(&data[dummy_header..]);
        info!(
            "Loaded {} byte image ({:?}, copier header: {})",
            size,
            mapping,
            dummy_header != 0
        );
        Ok(Rom {
            data,
            size,
            dummy_header,
            mapping,
            header,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut data = vec![];
        reader
            .take(MAX_IMAGE_SIZE + 1)
            .read_to_end(&mut data)
            .context("Unable to read cartridge image")?;
        Ok(Rom::from_bytes(data)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let len = std::fs::metadata(path)
            .with_context(|| format!("Unable to load ROM at path {}", path.display()))?
            .len();
        if len > MAX_IMAGE_SIZE {
            return Err(RomError::OversizeImage(len).into());
        }
        let data = std::fs::read(path)
            .with_context(|| format!("Unable to load ROM at path {}", path.display()))?;
        Ok(Rom::from_bytes(data)?)
    }

    /// Writes the image back exactly as loaded (copier header included) with
    /// any edits applied.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.data[..self.size])?;
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Unable to save ROM at path {}", path.display()))?;
        self.write_to(std::io::BufWriter::new(file))
            .with_context(|| format!("Unable to save ROM at path {}", path.display()))?;
        Ok(())
    }

    /// Logical image size in bytes, as loaded.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dummy_header(&self) -> usize {
        self.dummy_header
    }

    /// Addressable bytes past the copier header.
    pub fn capacity(&self) -> usize {
        self.data.len() - self.dummy_header
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    pub fn header(&self) -> &SnesHeader {
        &self.header
    }

    pub fn flat<A: RomAddr>(&self, addr: A) -> FlatAddr {
        addr.to_flat(self.mapping)
    }

    fn range<A: RomAddr>(&self, what: &'static str, addr: A, len: usize) -> Result<Range<usize>, RomError> {
        let start = self.dummy_header + self.flat(addr).index();
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(RomError::OutOfRangeAddress {
                what,
                index: start - self.dummy_header,
                limit: self.capacity(),
            }),
        }
    }

    pub fn read_u8<A: RomAddr>(&self, addr: A) -> Result<u8, RomError> {
        let r = self.range("read_u8", addr, 1)?;
        Ok(self.data[r.start])
    }

    pub fn read_i8<A: RomAddr>(&self, addr: A) -> Result<i8, RomError> {
        Ok(self.read_u8(addr)? as i8)
    }

    pub fn read_u16<A: RomAddr>(&self, addr: A) -> Result<u16, RomError> {
        let r = self.range("read_u16", addr, 2)?;
        Ok(u16::from_le_bytes([self.data[r.start], self.data[r.start + 1]]))
    }

    pub fn read_i16<A: RomAddr>(&self, addr: A) -> Result<i16, RomError> {
        Ok(self.read_u16(addr)? as i16)
    }

    pub fn read_u24<A: RomAddr>(&self, addr: A) -> Result<u32, RomError> {
        let r = self.range("read_u24", addr, 3)?;
        let b = &self.data[r];
        Ok(b[0] as u32 | (b[1] as u32) << 8 | (b[2] as u32) << 16)
    }

    pub fn read_u32<A: RomAddr>(&self, addr: A) -> Result<u32, RomError> {
        let r = self.range("read_u32", addr, 4)?;
        let b = &self.data[r];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_n<A: RomAddr>(&self, addr: A, n: usize) -> Result<&[u8], RomError> {
        let r = self.range("read_n", addr, n)?;
        Ok(&self.data[r])
    }

    /// Everything from `addr` to the end of the buffer, for stream decoders
    /// whose input length isn't known up front.
    pub fn tail<A: RomAddr>(&self, addr: A) -> Result<&[u8], RomError> {
        let r = self.range("tail", addr, 0)?;
        Ok(&self.data[r.start..])
    }

    pub fn read_ascii<A: RomAddr>(&self, addr: A, len: usize) -> Result<String, RomError> {
        Ok(self.read_n(addr, len)?.iter().map(|&b| b as char).collect())
    }

    pub fn write_u8<A: RomAddr>(&mut self, addr: A, x: u8) -> Result<(), RomError> {
        let r = self.range("write_u8", addr, 1)?;
        self.data[r.start] = x;
        Ok(())
    }

    pub fn write_u16<A: RomAddr>(&mut self, addr: A, x: u16) -> Result<(), RomError> {
        let r = self.range("write_u16", addr, 2)?;
        self.data[r].copy_from_slice(&x.to_le_bytes());
        Ok(())
    }

    pub fn write_i16<A: RomAddr>(&mut self, addr: A, x: i16) -> Result<(), RomError> {
        self.write_u16(addr, x as u16)
    }

    pub fn write_u24<A: RomAddr>(&mut self, addr: A, x: u32) -> Result<(), RomError> {
        let r = self.range("write_u24", addr, 3)?;
        self.data[r].copy_from_slice(&x.to_le_bytes()[..3]);
        Ok(())
    }

    pub fn write_u32<A: RomAddr>(&mut self, addr: A, x: u32) -> Result<(), RomError> {
        let r = self.range("write_u32", addr, 4)?;
        self.data[r].copy_from_slice(&x.to_le_bytes());
        Ok(())
    }

    pub fn write_n<A: RomAddr>(&mut self, addr: A, x: &[u8]) -> Result<(), RomError> {
        let r = self.range("write_n", addr, x.len())?;
        self.data[r].copy_from_slice(x);
        Ok(())
    }

    pub fn write_ascii<A: RomAddr>(&mut self, addr: A, s: &str) -> Result<(), RomError> {
        self.write_n(addr, s.as_bytes())
    }

    pub fn copy<A: RomAddr, B: RomAddr>(&mut self, src: A, dst: B, len: usize) -> Result<(), RomError> {
        let s = self.range("copy source", src, len)?;
        let d = self.range("copy destination", dst, len)?;
        self.data.copy_within(s, d.start);
        Ok(())
    }

    pub fn fill<A: RomAddr>(&mut self, addr: A, value: u8, len: usize) -> Result<(), RomError> {
        let r = self.range("fill", addr, len)?;
        self.data[r].fill(value);
        Ok(())
    }

    pub fn compare<A: RomAddr, B: RomAddr>(&self, left: A, right: B, len: usize) -> Result<Ordering, RomError> {
        let l = self.range("compare", left, len)?;
        let r = self.range("compare", right, len)?;
        Ok(self.data[l].cmp(&self.data[r]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::BankedAddr;

    fn blank(size: usize) -> Rom {
        Rom::from_bytes(vec![0; size]).unwrap()
    }

    #[test]
    fn empty_and_small_images() {
        assert_eq!(Rom::from_bytes(vec![]).err(), Some(RomError::EmptyImage));
        let rom = blank(0x1000);
        assert_eq!(rom.size(), 0x1000);
        assert_eq!(rom.capacity(), MIN_BUFFER_SIZE);
    }

    #[test]
    fn copier_header_offsets_reads() {
        let mut data = vec![0; 0x8000 + COPIER_HEADER_SIZE];
        data[COPIER_HEADER_SIZE] = 0x5A;
        data[COPIER_HEADER_SIZE + 1] = 0x12;
        let rom = Rom::from_bytes(data).unwrap();
        assert_eq!(rom.dummy_header(), COPIER_HEADER_SIZE);
        assert_eq!(rom.read_u16(FlatAddr(0)).unwrap(), 0x125A);
        assert_eq!(rom.read_u8(BankedAddr(0x808000)).unwrap(), 0x5A);
    }

    #[test]
    fn typed_reads_and_writes() {
        let mut rom = blank(0x10000);
        rom.write_u32(FlatAddr(0x10), 0xFEDCBA98).unwrap();
        assert_eq!(rom.read_u8(FlatAddr(0x10)).unwrap(), 0x98);
        assert_eq!(rom.read_i8(FlatAddr(0x13)).unwrap(), -2);
        assert_eq!(rom.read_u16(FlatAddr(0x11)).unwrap(), 0xDCBA);
        assert_eq!(rom.read_i16(FlatAddr(0x12)).unwrap(), -292);
        assert_eq!(rom.read_u24(FlatAddr(0x10)).unwrap(), 0xDCBA98);
        rom.write_ascii(FlatAddr(0x20), "EXPANDED").unwrap();
        assert_eq!(rom.read_ascii(FlatAddr(0x20), 8).unwrap(), "EXPANDED");
    }

    #[test]
    fn out_of_range_fails_loudly() {
        let mut rom = blank(0x100);
        let end = FlatAddr(rom.capacity() as u32);
        assert!(matches!(
            rom.read_u8(end),
            Err(RomError::OutOfRangeAddress { what: "read_u8", .. })
        ));
        assert!(rom.read_u16(FlatAddr(end.0 - 1)).is_err());
        assert!(rom.write_u16(FlatAddr(end.0 - 1), 0).is_err());
        assert!(rom.read_n(FlatAddr(u32::MAX), 4).is_err());
    }

    #[test]
    fn copy_fill_compare() {
        let mut rom = blank(0x100);
        rom.fill(FlatAddr(0), 0xAA, 4).unwrap();
        rom.copy(FlatAddr(0), FlatAddr(2), 4).unwrap();
        assert_eq!(rom.read_n(FlatAddr(0), 6).unwrap(), &[0xAA; 6]);
        assert_eq!(rom.compare(FlatAddr(0), FlatAddr(2), 4).unwrap(), Ordering::Equal);
        rom.write_u8(FlatAddr(3), 0xAB).unwrap();
        assert_eq!(rom.compare(FlatAddr(0), FlatAddr(2), 4).unwrap(), Ordering::Greater);
        assert_eq!(rom.compare(FlatAddr(2), FlatAddr(0), 4).unwrap(), Ordering::Less);
    }

    #[test]
    fn save_reproduces_image() {
        let mut data = vec![0x11; 0x8000 + COPIER_HEADER_SIZE];
        data[0] = 0x99;
        let mut rom = Rom::from_bytes(data.clone()).unwrap();
        rom.write_u8(FlatAddr(0), 0x42).unwrap();
        data[COPIER_HEADER_SIZE] = 0x42;
        let mut out = vec![];
        rom.write_to(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn hirom_detected_from_checksum() {
        let mut data = vec![0; 0x20000];
        data[HIROM_HEADER + 0x1C..HIROM_HEADER + 0x20].copy_from_slice(&[0x34, 0x12, 0xCB, 0xED]);
        let rom = Rom::from_bytes(data).unwrap();
        assert_eq!(rom.mapping(), Mapping::HiRom);
        assert_eq!(rom.header().checksum, 0xEDCB);
    }
}
