use serde::Serialize;
use std::{
    fmt::Display,
    ops::{Add, AddAssign},
};

// From past experience, it's a very common mistake to mix up SNES addresses
// with flat addresses (byte index into the cartridge image). So we use type-safe
// wrappers to make these harder to mess up:
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlatAddr(pub u32);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BankedAddr(pub u32);

macro_rules! impl_add {
    ($target_type:ident, $other_type:ident) => {
        impl Add<$other_type> for $target_type {
            type Output = $target_type;

            fn add(self, other: $other_type) -> Self {
                $target_type(self.0.wrapping_add(other as u32))
            }
        }
    };
}

impl_add!(FlatAddr, u32);
impl_add!(FlatAddr, usize);
impl_add!(BankedAddr, u32);

macro_rules! impl_add_assign {
    ($target_type:ident, $other_type:ident) => {
        impl AddAssign<$other_type> for $target_type {
            fn add_assign(&mut self, other: $other_type) {
                self.0 = self.0.wrapping_add(other as u32);
            }
        }
    };
}

impl_add_assign!(FlatAddr, u32);
impl_add_assign!(FlatAddr, usize);
impl_add_assign!(BankedAddr, u32);

impl Display for FlatAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)?;
        Ok(())
    }
}

impl Display for BankedAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:06X}", self.0)?;
        Ok(())
    }
}

impl BankedAddr {
    pub fn from_bytes(bank: u8, high: u8, low: u8) -> Self {
        Self((bank as u32) << 16 | (high as u32) << 8 | low as u32)
    }

    pub fn from_bank_offset(bank: u8, offset: u16) -> Self {
        Self((bank as u32) << 16 | offset as u32)
    }

    pub fn bank(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn offset(self) -> u16 {
        self.0 as u16
    }
}

impl FlatAddr {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cartridge memory map, which decides how banked addresses land in the image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Mapping {
    LoRom,
    HiRom,
}

impl Mapping {
    pub fn snes2pc(self, addr: BankedAddr) -> FlatAddr {
        match self {
            Mapping::LoRom => FlatAddr((addr.0 & 0x7F0000) >> 1 | addr.0 & 0x7FFF),
            Mapping::HiRom => FlatAddr(addr.0 & 0x3FFFFF),
        }
    }

    pub fn pc2snes(self, addr: FlatAddr) -> BankedAddr {
        match self {
            Mapping::LoRom => {
                BankedAddr(0x808000 | (addr.0 & 0x3F8000) << 1 | addr.0 & 0x7FFF)
            }
            Mapping::HiRom => BankedAddr(0xC00000 | addr.0),
        }
    }
}

/// Anything the buffer accessor can resolve to a flat offset. Banked addresses
/// only convert through an explicit mapping, so a raw integer never sneaks in.
pub trait RomAddr: Copy + Display {
    fn to_flat(self, mapping: Mapping) -> FlatAddr;
}

impl RomAddr for FlatAddr {
    fn to_flat(self, _mapping: Mapping) -> FlatAddr {
        self
    }
}

impl RomAddr for BankedAddr {
    fn to_flat(self, mapping: Mapping) -> FlatAddr {
        mapping.snes2pc(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorom_translation() {
        assert_eq!(Mapping::LoRom.snes2pc(BankedAddr(0x868D24)), FlatAddr(0x30D24));
        assert_eq!(Mapping::LoRom.snes2pc(BankedAddr(0x808000)), FlatAddr(0));
        // Mirrors below $8000 and above bank $80 resolve to the same bytes.
        assert_eq!(
            Mapping::LoRom.snes2pc(BankedAddr(0x068D24)),
            Mapping::LoRom.snes2pc(BankedAddr(0x868D24))
        );
        assert_eq!(Mapping::LoRom.pc2snes(FlatAddr(0x30D24)), BankedAddr(0x868D24));
    }

    #[test]
    fn hirom_translation() {
        assert_eq!(Mapping::HiRom.snes2pc(BankedAddr(0xC50123)), FlatAddr(0x050123));
        assert_eq!(Mapping::HiRom.pc2snes(FlatAddr(0x050123)), BankedAddr(0xC50123));
    }

    #[test]
    fn lorom_inverse_over_rom_window() {
        for pc in (0..0x400000).step_by(0x1357) {
            let addr = FlatAddr(pc);
            assert_eq!(Mapping::LoRom.snes2pc(Mapping::LoRom.pc2snes(addr)), addr);
        }
    }

    #[test]
    fn bank_parts() {
        let addr = BankedAddr::from_bank_offset(0x86, 0xA780);
        assert_eq!(addr, BankedAddr::from_bytes(0x86, 0xA7, 0x80));
        assert_eq!(addr.bank(), 0x86);
        assert_eq!(addr.offset(), 0xA780);
        assert_eq!(format!("{}", addr), "$86A780");
        assert_eq!(format!("{}", FlatAddr(0x32780)), "0x32780");
    }
}
