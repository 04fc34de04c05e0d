use anyhow::Result;
use log::warn;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    gfx::convert_16_color,
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

pub const NUM_COLORS: usize = 0x100;
pub const NUM_SPRITE_PALETTES: usize = 0x200;
const SPRITE_PALETTES: FlatAddr = FlatAddr(0x2A000);

// Fixed palette sub-block indices loaded for every Rockman & Forte level;
// one more level-dependent index is appended.
const RNF_PALETTE_INDICES: [u32; 6] = [0x124, 0x0, 0x1E, 0x1B2, 0xA, 0x104];

pub type Palette = [u16; 16];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteSet {
    colors: Vec<u16>,
    // ROM location each 16-color line was last loaded from.
    offsets: [Option<FlatAddr>; 16],
    sprite_colors: Vec<u16>,
}

impl Default for PaletteSet {
    fn default() -> Self {
        PaletteSet {
            colors: vec![0; NUM_COLORS],
            offsets: [None; 16],
            sprite_colors: vec![0; NUM_SPRITE_PALETTES * 16],
        }
    }
}

fn read_color(rom: &Rom, addr: FlatAddr) -> Result<u16, RomError> {
    Ok(convert_16_color(rom.read_u16(addr)?))
}

impl PaletteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn palette(&self, index: usize) -> Palette {
        let mut out = [0; 16];
        let start = (index % 16) * 16;
        out.copy_from_slice(&self.colors[start..start + 16]);
        out
    }

    pub fn sprite_palette(&self, index: usize) -> Palette {
        let mut out = [0; 16];
        let start = (index % NUM_SPRITE_PALETTES) * 16;
        out.copy_from_slice(&self.sprite_colors[start..start + 16]);
        out
    }

    pub fn colors(&self) -> &[u16] {
        &self.colors
    }

    pub fn offset(&self, line: usize) -> Option<FlatAddr> {
        self.offsets.get(line).copied().flatten()
    }

    fn load_colors(&mut self, rom: &Rom, src: FlatAddr, dest: usize, count: usize) -> Result<()> {
        if dest + count > NUM_COLORS {
            return Err(RomError::PaletteOverflow { dest, count }.into());
        }
        for i in 0..count {
            self.colors[dest + i] = read_color(rom, src + (i * 2))?;
        }
        Ok(())
    }

    /// Level palette block: one config pointer per level on the X titles,
    /// a list of sub-blocks on Rockman & Forte.
    pub fn load_static(&mut self, rom: &Rom, cart: &Cartridge, level: usize) -> Result<()> {
        if cart.variant.is_x_series() {
            let table = cart.tables().palettes.ok_or(RomError::Unsupported("palette table"))?;
            let offset = rom.read_u16(table + (level as u32 * 2 + 0x60))?;
            let config = rom.flat(BankedAddr::from_bank_offset(0x86, offset));
            let count = rom.read_u8(config)? as usize;
            let pal_offset = rom.read_u16(config + 1u32)?;
            let src = rom.flat(BankedAddr::from_bank_offset(cart.variant.color_bank(), pal_offset));
            self.load_colors(rom, src, 0, count)?;
            for i in 0..count >> 4 {
                self.offsets[i] = Some(src + (i * 0x20));
            }
        } else {
            let extra = 2 * rom.read_u8(BankedAddr(0x80823D) + level as u32)? as u32;
            for index in RNF_PALETTE_INDICES.into_iter().chain([extra]) {
                let offset = rom.read_u16(BankedAddr(0x81928A) + index)?;
                let entry = BankedAddr::from_bank_offset(0x81, offset);
                let count = rom.read_u8(entry)? as usize;
                let pal_offset = rom.read_u16(entry + 1u32)?;
                let dest = rom.read_u8(entry + 3u32)? as usize;
                let src = rom.flat(BankedAddr::from_bank_offset(0xC5, pal_offset));
                if let Err(err) = self.load_colors(rom, src, dest, count) {
                    warn!("Skipping palette block {:#X}: {}", index, err);
                }
            }
        }
        Ok(())
    }

    pub fn load_sprites(&mut self, rom: &Rom) -> Result<()> {
        for (i, color) in self.sprite_colors.iter_mut().enumerate() {
            *color = read_color(rom, SPRITE_PALETTES + (i * 2))?;
        }
        Ok(())
    }

    /// Per-level palette overrides layered over the static block, applied for
    /// every selector up to and including `pal_select`.
    pub fn load_dynamic(
        &mut self,
        rom: &Rom,
        variant: GameVariant,
        level: usize,
        pal_select: u8,
    ) -> Result<()> {
        let Some(table) = variant.dynamic_palettes() else {
            return Ok(());
        };
        let bank = variant.color_bank();
        let level_base = rom.read_u16(table + (level as u32 & 0xFF) * 2)? as u32;
        for i in 0..=pal_select as u32 {
            let mut entry = rom.read_u16(table + (level_base + i * 2))? as u32;
            loop {
                let color_ptr = rom.read_u16(table + entry)?;
                if color_ptr == 0xFFFF {
                    break;
                }
                let dest = (rom.read_u16(table + (entry + 2))? & 0xFF) as usize;
                entry += 3;
                if dest > 0x7F {
                    warn!("Skipping dynamic palette write at color {:#X}", dest);
                    continue;
                }
                let src = rom.flat(BankedAddr::from_bank_offset(bank, color_ptr));
                self.offsets[dest >> 4] = Some(src);
                self.load_colors(rom, src, dest, 16)?;
            }
        }
        Ok(())
    }
}
