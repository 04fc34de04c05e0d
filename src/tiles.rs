use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    gfx::{decompress, Codec},
    rom::Rom,
    variant::Cartridge,
    vram::{VramCache, NUM_TILES, TILE_SIZE, VRAM_SIZE},
};

// Incremental loads targeting this address stream from work RAM at runtime;
// there is nothing in ROM to copy.
const LIVE_RAM_SOURCE: u32 = 0x7F0000;
const MAX_INCREMENTS: u32 = 0x40;

/// Where a level's main compressed tile blob lives and where it lands in VRAM.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphicsConfig {
    pub gfx_id: u8,
    pub position: FlatAddr,
    pub dest: usize,
    pub size: usize,
    // Filled in by `decompress_into`.
    pub decoded_size: usize,
    pub stored_size: usize,
}

impl GraphicsConfig {
    pub fn load(rom: &Rom, cart: &Cartridge, level: usize) -> Result<Self> {
        let tables = cart.tables();
        let cfg_table = tables.gfx_config.ok_or(RomError::Unsupported("graphics config"))?;
        let pos_table = tables.gfx_pos.ok_or(RomError::Unsupported("graphics positions"))?;
        let (config, pos_field) = if cart.variant.is_x_series() {
            let offset = rom.read_u16(cfg_table + (level as u32 * 2 + 4))?;
            (BankedAddr::from_bank_offset(0x86, offset), 2)
        } else {
            let index = rom.read_u8(BankedAddr(0x80824A) + level as u32)?;
            let offset = rom.read_u16(BankedAddr((cfg_table.0 + index as u32) | 0x800000))?;
            (BankedAddr::from_bank_offset(0x80, offset), 0)
        };
        let gfx_id = rom.read_u8(config)?;
        let size = rom.read_u16(config + 1u32)? as usize;
        let dest = ((rom.read_u16(config + 3u32)? as usize) << 1).wrapping_sub(0x2000) & 0xFFFF;
        let position = BankedAddr(rom.read_u24(pos_table + (gfx_id as u32 * 5 + pos_field))?);
        Ok(GraphicsConfig {
            gfx_id,
            position: rom.flat(position),
            dest,
            size,
            decoded_size: 0,
            stored_size: 0,
        })
    }

    pub fn decompress_into(&mut self, rom: &Rom, cart: &Cartridge, vram: &mut VramCache) -> Result<()> {
        let decoded = decompress(
            rom.tail(self.position)?,
            vram.tail_mut(self.dest)?,
            self.size,
            Codec::for_variant(cart.variant),
        );
        if !decoded.is_complete() {
            warn!(
                "Tile blob {} decoded 0x{:X} of 0x{:X} bytes",
                self.position, decoded.produced, decoded.requested
            );
        }
        self.decoded_size = decoded.produced;
        self.stored_size = decoded.consumed;
        info!(
            "Decompressed tiles {:#X}: 0x{:X} bytes from {} into VRAM 0x{:X}",
            self.gfx_id, decoded.produced, self.position, self.dest
        );
        Ok(())
    }
}

/// Range of tile indices touched by a level's incremental tile loads.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TileDecBounds {
    pub start: usize,
    pub end: usize,
}

impl TileDecBounds {
    pub fn empty() -> Self {
        TileDecBounds {
            start: NUM_TILES,
            end: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

struct Increment {
    size: usize,
    dest: usize,
    source: u32,
}

fn read_increment(rom: &Rom, table: FlatAddr, level: usize, i: u32) -> Result<Increment> {
    let base = rom.read_u16(table + level as u32 * 2)? as u32 + i * 2;
    let entry = table + rom.read_u16(table + base)? as u32;
    Ok(Increment {
        size: rom.read_u16(entry)? as usize,
        dest: ((rom.read_u16(entry + 2u32)? as usize) << 1).wrapping_sub(0x2000) & 0xFFFF,
        source: rom.read_u32(entry + 4u32)? & 0xFFFFFF,
    })
}

/// Bounds over every incremental load of the level, whichever one is selected.
pub fn dynamic_tile_bounds(rom: &Rom, cart: &Cartridge, level: usize) -> Result<TileDecBounds> {
    let mut bounds = TileDecBounds::empty();
    let Some(table) = cart.variant.tile_increments() else {
        return Ok(bounds);
    };
    for i in 0..MAX_INCREMENTS {
        let inc = read_increment(rom, table, level, i)?;
        if inc.size == 0 {
            if i == 0 {
                continue;
            }
            break;
        }
        bounds.start = bounds.start.min(inc.dest / TILE_SIZE);
        bounds.end = bounds.end.max((inc.dest + inc.size) / TILE_SIZE);
    }
    Ok(bounds)
}

/// Copies uncompressed tile increments 0..=`tile_select` into VRAM.
pub fn load_dynamic_tiles(
    rom: &Rom,
    cart: &Cartridge,
    level: usize,
    tile_select: u8,
    vram: &mut VramCache,
) -> Result<()> {
    let Some(table) = cart.variant.tile_increments() else {
        return Ok(());
    };
    for i in 0..=tile_select as u32 {
        let inc = read_increment(rom, table, level, i)?;
        if inc.size == 0 {
            continue;
        }
        if inc.dest + inc.size > VRAM_SIZE {
            warn!(
                "Skipping tile increment {}: {}",
                i,
                RomError::VramOverflow {
                    dest: inc.dest,
                    size: inc.size
                }
            );
            continue;
        }
        if inc.source != LIVE_RAM_SOURCE {
            let src = rom.read_n(BankedAddr(inc.source), inc.size)?;
            vram.write(inc.dest, src)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRom;

    fn put_increment(t: &mut TestRom, entry: u32, size: u16, dest_word: u16, source: u32) {
        let table = FlatAddr(0x321D5);
        t.put_u16(table + entry, size);
        t.put_u16(table + (entry + 2), dest_word);
        t.put_u32(table + (entry + 4), source);
    }

    #[test]
    fn increments_copy_and_bound() {
        let mut t = TestRom::x1();
        let table = FlatAddr(0x321D5);
        t.put_u16(table, 0x10);
        // Increment 0 is empty, 1 copies from ROM, 2 streams from RAM, 3 ends.
        for (i, entry) in [0x30u32, 0x40, 0x50, 0x60].into_iter().enumerate() {
            t.put_u16(table + (0x10 + i as u32 * 2), entry as u16);
        }
        put_increment(&mut t, 0x30, 0, 0, 0);
        put_increment(&mut t, 0x40, 0x40, 0x1400, 0x8A8000);
        put_increment(&mut t, 0x50, 0x20, 0x1800, LIVE_RAM_SOURCE);
        put_increment(&mut t, 0x60, 0, 0, 0);
        t.put(BankedAddr(0x8A8000), &[0xAB; 0x40]);
        let (rom, cart) = t.build();

        let bounds = dynamic_tile_bounds(&rom, &cart, 0).unwrap();
        // 0x1400 -> VRAM 0x800 (tile 0x40); 0x1800 -> 0x1000 (tile 0x80).
        assert_eq!(bounds, TileDecBounds { start: 0x40, end: 0x81 });

        let mut vram = VramCache::new();
        load_dynamic_tiles(&rom, &cart, 0, 0, &mut vram).unwrap();
        assert!(vram.bytes().iter().all(|&b| b == 0));
        load_dynamic_tiles(&rom, &cart, 0, 2, &mut vram).unwrap();
        assert_eq!(&vram.bytes()[0x800..0x840], &[0xAB; 0x40]);
        assert!(vram.bytes()[0x1000..0x1020].iter().all(|&b| b == 0));
    }
}
