use anyhow::Result;
use log::warn;
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    gfx::{decompress, Codec},
    rom::Rom,
    variant::{Cartridge, GameVariant},
    vram::NUM_TILES,
};

pub const SCENE_LAYOUT_SIZE: usize = 0x400;
pub const MAPPING_SIZE: usize = 0x10000;
pub const MAPS_PER_SCENE: usize = 0x100;
const MAX_TABLE_ENTRIES: usize = 0x400;

/// Flat locations of a level's layout tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelPointers {
    pub layout: FlatAddr,
    pub scenes: FlatAddr,
    pub blocks: Option<FlatAddr>,
    pub maps: Option<FlatAddr>,
    pub collisions: Option<FlatAddr>,
}

fn long_entry(rom: &Rom, table: Option<BankedAddr>, index: u32) -> Result<Option<FlatAddr>> {
    match table {
        Some(t) => Ok(Some(rom.flat(BankedAddr(rom.read_u24(t + index)?)))),
        None => Ok(None),
    }
}

impl LevelPointers {
    pub fn resolve(rom: &Rom, cart: &Cartridge, level: usize) -> Result<Self> {
        let tables = cart.tables();
        let p_level = level as u32 * 3;
        let layout_table = tables.layout.ok_or(RomError::Unsupported("layout table"))?;
        let scene_table = tables.scenes.ok_or(RomError::Unsupported("scene table"))?;
        let (layout, scenes) = if cart.variant.is_x_series() {
            (
                rom.flat(BankedAddr(rom.read_u24(layout_table + p_level)?)),
                rom.flat(BankedAddr(rom.read_u24(scene_table + p_level)?)),
            )
        } else {
            let offset = rom.read_u16(layout_table + level as u32 * 2)?;
            (
                rom.flat(BankedAddr::from_bank_offset(0xC5, offset)),
                rom.flat(BankedAddr(rom.read_u24(scene_table + level as u32)?)),
            )
        };
        Ok(LevelPointers {
            layout,
            scenes,
            blocks: long_entry(rom, tables.blocks, p_level)?,
            maps: long_entry(rom, tables.maps, p_level)?,
            collisions: long_entry(rom, tables.collisions, p_level)?,
        })
    }

    /// Background layer: own layout, scenes and blocks, sharing the level's
    /// maps and collisions.
    pub fn resolve_background(rom: &Rom, cart: &Cartridge, level: usize) -> Result<Self> {
        let tables = cart.tables();
        let p_level = level as u32 * 3;
        let foreground = LevelPointers::resolve(rom, cart, level)?;
        let layout = long_entry(rom, tables.bg_layout, p_level)?;
        let scenes = long_entry(rom, tables.bg_scenes, p_level)?;
        let (Some(layout), Some(scenes)) = (layout, scenes) else {
            return Err(RomError::Unsupported("background layer").into());
        };
        Ok(LevelPointers {
            layout,
            scenes,
            blocks: long_entry(rom, tables.bg_blocks, p_level)?,
            ..foreground
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub tiles: usize,
    pub blocks: usize,
    pub maps: usize,
}

/// Levels whose tile set is shared with another level can't be reordered
/// without rewriting both levels' maps.
pub fn shares_tile_set(variant: GameVariant, level: usize) -> bool {
    variant == GameVariant::X2 && (level == 10 || level == 11)
}

/// There are no stored counts for tiles, blocks and maps; they're inferred
/// from the distance to the next level's tables, which assumes levels are
/// stored back to back. Returns the counts and whether tile sorting is safe.
pub fn estimate_counts(
    rom: &Rom,
    cart: &Cartridge,
    level: usize,
    pointers: &LevelPointers,
    tile_cmp_size: usize,
) -> Result<(TableCounts, bool)> {
    let mut sort_ok = !shares_tile_set(cart.variant, level);
    if level + 1 >= cart.num_levels() {
        let counts = TableCounts {
            tiles: NUM_TILES,
            blocks: 0x40,
            maps: MAX_TABLE_ENTRIES,
        };
        return Ok((counts, false));
    }

    let tables = cart.tables();
    let next = (level as u32 + 1) * 3;
    let distance = |table, current: Option<FlatAddr>| -> Result<Option<usize>> {
        let next = long_entry(rom, table, next)?;
        Ok(match (next, current) {
            (Some(n), Some(c)) => n.0.checked_sub(c.0).map(|d| d as usize / 8),
            _ => Some(0),
        })
    };
    let tiles = (0x200 + tile_cmp_size) / 0x20;
    let blocks = distance(tables.blocks, pointers.blocks)?;
    let maps = distance(tables.maps, pointers.maps)?;
    let counts = match (blocks, maps) {
        (Some(blocks), Some(maps))
            if tiles <= MAX_TABLE_ENTRIES && blocks <= MAX_TABLE_ENTRIES && maps <= MAX_TABLE_ENTRIES =>
        {
            TableCounts { tiles, blocks, maps }
        }
        _ => {
            sort_ok = false;
            TableCounts {
                tiles: MAX_TABLE_ENTRIES,
                blocks: MAX_TABLE_ENTRIES,
                maps: MAX_TABLE_ENTRIES,
            }
        }
    };
    Ok((counts, sort_ok))
}

/// Scene grid of a level layer and its expansion into 16x16 maps per scene.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerLayout {
    pub width: u8,
    pub height: u8,
    pub scene_used: usize,
    pub scenes: Vec<u8>,
    pub mapping: Vec<u16>,
}

impl LayerLayout {
    pub fn decode(rom: &Rom, cart: &Cartridge, pointers: &LevelPointers) -> Result<Self> {
        let mut p = pointers.layout;
        let width = rom.read_u8(p)?;
        let height = rom.read_u8(p + 1u32)?;
        p += 2u32;
        let mut scenes = vec![0u8; SCENE_LAYOUT_SIZE];
        let mut scene_used = 0;

        if cart.variant.is_x_series() {
            scene_used = rom.read_u8(p)? as usize;
            p += 1u32;
            let mut write = 0;
            loop {
                let ctrl = rom.read_u8(p)?;
                if ctrl == 0xFF {
                    break;
                }
                let mut scene = rom.read_u8(p + 1u32)?;
                p += 2u32;
                for _ in 0..ctrl & 0x7F {
                    if write >= SCENE_LAYOUT_SIZE {
                        warn!("Scene layout at {} overflows {} entries", pointers.layout, SCENE_LAYOUT_SIZE);
                        break;
                    }
                    scenes[write] = scene;
                    write += 1;
                    if ctrl & 0x80 == 0 {
                        scene = scene.wrapping_add(1);
                    }
                }
            }
        } else {
            let count = (width as usize * height as usize).min(SCENE_LAYOUT_SIZE);
            scenes[..count].copy_from_slice(rom.read_n(p, count)?);
            scene_used = scenes[..count].iter().map(|&s| s as usize + 1).max().unwrap_or(0);
        }

        Ok(LayerLayout {
            width,
            height,
            scene_used,
            scenes,
            mapping: vec![0; MAPPING_SIZE],
        })
    }

    /// Expands every used scene into its 16x16 grid of map indices.
    pub fn expand(&mut self, rom: &Rom, cart: &Cartridge, level: usize, pointers: &LevelPointers) -> Result<()> {
        self.mapping.fill(0);
        if cart.variant.is_x_series() {
            let blocks = pointers.blocks.ok_or(RomError::Unsupported("block table"))?;
            let mut write = 0usize;
            for i in 0..self.scene_used as u32 {
                for y in 0..8u32 {
                    for x in 0..8u32 {
                        let block_id = rom.read_u16(pointers.scenes + (i * 0x80 + x * 2 + y * 0x10))?;
                        let block = blocks + block_id as u32 * 8;
                        self.mapping[write] = rom.read_u16(block)?;
                        self.mapping[write + 0x01] = rom.read_u16(block + 2u32)?;
                        self.mapping[write + 0x10] = rom.read_u16(block + 4u32)?;
                        self.mapping[write + 0x11] = rom.read_u16(block + 6u32)?;
                        write += 2;
                    }
                    write += 0x10;
                }
            }
        } else {
            self.expand_compressed(rom, cart, level)?;
        }
        Ok(())
    }

    // Rockman & Forte stores each level's scenes as one compressed map blob.
    fn expand_compressed(&mut self, rom: &Rom, cart: &Cartridge, level: usize) -> Result<()> {
        let tables = cart.tables();
        let scene_table = tables.scenes.ok_or(RomError::Unsupported("scene table"))?;
        let pos_table = tables.gfx_pos.ok_or(RomError::Unsupported("graphics positions"))?;
        let idx = rom.read_u8(scene_table + level as u32)?;
        let offset = rom.read_u16(BankedAddr(0x808158) + idx as u32)?;
        let config = BankedAddr::from_bank_offset(0x80, offset);
        let gfx_id = rom.read_u8(config)?;
        let size = rom.read_u16(config + 1u32)? as usize;
        let pos = BankedAddr(rom.read_u24(pos_table + gfx_id as u32 * 5)?);

        let mut map_ram = vec![0u8; 0x10000];
        let decoded = decompress(rom.tail(pos)?, &mut map_ram[0x200..], size, Codec::for_variant(cart.variant));
        if !decoded.is_complete() {
            warn!("Scene blob {} decoded 0x{:X} of 0x{:X} bytes", pos, decoded.produced, size);
        }

        let mut write = 0;
        'scenes: for i in 0..self.scene_used {
            for y in 0..16 {
                for x in 0..16 {
                    let take = i * 0x200 + x * 2 + y * 0x20;
                    if take + 2 > map_ram.len() {
                        warn!("Scene {} lies outside the decoded map blob", i);
                        break 'scenes;
                    }
                    self.mapping[write] = u16::from_le_bytes([map_ram[take], map_ram[take + 1]]);
                    write += 1;
                }
            }
        }
        Ok(())
    }

    pub fn scene_at(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width as usize || y >= self.height as usize {
            return None;
        }
        self.scenes.get(y * self.width as usize + x).copied()
    }

    /// Map index at a map coordinate (16 maps per scene in each direction).
    pub fn map_at(&self, x: usize, y: usize) -> Option<u16> {
        let scene = self.scene_at(x / 16, y / 16)? as usize;
        self.mapping.get(scene * MAPS_PER_SCENE + (y % 16) * 16 + x % 16).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TestRom};

    #[test]
    fn layout_runs() {
        let mut t = TestRom::x1();
        t.put_u24(BankedAddr(0x868D24), 0x898000);
        // 3x2 scenes; run of 3 counting up from 4, run of 3 repeating 9.
        t.put(BankedAddr(0x898000), &[3, 2, 10, 0x03, 4, 0x83, 9, 0xFF]);
        let (rom, cart) = t.build();
        let pointers = LevelPointers::resolve(&rom, &cart, 0).unwrap();
        let layout = LayerLayout::decode(&rom, &cart, &pointers).unwrap();
        assert_eq!((layout.width, layout.height, layout.scene_used), (3, 2, 10));
        assert_eq!(&layout.scenes[..7], &[4, 5, 6, 9, 9, 9, 0]);
        assert_eq!(layout.scene_at(2, 1), Some(9));
        assert_eq!(layout.scene_at(3, 0), None);
    }

    #[test]
    fn layout_overflow_is_truncated() {
        let mut t = TestRom::x1();
        t.put_u24(BankedAddr(0x868D24), 0x898000);
        // Ten repeated runs of 126 scenes overrun the 0x400-entry grid.
        let mut stream = vec![0x20, 0x20, 1];
        for _ in 0..10 {
            stream.extend([0xFE, 1]);
        }
        stream.push(0xFF);
        t.put(BankedAddr(0x898000), &stream);
        let (rom, cart) = t.build();
        let pointers = LevelPointers::resolve(&rom, &cart, 0).unwrap();
        let layout = LayerLayout::decode(&rom, &cart, &pointers).unwrap();
        assert_eq!(layout.scenes.len(), SCENE_LAYOUT_SIZE);
        assert!(layout.scenes.iter().all(|&s| s == 1));
    }

    #[test]
    fn fixture_level_expands_scenes() {
        let (rom, cart) = testing::x1_level().build();
        let pointers = LevelPointers::resolve(&rom, &cart, 0).unwrap();
        let mut layout = LayerLayout::decode(&rom, &cart, &pointers).unwrap();
        layout.expand(&rom, &cart, 0, &pointers).unwrap();
        // Scene 0 block (0,0) is block 1: maps 0, 1, 2, 3 in a 2x2 square.
        assert_eq!(&layout.mapping[0..2], &[0, 1]);
        assert_eq!(&layout.mapping[0x10..0x12], &[2, 3]);
        assert_eq!(layout.map_at(1, 1), Some(3));
        assert_eq!(layout.map_at(16, 0), Some(layout.mapping[0x100]));
    }

    #[test]
    fn counts_from_neighbor_tables() {
        let (rom, cart) = testing::x1_level().build();
        let pointers = LevelPointers::resolve(&rom, &cart, 0).unwrap();
        let (counts, sort_ok) = estimate_counts(&rom, &cart, 0, &pointers, 0x200).unwrap();
        assert_eq!(counts.tiles, 0x20);
        assert_eq!(counts.blocks, testing::FIXTURE_BLOCKS);
        assert_eq!(counts.maps, testing::FIXTURE_MAPS);
        assert!(sort_ok);

        let (counts, sort_ok) = estimate_counts(&rom, &cart, 12, &pointers, 0x200).unwrap();
        assert_eq!(counts.blocks, 0x40);
        assert!(!sort_ok);
    }

    #[test]
    fn shared_tile_sets() {
        assert!(shares_tile_set(GameVariant::X2, 10));
        assert!(shares_tile_set(GameVariant::X2, 11));
        assert!(!shares_tile_set(GameVariant::X2, 9));
        assert!(!shares_tile_set(GameVariant::X1, 10));
    }
}
