use anyhow::Result;
use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    addr::FlatAddr,
    events::EventTable,
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

const CHAIN_END: u8 = 0xFF;
const CHAIN_STRIDE: u16 = 6;

/// Which palette and sprite assembly each graphics id switches to when a
/// boss door or teleporter swaps the object graphics mid-level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphicsAssociations {
    pub to_palette: HashMap<u8, u16>,
    pub to_assembly: HashMap<u8, u8>,
    pub num_gfx_ids: u32,
    pub boss_teleports: u32,
}

fn is_boss_teleport(variant: GameVariant, event_type: u8, event_id: u8) -> bool {
    match variant {
        GameVariant::X2 => event_type == 1 && event_id == 0x40,
        GameVariant::X3 => event_type == 0 && event_id == 0xD,
        _ => false,
    }
}

impl GraphicsAssociations {
    pub fn load(rom: &Rom, cart: &Cartridge, level: usize, events: &EventTable) -> Result<Self> {
        let mut assoc = GraphicsAssociations::default();
        let tables = cart.tables();
        let (Some(gfx_obj), Some(gfx_pal)) = (tables.gfx_obj, tables.gfx_pal) else {
            return Ok(assoc);
        };
        let gfx_obj = rom.flat(gfx_obj);
        let gfx_pal = rom.flat(gfx_pal);
        let level_offset = rom.read_u16(gfx_obj + level as u32 * 2)? as u32;

        // Chain 0 always loads; boss doors name two more chains in their sub id nibbles.
        let mut chains = vec![0u32];
        for event in events.iter() {
            if event.event_type == 2 && matches!(event.event_id, 0x15 | 0x18) {
                let nibbles = [event.sub_id as u32 & 0xF, event.sub_id as u32 >> 4];
                assoc.num_gfx_ids = nibbles.iter().map(|n| n + 1).fold(assoc.num_gfx_ids, u32::max);
                chains.extend(nibbles);
            } else if event.event_type == 3 {
                if let Some((index, assembly)) = sprite_entry(rom, cart, event.event_id)? {
                    assoc.to_assembly.entry(index).or_insert(assembly);
                }
            } else if is_boss_teleport(cart.variant, event.event_type, event.event_id) {
                assoc.boss_teleports += 1;
            }
        }
        chains.push(assoc.num_gfx_ids);
        if assoc.num_gfx_ids > 0 {
            chains.extend(0..=assoc.num_gfx_ids);
        }
        if assoc.boss_teleports > 0 {
            chains.extend(0..=assoc.boss_teleports);
        }

        for chain in chains.into_iter().unique() {
            let start = rom.read_u16(gfx_obj + (level_offset + chain * 2))?;
            assoc.walk_chain(rom, gfx_obj, gfx_pal, start)?;
        }
        debug!(
            "Graphics associations: {} palettes, {} assemblies, {} gfx ids, {} teleports",
            assoc.to_palette.len(),
            assoc.to_assembly.len(),
            assoc.num_gfx_ids,
            assoc.boss_teleports
        );
        Ok(assoc)
    }

    // Records are six bytes wide, led by a graphics id; 0xFF ends the chain.
    // The first palette seen for an id wins.
    fn walk_chain(&mut self, rom: &Rom, gfx_obj: FlatAddr, gfx_pal: FlatAddr, start: u16) -> Result<()> {
        let mut offset = start;
        loop {
            let gfx_id = rom.read_u8(gfx_obj + offset as u32)?;
            if gfx_id == CHAIN_END {
                return Ok(());
            }
            if !self.to_palette.contains_key(&gfx_id) {
                let palette = rom.read_u16(gfx_pal + offset as u32)?;
                self.to_palette.insert(gfx_id, palette);
            }
            let Some(next) = offset.checked_add(CHAIN_STRIDE) else {
                warn!("Graphics chain at {} runs past its bank", gfx_obj + start as u32);
                return Ok(());
            };
            offset = next;
        }
    }
}

/// Sprite index and assembly number of an enemy event id, from the enemy
/// sprite table.
pub fn sprite_entry(rom: &Rom, cart: &Cartridge, event_id: u8) -> Result<Option<(u8, u8)>> {
    let Some(table) = cart.tables().sprite_offset else {
        return Ok(None);
    };
    let Some(index) = (event_id as u32).checked_sub(1) else {
        return Ok(None);
    };
    let entry = rom.flat(table) + index * cart.variant.sprite_stride();
    Ok(Some((rom.read_u8(entry + 1u32)?, rom.read_u8(entry)?)))
}
