use anyhow::Result;
use hashbrown::HashSet;
use log::debug;
use serde::Serialize;
use std::collections::VecDeque;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    rom::Rom,
    variant::Cartridge,
};

pub const NUM_EVENT_BLOCKS: usize = 0x100;

// Rockman & Forte: per-level table redirecting segment-change targets.
const SEGMENT_REDIRECTS: BankedAddr = BankedAddr(0xC14A3E);

/// A scripted spawn record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventInfo {
    // Upper six bits of the type byte on the X titles.
    pub level_match: u8,
    pub event_type: u8,
    pub event_id: u8,
    pub sub_id: u8,
    pub flags: u8,
    pub x: i16,
    pub y: i16,
}

impl EventInfo {
    /// Checkpoint trigger; its low sub id nibble is the checkpoint index.
    pub fn checkpoint_index(&self) -> Option<usize> {
        (self.event_type == 2 && matches!(self.event_id, 0x2 | 0xB)).then_some((self.sub_id & 0xF) as usize)
    }

    pub fn is_segment_change(&self) -> bool {
        self.event_type == 4 && matches!(self.event_id, 0x0 | 0x1 | 0x6 | 0xE)
    }
}

/// Events bucketed by block (X titles) or by x-position segment (Rockman & Forte).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventTable {
    blocks: Vec<Vec<EventInfo>>,
}

impl Default for EventTable {
    fn default() -> Self {
        EventTable {
            blocks: vec![vec![]; NUM_EVENT_BLOCKS],
        }
    }
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, block_id: u8) -> &[EventInfo] {
        &self.blocks[block_id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventInfo> {
        self.blocks.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&mut self, block_id: usize, event: EventInfo) {
        self.blocks[block_id].push(event);
    }
}

pub fn load_events(rom: &Rom, cart: &Cartridge, level: usize) -> Result<EventTable> {
    let table = if cart.variant.is_x_series() {
        load_linked_events(rom, cart, level)?
    } else {
        let (table, visited) = load_segment_events(rom, cart, level)?;
        debug!("Visited event segments {:?}", visited);
        table
    };
    debug!("Loaded {} events for level {}", table.len(), level);
    Ok(table)
}

// Block stream: a block id byte, then 7-byte records until one carries the
// end-of-block flag, then the next block id. A repeated id ends the stream,
// and a leading 0xFF marks a level without events.
//
//   type(6b match, 2b type) ypos(16) id sub_id xpos(3b flags, 13b position)
fn load_linked_events(rom: &Rom, cart: &Cartridge, level: usize) -> Result<EventTable> {
    let mut table = EventTable::new();
    let events = cart.tables().events.ok_or(RomError::Unsupported("event table"))?;
    let list = if cart.expansion.is_some() {
        BankedAddr::from_bank_offset(cart.event_bank, 0xFFE0)
    } else {
        events
    };
    let offset = rom.read_u16(list + level as u32 * 2)?;
    let mut p = rom.flat(BankedAddr::from_bank_offset(cart.event_bank, offset));

    let mut block_id = 0xFF;
    let mut next_block_id = rom.read_u8(p)?;
    p += 1u32;
    while block_id != next_block_id {
        block_id = next_block_id;
        loop {
            let type_byte = rom.read_u8(p)?;
            let xpos = rom.read_u16(p + 5u32)?;
            let event = EventInfo {
                level_match: type_byte >> 2,
                event_type: type_byte & 3,
                y: rom.read_i16(p + 1u32)?,
                event_id: rom.read_u8(p + 3u32)?,
                sub_id: rom.read_u8(p + 4u32)?,
                flags: (xpos >> 13) as u8,
                x: (xpos & 0x1FFF) as i16,
            };
            p += 7u32;
            table.push(next_block_id as usize, event);
            if event.flags & 4 != 0 {
                break;
            }
        }
        next_block_id = rom.read_u8(p)?;
        p += 1u32;
    }
    Ok(table)
}

// Segment lists: a count byte, then 7-byte records
//
//   type id sub_id xpos(16) ypos(16)
//
// Segment-change records name further segments to visit. Each segment is
// visited at most once, so the walk ends after at most 256 segments. Returns
// the segment indices in visiting order.
fn load_segment_events(rom: &Rom, cart: &Cartridge, level: usize) -> Result<(EventTable, Vec<u8>)> {
    let mut table = EventTable::new();
    let events = cart.tables().events.ok_or(RomError::Unsupported("event table"))?;
    let offset = rom.read_u16(events + level as u32 * 2)?;
    let level_addr = rom.flat(BankedAddr::from_bank_offset(cart.event_bank, offset));

    let mut queue = VecDeque::from([0u8]);
    let mut seen = HashSet::new();
    seen.insert(0u8);
    let mut visited = vec![];
    while let Some(index) = queue.pop_front() {
        visited.push(index);
        let segment = rom.read_u16(level_addr + index as u32 * 2)?;
        let mut p: FlatAddr = rom.flat(BankedAddr::from_bank_offset(cart.event_bank, segment));
        let count = rom.read_u8(p)?;
        p += 1u32;
        for _ in 0..count {
            let xpos = rom.read_u16(p + 3u32)?;
            let event = EventInfo {
                level_match: 0,
                event_type: rom.read_u8(p)?,
                event_id: rom.read_u8(p + 1u32)?,
                sub_id: rom.read_u8(p + 2u32)?,
                flags: 0,
                x: xpos as i16,
                y: rom.read_i16(p + 5u32)?,
            };
            p += 7u32;
            let block_id = (xpos >> 5) as usize;
            if block_id < NUM_EVENT_BLOCKS {
                table.push(block_id, event);
            }

            if event.is_segment_change() {
                let mut target = event.sub_id & 0x7F;
                if matches!(event.event_id, 0x6 | 0xE) {
                    let redirect = rom.read_u16(SEGMENT_REDIRECTS + level as u32 * 2)? as u32;
                    target = rom.read_u8(SEGMENT_REDIRECTS + (redirect + 2 * target as u32))?;
                }
                if seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }
    Ok((table, visited))
}
