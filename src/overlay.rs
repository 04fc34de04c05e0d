use anyhow::Result;
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    events::EventInfo,
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

const MARKER_RADIUS: i32 = 5;
const LOCK_LINE_HALF_WIDTH: i32 = 128;
const LOCK_LINE_HALF_HEIGHT: i32 = 112;
// Assembly numbers substituted for events whose sprite isn't in the enemy table.
const HIGHWAY_CAR_ASSEMBLY: u32 = 0x3A;
const HEART_TANK_ASSEMBLY: u32 = 0x38;

/// Overlay rectangle in level pixel coordinates. `right` and `bottom` are exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn around(x: i32, y: i32, half_width: i32, half_height: i32) -> Self {
        Rect {
            left: x - half_width,
            top: y - half_height,
            right: x + half_width,
            bottom: y + half_height,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

pub fn event_bounds(rom: &Rom, cart: &Cartridge, level: usize, event: &EventInfo) -> Result<Rect> {
    let (x, y) = (event.x as i32, event.y as i32);
    if event.event_type == 2 && event.event_id == 0 {
        if let Some(b) = lock_border(rom, cart, level, event.sub_id)? {
            return Ok(Rect {
                right: rom.read_i16(b)? as i32,
                left: rom.read_i16(b + 2u32)? as i32,
                bottom: rom.read_i16(b + 4u32)? as i32,
                top: rom.read_i16(b + 6u32)? as i32,
            });
        }
    } else if event.event_type == 2 && (0x15..=0x18).contains(&event.event_id) {
        return Ok(if event.event_id & 0x8 != 0 {
            Rect::around(x, y, LOCK_LINE_HALF_WIDTH, MARKER_RADIUS)
        } else {
            Rect::around(x, y, MARKER_RADIUS, LOCK_LINE_HALF_HEIGHT)
        });
    } else if let Some(assembly) = sprite_assembly(rom, cart, event)? {
        if let Some(rect) = assembly_bounds(rom, cart, assembly, x, y)? {
            return Ok(rect);
        }
    }
    Ok(Rect::around(x, y, MARKER_RADIUS, MARKER_RADIUS))
}

// Camera lock borders: a per-level table of border records on stock
// cartridges; expanded images from version 4 on keep 0x20-byte records in
// one bank, 0x800 bytes per level.
fn lock_border(rom: &Rom, cart: &Cartridge, level: usize, sub_id: u8) -> Result<Option<FlatAddr>> {
    let tables = cart.tables();
    if tables.locks.is_none() {
        return Ok(None);
    }
    if cart.expanded_version().is_some_and(|v| v >= 4) {
        let offset = 0x8000 + level as u32 * 0x800 + sub_id as u32 * 0x20;
        return Ok(Some(rom.flat(BankedAddr(((cart.lock_bank as u32) << 16) | offset))));
    }
    let Some(borders) = tables.borders else {
        return Ok(None);
    };
    let level_table = BankedAddr::from_bank_offset(borders.bank(), rom.read_u16(borders + level as u32 * 2)?);
    let record = rom.read_u16(level_table + sub_id as u32 * 2)?;
    Ok(Some(rom.flat(BankedAddr::from_bank_offset(borders.bank(), record))))
}

fn sprite_assembly(rom: &Rom, cart: &Cartridge, event: &EventInfo) -> Result<Option<u32>> {
    let tables = cart.tables();
    if tables.sprite_assembly.is_none() {
        return Ok(None);
    }
    let table = match event.event_type {
        0 | 1 => tables.obj_offset,
        3 => tables.sprite_offset,
        _ => None,
    };
    let Some(table) = table else {
        return Ok(None);
    };
    let variant = cart.variant;
    match (event.event_type, event.event_id) {
        (1, 0x21) if variant == GameVariant::X1 => {
            return Ok(Some(((event.sub_id as u32 & 0x30) >> 4) + HIGHWAY_CAR_ASSEMBLY));
        }
        (0, 0xB) if event.sub_id == 4 => return Ok(Some(HEART_TANK_ASSEMBLY)),
        (0 | 1, _) => return Ok(None),
        (_, 0x2) if variant == GameVariant::X2 => return Ok(None),
        _ => {}
    }
    let Some(index) = (event.event_id as u32).checked_sub(1) else {
        return Ok(None);
    };
    let entry = rom.flat(table) + index * variant.sprite_stride();
    Ok(Some(rom.read_u8(entry)? as u32))
}

// Sprite assembly: a count byte, then four-byte pieces, each an 8x8 or
// 16x16 sprite at a signed offset from the event position.
fn assembly_bounds(rom: &Rom, cart: &Cartridge, assembly: u32, x: i32, y: i32) -> Result<Option<Rect>> {
    let Some(table) = cart.tables().sprite_assembly else {
        return Ok(None);
    };
    let frame = BankedAddr(rom.read_u24(table + assembly * 3)?);
    let pieces = rom.flat(BankedAddr(rom.read_u24(frame)?));
    let count = rom.read_u8(pieces)? as u32;

    let mut bounds: Option<Rect> = None;
    for i in 0..count {
        let piece = pieces + (1 + i * 4);
        let (dx, dy, info) = if cart.variant == GameVariant::X1 {
            (rom.read_i8(piece)?, rom.read_i8(piece + 1u32)?, rom.read_u8(piece + 3u32)?)
        } else {
            (rom.read_i8(piece + 1u32)?, rom.read_i8(piece + 2u32)?, rom.read_u8(piece)?)
        };
        let size = if info & 0x20 != 0 { 16 } else { 8 };
        let left = x + dx as i32;
        let top = y + dy as i32;
        let rect = Rect {
            left,
            top,
            right: left + size,
            bottom: top + size,
        };
        bounds = Some(bounds.map_or(rect, |b| b.union(rect)));
    }
    Ok(bounds)
}
