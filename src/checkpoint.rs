use anyhow::Result;
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    events::EventTable,
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

pub const SCREEN_WIDTH: i32 = 256;
pub const SCREEN_HEIGHT: i32 = 224;

/// ROM locations of one checkpoint's fields. Values are read on demand so
/// they reflect in-place edits to the image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckPointInfo {
    // Slot of the checkpoint pointer itself, tracked for expanded images.
    pub offset: Option<FlatAddr>,
    pub obj_load: FlatAddr,
    pub tile_load: FlatAddr,
    pub pal_load: FlatAddr,
    pub byte0: Option<FlatAddr>,
    pub ch_x: FlatAddr,
    pub ch_y: FlatAddr,
    pub cam_x: FlatAddr,
    pub cam_y: FlatAddr,
    pub bkg_x: FlatAddr,
    pub bkg_y: FlatAddr,
    pub min_x: FlatAddr,
    pub max_x: FlatAddr,
    pub min_y: FlatAddr,
    pub max_y: FlatAddr,
    pub force_x: FlatAddr,
    pub force_y: FlatAddr,
    pub scroll: FlatAddr,
    pub tel_dwn: FlatAddr,
    pub byte1: Option<FlatAddr>,
    pub byte2: Option<FlatAddr>,
}

struct FieldCursor(FlatAddr);

impl FieldCursor {
    fn byte(&mut self) -> FlatAddr {
        let a = self.0;
        self.0 += 1u32;
        a
    }

    fn word(&mut self) -> FlatAddr {
        let a = self.0;
        self.0 += 2u32;
        a
    }
}

impl CheckPointInfo {
    fn at(base: FlatAddr, variant: GameVariant, offset: Option<FlatAddr>) -> Self {
        let has_byte0 = variant != GameVariant::X1;
        let has_byte2 = !matches!(variant, GameVariant::X1 | GameVariant::X2);
        let mut c = FieldCursor(base);
        CheckPointInfo {
            offset,
            obj_load: c.byte(),
            tile_load: c.byte(),
            pal_load: c.byte(),
            byte0: has_byte0.then(|| c.byte()),
            ch_x: c.word(),
            ch_y: c.word(),
            cam_x: c.word(),
            cam_y: c.word(),
            bkg_x: c.word(),
            bkg_y: c.word(),
            min_x: c.word(),
            max_x: c.word(),
            min_y: c.word(),
            max_y: c.word(),
            force_x: c.word(),
            force_y: c.word(),
            scroll: c.byte(),
            tel_dwn: c.byte(),
            byte1: has_byte0.then(|| c.byte()),
            byte2: has_byte2.then(|| c.byte()),
        }
    }

    pub fn read(&self, rom: &Rom) -> Result<CheckPoint, RomError> {
        let point = |x: FlatAddr, y: FlatAddr| -> Result<Point, RomError> {
            Ok(Point {
                x: rom.read_i16(x)? as i32,
                y: rom.read_i16(y)? as i32,
            })
        };
        let min = point(self.min_x, self.min_y)?;
        let max = point(self.max_x, self.max_y)?;
        Ok(CheckPoint {
            obj_load: rom.read_u8(self.obj_load)?,
            tile_load: rom.read_u8(self.tile_load)?,
            pal_load: rom.read_u8(self.pal_load)?,
            character: point(self.ch_x, self.ch_y)?,
            camera: point(self.cam_x, self.cam_y)?,
            background: point(self.bkg_x, self.bkg_y)?,
            min,
            max: Point {
                x: max.x + SCREEN_WIDTH,
                y: max.y + SCREEN_HEIGHT,
            },
            force: point(self.force_x, self.force_y)?,
            scroll: rom.read_u8(self.scroll)?,
            teleport_down: rom.read_u8(self.tel_dwn)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Decoded checkpoint values. `max` is the far edge reachable by the
/// character, i.e. the camera maximum plus one screen.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckPoint {
    pub obj_load: u8,
    pub tile_load: u8,
    pub pal_load: u8,
    pub character: Point,
    pub camera: Point,
    pub background: Point,
    pub min: Point,
    pub max: Point,
    pub force: Point,
    pub scroll: u8,
    pub teleport_down: u8,
}

pub fn count_checkpoints(cart: &Cartridge, events: &EventTable) -> usize {
    if let Some(size) = cart.expansion.and_then(|e| e.checkpoint_size) {
        return size as usize;
    }
    let base = if cart.variant.is_x_series() { 1 } else { 0 };
    events
        .iter()
        .filter_map(|e| e.checkpoint_index())
        .map(|i| i + 1)
        .fold(base, usize::max)
}

pub fn load_checkpoints(
    rom: &Rom,
    cart: &Cartridge,
    level: usize,
    events: &EventTable,
) -> Result<Vec<CheckPointInfo>> {
    let Some(table) = cart.tables().checkpoints else {
        return Ok(vec![]);
    };
    let count = count_checkpoints(cart, events);
    let track_offset = cart.expansion.and_then(|e| e.checkpoint_size).unwrap_or(0) > 0;
    let list = rom.read_u16(table + level as u32 * 2)? as u32;
    let bank_base = BankedAddr::from_bank_offset(cart.checkpoint_bank, table.offset());

    let mut out = Vec::with_capacity(count);
    for i in 0..count as u32 {
        let slot = table + (list + i * 2);
        let base = rom.flat(bank_base + rom.read_u16(slot)? as u32);
        let offset = track_offset.then(|| rom.flat(slot));
        out.push(CheckPointInfo::at(base, cart.variant, offset));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::load_events, testing};

    #[test]
    fn fields_follow_variant_layout() {
        let x1 = CheckPointInfo::at(FlatAddr(0x100), GameVariant::X1, None);
        assert_eq!(x1.byte0, None);
        assert_eq!(x1.ch_x, FlatAddr(0x103));
        assert_eq!(x1.force_y, FlatAddr(0x119));
        assert_eq!(x1.tel_dwn, FlatAddr(0x11C));
        assert_eq!((x1.byte1, x1.byte2), (None, None));

        let x2 = CheckPointInfo::at(FlatAddr(0x100), GameVariant::X2, None);
        assert_eq!(x2.byte0, Some(FlatAddr(0x103)));
        assert_eq!(x2.ch_x, FlatAddr(0x104));
        assert_eq!(x2.byte1, Some(FlatAddr(0x11F)));
        assert_eq!(x2.byte2, None);

        let x3 = CheckPointInfo::at(FlatAddr(0x100), GameVariant::X3, None);
        assert_eq!(x3.byte2, Some(FlatAddr(0x120)));
    }

    #[test]
    fn fixture_checkpoints() {
        let (rom, cart) = testing::x1_level().build();
        let events = load_events(&rom, &cart, 0).unwrap();
        assert_eq!(count_checkpoints(&cart, &events), 2);
        let checkpoints = load_checkpoints(&rom, &cart, 0, &events).unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].obj_load, rom.flat(BankedAddr(testing::CHECKPOINT_0)));
        assert_eq!(checkpoints[1].obj_load, rom.flat(BankedAddr(testing::CHECKPOINT_1)));
        assert!(checkpoints[0].offset.is_none());

        let cp = checkpoints[1].read(&rom).unwrap();
        assert_eq!(cp.tile_load, 0);
        assert_eq!(cp.character, Point { x: 0x180, y: 0x40 });
        assert_eq!(cp.max, Point { x: 0x300 + SCREEN_WIDTH, y: 0x100 + SCREEN_HEIGHT });
        assert_eq!(cp.force, Point { x: -1, y: 0 });
    }
}
