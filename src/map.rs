use serde::Serialize;

use crate::vram::{TileId, VramCache};

/// Per-map collision byte. Values outside the named set do occur in hacks
/// and are kept as-is.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CollisionCode(pub u8);

impl CollisionCode {
    pub const NONE: Self = Self(0x00);
    pub const SLOPE_16_8: Self = Self(0x01);
    pub const SLOPE_0_4: Self = Self(0x0C);
    pub const WATER: Self = Self(0x0D);
    pub const WATER_SURFACE: Self = Self(0x0E);
    pub const MUD: Self = Self(0x11);
    pub const LADDER: Self = Self(0x12);
    pub const TOP_LADDER: Self = Self(0x13);
    pub const TOP_MUD: Self = Self(0x1C);
    pub const LAVA: Self = Self(0x33);
    pub const SOLID2: Self = Self(0x34);
    pub const SOLID3: Self = Self(0x35);
    pub const UNCLIMBABLE_SOLID: Self = Self(0x36);
    pub const LEFT_CONVEYOR: Self = Self(0x37);
    pub const RIGHT_CONVEYOR: Self = Self(0x38);
    pub const UP_SLOPE_BASE: Self = Self(0x39);
    pub const DOWN_SLOPE_BASE: Self = Self(0x3A);
    pub const SOLID: Self = Self(0x3B);
    pub const BREAKABLE: Self = Self(0x3C);
    pub const DOOR: Self = Self(0x3D);
    pub const NON_LETHAL_SPIKE: Self = Self(0x3E);
    pub const LETHAL_SPIKE: Self = Self(0x3F);
    pub const LEFT_CONVEYOR_SLOPE_16_12: Self = Self(0x45);
    pub const RIGHT_CONVEYOR_SLOPE_0_4: Self = Self(0x4C);
    pub const SEMI_SOLID: Self = Self(0x53);
    pub const SLIPPERY_SLOPE_16_8: Self = Self(0x81);
    pub const SLIPPERY_SLOPE_0_4: Self = Self(0x8C);
    pub const SLIPPERY_SLOPE_BASE: Self = Self(0xBA);
    pub const SLIPPERY_BORDER_FLOOR: Self = Self(0xBB);
    pub const SLIPPERY_FLOOR: Self = Self(0xBE);

    pub fn is_solid(self) -> bool {
        matches!(
            self,
            Self::MUD
                | Self::TOP_MUD
                | Self::LAVA
                | Self::SOLID2
                | Self::SOLID3
                | Self::UNCLIMBABLE_SOLID
                | Self::LEFT_CONVEYOR
                | Self::RIGHT_CONVEYOR
                | Self::UP_SLOPE_BASE
                | Self::DOWN_SLOPE_BASE
                | Self::SOLID
                | Self::BREAKABLE
                | Self::DOOR
                | Self::NON_LETHAL_SPIKE
                | Self::LETHAL_SPIKE
                | Self::SLIPPERY_SLOPE_BASE
                | Self::SLIPPERY_BORDER_FLOOR
                | Self::SLIPPERY_FLOOR
        )
    }

    pub fn is_slope(self) -> bool {
        self.slope_heights().is_some()
    }

    pub fn is_slippery(self) -> bool {
        (0x81..=0x8C).contains(&self.0) || matches!(self.0, 0xBA | 0xBB | 0xBE)
    }

    pub fn is_conveyor(self) -> bool {
        matches!(self.0, 0x37 | 0x38 | 0x45..=0x4C)
    }

    pub fn is_water(self) -> bool {
        matches!(self, Self::WATER | Self::WATER_SURFACE)
    }

    pub fn is_ladder(self) -> bool {
        matches!(self, Self::LADDER | Self::TOP_LADDER)
    }

    pub fn is_hazard(self) -> bool {
        matches!(self, Self::LAVA | Self::LETHAL_SPIKE)
    }

    /// Floor height in pixels at the left and right edge of a sloped map.
    pub fn slope_heights(self) -> Option<(u8, u8)> {
        const PLAIN: [(u8, u8); 12] = [
            (16, 8),
            (8, 0),
            (8, 16),
            (0, 8),
            (16, 12),
            (12, 8),
            (8, 4),
            (4, 0),
            (12, 16),
            (8, 12),
            (4, 8),
            (0, 4),
        ];
        match self.0 {
            0x01..=0x0C => Some(PLAIN[self.0 as usize - 0x01]),
            0x45..=0x4C => Some(PLAIN[self.0 as usize - 0x45 + 4]),
            0x81..=0x8C => Some(PLAIN[self.0 as usize - 0x81]),
            _ => None,
        }
    }
}

/// One 8x8 tile reference of a map.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MapCell {
    // None when the referenced tile has no visible pixels.
    pub tile: Option<TileId>,
    pub palette: u8,
    pub flip_h: bool,
    pub flip_v: bool,
    pub foreground: bool,
}

impl MapCell {
    pub fn from_tilemap_word(w: u16, vram: &VramCache, transparent: bool) -> Self {
        let id = w & 0x3FF;
        MapCell {
            tile: if transparent && vram.is_blank(id) {
                None
            } else {
                Some(id)
            },
            palette: ((w >> 10) & 7) as u8,
            foreground: w & 0x2000 != 0,
            flip_h: w & 0x4000 != 0,
            flip_v: w & 0x8000 != 0,
        }
    }
}

/// A 16x16 map: four tiles (top-left, top-right, bottom-left, bottom-right)
/// and a collision code.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Map {
    pub cells: [MapCell; 4],
    pub collision: CollisionCode,
}

impl Map {
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.tile.is_none())
    }
}
