use log::info;
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    rom::Rom,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum GameVariant {
    X1,
    X2,
    X3,
    RockmanForte,
}

// Addresses of where per-level data tables are located in each cartridge.
// `None` means the cartridge has no such table.
pub struct VariantTables {
    pub layout: Option<BankedAddr>,
    pub scenes: Option<BankedAddr>,
    pub blocks: Option<BankedAddr>,
    pub maps: Option<BankedAddr>,
    pub collisions: Option<BankedAddr>,
    pub checkpoints: Option<BankedAddr>,
    pub palettes: Option<BankedAddr>,
    pub font: Option<BankedAddr>,
    pub gfx_config: Option<BankedAddr>,
    pub gfx_pos: Option<BankedAddr>,
    pub events: Option<BankedAddr>,
    pub borders: Option<BankedAddr>,
    pub locks: Option<BankedAddr>,
    pub properties: Option<BankedAddr>,
    pub sprite_assembly: Option<BankedAddr>,
    pub sprite_offset: Option<BankedAddr>,
    pub obj_offset: Option<BankedAddr>,
    pub gfx_obj: Option<BankedAddr>,
    pub gfx_pal: Option<BankedAddr>,
    pub bg_layout: Option<BankedAddr>,
    pub bg_scenes: Option<BankedAddr>,
    pub bg_blocks: Option<BankedAddr>,
}

const fn a(addr: u32) -> Option<BankedAddr> {
    Some(BankedAddr(addr))
}

static X1_TABLES: VariantTables = VariantTables {
    layout: a(0x868D24),
    scenes: a(0x868D93),
    blocks: a(0x868E02),
    maps: a(0x868E71),
    collisions: a(0x868EE0),
    checkpoints: a(0x86A780),
    palettes: a(0x868133),
    font: a(0x86F744),
    gfx_config: a(0x86F56F),
    gfx_pos: a(0x86F6F7),
    events: a(0x8582C2),
    borders: a(0x86E4E2),
    locks: a(0x86ECD0),
    properties: None,
    sprite_assembly: a(0x8D8000),
    sprite_offset: a(0x86A5E4),
    obj_offset: a(0x86DE9B),
    gfx_obj: a(0x86ACEE),
    gfx_pal: a(0x86ACF1),
    bg_layout: a(0x868F4F),
    bg_scenes: a(0x868FBE),
    bg_blocks: a(0x86902D),
};

static X2_TABLES: VariantTables = VariantTables {
    layout: a(0x868888),
    scenes: a(0x8688F7),
    blocks: a(0x868966),
    maps: a(0x8689D5),
    collisions: a(0x868A44),
    checkpoints: a(0x86A4C5),
    palettes: a(0x86817A),
    font: a(0x86FA4C),
    gfx_config: a(0x86F831),
    gfx_pos: a(0x86F9FF),
    events: a(0x29D3D1),
    borders: a(0x82EBE9),
    locks: a(0x82FAE4),
    properties: None,
    sprite_assembly: a(0x8D8000),
    sprite_offset: a(0x86A34D),
    obj_offset: a(0x86A34D),
    gfx_obj: a(0xAAB2D4),
    gfx_pal: a(0xAAB2D7),
    bg_layout: a(0x868AB3),
    bg_scenes: a(0x868B22),
    bg_blocks: a(0x868B91),
};

static X3_TABLES: VariantTables = VariantTables {
    layout: a(0x8689B3),
    scenes: a(0x868A22),
    blocks: a(0x868A91),
    maps: a(0x868B00),
    collisions: a(0x868B6F),
    checkpoints: a(0x86A8E4),
    palettes: a(0x868180),
    font: a(0x86F77D),
    gfx_config: a(0x86F3C3),
    gfx_pos: a(0x86F730),
    events: a(0x3CCE4B),
    borders: a(0x83DE43),
    locks: a(0x83F2CC),
    properties: a(0x86E28E),
    sprite_assembly: a(0x8D8000),
    sprite_offset: a(0x86E28E),
    obj_offset: None,
    gfx_obj: a(0x888623),
    gfx_pal: a(0x888626),
    bg_layout: a(0x868BDE),
    bg_scenes: a(0x868C4D),
    bg_blocks: a(0x868CBC),
};

static RNF_TABLES: VariantTables = VariantTables {
    layout: a(0x808199),
    scenes: a(0x808257),
    blocks: None,
    maps: a(0x8081B3),
    collisions: None,
    checkpoints: None,
    palettes: None,
    font: None,
    gfx_config: a(0x80B75B),
    gfx_pos: a(0x81E391),
    events: a(0x80C18B),
    borders: None,
    locks: None,
    properties: None,
    sprite_assembly: None,
    sprite_offset: None,
    obj_offset: None,
    gfx_obj: None,
    gfx_pal: None,
    bg_layout: None,
    bg_scenes: None,
    bg_blocks: None,
};

// Per-level table sizes of the unmodified cartridges.
const X1_EVENT_SIZES: [u16; 13] = [
    0x2c8, 0x211, 0x250, 0x4b3, 0x2ea, 0x32c, 0x2e2, 0x260, 0x2d2, 0x37f, 0x254, 0x2b2, 0x27,
];
const X2_EVENT_SIZES: [u16; 13] = [
    0x235, 0x4a7, 0x338, 0x489, 0x310, 0x382, 0x3b6, 0x3da, 0x45c, 0x303, 0x212, 0x30f, 0xbd,
];
const X3_EVENT_SIZES: [u16; 14] = [
    0x2f1, 0x3b4, 0x3a7, 0x3d9, 0x3da, 0x455, 0x3c9, 0x405, 0x33b, 0x22b, 0x3cb, 0x2ba, 0x274, 0xe6,
];
const X1_LAYOUT_SIZES: [u16; 12] = [
    0x12, 0x32, 0x38, 0x64, 0x22, 0x3a, 0x1e, 0x6a, 0x2a, 0x3c, 0x22, 0x1a,
];
const X2_LAYOUT_SIZES: [u16; 12] = [
    0x8c, 0x3e, 0x38, 0x40, 0x42, 0x5c, 0x2a, 0x4e, 0x5e, 0x5a, 0x16, 0x5a,
];
const X3_LAYOUT_SIZES: [u16; 13] = [
    0x4c, 0x4c, 0x38, 0x42, 0x60, 0x54, 0x4e, 0x52, 0x30, 0x2e, 0x4e, 0x46, 0x22,
];

impl GameVariant {
    pub const ALL: [GameVariant; 4] = [
        GameVariant::X1,
        GameVariant::X2,
        GameVariant::X3,
        GameVariant::RockmanForte,
    ];

    pub fn tables(self) -> &'static VariantTables {
        match self {
            GameVariant::X1 => &X1_TABLES,
            GameVariant::X2 => &X2_TABLES,
            GameVariant::X3 => &X3_TABLES,
            GameVariant::RockmanForte => &RNF_TABLES,
        }
    }

    pub fn num_levels(self) -> usize {
        match self {
            GameVariant::X3 => 15,
            _ => 13,
        }
    }

    /// The three X titles share one engine lineage; Rockman & Forte lays out
    /// scenes, events and palettes differently.
    pub fn is_x_series(self) -> bool {
        self != GameVariant::RockmanForte
    }

    /// Flat table of per-level incremental tile loads.
    pub fn tile_increments(self) -> Option<FlatAddr> {
        match self {
            GameVariant::X1 => Some(FlatAddr(0x321D5)),
            GameVariant::X2 => Some(FlatAddr(0x31D6A)),
            GameVariant::X3 => Some(FlatAddr(0x32085)),
            GameVariant::RockmanForte => None,
        }
    }

    /// Flat table of per-level dynamic palette overrides.
    pub fn dynamic_palettes(self) -> Option<FlatAddr> {
        match self {
            GameVariant::X1 => Some(FlatAddr(0x32260)),
            GameVariant::X2 => Some(FlatAddr(0x31DD1)),
            GameVariant::X3 => Some(FlatAddr(0x32172)),
            GameVariant::RockmanForte => None,
        }
    }

    pub fn color_bank(self) -> u8 {
        match self {
            GameVariant::X3 => 0x8C,
            _ => 0x85,
        }
    }

    pub fn font_palette(self) -> FlatAddr {
        match self {
            GameVariant::X1 => FlatAddr(0x2D140),
            GameVariant::X2 => FlatAddr(0x2CF20),
            GameVariant::X3 => FlatAddr(0x632C0),
            GameVariant::RockmanForte => FlatAddr(0x50000),
        }
    }

    /// Bytes per entry of the enemy sprite/property table.
    pub fn sprite_stride(self) -> u32 {
        match self {
            GameVariant::X3 => 5,
            _ => 2,
        }
    }

    fn from_title(header: &crate::rom::SnesHeader) -> Option<Self> {
        if !matches!(header.title_u32(0), 0x4147454D | 0x6167654D | 0x4B434F52) {
            return None;
        }
        if !matches!(header.title_u32(4), 0x204E414D | 0x206E616D | 0x264E414D) {
            return None;
        }
        match header.title_u16(8) {
            0x2058 => Some(GameVariant::X1),
            0x3258 => Some(GameVariant::X2),
            0x3358 => Some(GameVariant::X3),
            0x2026 | 0x4F46 => Some(GameVariant::RockmanForte),
            _ => None,
        }
    }
}

const EXPANSION_TAG: &str = "EXPANDED ROM  ";
const EXPANSION_HEADER_SIZE: u32 = 0x20;

/// Header appended by ROM hacks that enlarge the layout/event/checkpoint tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExpansionHeader {
    pub location: FlatAddr,
    pub version: u16,
    pub layout_size: u16,
    pub layout_scenes: u16,
    pub event_size: Option<u16>,
    pub checkpoint_size: Option<u16>,
}

impl ExpansionHeader {
    fn read(rom: &Rom, location: FlatAddr) -> Result<Self, RomError> {
        let version = rom.read_u16(location + 0xEu32)?;
        let mut header = ExpansionHeader {
            location,
            version,
            layout_size: 0x800,
            layout_scenes: 0x40,
            event_size: None,
            checkpoint_size: None,
        };
        if version >= 1 {
            header.layout_size = rom.read_u16(location + 0x10u32)?;
            header.event_size = Some(rom.read_u16(location + 0x12u32)?);
        }
        if version >= 3 {
            header.checkpoint_size = Some(rom.read_u16(location + 0x14u32)?);
        }
        Ok(header)
    }
}

/// An identified cartridge: which game it is, and where its relocatable
/// tables live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cartridge {
    pub variant: GameVariant,
    pub expansion: Option<ExpansionHeader>,
    pub event_bank: u8,
    pub checkpoint_bank: u8,
    pub lock_bank: u8,
}

fn bank_of(addr: Option<BankedAddr>) -> u8 {
    addr.map(|a| a.bank()).unwrap_or(0)
}

impl Cartridge {
    /// Returns the variant without failing, for callers checking candidate files.
    pub fn detect(rom: &Rom) -> Option<GameVariant> {
        GameVariant::from_title(rom.header())
    }

    pub fn identify(rom: &Rom) -> Result<Self, RomError> {
        let variant = Cartridge::detect(rom).ok_or(RomError::UnrecognizedCartridge)?;
        let tables = variant.tables();
        let mut cart = Cartridge {
            variant,
            expansion: None,
            event_bank: bank_of(tables.events),
            checkpoint_bank: bank_of(tables.checkpoints),
            lock_bank: bank_of(tables.borders),
        };

        // (size code, image size, tag location, header location, relocated banks)
        let layout = match variant {
            GameVariant::X1 => (0xC, 0x280000, 0x188000, 0x188000, Some((0xB2, 0x93, 0xBB))),
            GameVariant::X2 => (0xC, 0x280000, 0x188000, 0x188000, Some((0xB2, cart.event_bank, 0xBB))),
            GameVariant::X3 => (0xC, 0x300000, 0x208000, 0x208000, Some((0xC2, cart.event_bank, 0xCB))),
            GameVariant::RockmanForte => (0xD, 0x600000, 0x208000, 0x408000, None),
        };
        let (size_code, image_size, tag_end, header_end, banks) = layout;
        if rom.header().rom_size == size_code
            && rom.size() == image_size
            && rom.read_ascii(FlatAddr(tag_end - EXPANSION_HEADER_SIZE), EXPANSION_TAG.len())?
                == EXPANSION_TAG
        {
            let expansion = ExpansionHeader::read(rom, FlatAddr(header_end - EXPANSION_HEADER_SIZE))?;
            info!("Expanded ROM detected (version {}).", expansion.version);
            if let Some((event_bank, checkpoint_bank, lock_bank)) = banks {
                cart.event_bank = event_bank;
                cart.checkpoint_bank = checkpoint_bank;
                cart.lock_bank = lock_bank;
            }
            cart.expansion = Some(expansion);
        }
        info!("{:?} cartridge detected.", variant);
        Ok(cart)
    }

    pub fn tables(&self) -> &'static VariantTables {
        self.variant.tables()
    }

    pub fn num_levels(&self) -> usize {
        self.variant.num_levels()
    }

    pub fn expanded_version(&self) -> Option<u16> {
        self.expansion.map(|e| e.version)
    }

    /// Maximum byte size of a level's event stream.
    pub fn event_size_limit(&self, level: usize) -> Option<usize> {
        if let Some(e) = &self.expansion {
            return e.event_size.map(|s| s as usize);
        }
        let sizes: &[u16] = match self.variant {
            GameVariant::X1 => &X1_EVENT_SIZES,
            GameVariant::X2 => &X2_EVENT_SIZES,
            GameVariant::X3 => &X3_EVENT_SIZES,
            GameVariant::RockmanForte => &[],
        };
        sizes.get(level).map(|&s| s as usize)
    }

    /// Maximum byte size of a level's compressed scene layout.
    pub fn layout_size_limit(&self, level: usize) -> Option<usize> {
        if let Some(e) = &self.expansion {
            return Some(e.layout_size as usize);
        }
        let sizes: &[u16] = match self.variant {
            GameVariant::X1 => &X1_LAYOUT_SIZES,
            GameVariant::X2 => &X2_LAYOUT_SIZES,
            GameVariant::X3 => &X3_LAYOUT_SIZES,
            GameVariant::RockmanForte => &[],
        };
        sizes.get(level).map(|&s| s as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_cartridge, put_title};

    #[test]
    fn identifies_titles() {
        for (title, variant) in [
            (&b"MEGAMAN X            "[..], GameVariant::X1),
            (&b"MEGAMAN X2           "[..], GameVariant::X2),
            (&b"MEGAMAN X3           "[..], GameVariant::X3),
            (&b"ROCKMAN&FORTE        "[..], GameVariant::RockmanForte),
        ] {
            let mut data = blank_cartridge(0x100000);
            put_title(&mut data, title, 0x0A);
            let rom = Rom::from_bytes(data).unwrap();
            let cart = Cartridge::identify(&rom).unwrap();
            assert_eq!(cart.variant, variant);
            assert!(cart.expansion.is_none());
        }
    }

    #[test]
    fn rejects_unknown_title() {
        let mut data = blank_cartridge(0x100000);
        put_title(&mut data, b"SUPER METROID        ", 0x0A);
        let rom = Rom::from_bytes(data).unwrap();
        assert_eq!(rom.header().title_string(), "SUPER METROID");
        assert_eq!(Cartridge::detect(&rom), None);
        assert_eq!(Cartridge::identify(&rom), Err(RomError::UnrecognizedCartridge));
    }

    #[test]
    fn expanded_x1_relocates_banks() {
        let mut data = blank_cartridge(0x280000);
        put_title(&mut data, b"MEGAMAN X            ", 0x0C);
        let hdr = 0x188000 - EXPANSION_HEADER_SIZE as usize;
        data[hdr..hdr + 14].copy_from_slice(EXPANSION_TAG.as_bytes());
        data[hdr + 0xE..hdr + 0x16].copy_from_slice(&[3, 0, 0x00, 0x10, 0x00, 0x08, 0x40, 0x00]);
        let rom = Rom::from_bytes(data).unwrap();
        let cart = Cartridge::identify(&rom).unwrap();
        let expansion = cart.expansion.unwrap();
        assert_eq!(expansion.version, 3);
        assert_eq!(expansion.layout_size, 0x1000);
        assert_eq!(expansion.event_size, Some(0x800));
        assert_eq!(expansion.checkpoint_size, Some(0x40));
        assert_eq!((cart.event_bank, cart.checkpoint_bank, cart.lock_bank), (0xB2, 0x93, 0xBB));
        assert_eq!(cart.event_size_limit(5), Some(0x800));
        assert_eq!(cart.layout_size_limit(5), Some(0x1000));
    }

    #[test]
    fn version_zero_only_sets_layout() {
        let mut data = blank_cartridge(0x280000);
        put_title(&mut data, b"MEGAMAN X2           ", 0x0C);
        let hdr = 0x188000 - EXPANSION_HEADER_SIZE as usize;
        data[hdr..hdr + 14].copy_from_slice(EXPANSION_TAG.as_bytes());
        let rom = Rom::from_bytes(data).unwrap();
        let cart = Cartridge::identify(&rom).unwrap();
        let expansion = cart.expansion.unwrap();
        assert_eq!(expansion.layout_size, 0x800);
        assert_eq!(expansion.event_size, None);
        assert_eq!(cart.checkpoint_bank, 0x29);
        assert_eq!(cart.event_size_limit(0), None);
    }

    #[test]
    fn stock_size_limits() {
        let mut data = blank_cartridge(0x100000);
        put_title(&mut data, b"MEGAMAN X            ", 0x0A);
        let cart = Cartridge::identify(&Rom::from_bytes(data).unwrap()).unwrap();
        assert_eq!(cart.event_size_limit(3), Some(0x4b3));
        assert_eq!(cart.layout_size_limit(7), Some(0x6a));
        assert_eq!(cart.layout_size_limit(12), None);
        assert_eq!(cart.event_bank, 0x85);
        assert_eq!(cart.checkpoint_bank, 0x86);
    }
}
