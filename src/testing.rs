// Synthetic cartridge images for unit tests.

use crate::{
    addr::{BankedAddr, Mapping, RomAddr},
    gfx::{compress, Codec},
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

const TITLE_OFFSET: usize = 0x7FC0;
const GROWTH: usize = 0x8000;

pub const FIXTURE_BLOCKS: usize = 4;
pub const FIXTURE_MAPS: usize = 8;
pub const FIXTURE_TILE_BYTES: usize = 0x200;
pub const CHECKPOINT_0: u32 = 0x86A880;
pub const CHECKPOINT_1: u32 = 0x86A8C0;
pub const FIXTURE_GFX_ID: u8 = 0x12;
pub const FIXTURE_GFX_PALETTE: u16 = 0x0345;

pub fn blank_cartridge(size: usize) -> Vec<u8> {
    vec![0; size]
}

/// Writes a LoROM header with a valid checksum pair.
pub fn put_title(data: &mut Vec<u8>, title: &[u8], size_code: u8) {
    let end = TITLE_OFFSET + 0x20;
    if data.len() < end {
        data.resize(end, 0);
    }
    data[TITLE_OFFSET..TITLE_OFFSET + 21].fill(b' ');
    data[TITLE_OFFSET..TITLE_OFFSET + title.len().min(21)].copy_from_slice(&title[..title.len().min(21)]);
    data[0x7FD7] = size_code;
    data[0x7FDC..0x7FDE].copy_from_slice(&0x0000u16.to_le_bytes());
    data[0x7FDE..0x7FE0].copy_from_slice(&0xFFFFu16.to_le_bytes());
}

/// Growable LoROM image; writes past the end extend it in whole banks.
pub struct TestRom {
    pub data: Vec<u8>,
}

impl TestRom {
    fn titled(title: &[u8]) -> Self {
        let mut data = blank_cartridge(GROWTH);
        put_title(&mut data, title, 0x0A);
        TestRom { data }
    }

    pub fn x1() -> Self {
        TestRom::titled(b"MEGAMAN X")
    }

    pub fn x2() -> Self {
        TestRom::titled(b"MEGAMAN X2")
    }

    pub fn rnf() -> Self {
        TestRom::titled(b"ROCKMAN&FORTE")
    }

    pub fn set_title(&mut self, title: &[u8]) {
        let size_code = self.data[0x7FD7];
        put_title(&mut self.data, title, size_code);
    }

    pub fn put<A: RomAddr>(&mut self, addr: A, bytes: &[u8]) {
        let start = addr.to_flat(Mapping::LoRom).index();
        let end = start + bytes.len();
        if end > self.data.len() {
            self.data.resize(end.div_ceil(GROWTH) * GROWTH, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    pub fn put_u8<A: RomAddr>(&mut self, addr: A, x: u8) {
        self.put(addr, &[x]);
    }

    pub fn put_u16<A: RomAddr>(&mut self, addr: A, x: u16) {
        self.put(addr, &x.to_le_bytes());
    }

    pub fn put_u24<A: RomAddr>(&mut self, addr: A, x: u32) {
        self.put(addr, &x.to_le_bytes()[..3]);
    }

    pub fn put_u32<A: RomAddr>(&mut self, addr: A, x: u32) {
        self.put(addr, &x.to_le_bytes());
    }

    pub fn build(&self) -> (Rom, Cartridge) {
        let rom = Rom::from_bytes(self.data.clone()).unwrap();
        let cart = Cartridge::identify(&rom).unwrap();
        (rom, cart)
    }
}

/// Planar data of the sixteen level tiles decoded to VRAM 0x200. Every tile
/// has visible pixels and a distinct byte distribution.
pub fn fixture_tiles() -> Vec<u8> {
    (0..FIXTURE_TILE_BYTES)
        .map(|i| {
            let (tile, k) = (i / 0x20, i % 0x20);
            (((15 - tile) * 17 + k * (tile % 3)) as u8) | 1
        })
        .collect()
}

fn tilemap_word(map: usize, corner: usize) -> u16 {
    let tile = 0x10 + (map * 4 + corner) % 16;
    let palette = (map % 8) << 10;
    let flip = if corner == 3 { 0x4000 } else { 0 };
    (tile | palette | flip) as u16
}

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Level 0 of a stock X1 cartridge, reduced to what the loaders touch:
///
/// - layout 2x1 scenes (0, 1); scene 0 holds block 1 at its top left,
///   scene 1 is all block 2; background is one scene of block 3
/// - blocks 0..4 over maps 0..8, map 0 blank; 16 compressed tiles at VRAM 0x200
/// - 32 static colors, no dynamic palettes or incremental tiles
/// - events: a checkpoint trigger (index 1) and an object in block 1, an enemy in block 2
/// - two checkpoints
/// - graphics chain 0 with one entry, enemy 1 sprite table entry
pub fn x1_level() -> TestRom {
    level_fixture(TestRom::x1(), &fixture_tiles())
}

/// The same level on an X2 cartridge, whose LZSS blob holds
/// `sortable_tiles`.
pub fn x2_level() -> TestRom {
    level_fixture(TestRom::x2(), &sortable_tiles())
}

/// Level tiles that compress better once reordered: 32 distinct tiles, then
/// the same 32 again. The copies sit 0x400 bytes after their originals, one
/// byte past the LZSS window, and each tile's unique top byte makes a sort by
/// maximum pair them up.
pub fn sortable_tiles() -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    let mut first = vec![];
    for k in 0..0x20u8 {
        let mut tile = [0u8; 0x20];
        for b in tile.iter_mut() {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            *b = ((state >> 16) & 0x7F) as u8;
        }
        tile[0] = 0x80 | k;
        first.extend(tile);
    }
    first.repeat(2)
}

fn level_fixture(mut t: TestRom, tiles: &[u8]) -> TestRom {
    let (_, cart) = t.build();
    let variant = cart.variant;
    let tables = variant.tables();
    let table = |addr: Option<BankedAddr>| addr.unwrap();
    let bank = |bank: u8, offset: u16| BankedAddr::from_bank_offset(bank, offset);

    // Level tables; level 1 entries sit right after level 0's data.
    t.put_u24(table(tables.layout), 0x898000);
    t.put_u24(table(tables.scenes), 0x8A8000);
    t.put_u24(table(tables.blocks), 0x8B8000);
    t.put_u24(table(tables.blocks) + 3u32, 0x8B8000 + FIXTURE_BLOCKS as u32 * 8);
    t.put_u24(table(tables.maps), 0x8C8000);
    t.put_u24(table(tables.maps) + 3u32, 0x8C8000 + FIXTURE_MAPS as u32 * 8);
    t.put_u24(table(tables.collisions), 0x8C9000);
    t.put_u24(table(tables.collisions) + 3u32, 0x8C9000 + FIXTURE_MAPS as u32);
    t.put_u24(table(tables.bg_layout), 0x898100);
    t.put_u24(table(tables.bg_scenes), 0x8A8100);
    t.put_u24(table(tables.bg_blocks), 0x8B8000);

    t.put(BankedAddr(0x898000), &[2, 1, 2, 0x02, 0, 0xFF]);
    t.put(BankedAddr(0x898100), &[1, 1, 1, 0x01, 0, 0xFF]);
    let mut scene0 = vec![0u16; 0x40];
    scene0[0] = 1;
    t.put(BankedAddr(0x8A8000), &words(&scene0));
    t.put(BankedAddr(0x8A8080), &words(&[2; 0x40]));
    t.put(BankedAddr(0x8A8100), &words(&[3; 0x40]));
    t.put(
        BankedAddr(0x8B8000),
        &words(&[0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 1, 1, 1, 1]),
    );
    let mut maps = vec![0u16; 4];
    for m in 1..FIXTURE_MAPS {
        maps.extend((0..4).map(|c| tilemap_word(m, c)));
    }
    t.put(BankedAddr(0x8C8000), &words(&maps));
    t.put(BankedAddr(0x8C9000), &[0x00, 0x3B, 0x3B, 0x01, 0x12, 0x3F, 0x0D, 0x53]);

    // Graphics: config 0 -> gfx id 0, all of `tiles` to VRAM 0x200.
    t.put_u16(table(tables.gfx_config) + 4u32, 0xB100);
    let [size_lo, size_hi] = (tiles.len() as u16).to_le_bytes();
    t.put(BankedAddr(0x86B100), &[0x00, size_lo, size_hi, 0x00, 0x11]);
    t.put_u24(table(tables.gfx_pos) + 2u32, 0x888000);
    t.put(BankedAddr(0x888000), &compress(tiles, Codec::for_variant(variant)));

    // Palettes: 32 static colors; dynamic table empty.
    t.put_u16(table(tables.palettes) + 0x60u32, 0xB000);
    t.put(BankedAddr(0x86B000), &[0x20, 0x00, 0x91]);
    let colors: Vec<u16> = (0..0x20u16).map(|i| i * 0x421).collect();
    t.put(bank(variant.color_bank(), 0x9100), &words(&colors));
    let dynamic = variant.dynamic_palettes().unwrap();
    t.put_u16(dynamic, 0x10);
    t.put_u16(dynamic + 0x10u32, 0x20);
    t.put_u16(dynamic + 0x20u32, 0xFFFF);

    // Events at offset 0x9000 of the event bank.
    t.put_u16(table(tables.events), 0x9000);
    let mut stream = vec![1u8];
    stream.extend([0x06, 0x80, 0x00, 0x0B, 0x01, 0x20, 0x01]);
    stream.extend([0x00, 0x40, 0x00, 0x05, 0x00, 0x40, 0x81]);
    stream.push(2);
    stream.extend([0x03, 0x60, 0x00, 0x01, 0x00, 0x00, 0x82]);
    stream.push(2);
    t.put(bank(cart.event_bank, 0x9000), &stream);

    // Checkpoints: list at table + 0x10, records at table + 0x100 and + 0x140.
    let checkpoints = table(tables.checkpoints);
    t.put_u16(checkpoints, 0x10);
    t.put(checkpoints + 0x10u32, &words(&[0x100, 0x140]));
    t.put(checkpoints + 0x100u32, &checkpoint_record(variant, [0x80, 0x60], [0x100, 0], 0));
    t.put(checkpoints + 0x140u32, &checkpoint_record(variant, [0x180, 0x40], [0x300, 0x100], -1));

    // Graphics chain 0 and enemy 1's sprite entry.
    let gfx_obj = table(tables.gfx_obj);
    t.put_u16(gfx_obj, 0x20);
    t.put_u16(gfx_obj + 0x20u32, 0x40);
    let [lo, hi] = FIXTURE_GFX_PALETTE.to_le_bytes();
    t.put(gfx_obj + 0x40u32, &[FIXTURE_GFX_ID, 0, 0, lo, hi, 0, 0xFF]);
    t.put(table(tables.sprite_offset), &[0x07, 0x21]);

    t
}

// Checkpoint: three load selectors, twelve position words, scroll and
// teleport bytes, plus the extra bytes of the later cartridges.
fn checkpoint_record(variant: GameVariant, character: [i16; 2], max: [i16; 2], force_x: i16) -> Vec<u8> {
    let mut out = vec![0u8, 0, 0];
    if variant != GameVariant::X1 {
        out.push(0);
    }
    let positions = [character[0], character[1], 0, 0, 0, 0, 0, max[0], 0, max[1], force_x, 0];
    out.extend(positions.iter().flat_map(|v| v.to_le_bytes()));
    out.extend([0, 0]);
    if variant != GameVariant::X1 {
        out.push(0);
    }
    out
}
