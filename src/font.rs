use anyhow::Result;
use log::info;

use crate::{
    addr::{BankedAddr, FlatAddr},
    error::RomError,
    gfx::{convert_16_color, decompress, tile_2bpp_to_raw, Codec},
    rom::Rom,
    variant::{Cartridge, GameVariant},
    vram::RAW_TILE_SIZE,
};

pub const NUM_GLYPHS: usize = 0x100;
pub const NUM_FONT_COLORS: usize = 0x20;
const GLYPH_SIZE: usize = 0x10;
const FONT_DATA_SIZE: usize = NUM_GLYPHS * GLYPH_SIZE;
const GLYPH_CACHE_SIZE: usize = 0x4800;
// Glyph cache slots before the first glyph.
const GLYPH_BASE: usize = 0x10;

/// Decoded text glyphs, one byte per pixel, and the font palette.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Font {
    glyphs: Vec<u8>,
    pub colors: [u16; NUM_FONT_COLORS],
}

impl Font {
    /// Raw pixels of character `ch`.
    pub fn glyph(&self, variant: GameVariant, ch: u8) -> &[u8] {
        let start = Font::slot(variant, ch) * RAW_TILE_SIZE + GLYPH_BASE * RAW_TILE_SIZE;
        &self.glyphs[start..start + RAW_TILE_SIZE]
    }

    // X1 characters map straight to glyph slots; the later titles skip the
    // first sixteen.
    fn slot(variant: GameVariant, ch: u8) -> usize {
        match variant {
            GameVariant::X1 => ch as usize,
            _ => ch as usize + 0x10,
        }
    }
}

fn font_source(rom: &Rom, cart: &Cartridge) -> Result<FlatAddr> {
    let tables = cart.tables();
    if let Some(font) = tables.font {
        let offset = rom.read_u16(font)? as u32;
        let bank = if cart.variant == GameVariant::X1 { 0x9C0000 } else { 0x1C0000 };
        return Ok(rom.flat(BankedAddr(bank + offset)));
    }
    let cfg_table = tables.gfx_config.ok_or(RomError::Unsupported("font"))?;
    let pos_table = tables.gfx_pos.ok_or(RomError::Unsupported("font"))?;
    let config = BankedAddr::from_bank_offset(0x80, rom.read_u16(cfg_table)?);
    let gfx_id = rom.read_u8(config)?;
    Ok(rom.flat(BankedAddr(rom.read_u24(pos_table + gfx_id as u32 * 5)?)))
}

pub fn load_font(rom: &Rom, cart: &Cartridge) -> Result<Font> {
    let source = font_source(rom, cart)?;
    let mut packed = vec![0u8; FONT_DATA_SIZE];
    decompress(rom.tail(source)?, &mut packed, FONT_DATA_SIZE, Codec::for_variant(cart.variant)).complete()?;

    let mut colors = [0u16; NUM_FONT_COLORS];
    let palette = cart.variant.font_palette();
    for (i, c) in colors.iter_mut().enumerate() {
        *c = convert_16_color(rom.read_u16(palette + i * 2)?);
    }

    let mut glyphs = vec![0u8; GLYPH_CACHE_SIZE];
    for (ch, glyph) in packed.chunks_exact(GLYPH_SIZE).enumerate() {
        let start = (Font::slot(cart.variant, ch as u8) + GLYPH_BASE) * RAW_TILE_SIZE;
        tile_2bpp_to_raw(glyph, &mut glyphs[start..start + RAW_TILE_SIZE]);
    }
    info!("Loaded font from {}", source);
    Ok(Font { glyphs, colors })
}
