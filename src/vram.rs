use crate::{error::RomError, gfx::tile_4bpp_to_raw};

pub const VRAM_SIZE: usize = 0x10000;
pub const NUM_TILES: usize = 0x400;
pub const TILE_SIZE: usize = 0x20;
pub const RAW_TILE_SIZE: usize = 0x40;

pub type TileId = u16;

// Rows of the fixed tiles loaded at the start of VRAM for every level:
// Z = 00 x16, A = FF 00 x8, B = 00 FF x8, F = FF x16.
const VRAM_BASE_ROWS: &[u8; 32] = b"ZZAZBZFZZAAABAFAZBABBBFBZFAFBFFF";

const fn build_vram_base() -> [u8; 0x200] {
    let mut out = [0u8; 0x200];
    let mut row = 0;
    while row < 32 {
        let mut i = 0;
        while i < 16 {
            out[row * 16 + i] = match VRAM_BASE_ROWS[row] {
                b'A' if i % 2 == 0 => 0xFF,
                b'B' if i % 2 == 1 => 0xFF,
                b'F' => 0xFF,
                _ => 0x00,
            };
            i += 1;
        }
        row += 1;
    }
    out
}

pub const VRAM_BASE: [u8; 0x200] = build_vram_base();

/// Planar tile store mirroring console VRAM, plus its one-byte-per-pixel
/// expansion. Call `unpack` after writing planar data.
#[derive(Clone, PartialEq, Eq)]
pub struct VramCache {
    vram: Vec<u8>,
    tiles: Vec<u8>,
}

impl Default for VramCache {
    fn default() -> Self {
        VramCache {
            vram: vec![0; VRAM_SIZE],
            tiles: vec![0; NUM_TILES * RAW_TILE_SIZE],
        }
    }
}

impl VramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_base(&mut self) {
        self.vram[..VRAM_BASE.len()].copy_from_slice(&VRAM_BASE);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.vram
    }

    /// Planar bytes from `dest` to the end of VRAM, for decoders.
    pub fn tail_mut(&mut self, dest: usize) -> Result<&mut [u8], RomError> {
        if dest > VRAM_SIZE {
            return Err(RomError::VramOverflow { dest, size: 0 });
        }
        Ok(&mut self.vram[dest..])
    }

    pub fn write(&mut self, dest: usize, data: &[u8]) -> Result<(), RomError> {
        if dest + data.len() > VRAM_SIZE {
            return Err(RomError::VramOverflow {
                dest,
                size: data.len(),
            });
        }
        self.vram[dest..dest + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn tile(&self, id: TileId) -> &[u8] {
        let start = (id as usize % NUM_TILES) * RAW_TILE_SIZE;
        &self.tiles[start..start + RAW_TILE_SIZE]
    }

    pub fn is_blank(&self, id: TileId) -> bool {
        self.tile(id).iter().all(|&p| p == 0)
    }

    pub fn unpack(&mut self) {
        for (planar, raw) in self
            .vram
            .chunks_exact(TILE_SIZE)
            .zip(self.tiles.chunks_exact_mut(RAW_TILE_SIZE))
        {
            tile_4bpp_to_raw(planar, raw);
        }
    }
}
