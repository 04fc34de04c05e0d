// Tile sort optimizer. Reordering the tiles of a level's compressed blob
// changes how well it compresses; each strategy orders the sortable tiles
// by a per-tile key, and the arrangement with the smallest encoding wins.

use log::debug;
use serde::Serialize;

use crate::{
    gfx::{compress, Codec},
    tiles::TileDecBounds,
    vram::{NUM_TILES, TILE_SIZE},
};

pub const SORT_REGION_SIZE: usize = NUM_TILES * TILE_SIZE;
// The fixed template tiles at the start of VRAM are never compressed.
const TEMPLATE_SIZE: usize = 0x200;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SortStrategy {
    None,
    Max,
    Mode,
}

impl SortStrategy {
    pub const ALL: [SortStrategy; 3] = [SortStrategy::None, SortStrategy::Max, SortStrategy::Mode];

    fn key(self, tile: &[u8]) -> u8 {
        match self {
            SortStrategy::None => 0,
            SortStrategy::Max => tile.iter().copied().max().unwrap_or(0),
            SortStrategy::Mode => {
                let mut counts = [0u8; 256];
                for &b in tile {
                    counts[b as usize] += 1;
                }
                // First value to reach the highest count wins ties.
                let mut best = (0u8, 0u8);
                for &b in tile {
                    if counts[b as usize] > best.1 {
                        best = (b, counts[b as usize]);
                    }
                }
                best.0
            }
        }
    }
}

/// Winning arrangement of the tile sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortPlan {
    pub strategy: SortStrategy,
    // remap[old tile] = new tile
    pub remap: Vec<u16>,
    pub vram: Vec<u8>,
    pub compressed: Vec<u8>,
}

impl SortPlan {
    pub fn is_identity(&self) -> bool {
        self.remap.iter().enumerate().all(|(i, &t)| i == t as usize)
    }

    pub fn remap_tilemap_word(&self, w: u16) -> u16 {
        (w & !0x3FF) | (self.remap[(w & 0x3FF) as usize] & 0x3FF)
    }
}

#[derive(Copy, Clone)]
struct TileKey {
    num: u16,
    key: u8,
}

/// Tile index ranges that may be reordered: everything between the template
/// and the end of the compressed blob, minus the tiles written by
/// incremental loads. A range straddling the incremental region keeps its
/// sortable parts on either side.
pub fn sortable_ranges(tile_cmp_size: usize, bounds: TileDecBounds) -> Vec<(usize, usize)> {
    let start = TEMPLATE_SIZE / TILE_SIZE;
    let end = NUM_TILES.saturating_sub((SORT_REGION_SIZE - TEMPLATE_SIZE).saturating_sub(tile_cmp_size) / TILE_SIZE);
    if start >= end {
        return vec![];
    }
    if bounds.start >= end || bounds.end <= start {
        return vec![(start, end)];
    }
    let mut ranges = vec![];
    if start < bounds.start {
        ranges.push((start, bounds.start));
    }
    if bounds.end < end {
        ranges.push((bounds.end, end));
    }
    ranges
}

/// Tries every strategy over the first `SORT_REGION_SIZE` bytes of `vram`
/// and returns the one with the smallest encoding; ties keep the earlier
/// strategy, so an unsorted layout wins unless sorting strictly helps.
pub fn plan_sort(vram: &[u8], tile_cmp_size: usize, bounds: TileDecBounds, codec: Codec) -> SortPlan {
    let region = &vram[..SORT_REGION_SIZE];
    let cmp_end = (TEMPLATE_SIZE + tile_cmp_size).min(SORT_REGION_SIZE);
    let ranges = sortable_ranges(tile_cmp_size, bounds);

    let candidate = |strategy: SortStrategy| -> SortPlan {
        let mut order: Vec<TileKey> = region
            .chunks_exact(TILE_SIZE)
            .enumerate()
            .map(|(i, tile)| TileKey {
                num: i as u16,
                key: strategy.key(tile),
            })
            .collect();
        for &(a, b) in &ranges {
            order[a..b].sort_by_key(|t| t.key);
        }

        let mut sorted = vec![0u8; SORT_REGION_SIZE];
        let mut remap = vec![0u16; NUM_TILES];
        for (i, t) in order.iter().enumerate() {
            let src = t.num as usize * TILE_SIZE;
            sorted[i * TILE_SIZE..(i + 1) * TILE_SIZE].copy_from_slice(&region[src..src + TILE_SIZE]);
            remap[t.num as usize] = i as u16;
        }
        let compressed = compress(&sorted[TEMPLATE_SIZE..cmp_end], codec);
        debug!("Tile sort {:?}: 0x{:X} bytes", strategy, compressed.len());
        SortPlan {
            strategy,
            remap,
            vram: sorted,
            compressed,
        }
    };

    SortStrategy::ALL[1..]
        .iter()
        .fold(candidate(SortStrategy::None), |best, &strategy| {
            let next = candidate(strategy);
            if next.compressed.len() < best.compressed.len() {
                next
            } else {
                best
            }
        })
}
