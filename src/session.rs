use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    checkpoint::{load_checkpoints, CheckPoint, CheckPointInfo},
    error::RomError,
    events::{load_events, EventInfo, EventTable},
    font::{load_font, Font},
    gfx::Codec,
    gfx_assoc::GraphicsAssociations,
    level::{estimate_counts, LayerLayout, LevelPointers, TableCounts},
    map::{CollisionCode, Map, MapCell},
    overlay::{event_bounds, Rect},
    palette::{Palette, PaletteSet},
    props::{PropertyInfo, PropertyTable},
    rom::Rom,
    sort::plan_sort,
    tiles::{dynamic_tile_bounds, load_dynamic_tiles, GraphicsConfig, TileDecBounds},
    variant::Cartridge,
    vram::{TileId, VramCache},
};

// The sorted blob can only replace the stored one when it decodes to the
// start of the sortable region.
const SORTED_BLOB_DEST: usize = 0x200;

/// Which level to load and which load selectors to apply. A selector left
/// at `None` is read from the chosen checkpoint.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelSelection {
    pub level: usize,
    pub checkpoint: usize,
    pub obj_load: Option<u8>,
    pub tile_load: Option<u8>,
    pub pal_load: Option<u8>,
}

impl LevelSelection {
    pub fn new(level: usize, checkpoint: usize) -> Self {
        LevelSelection {
            level,
            checkpoint,
            ..Default::default()
        }
    }
}

/// Steps of `load_level` that may reuse the previous load of the same level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub skip_events: bool,
    pub skip_layout: bool,
}

/// Everything derived from the image for the selected level.
#[derive(Clone)]
pub struct LevelData {
    pub selection: LevelSelection,
    // Selectors after checkpoint defaults are applied.
    pub obj_load: u8,
    pub tile_load: u8,
    pub pal_load: u8,
    pub pointers: LevelPointers,
    pub events: EventTable,
    pub checkpoints: Vec<CheckPointInfo>,
    pub graphics: GraphicsConfig,
    pub tile_bounds: TileDecBounds,
    pub vram: VramCache,
    pub palettes: PaletteSet,
    pub associations: GraphicsAssociations,
    pub counts: TableCounts,
    pub sort_ok: bool,
    pub layout: LayerLayout,
    pub background: Option<LayerLayout>,
}

impl std::fmt::Debug for LevelData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelData")
            .field("selection", &self.selection)
            .field("counts", &self.counts)
            .field("sort_ok", &self.sort_ok)
            .finish_non_exhaustive()
    }
}

/// An open cartridge image and the caches derived from it. Reloading the
/// image or a level builds the new state completely before replacing the
/// old one, so a failed load leaves the session as it was.
pub struct RomSession {
    pub rom: Rom,
    pub cart: Cartridge,
    pub properties: PropertyTable,
    pub level: Option<LevelData>,
}

impl RomSession {
    pub fn open(path: &Path) -> Result<Self> {
        let rom = Rom::load(path)?;
        Self::from_rom(rom).with_context(|| format!("Unable to open {}", path.display()))
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_rom(Rom::from_bytes(data)?)
    }

    fn from_rom(rom: Rom) -> Result<Self> {
        let cart = Cartridge::identify(&rom)?;
        let properties = PropertyTable::load(&rom, &cart)?;
        Ok(RomSession {
            rom,
            cart,
            properties,
            level: None,
        })
    }

    /// Replaces the image with the one at `path`, dropping the loaded level.
    pub fn load_new_rom(&mut self, path: &Path) -> Result<()> {
        info!("Loading ROM from {}", path.display());
        *self = RomSession::open(path)?;
        Ok(())
    }

    pub fn replace_rom(&mut self, data: Vec<u8>) -> Result<()> {
        *self = RomSession::from_bytes(data)?;
        Ok(())
    }

    pub fn save_rom(&self, path: &Path) -> Result<()> {
        info!("Saving ROM to {}", path.display());
        self.rom.save(path)
    }

    pub fn load_level(&mut self, selection: LevelSelection, options: LoadOptions) -> Result<()> {
        let data = self.build_level(selection, options)?;
        info!(
            "Loaded level {} checkpoint {}: {} events, {} checkpoints, 0x{:X} tiles, 0x{:X} blocks, 0x{:X} maps{}",
            selection.level,
            selection.checkpoint,
            data.events.len(),
            data.checkpoints.len(),
            data.counts.tiles,
            data.counts.blocks,
            data.counts.maps,
            if data.sort_ok { "" } else { " (unsortable)" }
        );
        self.level = Some(data);
        Ok(())
    }

    fn build_level(&self, selection: LevelSelection, options: LoadOptions) -> Result<LevelData> {
        let (rom, cart) = (&self.rom, &self.cart);
        let level = selection.level;
        if level >= cart.num_levels() {
            return Err(RomError::LevelOutOfRange {
                level,
                count: cart.num_levels(),
            }
            .into());
        }
        let previous = self.level.as_ref().filter(|d| d.selection.level == level);

        let (events, checkpoints) = match previous {
            Some(prev) if options.skip_events => (prev.events.clone(), prev.checkpoints.clone()),
            _ => {
                let events = load_events(rom, cart, level)?;
                let checkpoints = load_checkpoints(rom, cart, level, &events)?;
                (events, checkpoints)
            }
        };
        let active = match checkpoints.get(selection.checkpoint) {
            Some(info) => Some(info.read(rom)?),
            None if checkpoints.is_empty() && selection.checkpoint == 0 => None,
            None => {
                return Err(RomError::OutOfRangeAddress {
                    what: "checkpoint",
                    index: selection.checkpoint,
                    limit: checkpoints.len(),
                }
                .into())
            }
        };
        let obj_load = selection.obj_load.or(active.map(|c| c.obj_load)).unwrap_or(0);
        let tile_load = selection.tile_load.or(active.map(|c| c.tile_load)).unwrap_or(0);
        let pal_load = selection.pal_load.or(active.map(|c| c.pal_load)).unwrap_or(0);

        let mut palettes = PaletteSet::new();
        palettes.load_static(rom, cart, level)?;
        palettes.load_sprites(rom)?;
        let mut vram = VramCache::new();
        vram.load_base();
        palettes.load_dynamic(rom, cart.variant, level, pal_load)?;
        let mut graphics = GraphicsConfig::load(rom, cart, level)?;
        graphics.decompress_into(rom, cart, &mut vram)?;
        let tile_bounds = dynamic_tile_bounds(rom, cart, level)?;
        load_dynamic_tiles(rom, cart, level, tile_load, &mut vram)?;
        vram.unpack();

        let associations = GraphicsAssociations::load(rom, cart, level, &events)?;
        let pointers = LevelPointers::resolve(rom, cart, level)?;
        let (counts, sort_ok) = estimate_counts(rom, cart, level, &pointers, graphics.size)?;

        let mut layout = match previous {
            Some(prev) if options.skip_layout => prev.layout.clone(),
            _ => LayerLayout::decode(rom, cart, &pointers)?,
        };
        layout.expand(rom, cart, level, &pointers)?;

        Ok(LevelData {
            selection,
            obj_load,
            tile_load,
            pal_load,
            pointers,
            events,
            checkpoints,
            graphics,
            tile_bounds,
            vram,
            palettes,
            associations,
            counts,
            sort_ok,
            layout,
            background: None,
        })
    }

    fn current(&self) -> Result<&LevelData> {
        self.level.as_ref().context("No level loaded")
    }

    /// Decodes the background layer of the loaded level.
    pub fn load_background(&mut self) -> Result<()> {
        let data = self.level.as_ref().context("No level loaded")?;
        let level = data.selection.level;
        let pointers = LevelPointers::resolve_background(&self.rom, &self.cart, level)?;
        let mut layout = LayerLayout::decode(&self.rom, &self.cart, &pointers)?;
        layout.expand(&self.rom, &self.cart, level, &pointers)?;
        info!(
            "Loaded background of level {}: {}x{} scenes",
            level, layout.width, layout.height
        );
        if let Some(data) = self.level.as_mut() {
            data.background = Some(layout);
        }
        Ok(())
    }

    /// Reorders the level's compressed tiles for a smaller encoding and
    /// rewrites the level's maps to match. Returns whether anything changed.
    /// The tiles and maps are written together or not at all: unsortable
    /// levels, and sorted tiles that can't replace the stored blob, leave
    /// the image and VRAM untouched.
    pub fn sort_tiles(&mut self) -> Result<bool> {
        let RomSession { rom, cart, level, .. } = self;
        let data = level.as_mut().context("No level loaded")?;
        if !data.sort_ok {
            info!("Level {} can't be sorted", data.selection.level);
            return Ok(false);
        }
        let plan = plan_sort(
            data.vram.bytes(),
            data.graphics.size,
            data.tile_bounds,
            Codec::for_variant(cart.variant),
        );
        if plan.is_identity() {
            info!("Tile order of level {} is already optimal", data.selection.level);
            return Ok(false);
        }
        let graphics = &data.graphics;
        if graphics.dest != SORTED_BLOB_DEST || plan.compressed.len() > graphics.stored_size {
            warn!(
                "Sorted tiles (0x{:X} bytes for VRAM 0x{:X}) don't fit over 0x{:X} bytes at {}",
                plan.compressed.len(),
                graphics.dest,
                graphics.stored_size,
                graphics.position
            );
            return Ok(false);
        }

        // Read every map word before the first write.
        let mut words = vec![];
        if let Some(maps) = data.pointers.maps {
            for i in 0..data.counts.maps {
                for j in 0..4 {
                    let addr = maps + (i * 8 + j * 2);
                    words.push((addr, plan.remap_tilemap_word(rom.read_u16(addr)?)));
                }
            }
        }

        rom.write_n(graphics.position, &plan.compressed)?;
        for (addr, w) in words {
            rom.write_u16(addr, w)?;
        }
        data.vram.write(0, &plan.vram)?;
        data.vram.unpack();
        info!(
            "Sorted tiles of level {} by {:?}: 0x{:X} compressed bytes",
            data.selection.level,
            plan.strategy,
            plan.compressed.len()
        );
        Ok(true)
    }

    pub fn tile(&self, id: TileId) -> Result<&[u8]> {
        Ok(self.current()?.vram.tile(id))
    }

    pub fn map(&self, index: u16) -> Result<Map> {
        let data = self.current()?;
        let maps = data.pointers.maps.ok_or(RomError::Unsupported("map table"))?;
        let base = maps + index as u32 * 8;
        let mut cells = [MapCell::default(); 4];
        for (i, cell) in cells.iter_mut().enumerate() {
            let w = self.rom.read_u16(base + (i * 2))?;
            *cell = MapCell::from_tilemap_word(w, &data.vram, true);
        }
        let collision = match data.pointers.collisions {
            Some(c) => CollisionCode(self.rom.read_u8(c + index as u32)?),
            None => CollisionCode::NONE,
        };
        Ok(Map { cells, collision })
    }

    pub fn palette(&self, index: usize) -> Result<Palette> {
        Ok(self.current()?.palettes.palette(index))
    }

    pub fn checkpoint(&self, index: usize) -> Result<CheckPointInfo> {
        let checkpoints = &self.current()?.checkpoints;
        checkpoints.get(index).copied().ok_or_else(|| {
            RomError::OutOfRangeAddress {
                what: "checkpoint",
                index,
                limit: checkpoints.len(),
            }
            .into()
        })
    }

    pub fn checkpoint_values(&self, index: usize) -> Result<CheckPoint> {
        Ok(self.checkpoint(index)?.read(&self.rom)?)
    }

    pub fn events(&self, block_id: u8) -> Result<&[EventInfo]> {
        Ok(self.current()?.events.block(block_id))
    }

    pub fn property_of(&self, enemy_type: u8) -> PropertyInfo {
        self.properties.get(enemy_type)
    }

    pub fn event_bounds(&self, event: &EventInfo) -> Result<Rect> {
        let level = self.current()?.selection.level;
        event_bounds(&self.rom, &self.cart, level, event)
    }

    pub fn font(&self) -> Result<Font> {
        load_font(&self.rom, &self.cart)
    }
}
