use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use json_pretty_compact::PrettyCompactFormatter;
use log::info;
use serde::Serialize;
use serde_json::Serializer;

use mmx_level_core::{
    checkpoint::CheckPoint,
    events::{EventInfo, NUM_EVENT_BLOCKS},
    level::{LevelPointers, TableCounts},
    variant::{ExpansionHeader, GameVariant},
    vram::{NUM_TILES, RAW_TILE_SIZE},
    LevelSelection, LoadOptions, RomSession,
};

const SHEET_COLUMNS: usize = 16;

/// Decode one level of a Mega Man X or Rockman & Forte cartridge and export it.
#[derive(Parser, Debug)]
struct Args {
    /// Cartridge image to read
    #[arg(long)]
    rom: PathBuf,

    #[arg(long)]
    level: usize,

    #[arg(long, default_value_t = 0)]
    checkpoint: usize,

    /// Reorder the level's tiles for a smaller compressed size
    #[arg(long)]
    sort: bool,

    /// Write a JSON summary of the level
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write the level's tiles as a PNG sheet
    #[arg(long)]
    tiles: Option<PathBuf>,

    /// Palette line used for the tile sheet
    #[arg(long, default_value_t = 0)]
    palette: usize,

    /// Where to save the image after sorting
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct BlockEvents<'a> {
    block: usize,
    events: &'a [EventInfo],
}

#[derive(Serialize)]
struct LevelSummary<'a> {
    title: String,
    variant: GameVariant,
    expansion: Option<ExpansionHeader>,
    level: usize,
    checkpoint: usize,
    pointers: LevelPointers,
    counts: TableCounts,
    sort_ok: bool,
    width: u8,
    height: u8,
    scene_used: usize,
    // Room available for edits, when the cartridge records it.
    layout_size_limit: Option<usize>,
    event_size_limit: Option<usize>,
    events: Vec<BlockEvents<'a>>,
    checkpoints: Vec<CheckPoint>,
    properties_found: usize,
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Saving {}", path.display());
    let formatter = PrettyCompactFormatter::new();
    let mut data_bytes = vec![];
    let mut ser = Serializer::with_formatter(&mut data_bytes, formatter);
    data.serialize(&mut ser)?;
    fs::write(path, &data_bytes).with_context(|| format!("Unable to write {}", path.display()))?;
    Ok(())
}

fn save_summary(session: &RomSession, path: &Path) -> Result<()> {
    let data = session.level.as_ref().context("No level loaded")?;
    let events = (0..NUM_EVENT_BLOCKS)
        .map(|block| BlockEvents {
            block,
            events: data.events.block(block as u8),
        })
        .filter(|b| !b.events.is_empty())
        .collect();
    let checkpoints = (0..data.checkpoints.len())
        .map(|i| session.checkpoint_values(i))
        .collect::<Result<Vec<_>>>()?;
    let summary = LevelSummary {
        title: session.rom.header().title_string(),
        variant: session.cart.variant,
        expansion: session.cart.expansion,
        level: data.selection.level,
        checkpoint: data.selection.checkpoint,
        pointers: data.pointers,
        counts: data.counts,
        sort_ok: data.sort_ok,
        width: data.layout.width,
        height: data.layout.height,
        scene_used: data.layout.scene_used,
        layout_size_limit: session.cart.layout_size_limit(data.selection.level),
        event_size_limit: session.cart.event_size_limit(data.selection.level),
        events,
        checkpoints,
        properties_found: session.properties.found(),
    };
    save_json(path, &summary)
}

// Colors are 15-bit with red in the high bits.
fn to_rgb(c: u16) -> [u8; 3] {
    let channel = |v: u16| ((v & 0x1F) << 3) as u8;
    [channel(c >> 10), channel(c >> 5), channel(c)]
}

fn save_tile_sheet(session: &RomSession, path: &Path, palette: usize) -> Result<()> {
    info!("Saving {}", path.display());
    let colors = session.palette(palette)?;
    let width = SHEET_COLUMNS * 8;
    let height = NUM_TILES / SHEET_COLUMNS * 8;
    let mut pixels = vec![0u8; width * height * 3];
    for id in 0..NUM_TILES {
        let tile = session.tile(id as u16)?;
        let (tx, ty) = (id % SHEET_COLUMNS * 8, id / SHEET_COLUMNS * 8);
        for (i, &p) in tile.iter().enumerate().take(RAW_TILE_SIZE) {
            let (x, y) = (tx + i % 8, ty + i / 8);
            let offset = (y * width + x) * 3;
            pixels[offset..offset + 3].copy_from_slice(&to_rgb(colors[p as usize & 0xF]));
        }
    }

    let file = fs::File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer.write_image_data(&pixels).context("Failed to write PNG data")?;
    Ok(())
}

pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut session = RomSession::open(&args.rom)?;
    session.load_level(LevelSelection::new(args.level, args.checkpoint), LoadOptions::default())?;

    if args.sort && session.sort_tiles()? {
        if let Some(output) = &args.output {
            session.save_rom(output)?;
        }
    }
    if let Some(path) = &args.summary {
        save_summary(&session, path)?;
    }
    if let Some(path) = &args.tiles {
        save_tile_sheet(&session, path, args.palette)?;
    }
    Ok(())
}
