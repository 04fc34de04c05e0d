pub mod addr;
pub mod checkpoint;
pub mod error;
pub mod events;
pub mod font;
pub mod gfx;
pub mod gfx_assoc;
pub mod level;
pub mod map;
pub mod overlay;
pub mod palette;
pub mod props;
pub mod rom;
pub mod session;
pub mod sort;
pub mod tiles;
pub mod variant;
pub mod vram;

#[cfg(test)]
mod testing;

pub use error::RomError;
pub use session::{LevelSelection, LoadOptions, RomSession};
