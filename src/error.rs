use thiserror::Error;

/// Failures raised by the cartridge accessors and decoders.
///
/// Loaders surface these through `anyhow::Error`; use `downcast_ref::<RomError>()`
/// to recover the kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RomError {
    #[error("unrecognized cartridge header")]
    UnrecognizedCartridge,

    #[error("cartridge image is empty")]
    EmptyImage,

    #[error("cartridge image of {0} bytes is too large")]
    OversizeImage(u64),

    #[error("{what} out of range: 0x{index:X} (limit 0x{limit:X})")]
    OutOfRangeAddress {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("level {level} out of range ({count} levels)")]
    LevelOutOfRange { level: usize, count: usize },

    #[error("VRAM write of 0x{size:X} bytes at 0x{dest:X} overflows")]
    VramOverflow { dest: usize, size: usize },

    #[error("palette write of {count} colors at {dest} overflows")]
    PaletteOverflow { dest: usize, count: usize },

    #[error("decode stopped after 0x{produced:X} of 0x{requested:X} bytes")]
    DecodeBudgetExceeded { requested: usize, produced: usize },

    #[error("{0} is not available for this cartridge")]
    Unsupported(&'static str),
}
