// Enemy property lookup. X3 keeps hit points and damage modifiers in a
// table; the other titles load them as immediates inside each enemy's init
// routine, so those are located by walking the code.

use anyhow::Result;
use log::debug;
use serde::Serialize;

use crate::{
    addr::{BankedAddr, FlatAddr},
    rom::Rom,
    variant::{Cartridge, GameVariant},
};

pub const NUM_PROPERTY_SLOTS: usize = 0x100;
pub const NUM_ENEMY_TYPES: u32 = 107;
const DIRECT_STRIDE: u32 = 5;

const ITER_COUNT: u32 = 100;
const DEPTH_COUNT: u32 = 1;
const JUMP_SEARCH_LEN: u32 = 10;
// Init routines this close to the end of the image are skipped.
const CODE_MARGIN: usize = 0x2000;

// 65816 opcodes and the direct-page slots the init routines store to.
const OP_LDA_IMM: u8 = 0xA9;
const OP_STA_DP: u8 = 0x85;
const OP_JSL: u8 = 0x22;
const OP_RTS: u8 = 0x60;
const OP_RTL: u8 = 0x6B;
const OP_JMP_INDEXED: u8 = 0x7C;
const OP_JSR_INDEXED: u8 = 0xFC;
const DP_HP: u8 = 0x27;
const DP_DAMAGE_MOD: u8 = 0x28;
const MAX_STORES: u32 = 3;

/// ROM locations of one enemy type's hit points and damage modifier.
/// `None` means the value wasn't found; it stands for the zero sentinel of
/// a best-effort scan and is not an error.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub hp: Option<FlatAddr>,
    pub damage_mod: Option<FlatAddr>,
}

impl PropertyInfo {
    pub fn is_complete(&self) -> bool {
        self.hp.is_some() && self.damage_mod.is_some()
    }

    pub fn hp_value(&self, rom: &Rom) -> Option<u8> {
        self.hp.and_then(|a| rom.read_u8(a).ok())
    }

    pub fn damage_mod_value(&self, rom: &Rom) -> Option<u8> {
        self.damage_mod.and_then(|a| rom.read_u8(a).ok())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyTable {
    slots: Vec<PropertyInfo>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        PropertyTable {
            slots: vec![PropertyInfo::default(); NUM_PROPERTY_SLOTS],
        }
    }
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, enemy_type: u8) -> PropertyInfo {
        self.slots[enemy_type as usize]
    }

    pub fn found(&self) -> usize {
        self.slots.iter().filter(|p| p.hp.is_some() || p.damage_mod.is_some()).count()
    }

    pub fn load(rom: &Rom, cart: &Cartridge) -> Result<Self> {
        let Some(table) = cart.tables().properties else {
            return Ok(PropertyTable::new());
        };
        if cart.variant == GameVariant::X3 {
            Ok(PropertyTable::direct(rom.flat(table)))
        } else {
            PropertyTable::scan(rom, table)
        }
    }

    /// Fixed-stride table; slot 0 is unused.
    pub fn direct(table: FlatAddr) -> Self {
        let mut out = PropertyTable::new();
        for i in 1..NUM_ENEMY_TYPES {
            let entry = table + (i - 1) * DIRECT_STRIDE;
            out.slots[i as usize] = PropertyInfo {
                hp: Some(entry + 3u32),
                damage_mod: Some(entry + 4u32),
            };
        }
        out
    }

    /// Scans each enemy's init routine, reached through the word dispatch
    /// table at `dispatch`, for the stores of its hit points and damage modifier.
    pub fn scan(rom: &Rom, dispatch: BankedAddr) -> Result<Self> {
        let mut out = PropertyTable::new();
        for i in 0..NUM_ENEMY_TYPES {
            let entry = BankedAddr::from_bank_offset(dispatch.bank(), rom.read_u16(dispatch + i * 2)?);
            if let Some(start) = init_routine(rom, entry)? {
                out.slots[i as usize] = scan_routine(rom, start);
            }
        }
        debug!("Property scan found {} of {} enemy types", out.found(), NUM_ENEMY_TYPES);
        Ok(out)
    }
}

// The dispatch entry is a long call into a stub that jumps through a table
// of routines; the first table entry is the init routine. Stubs that
// return immediately have no init.
fn init_routine(rom: &Rom, entry: BankedAddr) -> Result<Option<FlatAddr>> {
    if rom.read_u8(entry)? == OP_RTS {
        return Ok(None);
    }
    let target = BankedAddr(rom.read_u24(entry + 1u32)?);
    let mut func = rom.flat(target);
    if func.index() > rom.size().saturating_sub(CODE_MARGIN) {
        return Ok(None);
    }
    let mut found = false;
    for _ in 0..JUMP_SEARCH_LEN {
        if matches!(rom.read_u8(func)?, OP_JMP_INDEXED | OP_JSR_INDEXED) {
            found = true;
            break;
        }
        func += 1u32;
    }
    if !found {
        return Ok(None);
    }
    let jump_table = BankedAddr::from_bank_offset(target.bank(), rom.read_u16(func + 1u32)?);
    let init = rom.read_u16(jump_table)?;
    Ok(Some(rom.flat(BankedAddr::from_bank_offset(target.bank(), init))))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct ScanFrame {
    addr: FlatAddr,
    iterations: u32,
    depth: u32,
}

// Walks forward from `start` looking for `LDA #imm` followed by up to three
// `STA dp`. Long calls are followed up to `DEPTH_COUNT` deep; each frame
// gives up after `ITER_COUNT` bytes.
fn scan_routine(rom: &Rom, start: FlatAddr) -> PropertyInfo {
    let mut info = PropertyInfo::default();
    let byte = |a: FlatAddr| rom.read_u8(a).ok();
    let mut stack = vec![ScanFrame {
        addr: start,
        iterations: 0,
        depth: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.iterations >= ITER_COUNT {
            stack.pop();
            continue;
        }
        let current = frame.addr;
        frame.addr += 1u32;
        frame.iterations += 1;
        let depth = frame.depth;

        let Some(op) = byte(current) else {
            stack.pop();
            continue;
        };
        if op == OP_LDA_IMM && byte(current + 2u32) == Some(OP_STA_DP) {
            for k in 0..MAX_STORES {
                let sta = current + (2 + k * 2);
                if byte(sta) != Some(OP_STA_DP) {
                    break;
                }
                match byte(sta + 1u32) {
                    Some(DP_HP) => info.hp = Some(current + 1u32),
                    Some(DP_DAMAGE_MOD) => info.damage_mod = Some(current + 1u32),
                    _ => {}
                }
            }
        } else if op == OP_JSL && depth < DEPTH_COUNT {
            if let Ok(target) = rom.read_u24(current + 1u32) {
                let callee = rom.flat(BankedAddr(target));
                if callee.index() < rom.size().saturating_sub(ITER_COUNT as usize + 1) {
                    stack.push(ScanFrame {
                        addr: callee,
                        iterations: 0,
                        depth: depth + 1,
                    });
                }
            }
        } else if op == OP_RTS || op == OP_RTL {
            stack.pop();
        }

        if info.is_complete() {
            break;
        }
    }
    info
}
