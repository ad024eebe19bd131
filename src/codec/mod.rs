//! Snapshot/delta wire protocol (§3.6, §4.6): MessagePack payloads framed
//! through [`compression`]. `cells`, `styles`, and `rowIds` are raw binary
//! fields (MessagePack bin, via `serde_bytes`), never base64.

pub mod compression;
pub mod delta;
pub mod snapshot;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, StyleTable};
use crate::error::CodecError;
use crate::grid::Cursor;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CursorWire {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
    pub style: u8,
}

impl From<Cursor> for CursorWire {
    fn from(c: Cursor) -> Self {
        CursorWire {
            x: c.x,
            y: c.y,
            visible: c.visible,
            style: cursor_style_code(c.style),
        }
    }
}

fn cursor_style_code(style: crate::grid::CursorStyle) -> u8 {
    use crate::grid::CursorStyle::*;
    match style {
        BlinkingBlock => 0,
        Block => 2,
        BlinkingUnderline => 3,
        Underline => 4,
        BlinkingBar => 5,
        Bar => 6,
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ScrollbackWire {
    pub total_rows: u32,
    pub viewport_top: u32,
}

/// Pack the cells of `rows` into the `cells` bin field, little-endian, row
/// major, 8 bytes per cell.
pub fn pack_cells(rows: &[Vec<Cell>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.iter().map(|r| r.len() * Cell::BYTES).sum());
    for row in rows {
        for cell in row {
            out.extend_from_slice(&cell.to_le_bytes());
        }
    }
    out
}

/// Pack a set of row IDs as `rows*8` little-endian u64s, in order.
pub fn pack_row_ids(ids: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 8);
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// Pack a style table restricted to `style_ids`, as `[count:u32][{id:u16,
/// style:14}...]`.
pub fn pack_styles(table: &StyleTable, style_ids: &[u16]) -> Vec<u8> {
    let mut ids: Vec<u16> = style_ids.iter().copied().filter(|&id| id != 0).collect();
    ids.sort_unstable();
    ids.dedup();
    let mut out = Vec::with_capacity(4 + ids.len() * 16);
    out.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&table.get(id).to_wire());
    }
    out
}

/// Serialize `value` as MessagePack and apply compression framing.
pub fn encode_framed<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let raw = rmp_serde::to_vec_named(value)?;
    compression::frame(&raw)
}

/// Undo [`encode_framed`] and deserialize. Exposed for tests and for any
/// collaborator that needs to decode what this crate itself produced.
pub fn decode_framed<T: for<'de> Deserialize<'de>>(wire: &[u8]) -> Result<T, CodecError> {
    let raw = compression::unframe(wire)?;
    Ok(rmp_serde::from_slice(&raw)?)
}
