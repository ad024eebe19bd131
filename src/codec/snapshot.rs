//! Full-viewport snapshot construction (§4.6 "Snapshot construction").

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::codec::{pack_cells, pack_row_ids, pack_styles, CursorWire, ScrollbackWire};
use crate::error::CodecError;
use crate::grid::Grid;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotWire {
    #[serde(rename = "type")]
    pub type_: String,
    pub gen: u64,
    pub cols: u16,
    pub rows: u16,
    pub cursor: CursorWire,
    #[serde(rename = "altScreen")]
    pub alt_screen: bool,
    pub scrollback: ScrollbackWire,
    pub cells: ByteBuf,
    pub styles: ByteBuf,
    #[serde(rename = "rowIds")]
    pub row_ids: ByteBuf,
}

/// Build a snapshot of the pane's current viewport at `generation`.
pub fn build_snapshot(grid: &Grid, generation: u64) -> SnapshotWire {
    let rows = grid.rows();
    let cols = grid.cols();
    let mut row_vecs = Vec::with_capacity(rows as usize);
    let mut row_ids = Vec::with_capacity(rows as usize);
    let mut referenced_styles = Vec::new();

    for y in 0..rows {
        let cells = grid.row_cells(y);
        for c in &cells {
            referenced_styles.push(c.style_id());
        }
        row_ids.push(grid.row_id_at(y));
        row_vecs.push(cells);
    }

    SnapshotWire {
        type_: "snapshot".to_string(),
        gen: generation,
        cols,
        rows,
        cursor: grid.cursor().into(),
        alt_screen: grid.is_alt_screen(),
        scrollback: ScrollbackWire {
            total_rows: grid.scrollback_total_rows() as u32,
            viewport_top: grid.scrollback_viewport_top() as u32,
        },
        cells: ByteBuf::from(pack_cells(&row_vecs)),
        styles: ByteBuf::from(pack_styles(&grid.style_table, &referenced_styles)),
        row_ids: ByteBuf::from(pack_row_ids(&row_ids)),
    }
}

pub fn encode_snapshot(grid: &Grid, generation: u64) -> Result<Vec<u8>, CodecError> {
    crate::codec::encode_framed(&build_snapshot(grid, generation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_s1_echo() {
        let mut grid = Grid::new(10, 5);
        for ch in "hello\r\n".chars() {
            match ch {
                '\r' => grid.carriage_return(),
                '\n' => grid.linefeed(),
                c => grid.print(c),
            }
        }
        let snap = build_snapshot(&grid, 1);
        assert_eq!(snap.cols, 10);
        assert_eq!(snap.rows, 5);
        let row0 = &snap.cells[0..10 * 8];
        let first_cell = u64::from_le_bytes(row0[0..8].try_into().unwrap());
        assert_eq!((first_cell & 0x1FFFFF) as u32, 'h' as u32);
    }

    #[test]
    fn snapshot_roundtrips_through_framing() {
        let grid = Grid::new(4, 2);
        let wire = encode_snapshot(&grid, 0).unwrap();
        let decoded: SnapshotWire = crate::codec::decode_framed(&wire).unwrap();
        assert_eq!(decoded.gen, 0);
        assert_eq!(decoded.cols, 4);
        assert_eq!(decoded.rows, 2);
    }
}
