//! Incremental delta construction (§4.6 "Delta construction"). This build
//! emits viewport-visible dirty rows only — the off-screen/scrollback pass is
//! deliberately not implemented, per the Open Question resolved in
//! DESIGN.md.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::cell::Cell;
use crate::codec::{pack_cells, pack_row_ids, pack_styles, CursorWire, ScrollbackWire};
use crate::error::CodecError;
use crate::grid::Grid;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DirtyRowWire {
    pub id: u64,
    pub cells: ByteBuf,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DeltaWire {
    #[serde(rename = "type")]
    pub type_: String,
    pub gen: u64,
    #[serde(rename = "fromGen")]
    pub from_gen: u64,
    pub cols: u16,
    pub rows: u16,
    pub cursor: CursorWire,
    #[serde(rename = "altScreen")]
    pub alt_screen: bool,
    pub scrollback: ScrollbackWire,
    #[serde(rename = "dirtyRows")]
    pub dirty_rows: Vec<DirtyRowWire>,
    #[serde(rename = "rowIds")]
    pub row_ids: ByteBuf,
    pub styles: ByteBuf,
}

/// Build a delta advancing a client from `from_gen` to `generation`, given
/// the accumulated set of dirty row IDs since `from_gen`. Rows that have
/// since scrolled out of the viewport are dropped (viewport-only policy).
pub fn build_delta(grid: &Grid, generation: u64, from_gen: u64, dirty_ids: &[u64]) -> DeltaWire {
    let rows = grid.rows();
    let cols = grid.cols();
    let mut dirty_rows = Vec::new();
    let mut referenced_styles = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for &id in dirty_ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(y) = (0..rows).find(|&y| grid.row_id_at(y) == id) {
            let cells: Vec<Cell> = grid.row_cells(y);
            for c in &cells {
                referenced_styles.push(c.style_id());
            }
            dirty_rows.push(DirtyRowWire {
                id,
                cells: ByteBuf::from(pack_cells(&[cells])),
            });
        }
    }

    let row_ids: Vec<u64> = (0..rows).map(|y| grid.row_id_at(y)).collect();

    DeltaWire {
        type_: "delta".to_string(),
        gen: generation,
        from_gen,
        cols,
        rows,
        cursor: grid.cursor().into(),
        alt_screen: grid.is_alt_screen(),
        scrollback: ScrollbackWire {
            total_rows: grid.scrollback_total_rows() as u32,
            viewport_top: grid.scrollback_viewport_top() as u32,
        },
        dirty_rows,
        row_ids: ByteBuf::from(pack_row_ids(&row_ids)),
        styles: ByteBuf::from(pack_styles(&grid.style_table, &referenced_styles)),
    }
}

pub fn encode_delta(
    grid: &Grid,
    generation: u64,
    from_gen: u64,
    dirty_ids: &[u64],
) -> Result<Vec<u8>, CodecError> {
    crate::codec::encode_framed(&build_delta(grid, generation, from_gen, dirty_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_s1_echo_single_dirty_row() {
        let mut grid = Grid::new(10, 5);
        for ch in "hello\r\n".chars() {
            match ch {
                '\r' => grid.carriage_return(),
                '\n' => grid.linefeed(),
                c => grid.print(c),
            }
        }
        grid.take_dirty_viewport_rows();
        let world_row_id = grid.row_id_at(1);
        for ch in "world\r\n".chars() {
            match ch {
                '\r' => grid.carriage_return(),
                '\n' => grid.linefeed(),
                c => grid.print(c),
            }
        }
        let dirty = grid.take_dirty_viewport_rows();
        let delta = build_delta(&grid, 2, 1, &dirty);
        assert_eq!(delta.dirty_rows.len(), 1);
        assert_eq!(delta.dirty_rows[0].id, world_row_id);
        let cells = &delta.dirty_rows[0].cells;
        let first = u64::from_le_bytes(cells[0..8].try_into().unwrap());
        assert_eq!((first & 0x1FFFFF) as u32, 'w' as u32);
    }

    #[test]
    fn delta_s2_cursor_home_write_leaves_other_row_untouched() {
        let mut grid = Grid::new(40, 10);
        for ch in "line1\r\nline2\r\n".chars() {
            match ch {
                '\r' => grid.carriage_return(),
                '\n' => grid.linefeed(),
                c => grid.print(c),
            }
        }
        grid.take_dirty_viewport_rows();
        let top_row_id = grid.row_id_at(0);
        grid.cursor_home();
        for c in "start".chars() {
            grid.print(c);
        }
        let dirty = grid.take_dirty_viewport_rows();
        let delta = build_delta(&grid, 2, 1, &dirty);
        assert_eq!(delta.dirty_rows.len(), 1);
        assert_eq!(delta.dirty_rows[0].id, top_row_id);
        let cells = &delta.dirty_rows[0].cells;
        let first = u64::from_le_bytes(cells[0..8].try_into().unwrap());
        assert_eq!((first & 0x1FFFFF) as u32, 's' as u32);
        // line2 is still on its own row, unreferenced by this delta.
        assert!(!delta.dirty_rows.iter().any(|r| r.id == grid.row_id_at(1)));
    }

    #[test]
    fn delta_s3_sgr_color_style_referenced_in_table() {
        let mut grid = Grid::new(20, 5);
        for ch in "plain\r\n".chars() {
            match ch {
                '\r' => grid.carriage_return(),
                '\n' => grid.linefeed(),
                c => grid.print(c),
            }
        }
        grid.take_dirty_viewport_rows();
        let red_row_id = grid.row_id_at(1);
        let mut pen = grid.current_pen();
        pen.fg = crate::cell::Color::Palette(1);
        grid.set_cursor_pen(pen);
        for c in "red".chars() {
            grid.print(c);
        }
        grid.set_cursor_pen(crate::cell::Style::default());
        grid.carriage_return();
        grid.linefeed();

        let dirty = grid.take_dirty_viewport_rows();
        let delta = build_delta(&grid, 2, 1, &dirty);
        let red_row = delta.dirty_rows.iter().find(|r| r.id == red_row_id).unwrap();
        let first = u64::from_le_bytes(red_row.cells[0..8].try_into().unwrap());
        let style_id = ((first >> 23) & 0xFFFF) as u16;
        assert_ne!(style_id, 0);
        let count = u32::from_le_bytes(delta.styles[0..4].try_into().unwrap());
        assert!(count >= 1);
        let mut found_red = false;
        for i in 0..count {
            let off = 4 + i as usize * 16;
            let id = u16::from_le_bytes(delta.styles[off..off + 2].try_into().unwrap());
            if id == style_id {
                let style = crate::cell::Style::from_wire(delta.styles[off + 2..off + 16].try_into().unwrap());
                assert_eq!(style.fg, crate::cell::Color::Palette(1));
                found_red = true;
            }
        }
        assert!(found_red);
    }

    #[test]
    fn delta_roundtrips_through_framing() {
        let grid = Grid::new(4, 2);
        let wire = encode_delta(&grid, 1, 0, &[]).unwrap();
        let decoded: DeltaWire = crate::codec::decode_framed(&wire).unwrap();
        assert_eq!(decoded.from_gen, 0);
        assert_eq!(decoded.gen, 1);
    }
}
