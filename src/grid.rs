//! The terminal emulator state: active screen (primary/alternate), its
//! scrollback, cursor, modes, palette, scrolling region, charsets, mouse
//! mode/format, kitty keyboard stack, hyperlinks, and protected regions.
//!
//! This is intentionally not built on a pre-existing terminal-state crate:
//! none of the ones in reach model page serials or a row ID stable across
//! everything except reflow, which is load-bearing for the delta protocol.

use std::collections::{HashMap, VecDeque};

use crate::cell::{Cell, Color, ContentKind, Style, StyleTable};
use crate::page::{page_serial_of, Row, PAGE_SIZE};

const DEFAULT_SCROLLBACK_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenKind {
    Primary,
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    #[default]
    Block,
    Underline,
    Bar,
    BlinkingBlock,
    BlinkingUnderline,
    BlinkingBar,
}

#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
    pub style: CursorStyle,
    pub pen: Style,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            x: 0,
            y: 0,
            visible: true,
            style: CursorStyle::default(),
            pen: Style::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMode {
    Off,
    X10,
    Normal,
    ButtonEvent,
    AnyEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseFormat {
    Default,
    Utf8,
    Sgr,
    Urxvt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetKind {
    Ascii,
    DecSpecialGraphics,
}

/// Modes tracked outside the per-screen cursor/scroll-region state; these are
/// process-wide to the pane (shared by primary and alternate screens).
#[derive(Debug, Clone)]
pub struct Modes {
    pub autowrap: bool,
    pub insert: bool,
    pub origin: bool,
    pub application_cursor_keys: bool,
    pub application_keypad: bool,
    pub bracketed_paste: bool,
    pub reverse_video: bool,
    pub in_band_resize: bool,
    pub sync_output: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Modes {
            autowrap: true,
            insert: false,
            origin: false,
            application_cursor_keys: false,
            application_keypad: false,
            bracketed_paste: false,
            reverse_video: false,
            in_band_resize: false,
            sync_output: false,
        }
    }
}

struct Screen {
    cols: u16,
    rows: u16,
    /// Scrollback + visible rows, oldest first. The last `rows` entries are
    /// the live viewport when `viewport_offset == 0`.
    rows_buf: VecDeque<Row>,
    viewport_offset: usize,
    next_seq: u64,
    scrollback_cap: usize,
    cursor: Cursor,
    saved_cursor: Option<Cursor>,
    scroll_top: u16,
    scroll_bottom: u16,
    full_clear: bool,
}

impl Screen {
    fn new(cols: u16, rows: u16, scrollback_cap: usize) -> Self {
        let mut s = Screen {
            cols,
            rows,
            rows_buf: VecDeque::new(),
            viewport_offset: 0,
            next_seq: 0,
            scrollback_cap,
            cursor: Cursor::default(),
            saved_cursor: None,
            scroll_top: 0,
            scroll_bottom: rows.saturating_sub(1),
            full_clear: false,
        };
        for _ in 0..rows {
            s.push_row();
        }
        s
    }

    fn push_row(&mut self) {
        let id = self.next_seq;
        self.next_seq += 1;
        self.rows_buf.push_back(Row::new(id, self.cols));
        let cap = self.scrollback_cap + self.rows as usize;
        while self.rows_buf.len() > cap {
            self.rows_buf.pop_front();
        }
    }

    fn viewport_start_index(&self) -> usize {
        let total = self.rows_buf.len();
        let bottom_start = total.saturating_sub(self.rows as usize);
        bottom_start.saturating_sub(self.viewport_offset)
    }

    fn viewport_row(&self, y: u16) -> Option<&Row> {
        let start = self.viewport_start_index();
        self.rows_buf.get(start + y as usize)
    }

    fn viewport_row_mut(&mut self, y: u16) -> Option<&mut Row> {
        let start = self.viewport_start_index();
        self.rows_buf.get_mut(start + y as usize)
    }

    fn active_row_mut(&mut self, y: u16) -> &mut Row {
        // y is relative to the live (bottom-aligned) screen, not the scrolled
        // viewport: mutation always targets the live screen.
        let total = self.rows_buf.len();
        let bottom_start = total.saturating_sub(self.rows as usize);
        self.rows_buf
            .get_mut(bottom_start + y as usize)
            .expect("row within live screen bounds")
    }

    fn scroll_up(&mut self, n: u16) {
        for _ in 0..n {
            self.push_row();
        }
    }

    fn first_viewport_row_id(&self) -> u64 {
        self.viewport_row(0).map(|r| r.id).unwrap_or(0)
    }

    fn viewport_row_ids(&self) -> Vec<u64> {
        (0..self.rows)
            .map(|y| self.viewport_row(y).map(|r| r.id).unwrap_or(0))
            .collect()
    }

    fn mark_all_dirty(&mut self) {
        let start = self.viewport_start_index();
        for y in 0..self.rows as usize {
            if let Some(r) = self.rows_buf.get_mut(start + y) {
                r.dirty = true;
            }
        }
    }

    fn clear_dirty(&mut self) {
        for r in self.rows_buf.iter_mut() {
            r.dirty = false;
        }
    }

    fn reflow(&mut self, new_cols: u16, new_rows: u16) {
        // Simple reflow: re-wrap each logical (unwrapped-joined) line is out
        // of scope for a from-scratch grid at this size; this implementation
        // preserves row content and truncates/pads columns, which still
        // forces a resize path of rebuilt rows (and therefore fresh IDs).
        let mut new_buf = VecDeque::new();
        let mut seq = 0u64;
        for row in self.rows_buf.drain(..) {
            let mut nr = Row::new(seq, new_cols);
            seq += 1;
            for (i, cell) in row.cells.iter().take(new_cols as usize).enumerate() {
                nr.cells[i] = *cell;
            }
            new_buf.push_back(nr);
        }
        while new_buf.len() < new_rows as usize {
            let id = seq;
            seq += 1;
            new_buf.push_back(Row::new(id, new_cols));
        }
        self.rows_buf = new_buf;
        self.next_seq = seq;
        self.cols = new_cols;
        self.rows = new_rows;
        self.viewport_offset = 0;
        self.scroll_top = 0;
        self.scroll_bottom = new_rows.saturating_sub(1);
        self.cursor.x = self.cursor.x.min(new_cols.saturating_sub(1));
        self.cursor.y = self.cursor.y.min(new_rows.saturating_sub(1));
        self.mark_all_dirty();
    }
}

/// Clear a cell in place unless `selective` erase (DECSED/DECSEL) is asking
/// to spare DECSCA-protected cells.
fn clear_cell(cell: &mut Cell, selective: bool) {
    if selective && cell.is_protected() {
        return;
    }
    *cell = Cell::empty();
}

pub struct Grid {
    primary: Screen,
    alternate: Screen,
    active: ScreenKind,
    pub style_table: StyleTable,
    pub modes: Modes,
    pub mouse_mode: MouseMode,
    pub mouse_format: MouseFormat,
    pub kitty_keyboard_stack: Vec<u8>,
    pub hyperlinks: HashMap<u32, String>,
    next_hyperlink_id: u32,
    current_hyperlink: Option<u32>,
    pub palette: [Color; 256],
    charsets: [CharsetKind; 4],
    gl: u8,
    protected_pen: bool,
}

/// Standard xterm ANSI 16-color defaults (indices 0-15), used to seed the
/// palette and to restore a slot on OSC 104 / DECSTR reset.
const ANSI_16: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00),
    (0xCD, 0x00, 0x00),
    (0x00, 0xCD, 0x00),
    (0xCD, 0xCD, 0x00),
    (0x00, 0x00, 0xEE),
    (0xCD, 0x00, 0xCD),
    (0x00, 0xCD, 0xCD),
    (0xE5, 0xE5, 0xE5),
    (0x7F, 0x7F, 0x7F),
    (0xFF, 0x00, 0x00),
    (0x00, 0xFF, 0x00),
    (0xFF, 0xFF, 0x00),
    (0x5C, 0x5C, 0xFF),
    (0xFF, 0x00, 0xFF),
    (0x00, 0xFF, 0xFF),
    (0xFF, 0xFF, 0xFF),
];

impl Grid {
    pub fn new(cols: u16, rows: u16) -> Self {
        let mut palette = [Color::None; 256];
        for (i, p) in palette.iter_mut().enumerate().take(16) {
            let (r, g, b) = ANSI_16[i];
            *p = Color::Rgb(r, g, b);
        }
        Grid {
            primary: Screen::new(cols, rows, DEFAULT_SCROLLBACK_CAP),
            alternate: Screen::new(cols, rows, 0),
            active: ScreenKind::Primary,
            style_table: StyleTable::new(),
            modes: Modes::default(),
            mouse_mode: MouseMode::Off,
            mouse_format: MouseFormat::Default,
            kitty_keyboard_stack: Vec::new(),
            hyperlinks: HashMap::new(),
            next_hyperlink_id: 1,
            current_hyperlink: None,
            palette,
            charsets: [CharsetKind::Ascii; 4],
            gl: 0,
            protected_pen: false,
        }
    }

    fn screen(&self) -> &Screen {
        match self.active {
            ScreenKind::Primary => &self.primary,
            ScreenKind::Alternate => &self.alternate,
        }
    }

    fn screen_mut(&mut self) -> &mut Screen {
        match self.active {
            ScreenKind::Primary => &mut self.primary,
            ScreenKind::Alternate => &mut self.alternate,
        }
    }

    pub fn is_alt_screen(&self) -> bool {
        self.active == ScreenKind::Alternate
    }

    pub fn cols(&self) -> u16 {
        self.screen().cols
    }

    pub fn rows(&self) -> u16 {
        self.screen().rows
    }

    pub fn cursor(&self) -> Cursor {
        self.screen().cursor
    }

    pub fn set_cursor_pen(&mut self, pen: Style) {
        self.screen_mut().cursor.pen = pen;
    }

    pub fn current_pen(&self) -> Style {
        self.screen().cursor.pen
    }

    pub fn scroll_region(&self) -> (u16, u16) {
        (self.screen().scroll_top, self.screen().scroll_bottom)
    }

    pub fn scrollback_total_rows(&self) -> usize {
        self.screen().rows_buf.len()
    }

    pub fn scrollback_viewport_top(&self) -> usize {
        self.screen().viewport_start_index()
    }

    pub fn row_id_at(&self, y: u16) -> u64 {
        self.screen().viewport_row(y).map(|r| r.id).unwrap_or(0)
    }

    pub fn viewport_top_row_id(&self) -> u64 {
        self.screen().first_viewport_row_id()
    }

    pub fn viewport_top_page_serial(&self) -> u64 {
        page_serial_of(self.viewport_top_row_id())
    }

    pub fn viewport_row_ids(&self) -> Vec<u64> {
        self.screen().viewport_row_ids()
    }

    pub fn cell_at(&self, y: u16, x: u16) -> Cell {
        self.screen()
            .viewport_row(y)
            .and_then(|r| r.cells.get(x as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn row_cells(&self, y: u16) -> Vec<Cell> {
        self.screen()
            .viewport_row(y)
            .map(|r| r.cells.clone())
            .unwrap_or_default()
    }

    /// §4.2 step 5: dirty rows currently in the viewport, with the grid's
    /// "full clear" escape hatch collapsed into "mark everything dirty".
    pub fn take_dirty_viewport_rows(&mut self) -> Vec<u64> {
        let full_clear = self.screen().full_clear;
        if full_clear {
            self.screen_mut().mark_all_dirty();
            self.screen_mut().full_clear = false;
        }
        let rows = self.rows();
        let mut ids = Vec::new();
        for y in 0..rows {
            if let Some(row) = self.screen().viewport_row(y) {
                if row.dirty {
                    ids.push(row.id);
                }
            }
        }
        self.screen_mut().clear_dirty();
        ids
    }

    pub fn mark_all_viewport_dirty(&mut self) {
        self.screen_mut().mark_all_dirty();
    }

    // ---- mutating grid primitives, invoked from the VT stream handler ----

    pub fn print(&mut self, ch: char) {
        let pen = self.current_pen();
        let style_id = self.style_table.ensure_id(pen);
        let autowrap = self.modes.autowrap;
        let insert = self.modes.insert;
        let protected = self.protected_pen;
        let screen = self.screen_mut();
        let cols = screen.cols;
        if screen.cursor.x >= cols {
            if autowrap {
                if let Some(row) = screen.viewport_row_mut(screen.cursor.y) {
                    row.wrapped = true;
                }
                screen.cursor.x = 0;
                Self::linefeed_screen(screen);
            } else {
                screen.cursor.x = cols.saturating_sub(1);
            }
        }
        let x = screen.cursor.x;
        let y = screen.cursor.y;
        let row = screen.active_row_mut(y);
        if insert && (x as usize) < row.cells.len() {
            row.cells.insert(x as usize, Cell::empty());
            row.cells.truncate(cols as usize);
        }
        if let Some(cell) = row.cells.get_mut(x as usize) {
            let mut c = Cell::new(ch, ContentKind::Codepoint, style_id);
            c.set_protected(protected);
            *cell = c;
        }
        row.dirty = true;
        screen.cursor.x += 1;
    }

    /// Returns `true` if the viewport scrolled (and therefore every row's
    /// mapping from row ID to on-screen position needs to be treated as
    /// dirty), `false` if only the cursor moved.
    fn linefeed_screen(screen: &mut Screen) -> bool {
        if screen.cursor.y >= screen.scroll_bottom {
            screen.scroll_up(1);
            true
        } else {
            screen.cursor.y += 1;
            false
        }
    }

    pub fn linefeed(&mut self) {
        if Self::linefeed_screen(self.screen_mut()) {
            self.screen_mut().mark_all_dirty();
        }
    }

    pub fn carriage_return(&mut self) {
        self.screen_mut().cursor.x = 0;
    }

    pub fn backspace(&mut self) {
        let s = self.screen_mut();
        s.cursor.x = s.cursor.x.saturating_sub(1);
    }

    pub fn tab(&mut self) {
        let s = self.screen_mut();
        let next = ((s.cursor.x / 8) + 1) * 8;
        s.cursor.x = next.min(s.cols.saturating_sub(1));
    }

    pub fn cursor_up(&mut self, n: u16) {
        let s = self.screen_mut();
        s.cursor.y = s.cursor.y.saturating_sub(n).max(s.scroll_top);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let s = self.screen_mut();
        s.cursor.y = (s.cursor.y + n).min(s.scroll_bottom);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let s = self.screen_mut();
        s.cursor.x = (s.cursor.x + n).min(s.cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let s = self.screen_mut();
        s.cursor.x = s.cursor.x.saturating_sub(n);
    }

    /// `row`/`col` are 0-based and, under DECOM (origin mode), relative to
    /// the scrolling region rather than the full screen.
    pub fn cursor_to(&mut self, row: u16, col: u16) {
        let origin = self.modes.origin;
        let s = self.screen_mut();
        let (row_base, max_row) = if origin {
            (s.scroll_top, s.scroll_bottom)
        } else {
            (0, s.rows.saturating_sub(1))
        };
        s.cursor.y = (row_base + row).min(max_row);
        s.cursor.x = col.min(s.cols.saturating_sub(1));
    }

    pub fn cursor_to_col(&mut self, col: u16) {
        let s = self.screen_mut();
        s.cursor.x = col.min(s.cols.saturating_sub(1));
    }

    pub fn cursor_home(&mut self) {
        self.cursor_to(0, 0);
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.screen_mut().cursor.visible = visible;
    }

    pub fn set_cursor_style(&mut self, style: CursorStyle) {
        self.screen_mut().cursor.style = style;
    }

    pub fn save_cursor(&mut self) {
        let cur = self.screen().cursor;
        self.screen_mut().saved_cursor = Some(cur);
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.screen().saved_cursor {
            self.screen_mut().cursor = saved;
        }
    }

    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let s = self.screen_mut();
        let bottom = bottom.min(s.rows.saturating_sub(1));
        if top < bottom {
            s.scroll_top = top;
            s.scroll_bottom = bottom;
        } else {
            s.scroll_top = 0;
            s.scroll_bottom = s.rows.saturating_sub(1);
        }
        s.cursor.x = 0;
        s.cursor.y = s.scroll_top;
    }

    /// `selective` is the DECSED form (`CSI ? Ps J`): cells with their
    /// protected bit set (DECSCA) survive the erase.
    pub fn erase_in_display(&mut self, mode: u16, selective: bool) {
        let rows = self.rows();
        let (cy, cx) = {
            let c = self.screen().cursor;
            (c.y, c.x)
        };
        match mode {
            0 => {
                self.erase_in_line_from(cy, cx, selective);
                for y in (cy + 1)..rows {
                    self.clear_row(y, selective);
                }
            }
            1 => {
                for y in 0..cy {
                    self.clear_row(y, selective);
                }
                self.erase_in_line_to(cy, cx, selective);
            }
            _ => {
                for y in 0..rows {
                    self.clear_row(y, selective);
                }
                self.screen_mut().full_clear = true;
            }
        }
    }

    /// `selective` is the DECSEL form (`CSI ? Ps K`): see [`Self::erase_in_display`].
    pub fn erase_in_line(&mut self, mode: u16, selective: bool) {
        let (cy, cx) = {
            let c = self.screen().cursor;
            (c.y, c.x)
        };
        match mode {
            0 => self.erase_in_line_from(cy, cx, selective),
            1 => self.erase_in_line_to(cy, cx, selective),
            _ => self.clear_row(cy, selective),
        }
    }

    fn erase_in_line_from(&mut self, y: u16, from_x: u16, selective: bool) {
        let s = self.screen_mut();
        let row = s.active_row_mut(y);
        for c in row.cells.iter_mut().skip(from_x as usize) {
            clear_cell(c, selective);
        }
        row.dirty = true;
    }

    fn erase_in_line_to(&mut self, y: u16, to_x: u16, selective: bool) {
        let s = self.screen_mut();
        let row = s.active_row_mut(y);
        for c in row.cells.iter_mut().take(to_x as usize + 1) {
            clear_cell(c, selective);
        }
        row.dirty = true;
    }

    fn clear_row(&mut self, y: u16, selective: bool) {
        let row = self.screen_mut().active_row_mut(y);
        for c in row.cells.iter_mut() {
            clear_cell(c, selective);
        }
        row.dirty = true;
    }

    pub fn insert_lines(&mut self, n: u16) {
        let s = self.screen_mut();
        let top = s.cursor.y;
        let bottom = s.scroll_bottom;
        for _ in 0..n.min(bottom.saturating_sub(top) + 1) {
            let id = s.next_seq;
            s.next_seq += 1;
            let cols = s.cols;
            let new_row = Row::new(id, cols);
            let start = s.viewport_start_index();
            let abs_bottom = start + bottom as usize;
            if abs_bottom < s.rows_buf.len() {
                s.rows_buf.remove(abs_bottom);
            }
            let abs_top = start + top as usize;
            s.rows_buf.insert(abs_top.min(s.rows_buf.len()), new_row);
        }
        s.mark_all_dirty();
    }

    pub fn delete_lines(&mut self, n: u16) {
        let s = self.screen_mut();
        let top = s.cursor.y;
        let bottom = s.scroll_bottom;
        for _ in 0..n.min(bottom.saturating_sub(top) + 1) {
            let start = s.viewport_start_index();
            let abs_top = start + top as usize;
            if abs_top < s.rows_buf.len() {
                s.rows_buf.remove(abs_top);
            }
            let id = s.next_seq;
            s.next_seq += 1;
            let cols = s.cols;
            let abs_bottom = start + bottom as usize;
            s.rows_buf.insert(abs_bottom.min(s.rows_buf.len()), Row::new(id, cols));
        }
        s.mark_all_dirty();
    }

    pub fn insert_chars(&mut self, n: u16) {
        let s = self.screen_mut();
        let y = s.cursor.y;
        let x = s.cursor.x;
        let cols = s.cols as usize;
        let row = s.active_row_mut(y);
        for _ in 0..n {
            if (x as usize) < row.cells.len() {
                row.cells.insert(x as usize, Cell::empty());
            }
        }
        row.cells.truncate(cols);
        row.dirty = true;
    }

    pub fn delete_chars(&mut self, n: u16) {
        let s = self.screen_mut();
        let y = s.cursor.y;
        let x = s.cursor.x as usize;
        let cols = s.cols as usize;
        let row = s.active_row_mut(y);
        for _ in 0..n {
            if x < row.cells.len() {
                row.cells.remove(x);
            }
        }
        row.cells.resize(cols, Cell::empty());
        row.dirty = true;
    }

    pub fn scroll_viewport(&mut self, delta_rows: i32) {
        let s = self.screen_mut();
        let max_offset = s.rows_buf.len().saturating_sub(s.rows as usize);
        let new_offset = (s.viewport_offset as i64 - delta_rows as i64)
            .clamp(0, max_offset as i64) as usize;
        s.viewport_offset = new_offset;
        s.mark_all_dirty();
    }

    pub fn enter_alt_screen(&mut self) {
        self.active = ScreenKind::Alternate;
        self.alternate.mark_all_dirty();
    }

    pub fn leave_alt_screen(&mut self) {
        self.active = ScreenKind::Primary;
        self.primary.mark_all_dirty();
    }

    pub fn decaln(&mut self) {
        let rows = self.rows();
        let cols = self.cols();
        for y in 0..rows {
            let s = self.screen_mut();
            let row = s.active_row_mut(y);
            for c in row.cells.iter_mut().take(cols as usize) {
                *c = Cell::new('E', ContentKind::Codepoint, 0);
            }
            row.dirty = true;
        }
    }

    pub fn full_reset(&mut self) {
        let cols = self.cols();
        let rows = self.rows();
        self.primary = Screen::new(cols, rows, DEFAULT_SCROLLBACK_CAP);
        self.alternate = Screen::new(cols, rows, 0);
        self.active = ScreenKind::Primary;
        self.modes = Modes::default();
        self.mouse_mode = MouseMode::Off;
        self.mouse_format = MouseFormat::Default;
        self.kitty_keyboard_stack.clear();
        self.hyperlinks.clear();
        self.current_hyperlink = None;
        self.charsets = [CharsetKind::Ascii; 4];
        self.protected_pen = false;
    }

    pub fn designate_charset(&mut self, slot: u8, kind: CharsetKind) {
        if let Some(s) = self.charsets.get_mut(slot as usize) {
            *s = kind;
        }
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.protected_pen = protected;
    }

    pub fn set_palette(&mut self, index: u8, color: Color) {
        self.palette[index as usize] = color;
    }

    /// Resolve a palette slot to concrete RGB, following one level of
    /// indirection if the slot itself references another slot.
    pub fn resolve_palette(&self, index: u8) -> Color {
        match self.palette[index as usize] {
            Color::Palette(idx) => match self.palette[idx as usize] {
                Color::Rgb(r, g, b) => Color::Rgb(r, g, b),
                other => other,
            },
            other => other,
        }
    }

    pub fn reset_palette(&mut self, index: u8) {
        self.palette[index as usize] = match ANSI_16.get(index as usize) {
            Some(&(r, g, b)) => Color::Rgb(r, g, b),
            None => Color::None,
        };
    }

    pub fn push_kitty_keyboard_flags(&mut self, flags: u8) {
        self.kitty_keyboard_stack.push(flags);
    }

    pub fn pop_kitty_keyboard_flags(&mut self, n: u8) {
        for _ in 0..n {
            self.kitty_keyboard_stack.pop();
        }
    }

    pub fn kitty_keyboard_flags(&self) -> u8 {
        self.kitty_keyboard_stack.last().copied().unwrap_or(0)
    }

    pub fn set_kitty_keyboard_flags(&mut self, flags: u8) {
        match self.kitty_keyboard_stack.last_mut() {
            Some(top) => *top = flags,
            None => self.kitty_keyboard_stack.push(flags),
        }
    }

    pub fn open_hyperlink(&mut self, uri: String) -> u32 {
        let id = self.next_hyperlink_id;
        self.next_hyperlink_id += 1;
        self.hyperlinks.insert(id, uri);
        self.current_hyperlink = Some(id);
        id
    }

    pub fn close_hyperlink(&mut self) {
        self.current_hyperlink = None;
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.primary.reflow(cols, rows);
        self.alternate.reflow(cols, rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_advances_cursor_and_dirties_row() {
        let mut g = Grid::new(10, 5);
        g.print('h');
        g.print('i');
        assert_eq!(g.cursor().x, 2);
        assert_eq!(g.cell_at(0, 0).codepoint(), 'h' as u32);
        assert_eq!(g.cell_at(0, 1).codepoint(), 'i' as u32);
        let dirty = g.take_dirty_viewport_rows();
        assert_eq!(dirty.len(), 1);
    }

    #[test]
    fn linefeed_scrolls_and_reassigns_row_ids() {
        let mut g = Grid::new(10, 2);
        let top_before = g.row_id_at(0);
        g.linefeed();
        g.linefeed();
        g.linefeed();
        let top_after = g.row_id_at(0);
        assert_ne!(top_before, top_after);
    }

    #[test]
    fn alt_screen_switch_is_tracked() {
        let mut g = Grid::new(10, 5);
        assert!(!g.is_alt_screen());
        g.enter_alt_screen();
        assert!(g.is_alt_screen());
        g.leave_alt_screen();
        assert!(!g.is_alt_screen());
    }

    #[test]
    fn resize_reflow_changes_row_ids() {
        let mut g = Grid::new(80, 24);
        g.print('x');
        let before = g.viewport_row_ids();
        g.resize(40, 24);
        let after = g.viewport_row_ids();
        assert_ne!(before, after);
    }

    #[test]
    fn style_table_assigns_red_for_sgr31() {
        let mut g = Grid::new(10, 5);
        g.set_cursor_pen(Style {
            fg: Color::Palette(1),
            ..Default::default()
        });
        g.print('r');
        let cell = g.cell_at(0, 0);
        let style = g.style_table.get(cell.style_id());
        assert!(style.fg.is_red_palette());
    }
}
