//! Packed cell and style records. The bit layouts here are wire format: they
//! are copied byte-for-byte into snapshot and delta payloads, so changing the
//! layout is a protocol break, not a refactor.

use std::collections::HashMap;

/// Content-kind tag occupying bits 21-22 of a packed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentKind {
    Empty = 0,
    Codepoint = 1,
    CodepointGrapheme = 2,
    Extension = 3,
}

impl ContentKind {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => ContentKind::Empty,
            1 => ContentKind::Codepoint,
            2 => ContentKind::CodepointGrapheme,
            _ => ContentKind::Extension,
        }
    }
}

const CODEPOINT_BITS: u32 = 21;
const CODEPOINT_MASK: u64 = (1 << CODEPOINT_BITS) - 1;
const KIND_SHIFT: u32 = CODEPOINT_BITS;
const KIND_MASK: u64 = 0b11;
const STYLE_SHIFT: u32 = KIND_SHIFT + 2;
const STYLE_MASK: u64 = 0xFFFF;
const WIDE_BIT: u64 = 1 << 39;
const NARROW_CONTINUATION_BIT: u64 = 1 << 40;
const WRAP_CONTINUATION_BIT: u64 = 1 << 41;
const PROTECTED_BIT: u64 = 1 << 42;

/// A single packed 8-byte cell: `[codepoint:21][kind:2][style:16][wide][narrow_cont][wrap_cont][protected]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell(pub u64);

impl Cell {
    pub const BYTES: usize = 8;

    pub fn empty() -> Self {
        Cell(0)
    }

    pub fn new(codepoint: char, kind: ContentKind, style_id: u16) -> Self {
        let mut bits = (codepoint as u64) & CODEPOINT_MASK;
        bits |= ((kind as u64) & KIND_MASK) << KIND_SHIFT;
        bits |= ((style_id as u64) & STYLE_MASK) << STYLE_SHIFT;
        Cell(bits)
    }

    pub fn codepoint(&self) -> u32 {
        (self.0 & CODEPOINT_MASK) as u32
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::from_bits((self.0 >> KIND_SHIFT) & KIND_MASK)
    }

    pub fn style_id(&self) -> u16 {
        ((self.0 >> STYLE_SHIFT) & STYLE_MASK) as u16
    }

    pub fn is_wide(&self) -> bool {
        self.0 & WIDE_BIT != 0
    }

    pub fn set_wide(&mut self, wide: bool) {
        self.set_flag(WIDE_BIT, wide);
    }

    pub fn is_narrow_continuation(&self) -> bool {
        self.0 & NARROW_CONTINUATION_BIT != 0
    }

    pub fn set_narrow_continuation(&mut self, v: bool) {
        self.set_flag(NARROW_CONTINUATION_BIT, v);
    }

    pub fn is_wrap_continuation(&self) -> bool {
        self.0 & WRAP_CONTINUATION_BIT != 0
    }

    pub fn set_wrap_continuation(&mut self, v: bool) {
        self.set_flag(WRAP_CONTINUATION_BIT, v);
    }

    pub fn is_protected(&self) -> bool {
        self.0 & PROTECTED_BIT != 0
    }

    pub fn set_protected(&mut self, v: bool) {
        self.set_flag(PROTECTED_BIT, v);
    }

    fn set_flag(&mut self, bit: u64, v: bool) {
        if v {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Cell(u64::from_le_bytes(bytes))
    }
}

/// Color tag per §3.2: `none=0`, `palette=1` (v0 = index), `rgb=2` (v0/v1/v2 = R/G/B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    None,
    Palette(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    fn encode(self) -> [u8; 4] {
        match self {
            Color::None => [0, 0, 0, 0],
            Color::Palette(idx) => [1, idx, 0, 0],
            Color::Rgb(r, g, b) => [2, r, g, b],
        }
    }

    fn decode(bytes: [u8; 4]) -> Self {
        match bytes[0] {
            1 => Color::Palette(bytes[1]),
            2 => Color::Rgb(bytes[1], bytes[2], bytes[3]),
            _ => Color::None,
        }
    }

    pub fn is_red_palette(&self) -> bool {
        matches!(self, Color::Palette(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

impl UnderlineStyle {
    fn to_bits(self) -> u16 {
        match self {
            UnderlineStyle::None => 0,
            UnderlineStyle::Single => 1,
            UnderlineStyle::Double => 2,
            UnderlineStyle::Curly => 3,
            UnderlineStyle::Dotted => 4,
            UnderlineStyle::Dashed => 5,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            1 => UnderlineStyle::Single,
            2 => UnderlineStyle::Double,
            3 => UnderlineStyle::Curly,
            4 => UnderlineStyle::Dotted,
            5 => UnderlineStyle::Dashed,
            _ => UnderlineStyle::None,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StyleFlags: u8 {
        const BOLD          = 1 << 0;
        const ITALIC        = 1 << 1;
        const FAINT         = 1 << 2;
        const BLINK         = 1 << 3;
        const INVERSE       = 1 << 4;
        const INVISIBLE     = 1 << 5;
        const STRIKETHROUGH = 1 << 6;
        const OVERLINE      = 1 << 7;
    }
}

/// A style record: 14 bytes on the wire, `{fg(4), bg(4), underline_color(4), flags(2)}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub flags: StyleFlags,
    pub underline_style: UnderlineStyle,
}

impl Style {
    pub const WIRE_LEN: usize = 14;

    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..4].copy_from_slice(&self.fg.encode());
        out[4..8].copy_from_slice(&self.bg.encode());
        out[8..12].copy_from_slice(&self.underline_color.encode());
        let flags_u16 = self.flags.bits() as u16 | (self.underline_style.to_bits() << 8);
        out[12..14].copy_from_slice(&flags_u16.to_le_bytes());
        out
    }

    pub fn from_wire(bytes: [u8; Self::WIRE_LEN]) -> Self {
        let fg = Color::decode(bytes[0..4].try_into().unwrap());
        let bg = Color::decode(bytes[4..8].try_into().unwrap());
        let underline_color = Color::decode(bytes[8..12].try_into().unwrap());
        let flags_u16 = u16::from_le_bytes(bytes[12..14].try_into().unwrap());
        let flags = StyleFlags::from_bits_truncate((flags_u16 & 0xFF) as u8);
        let underline_style = UnderlineStyle::from_bits(flags_u16 >> 8);
        Style {
            fg,
            bg,
            underline_color,
            flags,
            underline_style,
        }
    }
}

/// Interns [`Style`] values to u16 ids so cells only ever carry a style id.
/// Id 0 is reserved for the default (empty) style and is never emitted in a
/// wire style table, matching "non-zero style IDs referenced" in the
/// snapshot/delta construction contract.
#[derive(Debug, Default)]
pub struct StyleTable {
    by_style: HashMap<Style, u16>,
    by_id: Vec<Style>,
}

impl StyleTable {
    pub fn new() -> Self {
        StyleTable {
            by_style: HashMap::new(),
            by_id: vec![Style::default()],
        }
    }

    pub fn ensure_id(&mut self, style: Style) -> u16 {
        if style == Style::default() {
            return 0;
        }
        if let Some(&id) = self.by_style.get(&style) {
            return id;
        }
        let id = self.by_id.len() as u16;
        self.by_id.push(style);
        self.by_style.insert(style, id);
        id
    }

    pub fn get(&self, id: u16) -> Style {
        self.by_id.get(id as usize).copied().unwrap_or_default()
    }
}

impl std::hash::Hash for Style {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_wire().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_roundtrip() {
        let c = Cell::new('h', ContentKind::Codepoint, 7);
        let bytes = c.to_le_bytes();
        let c2 = Cell::from_le_bytes(bytes);
        assert_eq!(c2.codepoint(), 'h' as u32);
        assert_eq!(c2.kind(), ContentKind::Codepoint);
        assert_eq!(c2.style_id(), 7);
    }

    #[test]
    fn cell_aux_bits_independent_of_codepoint() {
        let mut c = Cell::new('€', ContentKind::Codepoint, 0xFFFF);
        c.set_wide(true);
        c.set_wrap_continuation(true);
        assert!(c.is_wide());
        assert!(c.is_wrap_continuation());
        assert!(!c.is_protected());
        assert_eq!(c.codepoint(), '€' as u32);
        assert_eq!(c.style_id(), 0xFFFF);
    }

    #[test]
    fn style_wire_roundtrip_red_palette() {
        let style = Style {
            fg: Color::Palette(1),
            bg: Color::None,
            underline_color: Color::None,
            flags: StyleFlags::BOLD,
            underline_style: UnderlineStyle::None,
        };
        let wire = style.to_wire();
        assert_eq!(wire.len(), Style::WIRE_LEN);
        let back = Style::from_wire(wire);
        assert_eq!(back, style);
        assert!(back.fg.is_red_palette());
    }

    #[test]
    fn style_wire_roundtrip_rgb_and_underline() {
        let style = Style {
            fg: Color::Rgb(10, 20, 30),
            bg: Color::Rgb(1, 2, 3),
            underline_color: Color::Palette(4),
            flags: StyleFlags::ITALIC | StyleFlags::STRIKETHROUGH,
            underline_style: UnderlineStyle::Curly,
        };
        let back = Style::from_wire(style.to_wire());
        assert_eq!(back, style);
    }

    #[test]
    fn style_table_interns_and_reserves_zero() {
        let mut table = StyleTable::new();
        assert_eq!(table.ensure_id(Style::default()), 0);
        let s = Style {
            fg: Color::Palette(2),
            ..Default::default()
        };
        let id1 = table.ensure_id(s);
        let id2 = table.ensure_id(s);
        assert_eq!(id1, id2);
        assert_ne!(id1, 0);
        assert_eq!(table.get(id1), s);
    }
}
