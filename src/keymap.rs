//! Keyboard and mouse translation (§4.9): pure functions turning a client
//! input event into the bytes to write into a pane's PTY. No teacher module
//! does this — the teacher's TUI client reads a local terminal directly via
//! `crossterm` and never re-encodes input events for a remote PTY — so this
//! is built fresh in the style of the rest of this crate's small, pure,
//! well-tested encode functions (cf. `cell.rs`, `codec/compression.rs`).

use crate::grid::{MouseFormat, MouseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Multi-codepoint grapheme (emoji, combining sequences).
    Text(String),
    Enter,
    Backspace,
    Tab,
    Escape,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowUp,
    ArrowDown,
    ArrowRight,
    ArrowLeft,
    F(u8),
    Modifier(ModifierKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKey {
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    NumLock,
    ScrollLock,
    Hyper,
    Super,
    Os,
    AltGraph,
    Fn,
    FnLock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

#[derive(Debug, Clone)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key: Key,
    pub mods: Modifiers,
}

fn ctrl_byte(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    match upper {
        'A'..='Z' => Some((upper as u8) - b'A' + 1),
        '@' => Some(0x00),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' => Some(0x1F),
        '?' => Some(0x7F),
        _ => None,
    }
}

fn arrow_letter(key: &Key) -> Option<u8> {
    match key {
        Key::ArrowUp => Some(b'A'),
        Key::ArrowDown => Some(b'B'),
        Key::ArrowRight => Some(b'C'),
        Key::ArrowLeft => Some(b'D'),
        _ => None,
    }
}

fn arrow_modifier_code(mods: &Modifiers) -> u8 {
    1 + if mods.alt { 2 } else { 0 } + if mods.ctrl { 4 } else { 0 }
}

fn maybe_esc_prefix(mods: &Modifiers, bytes: Vec<u8>) -> Vec<u8> {
    if mods.alt {
        let mut out = vec![0x1B];
        out.extend(bytes);
        out
    } else {
        bytes
    }
}

/// Render `ev` to the bytes that should be written into the pane's PTY.
/// `application_cursor_keys` mirrors the grid's DECCKM mode.
pub fn key_to_bytes(ev: &KeyEvent, application_cursor_keys: bool) -> Vec<u8> {
    if ev.action == KeyAction::Up {
        return Vec::new();
    }
    if matches!(ev.key, Key::Modifier(_)) {
        return Vec::new();
    }

    if let Key::Char(c) = ev.key {
        if ev.mods.ctrl && c.is_ascii() {
            if let Some(b) = ctrl_byte(c) {
                return maybe_esc_prefix(&ev.mods, vec![b]);
            }
        }
        let mut buf = [0u8; 4];
        let s = c.encode_utf8(&mut buf);
        return maybe_esc_prefix(&ev.mods, s.as_bytes().to_vec());
    }

    if let Key::Text(ref s) = ev.key {
        return maybe_esc_prefix(&ev.mods, s.as_bytes().to_vec());
    }

    if let Some(letter) = arrow_letter(&ev.key) {
        if ev.mods.shift || ev.mods.ctrl || ev.mods.alt {
            let m = arrow_modifier_code(&ev.mods);
            return format!("\x1b[1;{m}{}", letter as char).into_bytes();
        }
        return if application_cursor_keys {
            vec![0x1B, b'O', letter]
        } else {
            vec![0x1B, b'[', letter]
        };
    }

    match ev.key {
        Key::Enter => b"\r".to_vec(),
        Key::Backspace => vec![0x7F],
        Key::Tab => {
            if ev.mods.shift {
                b"\x1b[Z".to_vec()
            } else {
                b"\t".to_vec()
            }
        }
        Key::Escape => vec![0x1B],
        Key::Delete => b"\x1b[3~".to_vec(),
        Key::Insert => b"\x1b[2~".to_vec(),
        Key::Home => b"\x1b[H".to_vec(),
        Key::End => b"\x1b[F".to_vec(),
        Key::PageUp => b"\x1b[5~".to_vec(),
        Key::PageDown => b"\x1b[6~".to_vec(),
        Key::F(1) => b"\x1bOP".to_vec(),
        Key::F(2) => b"\x1bOQ".to_vec(),
        Key::F(3) => b"\x1bOR".to_vec(),
        Key::F(4) => b"\x1bOS".to_vec(),
        Key::F(5) => b"\x1b[15~".to_vec(),
        Key::F(6) => b"\x1b[17~".to_vec(),
        Key::F(7) => b"\x1b[18~".to_vec(),
        Key::F(8) => b"\x1b[19~".to_vec(),
        Key::F(9) => b"\x1b[20~".to_vec(),
        Key::F(10) => b"\x1b[21~".to_vec(),
        Key::F(11) => b"\x1b[23~".to_vec(),
        Key::F(12) => b"\x1b[24~".to_vec(),
        Key::F(_) => Vec::new(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    None,
    WheelUp,
    WheelDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    Move,
}

#[derive(Debug, Clone, Copy)]
pub struct MouseEvent {
    /// 0-based column.
    pub x: u16,
    /// 0-based row.
    pub y: u16,
    pub button: MouseButton,
    pub action: MouseAction,
    pub mods: Modifiers,
}

fn mouse_button_code(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::None => 3,
        MouseButton::WheelUp => 64,
        MouseButton::WheelDown => 65,
    }
}

fn mouse_modifier_bits(mods: &Modifiers) -> u8 {
    (if mods.shift { 4 } else { 0 }) | (if mods.alt { 8 } else { 0 }) | (if mods.ctrl { 16 } else { 0 })
}

/// Render `ev` to the bytes that should be written into the pane's PTY,
/// given the grid's current mouse tracking mode and reporting format.
/// Mirrors `key_to_bytes`: a pure translation with no teacher analog,
/// since the teacher never forwards mouse input to a remote PTY.
pub fn mouse_to_bytes(ev: &MouseEvent, mode: MouseMode, format: MouseFormat) -> Vec<u8> {
    if mode == MouseMode::Off {
        return Vec::new();
    }
    if ev.action == MouseAction::Move {
        let dragging = ev.button != MouseButton::None;
        let reportable = match mode {
            MouseMode::Off => false,
            MouseMode::X10 | MouseMode::Normal => false,
            MouseMode::ButtonEvent => dragging,
            MouseMode::AnyEvent => true,
        };
        if !reportable {
            return Vec::new();
        }
    }
    if mode == MouseMode::X10 && ev.action != MouseAction::Press {
        return Vec::new();
    }

    let is_wheel = matches!(ev.button, MouseButton::WheelUp | MouseButton::WheelDown);
    let mut code = mouse_button_code(ev.button);
    if ev.action == MouseAction::Move {
        code |= 32;
    }
    if mode != MouseMode::X10 {
        code |= mouse_modifier_bits(&ev.mods);
    }
    if ev.action == MouseAction::Release && !is_wheel && format != MouseFormat::Sgr {
        code = 3 | if mode != MouseMode::X10 { mouse_modifier_bits(&ev.mods) } else { 0 };
    }

    match format {
        MouseFormat::Sgr => {
            let final_byte = if ev.action == MouseAction::Release { 'm' } else { 'M' };
            format!("\x1b[<{};{};{}{}", code, ev.x + 1, ev.y + 1, final_byte).into_bytes()
        }
        MouseFormat::Urxvt => {
            let final_code = code + 32;
            format!("\x1b[{};{};{}M", final_code, ev.x + 1, ev.y + 1).into_bytes()
        }
        MouseFormat::Default => {
            let cx = (ev.x + 33).min(255) as u8;
            let cy = (ev.y + 33).min(255) as u8;
            vec![0x1B, b'[', b'M', code + 32, cx, cy]
        }
        MouseFormat::Utf8 => {
            let mut out = vec![0x1B, b'[', b'M', code + 32];
            push_utf8_coord(&mut out, ev.x + 33);
            push_utf8_coord(&mut out, ev.y + 33);
            out
        }
    }
}

fn push_utf8_coord(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 4];
    let ch = char::from_u32(value as u32).unwrap_or('\u{FFFD}');
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(key: Key, mods: Modifiers) -> KeyEvent {
        KeyEvent {
            action: KeyAction::Down,
            key,
            mods,
        }
    }

    #[test]
    fn up_action_produces_nothing() {
        let ev = KeyEvent {
            action: KeyAction::Up,
            key: Key::Char('a'),
            mods: Modifiers::default(),
        };
        assert_eq!(key_to_bytes(&ev, false), Vec::<u8>::new());
    }

    #[test]
    fn modifier_only_keys_produce_nothing() {
        let ev = down(Key::Modifier(ModifierKey::Shift), Modifiers::default());
        assert_eq!(key_to_bytes(&ev, false), Vec::<u8>::new());
    }

    #[test]
    fn ctrl_a_through_z() {
        let mods = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        let ev = down(Key::Char('a'), mods);
        assert_eq!(key_to_bytes(&ev, false), vec![0x01]);
        let ev = down(Key::Char('z'), mods);
        assert_eq!(key_to_bytes(&ev, false), vec![0x1A]);
    }

    #[test]
    fn ctrl_special_punctuation() {
        let mods = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        assert_eq!(key_to_bytes(&down(Key::Char('@'), mods), false), vec![0x00]);
        assert_eq!(key_to_bytes(&down(Key::Char('['), mods), false), vec![0x1B]);
        assert_eq!(key_to_bytes(&down(Key::Char('\\'), mods), false), vec![0x1C]);
        assert_eq!(key_to_bytes(&down(Key::Char(']'), mods), false), vec![0x1D]);
        assert_eq!(key_to_bytes(&down(Key::Char('^'), mods), false), vec![0x1E]);
        assert_eq!(key_to_bytes(&down(Key::Char('_'), mods), false), vec![0x1F]);
        assert_eq!(key_to_bytes(&down(Key::Char('?'), mods), false), vec![0x7F]);
    }

    #[test]
    fn alt_prefixes_with_escape() {
        let mods = Modifiers {
            alt: true,
            ..Default::default()
        };
        assert_eq!(key_to_bytes(&down(Key::Char('x'), mods), false), vec![0x1B, b'x']);
    }

    #[test]
    fn arrows_switch_on_application_cursor_mode() {
        let ev = down(Key::ArrowUp, Modifiers::default());
        assert_eq!(key_to_bytes(&ev, false), b"\x1b[A".to_vec());
        assert_eq!(key_to_bytes(&ev, true), b"\x1bOA".to_vec());
    }

    #[test]
    fn arrow_with_modifier_uses_csi_1_m_form() {
        let mods = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        let ev = down(Key::ArrowLeft, mods);
        assert_eq!(key_to_bytes(&ev, false), b"\x1b[1;5D".to_vec());
    }

    #[test]
    fn named_keys() {
        assert_eq!(key_to_bytes(&down(Key::Enter, Modifiers::default()), false), b"\r".to_vec());
        assert_eq!(key_to_bytes(&down(Key::Backspace, Modifiers::default()), false), vec![0x7F]);
        assert_eq!(key_to_bytes(&down(Key::Tab, Modifiers::default()), false), b"\t".to_vec());
        let shift_tab = Modifiers {
            shift: true,
            ..Default::default()
        };
        assert_eq!(key_to_bytes(&down(Key::Tab, shift_tab), false), b"\x1b[Z".to_vec());
        assert_eq!(key_to_bytes(&down(Key::Delete, Modifiers::default()), false), b"\x1b[3~".to_vec());
    }

    #[test]
    fn function_keys() {
        assert_eq!(key_to_bytes(&down(Key::F(1), Modifiers::default()), false), b"\x1bOP".to_vec());
        assert_eq!(key_to_bytes(&down(Key::F(12), Modifiers::default()), false), b"\x1b[24~".to_vec());
    }

    #[test]
    fn multi_byte_text_forwarded_as_is() {
        let ev = down(Key::Text("😀".to_string()), Modifiers::default());
        assert_eq!(key_to_bytes(&ev, false), "😀".as_bytes().to_vec());
        let mods = Modifiers {
            alt: true,
            ..Default::default()
        };
        let ev = down(Key::Text("😀".to_string()), mods);
        let mut expected = vec![0x1B];
        expected.extend_from_slice("😀".as_bytes());
        assert_eq!(key_to_bytes(&ev, false), expected);
    }

    fn click(button: MouseButton, action: MouseAction) -> MouseEvent {
        MouseEvent {
            x: 4,
            y: 2,
            button,
            action,
            mods: Modifiers::default(),
        }
    }

    #[test]
    fn mouse_off_mode_produces_nothing() {
        let ev = click(MouseButton::Left, MouseAction::Press);
        assert_eq!(mouse_to_bytes(&ev, MouseMode::Off, MouseFormat::Default), Vec::<u8>::new());
    }

    #[test]
    fn x10_mode_reports_press_only() {
        let press = click(MouseButton::Left, MouseAction::Press);
        assert_eq!(
            mouse_to_bytes(&press, MouseMode::X10, MouseFormat::Default),
            vec![0x1B, b'[', b'M', 32, 4 + 33, 2 + 33]
        );
        let release = click(MouseButton::Left, MouseAction::Release);
        assert_eq!(mouse_to_bytes(&release, MouseMode::X10, MouseFormat::Default), Vec::<u8>::new());
    }

    #[test]
    fn normal_mode_default_format_release_uses_button_3() {
        let release = click(MouseButton::Left, MouseAction::Release);
        assert_eq!(
            mouse_to_bytes(&release, MouseMode::Normal, MouseFormat::Default),
            vec![0x1B, b'[', b'M', 3 + 32, 4 + 33, 2 + 33]
        );
    }

    #[test]
    fn sgr_format_uses_one_based_coords_and_m_or_m_lower() {
        let press = click(MouseButton::Right, MouseAction::Press);
        assert_eq!(
            mouse_to_bytes(&press, MouseMode::Normal, MouseFormat::Sgr),
            b"\x1b[<2;5;3M".to_vec()
        );
        let release = click(MouseButton::Right, MouseAction::Release);
        assert_eq!(
            mouse_to_bytes(&release, MouseMode::Normal, MouseFormat::Sgr),
            b"\x1b[<2;5;3m".to_vec()
        );
    }

    #[test]
    fn button_event_mode_ignores_plain_move_but_reports_drag() {
        let idle_move = MouseEvent {
            x: 1,
            y: 1,
            button: MouseButton::None,
            action: MouseAction::Move,
            mods: Modifiers::default(),
        };
        assert_eq!(
            mouse_to_bytes(&idle_move, MouseMode::ButtonEvent, MouseFormat::Sgr),
            Vec::<u8>::new()
        );
        let drag = MouseEvent {
            x: 1,
            y: 1,
            button: MouseButton::Left,
            action: MouseAction::Move,
            mods: Modifiers::default(),
        };
        assert_eq!(
            mouse_to_bytes(&drag, MouseMode::ButtonEvent, MouseFormat::Sgr),
            b"\x1b[<32;2;2M".to_vec()
        );
    }

    #[test]
    fn any_event_mode_reports_plain_move() {
        let idle_move = MouseEvent {
            x: 1,
            y: 1,
            button: MouseButton::None,
            action: MouseAction::Move,
            mods: Modifiers::default(),
        };
        assert_eq!(
            mouse_to_bytes(&idle_move, MouseMode::AnyEvent, MouseFormat::Sgr),
            b"\x1b[<35;2;2M".to_vec()
        );
    }

    #[test]
    fn wheel_events_use_high_button_codes_in_sgr() {
        let up = click(MouseButton::WheelUp, MouseAction::Press);
        assert_eq!(
            mouse_to_bytes(&up, MouseMode::Normal, MouseFormat::Sgr),
            b"\x1b[<64;5;3M".to_vec()
        );
    }

    #[test]
    fn urxvt_format_uses_decimal_csi_with_32_offset() {
        let press = click(MouseButton::Left, MouseAction::Press);
        assert_eq!(
            mouse_to_bytes(&press, MouseMode::Normal, MouseFormat::Urxvt),
            b"\x1b[32;5;3M".to_vec()
        );
    }

    #[test]
    fn modifiers_fold_into_the_button_code_outside_x10() {
        let ev = MouseEvent {
            x: 0,
            y: 0,
            button: MouseButton::Left,
            action: MouseAction::Press,
            mods: Modifiers {
                shift: true,
                ..Default::default()
            },
        };
        assert_eq!(mouse_to_bytes(&ev, MouseMode::Normal, MouseFormat::Sgr), b"\x1b[<4;1;1M".to_vec());
    }
}
