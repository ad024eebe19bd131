//! VT Stream Handler (§4.1): a `vte::Perform` implementation that is pure
//! dispatch. Every method either forwards to a grid mutation primitive or
//! updates pane-reactive state / writes a reply into the child's stdin.
//! Nothing here mutates pane bookkeeping (generation, dirty floor) — that is
//! [`crate::pane::Pane::feed`]'s job, once the whole chunk has been parsed.

use vte::{Params, Perform};

use crate::cell::{Color, Style, StyleFlags, UnderlineStyle};
use crate::clipboard::ClipboardHandler;
use crate::grid::{CharsetKind, CursorStyle, Grid, MouseFormat, MouseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressState {
    #[default]
    None,
    Normal,
    Error,
    Indeterminate,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    PromptStart,
    CommandStart,
    CommandExecuted,
    CommandFinished(Option<i32>),
}

/// One-shot OSC-driven event flags, latched by the stream handler and
/// consumed (and cleared) by whatever drains them each `feed`.
#[derive(Debug, Default)]
pub struct ReactiveState {
    pub title: Option<String>,
    pub title_changed: bool,
    pub bell_pending: bool,
    pub notify_title: Option<String>,
    pub notify_body: Option<String>,
    pub notify_pending: bool,
    pub progress_state: ProgressState,
    pub progress_value: u8,
    pub progress_changed: bool,
    pub shell_event: Option<ShellEvent>,
    pub shell_event_pending: bool,
}

/// Terminator preference carried by a color-query request; the reply MUST
/// use the same terminator the request arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Bel,
    St,
}

impl Terminator {
    pub(crate) fn bytes(self) -> &'static [u8] {
        match self {
            Terminator::Bel => b"\x07",
            Terminator::St => b"\x1b\\",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DcsKind {
    #[default]
    Unknown,
    Decrqss,
    Xtgettcap,
}

pub struct StreamHandler<'a> {
    pub grid: &'a mut Grid,
    pub reactive: &'a mut ReactiveState,
    pub clipboard: &'a mut ClipboardHandler,
    pub reply: &'a mut Vec<u8>,
    pub theme_fg: Option<(u8, u8, u8)>,
    pub theme_bg: Option<(u8, u8, u8)>,
    pub in_band_resize_now: bool,
    dcs_kind: DcsKind,
    dcs_buf: Vec<u8>,
}

fn flatten_params(params: &Params) -> Vec<u16> {
    params.iter().flat_map(|p| p.iter().copied()).collect()
}

fn widen(byte: u8) -> u16 {
    (byte as u16) << 8 | byte as u16
}

fn luminance(r: u8, g: u8, b: u8) -> u32 {
    (2126 * r as u32 + 7152 * g as u32 + 722 * b as u32) / 10000
}

impl<'a> StreamHandler<'a> {
    pub fn new(
        grid: &'a mut Grid,
        reactive: &'a mut ReactiveState,
        clipboard: &'a mut ClipboardHandler,
        reply: &'a mut Vec<u8>,
        theme_fg: Option<(u8, u8, u8)>,
        theme_bg: Option<(u8, u8, u8)>,
    ) -> Self {
        StreamHandler {
            grid,
            reactive,
            clipboard,
            reply,
            theme_fg,
            theme_bg,
            in_band_resize_now: false,
            dcs_kind: DcsKind::Unknown,
            dcs_buf: Vec::new(),
        }
    }

    fn write_reply(&mut self, bytes: &[u8]) {
        // §7: response-buffer-too-small is dropped, never truncated. Our
        // reply sink is an unbounded Vec so the only failure mode is an
        // allocation failure, which we let propagate as a panic-free no-op
        // (allocation failure is not recoverable in safe Rust without a
        // fallible-alloc API, so we simply do nothing on an empty bytes
        // slice — which never happens for our own formatted replies).
        if bytes.is_empty() {
            return;
        }
        self.reply.extend_from_slice(bytes);
    }

    fn reply_da1(&mut self) {
        self.write_reply(b"\x1b[?62;22;52c");
    }

    fn reply_da2(&mut self) {
        self.write_reply(b"\x1b[>1;10;0c");
    }

    fn reply_color_scheme(&mut self) {
        let (r, g, b) = self.theme_bg.unwrap_or((0, 0, 0));
        let y = luminance(r, g, b);
        if y > 127 {
            self.write_reply(b"\x1b[?997;1n");
        } else {
            self.write_reply(b"\x1b[?997;2n");
        }
    }

    fn reply_kitty_keyboard_query(&mut self) {
        let s = format!("\x1b[?{}u", self.grid.kitty_keyboard_flags());
        self.write_reply(s.as_bytes());
    }

    fn reply_cursor_position(&mut self) {
        let c = self.grid.cursor();
        let s = format!("\x1b[{};{}R", c.y + 1, c.x + 1);
        self.write_reply(s.as_bytes());
    }

    /// `slot` is the extra positional field OSC4 echoes back (the queried
    /// palette index); OSC 10/11/12 replies carry no such field.
    fn dispatch_color_reply(&mut self, code: u32, slot: Option<u32>, r: u8, g: u8, b: u8, term: Terminator) {
        let wr = widen(r);
        let wg = widen(g);
        let wb = widen(b);
        let body = format!("rgb:{wr:04x}/{wg:04x}/{wb:04x}");
        let mut out = Vec::new();
        out.extend_from_slice(b"\x1b]");
        out.extend_from_slice(code.to_string().as_bytes());
        out.push(b';');
        if let Some(slot) = slot {
            out.extend_from_slice(slot.to_string().as_bytes());
            out.push(b';');
        }
        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(term.bytes());
        self.write_reply(&out);
    }

    fn handle_osc_color_query(&mut self, which: u32, term: Terminator) {
        let (r, g, b) = match which {
            10 => self.theme_fg.unwrap_or((255, 255, 255)),
            11 => self.theme_bg.unwrap_or((0, 0, 0)),
            12 => self.theme_fg.unwrap_or((255, 255, 255)),
            _ => (0, 0, 0),
        };
        self.dispatch_color_reply(which, None, r, g, b, term);
    }

    fn handle_osc4(&mut self, params: &[&[u8]], term: Terminator) {
        // OSC 4 ; index ; spec (spec == "?" means query, else a set).
        let mut i = 1;
        while i + 1 < params.len() {
            let Ok(index_str) = std::str::from_utf8(params[i]) else {
                break;
            };
            let Ok(index) = index_str.parse::<u8>() else {
                break;
            };
            let spec = params[i + 1];
            if spec == b"?" {
                if let Color::Rgb(r, g, b) = self.grid.resolve_palette(index) {
                    self.dispatch_color_reply(4, Some(index as u32), r, g, b, term);
                }
            } else if let Some((r, g, b)) = parse_xparsecolor(spec) {
                self.grid.set_palette(index, Color::Rgb(r, g, b));
            }
            i += 2;
        }
    }

    fn handle_osc52(&mut self, data: &[u8], term: Terminator) {
        self.clipboard.handle_osc52(data, term);
    }

    fn handle_osc9(&mut self, body: &[u8]) {
        self.reactive.notify_body = Some(String::from_utf8_lossy(body).into_owned());
        self.reactive.notify_pending = true;
    }

    fn handle_osc777(&mut self, params: &[&[u8]]) {
        if params.len() >= 3 && params[1] == b"notify" {
            self.reactive.notify_title = Some(String::from_utf8_lossy(params[2]).into_owned());
            if params.len() >= 4 {
                self.reactive.notify_body = Some(String::from_utf8_lossy(params[3]).into_owned());
            }
            self.reactive.notify_pending = true;
        }
    }

    fn handle_osc9_progress(&mut self, params: &[&[u8]]) {
        // OSC 9 ; 4 ; state ; value
        if params.len() < 3 {
            return;
        }
        let state = match params[2] {
            b"0" => ProgressState::None,
            b"1" => ProgressState::Normal,
            b"2" => ProgressState::Error,
            b"3" => ProgressState::Indeterminate,
            b"4" => ProgressState::Paused,
            _ => return,
        };
        let value = params
            .get(3)
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.parse::<u8>().ok())
            .unwrap_or(0);
        self.reactive.progress_state = state;
        self.reactive.progress_value = value;
        self.reactive.progress_changed = true;
    }

    fn cursor_style_param(style: CursorStyle) -> u8 {
        match style {
            CursorStyle::BlinkingBlock => 1,
            CursorStyle::Block => 2,
            CursorStyle::BlinkingUnderline => 3,
            CursorStyle::Underline => 4,
            CursorStyle::BlinkingBar => 5,
            CursorStyle::Bar => 6,
        }
    }

    fn sgr_params(pen: &Style) -> String {
        let mut parts = vec!["0".to_string()];
        if pen.flags.contains(StyleFlags::BOLD) {
            parts.push("1".into());
        }
        if pen.flags.contains(StyleFlags::FAINT) {
            parts.push("2".into());
        }
        if pen.flags.contains(StyleFlags::ITALIC) {
            parts.push("3".into());
        }
        match pen.underline_style {
            UnderlineStyle::None => {}
            UnderlineStyle::Double => parts.push("21".into()),
            _ => parts.push("4".into()),
        }
        if pen.flags.contains(StyleFlags::BLINK) {
            parts.push("5".into());
        }
        if pen.flags.contains(StyleFlags::INVERSE) {
            parts.push("7".into());
        }
        if pen.flags.contains(StyleFlags::INVISIBLE) {
            parts.push("8".into());
        }
        if pen.flags.contains(StyleFlags::STRIKETHROUGH) {
            parts.push("9".into());
        }
        if pen.flags.contains(StyleFlags::OVERLINE) {
            parts.push("53".into());
        }
        match pen.fg {
            Color::None => {}
            Color::Palette(idx) if idx < 8 => parts.push((30 + idx).to_string()),
            Color::Palette(idx) if idx < 16 => parts.push((90 + idx - 8).to_string()),
            Color::Palette(idx) => parts.push(format!("38;5;{idx}")),
            Color::Rgb(r, g, b) => parts.push(format!("38;2;{r};{g};{b}")),
        }
        match pen.bg {
            Color::None => {}
            Color::Palette(idx) if idx < 8 => parts.push((40 + idx).to_string()),
            Color::Palette(idx) if idx < 16 => parts.push((100 + idx - 8).to_string()),
            Color::Palette(idx) => parts.push(format!("48;5;{idx}")),
            Color::Rgb(r, g, b) => parts.push(format!("48;2;{r};{g};{b}")),
        }
        parts.join(";")
    }

    /// §4.1: DECRQSS answers SGR / DECSCUSR / DECSTBM / DECSLRM status
    /// strings. `Pt` is whatever the client asked about, read off `dcs_buf`
    /// by [`Perform::unhook`].
    fn reply_decrqss(&mut self) {
        let query = String::from_utf8_lossy(&self.dcs_buf).into_owned();
        let mut out = Vec::from(&b"\x1bP"[..]);
        match query.as_str() {
            "m" => {
                out.extend_from_slice(b"1$r");
                out.extend_from_slice(Self::sgr_params(&self.grid.current_pen()).as_bytes());
                out.push(b'm');
            }
            " q" => {
                let code = Self::cursor_style_param(self.grid.cursor().style);
                out.extend_from_slice(b"1$r");
                out.extend_from_slice(code.to_string().as_bytes());
                out.extend_from_slice(b" q");
            }
            "r" => {
                let (top, bottom) = self.grid.scroll_region();
                out.extend_from_slice(b"1$r");
                out.extend_from_slice(format!("{};{}", top + 1, bottom + 1).as_bytes());
                out.push(b'r');
            }
            "s" => {
                out.extend_from_slice(b"1$r");
                out.extend_from_slice(format!("1;{}", self.grid.cols()).as_bytes());
                out.push(b's');
            }
            _ => out.extend_from_slice(b"0$r"),
        }
        out.extend_from_slice(b"\x1b\\");
        self.write_reply(&out);
    }

    /// §4.1: XTGETTCAP answers for `indn`, `Ms`, `query-os-name` (only
    /// recognized terminfo capability names for this implementation).
    /// Requests and replies carry hex-encoded ASCII per xterm's control
    /// sequence definition.
    fn reply_xtgettcap(&mut self) {
        let names: Vec<&[u8]> = self.dcs_buf.split(|&b| b == b';').collect();
        let mut out = Vec::from(&b"\x1bP"[..]);
        let mut any = false;
        for name in names {
            let Some(decoded) = hex_decode(name) else { continue };
            let value = match decoded.as_str() {
                "indn" => Some("\\EM"),
                "Ms" => Some("\\E]52;%p1%s;%p2%s\\007"),
                "query-os-name" => Some("linux"),
                _ => None,
            };
            let Some(value) = value else { continue };
            if any {
                out.push(b';');
            } else {
                out.extend_from_slice(b"1+r");
            }
            any = true;
            out.extend_from_slice(&hex_encode(decoded.as_bytes()));
            out.push(b'=');
            out.extend_from_slice(&hex_encode(value.as_bytes()));
        }
        if !any {
            out.extend_from_slice(b"0+r");
        }
        out.extend_from_slice(b"\x1b\\");
        self.write_reply(&out);
    }

    fn handle_osc133(&mut self, params: &[&[u8]]) {
        let Some(sub) = params.get(1) else { return };
        let ev = match *sub {
            b"A" => ShellEvent::PromptStart,
            b"B" => ShellEvent::CommandStart,
            b"C" => ShellEvent::CommandExecuted,
            b"D" => {
                let code = params
                    .get(2)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<i32>().ok());
                ShellEvent::CommandFinished(code)
            }
            _ => return,
        };
        self.reactive.shell_event = Some(ev);
        self.reactive.shell_event_pending = true;
    }
}

fn hex_encode(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|b| format!("{b:02x}").into_bytes()).collect()
}

fn hex_decode(hex: &[u8]) -> Option<String> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.chunks_exact(2) {
        let s = std::str::from_utf8(chunk).ok()?;
        out.push(u8::from_str_radix(s, 16).ok()?);
    }
    String::from_utf8(out).ok()
}

fn parse_xparsecolor(spec: &[u8]) -> Option<(u8, u8, u8)> {
    let s = std::str::from_utf8(spec).ok()?;
    let rest = s.strip_prefix("rgb:")?;
    let mut parts = rest.split('/');
    let r = u8::from_str_radix(&parts.next()?[..2], 16).ok()?;
    let g = u8::from_str_radix(&parts.next()?[..2], 16).ok()?;
    let b = u8::from_str_radix(&parts.next()?[..2], 16).ok()?;
    Some((r, g, b))
}

impl<'a> Perform for StreamHandler<'a> {
    fn print(&mut self, c: char) {
        self.grid.print(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.reactive.bell_pending = true,
            0x08 => self.grid.backspace(),
            0x09 => self.grid.tab(),
            0x0a | 0x0b | 0x0c => self.grid.linefeed(),
            0x0d => self.grid.carriage_return(),
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        self.dcs_buf.clear();
        self.dcs_kind = match (intermediates.first(), action) {
            (Some(b'$'), 'q') => DcsKind::Decrqss,
            (Some(b'+'), 'q') => DcsKind::Xtgettcap,
            _ => DcsKind::Unknown,
        };
    }

    fn put(&mut self, byte: u8) {
        if self.dcs_kind != DcsKind::Unknown {
            self.dcs_buf.push(byte);
        }
    }

    fn unhook(&mut self) {
        match self.dcs_kind {
            DcsKind::Decrqss => self.reply_decrqss(),
            DcsKind::Xtgettcap => self.reply_xtgettcap(),
            DcsKind::Unknown => {}
        }
        self.dcs_kind = DcsKind::Unknown;
        self.dcs_buf.clear();
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], bell_terminated: bool) {
        if params.is_empty() {
            return;
        }
        let term = if bell_terminated {
            Terminator::Bel
        } else {
            Terminator::St
        };
        let Ok(code_str) = std::str::from_utf8(params[0]) else {
            return;
        };
        match code_str {
            "0" | "2" => {
                if let Some(title) = params.get(1) {
                    self.reactive.title = Some(String::from_utf8_lossy(title).into_owned());
                    self.reactive.title_changed = true;
                }
            }
            "1" => {}
            "4" => self.handle_osc4(params, term),
            "8" => {
                if params.len() >= 3 {
                    let uri = String::from_utf8_lossy(params[2]).into_owned();
                    if uri.is_empty() {
                        self.grid.close_hyperlink();
                    } else {
                        self.grid.open_hyperlink(uri);
                    }
                }
            }
            "9" => {
                if params.get(1) == Some(&b"4".as_slice()) {
                    self.handle_osc9_progress(params);
                } else if let Some(body) = params.get(1) {
                    self.handle_osc9(body);
                }
            }
            "10" => self.handle_osc_color_query(10, term),
            "11" => self.handle_osc_color_query(11, term),
            "12" => self.handle_osc_color_query(12, term),
            "52" => {
                if let Some(data) = params.get(1) {
                    self.handle_osc52(data, term);
                }
            }
            "133" => self.handle_osc133(params),
            "777" => self.handle_osc777(params),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        let p = flatten_params(params);
        let n = |i: usize, default: u16| -> u16 {
            p.get(i).copied().filter(|&v| v != 0).unwrap_or(default)
        };
        let is_private = intermediates.first() == Some(&b'?');

        match action {
            'A' => self.grid.cursor_up(n(0, 1)),
            'B' => self.grid.cursor_down(n(0, 1)),
            'C' => self.grid.cursor_forward(n(0, 1)),
            'D' => self.grid.cursor_backward(n(0, 1)),
            'G' => self.grid.cursor_to_col(n(0, 1).saturating_sub(1)),
            'H' | 'f' => {
                let row = p.first().copied().unwrap_or(1).max(1) - 1;
                let col = p.get(1).copied().unwrap_or(1).max(1) - 1;
                self.grid.cursor_to(row, col);
            }
            'J' => self.grid.erase_in_display(p.first().copied().unwrap_or(0), is_private),
            'K' => self.grid.erase_in_line(p.first().copied().unwrap_or(0), is_private),
            'L' => self.grid.insert_lines(n(0, 1)),
            'M' => self.grid.delete_lines(n(0, 1)),
            '@' => self.grid.insert_chars(n(0, 1)),
            'P' => self.grid.delete_chars(n(0, 1)),
            'r' => {
                let top = p.first().copied().unwrap_or(1).max(1) - 1;
                let bottom = p.get(1).copied().unwrap_or(0);
                self.grid.set_scroll_region(top, bottom.max(1) - 1);
            }
            'm' => self.apply_sgr(&p),
            's' => self.grid.save_cursor(),
            'u' => match intermediates.first() {
                None => self.grid.restore_cursor(),
                Some(b'>') => self.grid.push_kitty_keyboard_flags(p.first().copied().unwrap_or(0) as u8),
                Some(b'<') => self.grid.pop_kitty_keyboard_flags(p.first().copied().unwrap_or(1) as u8),
                Some(b'=') => self.grid.set_kitty_keyboard_flags(p.first().copied().unwrap_or(0) as u8),
                Some(b'?') => self.reply_kitty_keyboard_query(),
                _ => {}
            },
            'n' => self.handle_dsr(&p, is_private),
            'c' => {
                if is_private {
                    // unused secondary-private form
                } else if p.first().copied().unwrap_or(0) == 0 {
                    self.reply_da1();
                }
            }
            '>' if action == '>' => {}
            'h' | 'l' => self.handle_mode(&p, is_private, action == 'h'),
            't' => {}
            'q' if intermediates.first() == Some(&b' ') => {
                // DECSCUSR cursor style
                let style = match p.first().copied().unwrap_or(0) {
                    0 | 1 => CursorStyle::BlinkingBlock,
                    2 => CursorStyle::Block,
                    3 => CursorStyle::BlinkingUnderline,
                    4 => CursorStyle::Underline,
                    5 => CursorStyle::BlinkingBar,
                    6 => CursorStyle::Bar,
                    _ => CursorStyle::Block,
                };
                self.grid.set_cursor_style(style);
            }
            'q' if intermediates.first() == Some(&b'"') => {
                // DECSCA: 1 = protect subsequently printed cells, 0/2 = unprotect.
                let protect = p.first().copied().unwrap_or(0) == 1;
                self.grid.set_protected(protect);
            }
            _ => {}
        }
        if action == '>' && p.first().copied().unwrap_or(0) == 0 {
            self.reply_da2();
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        match (intermediates.first(), byte) {
            (Some(b'#'), b'8') => self.grid.decaln(),
            (None, b'7') => self.grid.save_cursor(),
            (None, b'8') => self.grid.restore_cursor(),
            (None, b'c') => self.grid.full_reset(),
            (Some(b'('), b'0') => self.grid.designate_charset(0, CharsetKind::DecSpecialGraphics),
            (Some(b'('), b'B') => self.grid.designate_charset(0, CharsetKind::Ascii),
            (Some(b')'), b'0') => self.grid.designate_charset(1, CharsetKind::DecSpecialGraphics),
            (Some(b')'), b'B') => self.grid.designate_charset(1, CharsetKind::Ascii),
            _ => {}
        }
    }
}

impl<'a> StreamHandler<'a> {
    fn apply_sgr(&mut self, p: &[u16]) {
        let mut pen = self.grid.current_pen();
        if p.is_empty() {
            self.grid.set_cursor_pen(Style::default());
            return;
        }
        let mut i = 0;
        while i < p.len() {
            match p[i] {
                0 => pen = Style::default(),
                1 => pen.flags |= StyleFlags::BOLD,
                2 => pen.flags |= StyleFlags::FAINT,
                3 => pen.flags |= StyleFlags::ITALIC,
                4 => {
                    pen.underline_style = UnderlineStyle::Single;
                }
                5 | 6 => pen.flags |= StyleFlags::BLINK,
                7 => pen.flags |= StyleFlags::INVERSE,
                8 => pen.flags |= StyleFlags::INVISIBLE,
                9 => pen.flags |= StyleFlags::STRIKETHROUGH,
                21 => pen.underline_style = UnderlineStyle::Double,
                22 => pen.flags.remove(StyleFlags::BOLD | StyleFlags::FAINT),
                23 => pen.flags.remove(StyleFlags::ITALIC),
                24 => pen.underline_style = UnderlineStyle::None,
                25 => pen.flags.remove(StyleFlags::BLINK),
                27 => pen.flags.remove(StyleFlags::INVERSE),
                28 => pen.flags.remove(StyleFlags::INVISIBLE),
                29 => pen.flags.remove(StyleFlags::STRIKETHROUGH),
                53 => pen.flags |= StyleFlags::OVERLINE,
                55 => pen.flags.remove(StyleFlags::OVERLINE),
                30..=37 => pen.fg = Color::Palette((p[i] - 30) as u8),
                39 => pen.fg = Color::None,
                40..=47 => pen.bg = Color::Palette((p[i] - 40) as u8),
                49 => pen.bg = Color::None,
                90..=97 => pen.fg = Color::Palette((p[i] - 90 + 8) as u8),
                100..=107 => pen.bg = Color::Palette((p[i] - 100 + 8) as u8),
                38 | 48 | 58 => {
                    let target = p[i];
                    if let Some(&mode) = p.get(i + 1) {
                        if mode == 5 {
                            if let Some(&idx) = p.get(i + 2) {
                                let c = Color::Palette(idx as u8);
                                match target {
                                    38 => pen.fg = c,
                                    48 => pen.bg = c,
                                    _ => pen.underline_color = c,
                                }
                                i += 2;
                            }
                        } else if mode == 2 {
                            if let (Some(&r), Some(&g), Some(&b)) =
                                (p.get(i + 2), p.get(i + 3), p.get(i + 4))
                            {
                                let c = Color::Rgb(r as u8, g as u8, b as u8);
                                match target {
                                    38 => pen.fg = c,
                                    48 => pen.bg = c,
                                    _ => pen.underline_color = c,
                                }
                                i += 4;
                            }
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        self.grid.set_cursor_pen(pen);
    }

    fn handle_dsr(&mut self, p: &[u16], is_private: bool) {
        if is_private {
            match p.first().copied().unwrap_or(0) {
                996 => self.reply_color_scheme(),
                _ => {}
            }
        } else {
            match p.first().copied().unwrap_or(0) {
                6 => self.reply_cursor_position(),
                _ => {}
            }
        }
    }

    fn handle_mode(&mut self, p: &[u16], is_private: bool, set: bool) {
        for &mode in p {
            if is_private {
                match mode {
                    1 => self.grid.modes.application_cursor_keys = set,
                    25 => self.grid.set_cursor_visible(set),
                    1000 => self.grid.mouse_mode = if set { MouseMode::Normal } else { MouseMode::Off },
                    1002 => {
                        self.grid.mouse_mode = if set {
                            MouseMode::ButtonEvent
                        } else {
                            MouseMode::Off
                        }
                    }
                    1003 => {
                        self.grid.mouse_mode = if set { MouseMode::AnyEvent } else { MouseMode::Off }
                    }
                    1005 => self.grid.mouse_format = if set { MouseFormat::Utf8 } else { MouseFormat::Default },
                    1006 => self.grid.mouse_format = if set { MouseFormat::Sgr } else { MouseFormat::Default },
                    1015 => self.grid.mouse_format = if set { MouseFormat::Urxvt } else { MouseFormat::Default },
                    2004 => self.grid.modes.bracketed_paste = set,
                    2026 => self.grid.modes.sync_output = set,
                    2048 => {
                        self.grid.modes.in_band_resize = set;
                        self.in_band_resize_now = set;
                    }
                    1049 | 47 | 1047 => {
                        if set {
                            self.grid.enter_alt_screen();
                        } else {
                            self.grid.leave_alt_screen();
                        }
                    }
                    6 => self.grid.modes.origin = set,
                    7 => self.grid.modes.autowrap = set,
                    _ => {}
                }
            } else {
                match mode {
                    4 => self.grid.modes.insert = set,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::ClipboardHandler;

    fn run(bytes: &[u8]) -> (Grid, ReactiveState, Vec<u8>) {
        let mut grid = Grid::new(20, 5);
        let mut reactive = ReactiveState::default();
        let mut clipboard = ClipboardHandler::default();
        let mut reply = Vec::new();
        {
            let mut handler =
                StreamHandler::new(&mut grid, &mut reactive, &mut clipboard, &mut reply, None, None);
            let mut parser = vte::Parser::new();
            parser.advance(&mut handler, bytes);
        }
        (grid, reactive, reply)
    }

    #[test]
    fn da1_reply() {
        let (_, _, reply) = run(b"\x1b[c");
        assert_eq!(reply, b"\x1b[?62;22;52c");
        let (_, _, reply2) = run(b"\x1b[0c");
        assert_eq!(reply2, b"\x1b[?62;22;52c");
    }

    #[test]
    fn bell_vs_title_osc() {
        let (_, reactive, _) = run(b"\x1b]0;Title\x07");
        assert_eq!(reactive.title.as_deref(), Some("Title"));
        assert!(!reactive.bell_pending);

        let (_, reactive2, _) = run(b"\x07");
        assert!(reactive2.bell_pending);
    }

    #[test]
    fn sgr_red_palette() {
        let (grid, _, _) = run(b"\x1b[31mred");
        let cell = grid.cell_at(0, 0);
        let style = grid.style_table.get(cell.style_id());
        assert!(style.fg.is_red_palette());
    }

    #[test]
    fn cursor_home_then_write() {
        let (grid, _, _) = run(b"line1\r\nline2\r\n\x1b[Hstart");
        assert_eq!(grid.cell_at(0, 0).codepoint(), 's' as u32);
    }

    #[test]
    fn kitty_keyboard_push_query_pop() {
        let (_, _, reply) = run(b"\x1b[>5u\x1b[?u");
        assert_eq!(reply, b"\x1b[?5u");
        let (grid, _, _) = run(b"\x1b[>5u\x1b[<1u");
        assert_eq!(grid.kitty_keyboard_flags(), 0);
    }

    #[test]
    fn plain_csi_u_still_restores_cursor() {
        let (grid, _, _) = run(b"\x1b[5;5H\x1b[s\x1b[1;1H\x1b[u");
        let c = grid.cursor();
        assert_eq!((c.x, c.y), (4, 4));
    }

    #[test]
    fn decrqss_sgr_reports_bold() {
        let (_, _, reply) = run(b"\x1b[1m\x1bP$qm\x1b\\");
        assert_eq!(reply, b"\x1bP1$r0;1m\x1b\\");
    }

    #[test]
    fn decrqss_unsupported_setting_is_invalid() {
        let (_, _, reply) = run(b"\x1bP$qZ\x1b\\");
        assert_eq!(reply, b"\x1bP0$r\x1b\\");
    }

    #[test]
    fn decsca_marks_printed_cells_protected() {
        let (grid, _, _) = run(b"\x1b[1\"qAB\x1b[0\"qC");
        assert!(grid.cell_at(0, 0).is_protected());
        assert!(grid.cell_at(0, 1).is_protected());
        assert!(!grid.cell_at(0, 2).is_protected());
    }

    #[test]
    fn selective_erase_spares_protected_cells() {
        let (grid, _, _) = run(b"\x1b[1\"qAB\x1b[0\"qCD\x1b[H\x1b[?2K");
        assert_eq!(grid.cell_at(0, 0).codepoint(), 'A' as u32);
        assert_eq!(grid.cell_at(0, 1).codepoint(), 'B' as u32);
        assert_eq!(grid.cell_at(0, 2).codepoint(), 0);
        assert_eq!(grid.cell_at(0, 3).codepoint(), 0);
    }

    #[test]
    fn plain_erase_clears_protected_cells_too() {
        let (grid, _, _) = run(b"\x1b[1\"qAB\x1b[H\x1b[2K");
        assert_eq!(grid.cell_at(0, 0).codepoint(), 0);
        assert_eq!(grid.cell_at(0, 1).codepoint(), 0);
    }

    #[test]
    fn osc52_get_remembers_bel_terminator() {
        let mut grid = Grid::new(20, 5);
        let mut reactive = ReactiveState::default();
        let mut clipboard = ClipboardHandler::default();
        let mut reply = Vec::new();
        {
            let mut handler =
                StreamHandler::new(&mut grid, &mut reactive, &mut clipboard, &mut reply, None, None);
            let mut parser = vte::Parser::new();
            parser.advance(&mut handler, b"\x1b]52;c;?\x07");
        }
        assert_eq!(clipboard.pending_get.as_ref().unwrap().terminator, Terminator::Bel);
    }

    #[test]
    fn osc52_get_remembers_st_terminator() {
        let mut grid = Grid::new(20, 5);
        let mut reactive = ReactiveState::default();
        let mut clipboard = ClipboardHandler::default();
        let mut reply = Vec::new();
        {
            let mut handler =
                StreamHandler::new(&mut grid, &mut reactive, &mut clipboard, &mut reply, None, None);
            let mut parser = vte::Parser::new();
            parser.advance(&mut handler, b"\x1b]52;c;?\x1b\\");
        }
        assert_eq!(clipboard.pending_get.as_ref().unwrap().terminator, Terminator::St);
    }

    #[test]
    fn osc4_query_reply_echoes_queried_slot() {
        let (_, _, reply) = run(b"\x1b]4;1;?\x07");
        assert_eq!(reply, b"\x1b]4;1;rgb:cdcd/0000/0000\x07");
    }

    #[test]
    fn xtgettcap_known_name_round_trips() {
        // "Ms" hex-encoded is "4d73"
        let (_, _, reply) = run(b"\x1bP+q4d73\x1b\\");
        assert!(reply.starts_with(b"\x1bP1+r4d73="));
        assert!(reply.ends_with(b"\x1b\\"));
    }

    #[test]
    fn xtgettcap_unknown_name_is_invalid() {
        let (_, _, reply) = run(b"\x1bP+q0000\x1b\\");
        assert_eq!(reply, b"\x1bP0+r\x1b\\");
    }
}
