//! IPC command protocol (§6.2): dispatches one line-delimited admin command
//! against the session/config, returning the `OK:`/`ERR:` response line
//! (plus an optional data block). No teacher module owns a line-oriented
//! admin protocol — the closest is the teacher's `socket/server.rs` framed
//! binary IPC — so the dispatcher itself is fresh, built in the small
//! match-on-command-name shape the rest of this crate uses for its pure
//! translation functions (cf. `keymap::key_to_bytes`).

use std::sync::Arc;

use base64::Engine as _;

use crate::config::RuntimeConfig;
use crate::error::IpcError;
use crate::registry::Session;

pub struct CommandContext {
    pub session: Arc<Session>,
    pub config: Arc<RuntimeConfig>,
}

/// The full text to write back to the IPC client: first line `OK:`/`ERR:`,
/// optionally followed by additional data lines.
pub struct CommandResponse(pub String);

impl CommandResponse {
    fn ok(message: impl Into<String>) -> Self {
        CommandResponse(format!("OK: {}\n", message.into()))
    }

    fn ok_with_data(message: impl Into<String>, data: &str) -> Self {
        CommandResponse(format!("OK: {}\n{data}\n", message.into()))
    }

    fn err(message: impl Into<String>) -> Self {
        CommandResponse(format!("ERR: {}\n", message.into()))
    }
}

impl CommandContext {
    pub fn dispatch(&self, line: &str) -> CommandResponse {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');
        let cmd = match parts.next() {
            Some(c) if !c.is_empty() => c,
            _ => return CommandResponse::err("empty command"),
        };
        let rest: Vec<&str> = parts.filter(|s| !s.is_empty()).collect();

        match cmd {
            "ping" => CommandResponse::ok("pong"),
            "status" => self.cmd_status(),
            "quit" => CommandResponse::ok("shutting down"),
            "help" => CommandResponse::ok_with_data("commands", HELP_TEXT),
            "shell" => CommandResponse::ok(std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())),
            "dump" => self.cmd_dump(&rest, false),
            "dump-raw" => self.cmd_dump(&rest, true),
            "debug-capture" => self.cmd_debug_capture(&rest),
            "pty-log" => CommandResponse::ok(format!("pty-log={}", self.config.pty_log_enabled())),
            "pty-log-on" => {
                self.config.set_pty_log_enabled(true);
                CommandResponse::ok("pty logging enabled")
            }
            "pty-log-off" => {
                self.config.set_pty_log_enabled(false);
                CommandResponse::ok("pty logging disabled")
            }
            "ttysize" => self.cmd_ttysize(&rest),
            "layouts" => self.cmd_layouts(),
            "panes" => self.cmd_panes(),
            "windows" => self.cmd_windows(),
            "send" => self.cmd_send(&rest),
            "clipboard-set" => self.cmd_clipboard_set(&rest),
            "clipboard-get" => self.cmd_clipboard_get(&rest),
            "debug-log" => CommandResponse::ok(format!("debug mask={:#x}", self.config.debug_mask())),
            other => CommandResponse::err(IpcError::UnknownCommand(other.to_string()).to_string()),
        }
    }

    fn cmd_status(&self) -> CommandResponse {
        CommandResponse::ok(format!(
            "panes={} windows={}",
            self.session.pane_count(),
            self.session.window_count()
        ))
    }

    fn parse_pane_id(s: &str) -> Result<u64, IpcError> {
        s.parse().map_err(|_| IpcError::MissingArgument("pane_id"))
    }

    fn cmd_dump(&self, rest: &[&str], raw: bool) -> CommandResponse {
        let Some(&id_str) = rest.first() else {
            return CommandResponse::err("usage: dump <pane_id>");
        };
        let id = match Self::parse_pane_id(id_str) {
            Ok(id) => id,
            Err(e) => return CommandResponse::err(e.to_string()),
        };
        let Some(pane) = self.session.get_pane(id) else {
            return CommandResponse::err(IpcError::PaneNotFound(id).to_string());
        };
        let guard = pane.lock().expect("pane lock poisoned");
        let grid = guard.grid();
        let mut out = String::new();
        for y in 0..grid.rows() {
            for cell in grid.row_cells(y) {
                let ch = char::from_u32(cell.codepoint()).unwrap_or(' ');
                out.push(if raw { ch } else if ch == '\0' { ' ' } else { ch });
            }
            out.push('\n');
        }
        CommandResponse::ok_with_data(format!("dump of pane {id}"), out.trim_end())
    }

    fn cmd_debug_capture(&self, rest: &[&str]) -> CommandResponse {
        let Some(&id_str) = rest.first() else {
            return CommandResponse::err("usage: debug-capture <pane_id>");
        };
        let id = match Self::parse_pane_id(id_str) {
            Ok(id) => id,
            Err(e) => return CommandResponse::err(e.to_string()),
        };
        let Some(pane) = self.session.get_pane(id) else {
            return CommandResponse::err(IpcError::PaneNotFound(id).to_string());
        };
        let path = self.config.dlog_path.clone();
        pane.lock().expect("pane lock poisoned").set_debug_capture(Some(path));
        CommandResponse::ok(format!("capturing pane {id}"))
    }

    fn cmd_ttysize(&self, rest: &[&str]) -> CommandResponse {
        let Some(&id_str) = rest.first() else {
            return CommandResponse::err("usage: ttysize <pane_id>");
        };
        let id = match Self::parse_pane_id(id_str) {
            Ok(id) => id,
            Err(e) => return CommandResponse::err(e.to_string()),
        };
        let Some(pane) = self.session.get_pane(id) else {
            return CommandResponse::err(IpcError::PaneNotFound(id).to_string());
        };
        let guard = pane.lock().expect("pane lock poisoned");
        let grid = guard.grid();
        CommandResponse::ok(format!("{}x{}", grid.cols(), grid.rows()))
    }

    fn cmd_layouts(&self) -> CommandResponse {
        let layouts = self.config.load_layouts();
        let names: Vec<&str> = layouts.layouts.iter().map(|t| t.name.as_str()).collect();
        CommandResponse::ok_with_data("layouts", &names.join("\n"))
    }

    fn cmd_panes(&self) -> CommandResponse {
        let mut ids = self.session.pane_ids();
        ids.sort_unstable();
        let text: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        CommandResponse::ok_with_data(format!("{} panes", ids.len()), &text.join("\n"))
    }

    fn cmd_windows(&self) -> CommandResponse {
        let mut ids = self.session.window_ids();
        ids.sort_unstable();
        let text: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        CommandResponse::ok_with_data(format!("{} windows", ids.len()), &text.join("\n"))
    }

    fn cmd_send(&self, rest: &[&str]) -> CommandResponse {
        let Some((&id_str, text_parts)) = rest.split_first() else {
            return CommandResponse::err("usage: send <pane_id> <text>");
        };
        let id = match Self::parse_pane_id(id_str) {
            Ok(id) => id,
            Err(e) => return CommandResponse::err(e.to_string()),
        };
        let Some(pane) = self.session.get_pane(id) else {
            return CommandResponse::err(IpcError::PaneNotFound(id).to_string());
        };
        let text = text_parts.join(" ");
        pane.lock().expect("pane lock poisoned").write_input(text.as_bytes());
        CommandResponse::ok(format!("sent {} bytes to pane {id}", text.len()))
    }

    /// §6.1/S6: stores `text` under `kind` for future `clipboard-get`,
    /// publishes it to the session's clipboard broadcast channel, and
    /// answers any pane currently blocked on an OSC 52 GET of that kind.
    fn cmd_clipboard_set(&self, rest: &[&str]) -> CommandResponse {
        let (Some(&kind_str), Some(text_parts)) = (rest.first(), rest.get(1..)) else {
            return CommandResponse::err("usage: clipboard-set <c|p> <text>");
        };
        if kind_str.len() != 1 || !"cps".contains(kind_str) {
            return CommandResponse::err("kind must be one of c, p, s");
        }
        let kind = kind_str.chars().next().unwrap();
        let text = text_parts.join(" ");
        self.session.clipboard_set(kind, text.clone());

        let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
        for pane_id in self.session.pane_ids() {
            let Some(pane) = self.session.get_pane(pane_id) else { continue };
            let mut pane = pane.lock().expect("pane lock poisoned");
            if pane.clipboard_pending_get_kind() == Some(kind) {
                pane.clipboard_respond_get(&encoded);
            }
        }
        CommandResponse::ok(format!("clipboard {kind_str} set ({} bytes, base64={encoded})", text.len()))
    }

    fn cmd_clipboard_get(&self, rest: &[&str]) -> CommandResponse {
        let Some(&kind_str) = rest.first() else {
            return CommandResponse::err("usage: clipboard-get <c|p>");
        };
        if kind_str.len() != 1 || !"cps".contains(kind_str) {
            return CommandResponse::err("kind must be one of c, p, s");
        }
        let kind = kind_str.chars().next().unwrap();
        match self.session.clipboard_get(kind) {
            Some(text) => CommandResponse::ok_with_data(format!("clipboard {kind_str}"), &text),
            None => CommandResponse::err(format!("clipboard {kind_str} is empty")),
        }
    }
}

const HELP_TEXT: &str = "ping status quit help shell dump dump-raw debug-capture pty-log pty-log-on pty-log-off ttysize layouts panes windows send clipboard-set clipboard-get debug-log";
