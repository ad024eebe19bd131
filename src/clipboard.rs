//! OSC 52 clipboard handshake (§4.5). Kind priority among `{c,p,s,...}` is
//! `c > p > s`; empty kind strings default to `c`. GET replies are
//! synthesized back into the child's stdin either by the master client
//! supplying data or by a 5 s timeout, whichever comes first.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ClipboardError;
use crate::vt::Terminator;

pub const GET_TIMEOUT_MS: u64 = 5000;
pub const MAX_RESPONSE_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
pub struct PendingSet {
    pub kind: char,
    pub base64_data: String,
}

#[derive(Debug, Clone)]
pub struct PendingGet {
    pub kind: char,
    pub terminator: Terminator,
}

#[derive(Debug, Default)]
pub struct ClipboardHandler {
    pub pending_set: Option<PendingSet>,
    pub pending_get: Option<PendingGet>,
    pub get_timestamp_ms: Option<u64>,
    pub get_sent: bool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `pcs` → `c`, `pc` → `c`, `sp` → `p`, `sc` → `c`, `` (empty) → `c`.
pub fn pick_kind(kinds: &str) -> char {
    if kinds.contains('c') {
        'c'
    } else if kinds.contains('p') {
        'p'
    } else if kinds.contains('s') {
        's'
    } else {
        'c'
    }
}

impl ClipboardHandler {
    /// Parse an OSC 52 payload `<kinds>;<data>` and update pending state.
    /// Returns `true` if this was a GET (caller should notify the master
    /// client that a GET is pending), `false` for SET (or malformed input,
    /// which is dropped per the malformed-OSC error kind).
    pub fn handle_osc52(&mut self, payload: &[u8], terminator: Terminator) -> bool {
        let Ok(text) = std::str::from_utf8(payload) else {
            return false;
        };
        let Some((kinds, data)) = text.split_once(';') else {
            return false;
        };
        let kind = pick_kind(kinds);
        if data == "?" {
            self.pending_get = Some(PendingGet { kind, terminator });
            self.get_timestamp_ms = Some(now_ms());
            self.get_sent = false;
            true
        } else {
            self.pending_set = Some(PendingSet {
                kind,
                base64_data: data.to_string(),
            });
            false
        }
    }

    pub fn mark_get_sent(&mut self) {
        self.get_sent = true;
    }

    pub fn take_pending_set(&mut self) -> Option<PendingSet> {
        self.pending_set.take()
    }

    /// Caller (master client) supplies the clipboard content; synthesizes
    /// `ESC ] 52 ; kind ; base64 ESC \` into the child's stdin and clears
    /// pending GET state. Refuses (drops, per §4.5) payloads that would push
    /// the encoded response past `MAX_RESPONSE_SIZE`.
    pub fn respond_get(&mut self, base64_data: &str) -> Option<Vec<u8>> {
        let pending = self.pending_get.take()?;
        self.get_timestamp_ms = None;
        self.get_sent = false;
        let mut body = format!("\x1b]52;{};{}", pending.kind, base64_data).into_bytes();
        body.extend_from_slice(pending.terminator.bytes());
        if body.len() > MAX_RESPONSE_SIZE {
            log::warn!("{}", ClipboardError::TooLarge(body.len(), MAX_RESPONSE_SIZE));
            return None;
        }
        Some(body)
    }

    /// §4.5 step 4: if the GET has been outstanding longer than the timeout,
    /// synthesize an empty response to unblock the child and clear state.
    pub fn check_timeout(&mut self) -> Option<Vec<u8>> {
        let started = self.get_timestamp_ms?;
        if now_ms().saturating_sub(started) > GET_TIMEOUT_MS {
            let pending = self.pending_get.take();
            let kind = pending.as_ref().map(|p| p.kind).unwrap_or('c');
            let term = pending.map(|p| p.terminator).unwrap_or(Terminator::St);
            self.get_timestamp_ms = None;
            self.get_sent = false;
            let mut out = format!("\x1b]52;{kind};").into_bytes();
            out.extend_from_slice(term.bytes());
            Some(out)
        } else {
            None
        }
    }

    pub fn has_pending_get(&self) -> bool {
        self.pending_get.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_priority_table() {
        assert_eq!(pick_kind("pcs"), 'c');
        assert_eq!(pick_kind("pc"), 'c');
        assert_eq!(pick_kind("sp"), 'p');
        assert_eq!(pick_kind("sc"), 'c');
        assert_eq!(pick_kind(""), 'c');
    }

    #[test]
    fn set_overwrites_pending_and_clear_is_valid() {
        let mut cb = ClipboardHandler::default();
        cb.handle_osc52(b"c;SGVsbG8=", Terminator::St);
        assert_eq!(cb.pending_set.as_ref().unwrap().base64_data, "SGVsbG8=");
        cb.handle_osc52(b"c;", Terminator::St);
        let pending = cb.take_pending_set().unwrap();
        assert_eq!(pending.base64_data, "");
    }

    #[test]
    fn get_round_trip() {
        let mut cb = ClipboardHandler::default();
        let is_get = cb.handle_osc52(b"c;?", Terminator::St);
        assert!(is_get);
        assert!(cb.has_pending_get());
        cb.mark_get_sent();
        let reply = cb.respond_get("d29ybGQ=").unwrap();
        assert_eq!(reply, b"\x1b]52;c;d29ybGQ=\x1b\\".to_vec());
        assert!(!cb.has_pending_get());
    }

    #[test]
    fn get_timeout_emits_empty_response_bel() {
        let mut cb = ClipboardHandler::default();
        cb.handle_osc52(b"c;?", Terminator::Bel);
        cb.get_timestamp_ms = Some(0); // force "long ago"
        let reply = cb.check_timeout().unwrap();
        assert_eq!(reply, b"\x1b]52;c;\x07".to_vec());
        assert!(!cb.has_pending_get());
    }

    #[test]
    fn get_timeout_emits_empty_response_st() {
        let mut cb = ClipboardHandler::default();
        cb.handle_osc52(b"c;?", Terminator::St);
        cb.get_timestamp_ms = Some(0); // force "long ago"
        let reply = cb.check_timeout().unwrap();
        assert_eq!(reply, b"\x1b]52;c;\x1b\\".to_vec());
        assert!(!cb.has_pending_get());
    }
}
