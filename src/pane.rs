//! Pane state machine (§3.3, §4.2-§4.4, §4.7): the unit of ownership for one
//! grid, its generation/dirty bookkeeping, and (when attached) one PTY and
//! child process. Grounded on the teacher's `agent/pty/mod.rs` `PtySession`
//! — exclusive PTY+child ownership and `Drop`-based cleanup carry over
//! directly; the vt100 scrollback buffer there is replaced by the
//! generation/dirty-row model this daemon's wire protocol requires.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::clipboard::ClipboardHandler;
use crate::codec::{delta, snapshot};
use crate::error::{CodecError, PaneError};
use crate::grid::Grid;
use crate::spawn::PtyHandle;
use crate::vt::{self, ReactiveState, StreamHandler};

/// §7 back-pressure: max `EAGAIN` retries in [`Pane::write_input`] before
/// giving up on the write.
const WRITE_RETRY_BUDGET: u32 = 50;

pub struct PaneOptions {
    pub id: u64,
    pub cols: u16,
    pub rows: u16,
    pub allow_sync_output: bool,
}

/// What a caller should do with a pane's latest state for one client.
pub enum BroadcastResult {
    /// Client is too far behind (or this is its first attach); send a full
    /// snapshot frame.
    Snapshot(Vec<u8>),
    /// Client can be advanced incrementally. `from_gen` is carried in the
    /// frame too — a client whose own generation is below it must discard
    /// and request a snapshot instead.
    Delta { bytes: Vec<u8>, from_gen: u64 },
    /// Client is already at the current generation; nothing to send.
    Nothing,
}

/// Result of driving one chunk of PTY (or injected) bytes through a pane.
pub struct FeedOutcome {
    /// Bytes the stream handler wrote back into the child's stdin (DA1/DA2,
    /// color replies, clipboard replies, etc.) — already flushed to the PTY
    /// if one is attached; returned again for callers (and tests) that want
    /// to inspect them directly.
    pub reply: Vec<u8>,
    /// DEC synchronized-output on→off transition: caller should flush any
    /// queued client output for this pane in one coherent frame.
    pub flush_now: bool,
}

pub struct Pane {
    pub id: u64,
    grid: Grid,
    cols: u16,
    rows: u16,
    width_px: u16,
    height_px: u16,

    generation: u64,
    dirty_rows: HashSet<u64>,
    dirty_base_gen: u64,
    cached_delta: Option<Vec<u8>>,
    cached_delta_from_gen: u64,
    last_broadcast_gen: u64,

    last_was_alt_screen: bool,
    last_page_serial: u64,

    sync_output_enabled: bool,
    sync_output_start: Option<Instant>,
    sync_output_allowed: bool,

    selection_start: Option<(u16, u16)>,
    selection_active: bool,

    theme_fg: Option<(u8, u8, u8)>,
    theme_bg: Option<(u8, u8, u8)>,

    clipboard: ClipboardHandler,
    reactive: ReactiveState,

    pty: Option<PtyHandle>,
    debug_capture_path: Option<std::path::PathBuf>,
}

impl Pane {
    pub fn new(opts: PaneOptions) -> Self {
        let grid = Grid::new(opts.cols, opts.rows);
        let last_page_serial = grid.viewport_top_page_serial();
        Pane {
            id: opts.id,
            grid,
            cols: opts.cols,
            rows: opts.rows,
            width_px: 0,
            height_px: 0,
            generation: 0,
            dirty_rows: HashSet::new(),
            dirty_base_gen: 0,
            cached_delta: None,
            cached_delta_from_gen: 0,
            last_broadcast_gen: 0,
            last_was_alt_screen: false,
            last_page_serial,
            sync_output_enabled: false,
            sync_output_start: None,
            sync_output_allowed: opts.allow_sync_output,
            selection_start: None,
            selection_active: false,
            theme_fg: None,
            theme_bg: None,
            clipboard: ClipboardHandler::default(),
            reactive: ReactiveState::default(),
            pty: None,
            debug_capture_path: None,
        }
    }

    pub fn attach_pty(&mut self, pty: PtyHandle) {
        self.pty = Some(pty);
    }

    pub fn has_pty(&self) -> bool {
        self.pty.is_some()
    }

    /// Raw fd of the master side, for the multiplexer's `poll` set. `None`
    /// once the pane has shut down its pty.
    pub fn master_raw_fd(&self) -> Option<i32> {
        self.pty.as_ref().and_then(|p| p.master.as_raw_fd())
    }

    pub fn set_debug_capture(&mut self, path: Option<std::path::PathBuf>) {
        self.debug_capture_path = path;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dirty_base_gen(&self) -> u64 {
        self.dirty_base_gen
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    fn capture(&self, bytes: &[u8]) {
        let Some(path) = &self.debug_capture_path else {
            return;
        };
        use std::io::Write as _;
        if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(f, "{hex}");
        }
    }

    /// §4.2: drive the VT parser over `bytes`, detect screen switch / page
    /// reallocation, collect dirty rows, and bump the generation.
    fn feed_inner(&mut self, bytes: &[u8]) -> FeedOutcome {
        self.capture(bytes);

        let mut reply = Vec::new();
        {
            let mut handler = StreamHandler::new(
                &mut self.grid,
                &mut self.reactive,
                &mut self.clipboard,
                &mut reply,
                self.theme_fg,
                self.theme_bg,
            );
            let mut parser = vte::Parser::new();
            parser.advance(&mut handler, bytes);
        }

        let alt_now = self.grid.is_alt_screen();
        if alt_now != self.last_was_alt_screen {
            self.last_was_alt_screen = alt_now;
            self.force_full_resync();
        }

        let page_serial_now = self.grid.viewport_top_page_serial();
        if page_serial_now != self.last_page_serial {
            self.last_page_serial = page_serial_now;
            self.force_full_resync();
        }

        let dirty = self.grid.take_dirty_viewport_rows();
        self.dirty_rows.extend(dirty);

        self.generation = self.generation.wrapping_add(1);

        let flush_now = self.update_sync_output_transition();

        if !reply.is_empty() {
            self.write_input(&reply);
        }

        FeedOutcome { reply, flush_now }
    }

    /// Feed bytes read from the pane's own PTY.
    pub fn feed(&mut self, bytes: &[u8]) -> FeedOutcome {
        self.feed_inner(bytes)
    }

    /// Feed bytes into a pane with no PTY (debug console injection, §4.2).
    pub fn feed_direct(&mut self, bytes: &[u8]) -> FeedOutcome {
        self.feed_inner(bytes)
    }

    fn update_sync_output_transition(&mut self) -> bool {
        let now_on = self.grid.modes.sync_output;
        let mut flush_now = false;
        if now_on && !self.sync_output_enabled {
            self.sync_output_start = Some(Instant::now());
        } else if !now_on && self.sync_output_enabled {
            self.sync_output_start = None;
            flush_now = true;
        }
        self.sync_output_enabled = now_on;
        flush_now
    }

    /// §4.7: a 1 s timeout while sync output is on forces it off. Call
    /// periodically (e.g. from the multiplexer's idle tick).
    pub fn force_sync_disable_if_timed_out(&mut self) -> bool {
        if !self.sync_output_allowed {
            return false;
        }
        if let Some(start) = self.sync_output_start {
            if start.elapsed() >= Duration::from_secs(1) {
                self.sync_output_enabled = false;
                self.sync_output_start = None;
                return true;
            }
        }
        false
    }

    pub fn sync_output_enabled(&self) -> bool {
        self.sync_output_enabled
    }

    /// §4.3 `resize`.
    pub fn resize(&mut self, cols: u16, rows: u16, cell_w: Option<u16>, cell_h: Option<u16>) {
        self.grid.resize(cols, rows);
        self.cols = cols;
        self.rows = rows;
        self.width_px = cell_w.unwrap_or(8).saturating_mul(cols);
        self.height_px = cell_h.unwrap_or(16).saturating_mul(rows);

        if let Some(pty) = &self.pty {
            if let Err(e) = pty.master.resize(portable_pty::PtySize {
                rows,
                cols,
                pixel_width: self.width_px,
                pixel_height: self.height_px,
            }) {
                log::warn!("pane {}: pty resize ioctl failed: {e}", self.id);
            }
        }

        self.sync_output_enabled = false;
        self.sync_output_start = None;
        self.grid.modes.sync_output = false;

        if self.grid.modes.in_band_resize {
            let msg = format!("\x1b[48;{rows};{cols};{};{}t", self.height_px, self.width_px);
            self.write_input(msg.as_bytes());
        }

        self.generation = self.generation.wrapping_add(1);
        self.force_full_resync();
    }

    /// §4.3 `scroll`.
    pub fn scroll(&mut self, delta_rows: i32) {
        self.grid.scroll_viewport(delta_rows);
        let dirty = self.grid.take_dirty_viewport_rows();
        self.dirty_rows.extend(dirty);
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn start_selection(&mut self, x: u16, y: u16) {
        self.selection_start = Some((x, y));
        self.selection_active = true;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn update_selection(&mut self) {
        if self.selection_active {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection_start = None;
        self.selection_active = false;
        self.generation = self.generation.wrapping_add(1);
    }

    /// §4.4 force full resync.
    pub fn force_full_resync(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.dirty_rows.clear();
        self.dirty_base_gen = self.generation;
        self.cached_delta = None;
        self.last_broadcast_gen = self.generation;
        self.grid.mark_all_viewport_dirty();
    }

    pub fn set_theme_colors(&mut self, fg: Option<(u8, u8, u8)>, bg: Option<(u8, u8, u8)>) {
        self.theme_fg = fg;
        self.theme_bg = bg;
    }

    /// §4.6: advance a client currently at `client_gen`.
    pub fn get_broadcast_delta(&mut self, client_gen: u64) -> Result<BroadcastResult, CodecError> {
        if client_gen < self.dirty_base_gen {
            let bytes = snapshot::encode_snapshot(&self.grid, self.generation)?;
            return Ok(BroadcastResult::Snapshot(bytes));
        }
        if client_gen == self.generation {
            return Ok(BroadcastResult::Nothing);
        }
        if self.cached_delta.is_none() || self.last_broadcast_gen != self.generation {
            let from_gen = self.last_broadcast_gen;
            let dirty: Vec<u64> = self.dirty_rows.iter().copied().collect();
            let bytes = delta::encode_delta(&self.grid, self.generation, from_gen, &dirty)?;
            self.cached_delta = Some(bytes);
            self.cached_delta_from_gen = from_gen;
            self.last_broadcast_gen = self.generation;
            self.dirty_rows.clear();
            self.dirty_base_gen = self.generation;
        }
        Ok(BroadcastResult::Delta {
            bytes: self.cached_delta.clone().expect("just populated"),
            from_gen: self.cached_delta_from_gen,
        })
    }

    /// §7 back-pressure: retry on `EAGAIN`/`EWOULDBLOCK` with a short sleep,
    /// up to [`WRITE_RETRY_BUDGET`] attempts; partial writes continue from
    /// where they left off.
    pub fn write_input(&mut self, bytes: &[u8]) {
        use std::io::Write as _;
        let Some(pty) = self.pty.as_mut() else {
            log::warn!("{}", PaneError::NoPty(self.id));
            return;
        };
        let mut remaining = bytes;
        let mut retries = 0u32;
        while !remaining.is_empty() {
            match pty.writer.write(remaining) {
                Ok(0) => break,
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    retries += 1;
                    if retries > WRITE_RETRY_BUDGET {
                        log::warn!("pane {}: {}", self.id, PaneError::WriteBackpressure);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    log::warn!("pane {}: write_input failed: {e}", self.id);
                    break;
                }
            }
        }
    }

    // ---- clipboard (§4.5) ----

    pub fn clipboard_pending_get_kind(&self) -> Option<char> {
        self.clipboard.pending_get.as_ref().map(|g| g.kind)
    }

    pub fn clipboard_mark_get_sent(&mut self) {
        self.clipboard.mark_get_sent();
    }

    pub fn clipboard_take_pending_set(&mut self) -> Option<(char, String)> {
        self.clipboard
            .take_pending_set()
            .map(|s| (s.kind, s.base64_data))
    }

    pub fn clipboard_respond_get(&mut self, base64_data: &str) {
        if let Some(bytes) = self.clipboard.respond_get(base64_data) {
            self.write_input(&bytes);
        }
    }

    /// Call periodically; synthesizes the timeout response into the child's
    /// stdin if the GET has been outstanding too long.
    pub fn clipboard_check_timeout(&mut self) {
        if let Some(bytes) = self.clipboard.check_timeout() {
            self.write_input(&bytes);
        }
    }

    // ---- one-shot reactive flags (§3.3) ----

    pub fn take_title(&mut self) -> Option<String> {
        if self.reactive.title_changed {
            self.reactive.title_changed = false;
            self.reactive.title.clone()
        } else {
            None
        }
    }

    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.reactive.bell_pending)
    }

    pub fn take_notification(&mut self) -> Option<(Option<String>, Option<String>)> {
        if self.reactive.notify_pending {
            self.reactive.notify_pending = false;
            Some((self.reactive.notify_title.take(), self.reactive.notify_body.take()))
        } else {
            None
        }
    }

    pub fn take_progress(&mut self) -> Option<(vt::ProgressState, u8)> {
        if self.reactive.progress_changed {
            self.reactive.progress_changed = false;
            Some((self.reactive.progress_state, self.reactive.progress_value))
        } else {
            None
        }
    }

    pub fn take_shell_event(&mut self) -> Option<vt::ShellEvent> {
        if self.reactive.shell_event_pending {
            self.reactive.shell_event_pending = false;
            self.reactive.shell_event
        } else {
            None
        }
    }

    /// §7 "child exit / PTY closed": the child has already exited or the
    /// master fd has gone bad (HUP/read-error observed by the multiplexer).
    /// Reaps without signaling and clears the PTY handle but leaves the grid
    /// (and its scrollback) untouched, unlike [`Self::shutdown`].
    pub fn reap(&mut self) {
        let Some(mut pty) = self.pty.take() else {
            return;
        };
        let _ = pty.child.try_wait();
    }

    /// §3.3 lifecycle: close the PTY first (sends HUP, unblocking a shell
    /// reading stdin), then reap the child with escalating signals. Only for
    /// tearing a pane down ourselves — a child that already exited on its
    /// own should go through [`Self::reap`] instead.
    pub fn shutdown(&mut self) {
        let Some(mut pty) = self.pty.take() else {
            return;
        };
        drop(pty.master);

        if let Some(pid) = pty.child.process_id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if !wait_for_exit(pty.child.as_mut(), Duration::from_millis(500)) {
                unsafe {
                    libc::kill(pid as i32, libc::SIGKILL);
                }
                if !wait_for_exit(pty.child.as_mut(), Duration::from_secs(1)) {
                    log::warn!("pane {}: child pid {pid} did not exit after SIGKILL, abandoning", self.id);
                }
            }
        } else {
            let _ = pty.child.wait();
        }
    }
}

fn wait_for_exit(child: &mut dyn portable_pty::Child, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return true,
        }
    }
}

impl Drop for Pane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane(cols: u16, rows: u16) -> Pane {
        Pane::new(PaneOptions {
            id: 1,
            cols,
            rows,
            allow_sync_output: true,
        })
    }

    #[test]
    fn generation_monotonicity_on_feed() {
        let mut p = pane(10, 5);
        let g0 = p.generation();
        p.feed_direct(b"x");
        assert_eq!(p.generation(), g0 + 1);
    }

    #[test]
    fn dirty_floor_invariant_forces_snapshot() {
        let mut p = pane(10, 5);
        p.feed_direct(b"hello");
        let gen_after_first = p.generation();
        p.force_full_resync();
        assert!(gen_after_first < p.dirty_base_gen());
        match p.get_broadcast_delta(gen_after_first).unwrap() {
            BroadcastResult::Snapshot(_) => {}
            _ => panic!("expected snapshot when client_gen < dirty_base_gen"),
        }
    }

    #[test]
    fn cached_delta_identity_across_n_callers() {
        let mut p = pane(10, 5);
        p.feed_direct(b"hello\r\n");
        let base_gen = p.generation();
        p.feed_direct(b"world\r\n");
        let a = match p.get_broadcast_delta(base_gen).unwrap() {
            BroadcastResult::Delta { bytes, .. } => bytes,
            _ => panic!("expected delta"),
        };
        let b = match p.get_broadcast_delta(base_gen).unwrap() {
            BroadcastResult::Delta { bytes, .. } => bytes,
            _ => panic!("expected delta"),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn screen_switch_forces_resync_past_client_gen() {
        let mut p = pane(80, 24);
        p.feed_direct(b"before");
        let client_gen = p.generation();
        p.feed_direct(b"\x1b[?1049h");
        match p.get_broadcast_delta(client_gen).unwrap() {
            BroadcastResult::Delta { from_gen, .. } => assert!(from_gen > client_gen),
            BroadcastResult::Snapshot(_) => {}
            BroadcastResult::Nothing => panic!("expected resync signal, not Nothing"),
        }
    }

    #[test]
    fn resize_reflow_forces_resync_past_client_gen() {
        let mut p = pane(80, 24);
        p.feed_direct(b"hi");
        let client_gen = p.generation();
        p.resize(40, 24, None, None);
        match p.get_broadcast_delta(client_gen).unwrap() {
            BroadcastResult::Delta { from_gen, .. } => assert!(from_gen > client_gen),
            BroadcastResult::Snapshot(_) => {}
            BroadcastResult::Nothing => panic!("expected resync signal, not Nothing"),
        }
    }

    #[test]
    fn clipboard_round_trip_via_feed() {
        let mut p = pane(40, 10);
        p.feed_direct(b"\x1b]52;c;SGVsbG8=\x07");
        let pending = p.clipboard_take_pending_set().unwrap();
        assert_eq!(pending, ('c', "SGVsbG8=".to_string()));
    }

    #[test]
    fn bell_and_title_are_distinct() {
        let mut p = pane(40, 10);
        p.feed_direct(b"\x1b]0;Title\x07");
        assert_eq!(p.take_title().as_deref(), Some("Title"));
        assert!(!p.take_bell());
        p.feed_direct(b"\x07");
        assert!(p.take_bell());
    }
}
