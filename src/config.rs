//! Process-wide runtime configuration. A single `RuntimeConfig` is built at
//! startup and handed around as an `Arc`; nothing here is a `static`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Debug log categories, combined as a bitmask.
pub mod debug_category {
    pub const PTY_IO: u32 = 1 << 0;
    pub const VT_EVENTS: u32 = 1 << 1;
    pub const DELTA: u32 = 1 << 2;
    pub const IPC: u32 = 1 << 3;
    pub const WS: u32 = 1 << 4;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutTemplate {
    pub id: String,
    pub name: String,
    pub panes: Vec<LayoutPane>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutPane {
    pub cols: u16,
    pub rows: u16,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LayoutFile {
    pub layouts: Vec<LayoutTemplate>,
}

/// Process-wide paths and toggles. Construct once via [`RuntimeConfig::load`].
pub struct RuntimeConfig {
    pub pid_file: PathBuf,
    pub control_socket_path: PathBuf,
    pub layout_file: PathBuf,
    pub pty_log_path: PathBuf,
    pub dlog_path: PathBuf,
    pub allow_sync_output_default: bool,
    debug_mask: AtomicU32,
    pty_log_enabled: std::sync::atomic::AtomicBool,
}

impl RuntimeConfig {
    /// Resolve all persisted-state paths (§6.3) under the system temp dir,
    /// plus the layout template under the user's config dir.
    ///
    /// `VTMUXD_INSTANCE_ID`, if set, is appended to `app_name` so integration
    /// tests can run an isolated daemon instance alongside (or instead of) a
    /// real one without colliding on pidfile/socket paths.
    pub fn load(app_name: &str) -> Arc<Self> {
        let app_name = match std::env::var("VTMUXD_INSTANCE_ID") {
            Ok(id) if !id.is_empty() => format!("{app_name}-{id}"),
            _ => app_name.to_string(),
        };
        let app_name = app_name.as_str();
        let tmp = std::env::temp_dir();
        let config_dir = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(app_name);

        Arc::new(Self {
            pid_file: tmp.join(format!("{app_name}.pid")),
            control_socket_path: tmp.join(format!("{app_name}.sock")),
            layout_file: config_dir.join("layouts.json"),
            pty_log_path: tmp.join(format!("{app_name}-pty.jsonl")),
            dlog_path: tmp.join(format!("{app_name}.dlog")),
            allow_sync_output_default: true,
            debug_mask: AtomicU32::new(0),
            pty_log_enabled: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn debug_enabled(&self, category: u32) -> bool {
        self.debug_mask.load(Ordering::Relaxed) & category != 0
    }

    pub fn set_debug_mask(&self, mask: u32) {
        self.debug_mask.store(mask, Ordering::Relaxed);
    }

    pub fn debug_mask(&self) -> u32 {
        self.debug_mask.load(Ordering::Relaxed)
    }

    pub fn pty_log_enabled(&self) -> bool {
        self.pty_log_enabled.load(Ordering::Relaxed)
    }

    pub fn set_pty_log_enabled(&self, on: bool) {
        self.pty_log_enabled.store(on, Ordering::Relaxed);
    }

    /// Refuse to start if `pid_file` names a PID that is still alive (§6.3, §7).
    pub fn check_single_instance(&self) -> anyhow::Result<()> {
        if let Ok(contents) = std::fs::read_to_string(&self.pid_file) {
            if let Ok(pid) = contents.trim().parse::<i32>() {
                // kill(pid, 0) checks liveness without signaling.
                let alive = unsafe { libc::kill(pid, 0) == 0 };
                if alive {
                    anyhow::bail!("server already running with pid {pid}");
                }
            }
        }
        std::fs::write(&self.pid_file, std::process::id().to_string())?;
        Ok(())
    }

    pub fn load_layouts(&self) -> LayoutFile {
        std::fs::read_to_string(&self.layout_file)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_mask_roundtrip() {
        let cfg = RuntimeConfig::load("vtmuxd-test-debug");
        assert!(!cfg.debug_enabled(debug_category::PTY_IO));
        cfg.set_debug_mask(debug_category::PTY_IO | debug_category::WS);
        assert!(cfg.debug_enabled(debug_category::PTY_IO));
        assert!(cfg.debug_enabled(debug_category::WS));
        assert!(!cfg.debug_enabled(debug_category::IPC));
    }

    #[test]
    fn pty_log_toggle() {
        let cfg = RuntimeConfig::load("vtmuxd-test-log");
        assert!(!cfg.pty_log_enabled());
        cfg.set_pty_log_enabled(true);
        assert!(cfg.pty_log_enabled());
    }

    #[test]
    fn missing_layout_file_yields_empty() {
        let cfg = RuntimeConfig::load("vtmuxd-test-nonexistent-layouts-xyz");
        let layouts = cfg.load_layouts();
        assert!(layouts.layouts.is_empty());
    }
}
