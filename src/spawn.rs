//! PTY open/spawn mechanics (§6.4). Kept close to the teacher's
//! `agent/spawn.rs` shape for opening a PTY pair and building a command; the
//! reader-thread half of that module is not reused here — it is superseded
//! by the poll-based multiplexer in [`crate::multiplexer`].

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::path::Path;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// Everything a [`crate::pane::Pane`] needs to own its PTY and child.
pub struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub writer: Box<dyn std::io::Write + Send>,
    pub child: Box<dyn Child + Send>,
}

pub fn open_pty(cols: u16, rows: u16) -> Result<portable_pty::PtyPair> {
    let pty_system = native_pty_system();
    let size = PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    };
    pty_system.openpty(size).context("failed to open pty")
}

/// Detect the user's shell and build the environment described in §6.4:
/// `SHELL` (fallback `/bin/sh`), `TERM=xterm-<id>`, `TERM_PROGRAM=<id>`, and
/// `TERMINFO` when a compiled terminfo entry exists at a well-known path.
pub fn build_shell_command(app_id: &str, cwd: &Path, extra_env: &HashMap<String, String>) -> CommandBuilder {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let mut cmd = CommandBuilder::new(&shell);
    cmd.cwd(cwd);
    cmd.env("TERM", format!("xterm-{app_id}"));
    cmd.env("TERM_PROGRAM", app_id);
    let terminfo_path = format!("/usr/share/terminfo/x/xterm-{app_id}");
    if Path::new(&terminfo_path).exists() {
        cmd.env("TERMINFO", "/usr/share/terminfo");
    }
    for (k, v) in extra_env {
        cmd.env(k, v);
    }
    cmd
}

/// Spawn `cmd` on `pair`, returning a [`PtyHandle`] owning the master side,
/// a writer, and the child. §6.4 requires UTF-8 input mode (IUTF8),
/// non-blocking mode, and close-on-exec on the master, none of which
/// `portable-pty` sets for us, so [`configure_master_fd`] does it explicitly
/// right after spawn.
pub fn spawn(pair: portable_pty::PtyPair, cmd: CommandBuilder) -> Result<PtyHandle> {
    let child = pair.slave.spawn_command(cmd).context("failed to spawn child")?;
    let writer = pair.master.take_writer().context("failed to take pty writer")?;
    if let Some(fd) = pair.master.as_raw_fd() {
        configure_master_fd(fd).context("failed to configure pty master fd")?;
    }
    Ok(PtyHandle {
        master: pair.master,
        writer,
        child,
    })
}

/// Set O_NONBLOCK and FD_CLOEXEC via `fcntl`, and IUTF8 via `tcsetattr`, on
/// the PTY master fd.
fn configure_master_fd(fd: RawFd) -> std::io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let fd_flags = libc::fcntl(fd, libc::F_GETFD, 0);
        if fd_flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut term: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut term) == 0 {
            term.c_iflag |= libc::IUTF8;
            libc::tcsetattr(fd, libc::TCSANOW, &term);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn build_shell_command_sets_term_vars() {
        let env = HashMap::new();
        let cwd = PathBuf::from("/tmp");
        let _cmd = build_shell_command("vtmuxd", &cwd, &env);
    }

    #[test]
    fn open_pty_does_not_panic() {
        let result = open_pty(80, 24);
        let _ = result;
    }

    #[test]
    fn spawn_sets_nonblocking_and_cloexec_on_master() {
        let pair = open_pty(80, 24).expect("open pty");
        let cmd = CommandBuilder::new("/bin/sh");
        let pty = spawn(pair, cmd).expect("spawn");
        let fd = pty.master.as_raw_fd().expect("master has raw fd");

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        assert!(flags >= 0);
        assert_ne!(flags & libc::O_NONBLOCK, 0, "master should be non-blocking");

        let fd_flags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
        assert!(fd_flags >= 0);
        assert_ne!(fd_flags & libc::FD_CLOEXEC, 0, "master should be close-on-exec");

        let mut term: libc::termios = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::tcgetattr(fd, &mut term) };
        if rc == 0 {
            assert_ne!(term.c_iflag & libc::IUTF8, 0, "master should have IUTF8 set");
        }
    }
}
