//! vtmuxd — headless terminal multiplexer server entry point. Signal setup
//! and the "tick until shutdown" headless loop are adapted from the
//! teacher's `main.rs` `run_headless` — the hub/TUI architecture is replaced
//! by a session plus the PTY multiplexer and transport accept loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use vtmuxd::ipc::CommandContext;
use vtmuxd::multiplexer::{self, WakePipe};
use vtmuxd::transport::socket::SocketServer;
use vtmuxd::{RuntimeConfig, Session};

const APP_NAME: &str = "vtmuxd";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RuntimeConfig::load(APP_NAME);
    config.check_single_instance()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    register_signal_handlers(&shutdown)?;

    let session = Arc::new(Session::new());
    let wake = Arc::new(WakePipe::new()?);

    let mux_session = session.clone();
    let mux_wake = wake.clone();
    let mux_shutdown = shutdown.clone();
    std::thread::spawn(move || multiplexer::run(mux_session, mux_wake, mux_shutdown));

    let cleanup_guard = scopeguard::guard((config.pid_file.clone(), config.control_socket_path.clone()), |(pid_file, socket_path)| {
        let _ = std::fs::remove_file(&pid_file);
        let _ = std::fs::remove_file(&socket_path);
    });

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let ctx = Arc::new(CommandContext {
            session: session.clone(),
            config: config.clone(),
        });
        let _socket_server = SocketServer::start(config.control_socket_path.clone(), ctx)?;

        log::info!("{APP_NAME} ready, control socket at {}", config.control_socket_path.display());

        while !shutdown.load(Ordering::Relaxed) {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        log::info!("{APP_NAME} shutting down");
        Ok::<(), anyhow::Error>(())
    })?;

    drop(cleanup_guard);

    Ok(())
}

fn register_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(shutdown))?;
    flag::register(SIGTERM, Arc::clone(shutdown))?;
    flag::register(SIGHUP, Arc::clone(shutdown))?;
    Ok(())
}
