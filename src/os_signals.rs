//! OS signal handling for early shutdown.
//!
//! [`wait_for_shutdown_signal`] completes when the process receives a
//! termination signal. On Unix it listens for SIGINT (Ctrl-C in a terminal)
//! and SIGTERM (the default kill signal, used by systemd and container
//! runtimes), with [`tokio::signal::ctrl_c`] awaited as a fallback. On other
//! platforms only Ctrl-C is available.
//!
//! The engine races this against the duration deadline; both land on the
//! same shutdown path.

#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
