use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Sets the returned flag on the first Ctrl-C. The watcher thread is detached
/// and dies with the process.
pub fn install_ctrl_c_flag() -> Result<Arc<AtomicBool>, String> {
    let flag = Arc::new(AtomicBool::new(false));
    let watcher_flag = Arc::clone(&flag);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build signal runtime: {err}"))?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::warn!("interrupt received, stopping decode workers");
                        watcher_flag.store(true, Ordering::SeqCst);
                    }
                    Err(err) => tracing::warn!(error = %err, "cannot listen for Ctrl-C"),
                }
            });
        })
        .map_err(|err| format!("Failed to spawn signal watcher: {err}"))?;

    Ok(flag)
}
