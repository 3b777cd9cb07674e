use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;

/// Exit status after a forced quit.
const FORCE_QUIT_EXIT_CODE: i32 = 130;

/// Install the Ctrl+C handler and return the flag it sets.
///
/// The first Ctrl+C requests a graceful stop at the next branch or project
/// boundary. A second one exits immediately.
pub(crate) fn setup_shutdown_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let requested = Arc::clone(&flag);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current branch...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current branch");
        }

        requested.store(true, Ordering::Release);

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(FORCE_QUIT_EXIT_CODE);
    });

    flag
}
