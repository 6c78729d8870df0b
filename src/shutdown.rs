//! Graceful shutdown signal handling.

use tokio::signal;

/// Resolves when the process receives Ctrl+C or SIGTERM.
///
/// Handed to the polling engine so both the inter-cycle sleep and an
/// in-flight cycle are cancellable.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
