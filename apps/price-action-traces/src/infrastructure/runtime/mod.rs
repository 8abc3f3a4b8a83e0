//! Process Bootstrap Helpers
//!
//! Shared start-up and shutdown plumbing for the binaries: `.env` discovery,
//! configuration logging and signal-driven cancellation.

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::AppConfig;

/// Load `.env` from the current directory or the nearest ancestor that has one.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
pub fn log_config(config: &AppConfig) {
    tracing::info!(
        bootstrap_servers = %config.bus.bootstrap_servers,
        topic = %config.bus.topic,
        group_id = %config.bus.group_id,
        window_size = config.consumer.window_size.get(),
        history_capacity = ?config.consumer.retention.cap(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        poll_timeout = ?config.consumer.poll_timeout,
        max_batch = config.consumer.max_batch,
        message_count = config.producer.message_count,
        interval = ?config.producer.interval,
        "Loop settings"
    );
}

/// Wait for SIGTERM or Ctrl+C, then cancel `shutdown_token`.
///
/// Returns early without cancelling if the token is cancelled elsewhere.
#[allow(clippy::expect_used)]
pub async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
