// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use bitmail_auth::{
    api::router,
    clock::SystemClock,
    config::{SiweConfig, LOG_FORMAT_ENV},
    siwe::{ChallengeSweeper, InMemoryChallengeStore},
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Time allowed for in-flight requests after a shutdown signal.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match SiweConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    let addr = config.bind_addr;
    let tls = config.tls.clone();

    let clock = Arc::new(SystemClock);
    let challenges = Arc::new(InMemoryChallengeStore::new());
    let shutdown = CancellationToken::new();

    let sweeper = ChallengeSweeper::new(
        challenges.clone(),
        clock.clone(),
        config.nonce_ttl,
        config.sweep_interval,
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

    let state = match AppState::new(config, challenges, clock) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialise session key");
            std::process::exit(1);
        }
    };
    let app = router(state);

    let handle = Handle::<SocketAddr>::new();
    tokio::spawn(shutdown_on(
        tokio::signal::ctrl_c(),
        handle.clone(),
        shutdown.clone(),
    ));

    let result = match tls {
        Some(paths) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");

            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .expect("Failed to load TLS certificate and key");

            info!(%addr, "BitMail auth listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(%addr, "BitMail auth listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    shutdown.cancel();
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "Challenge sweeper task failed");
    }

    if let Err(e) = result {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    info!("Server stopped");
}

/// Waits for `signal`, then cancels background tasks and drains the server.
async fn shutdown_on(
    signal: impl Future<Output = io::Result<()>>,
    handle: Handle<SocketAddr>,
    shutdown: CancellationToken,
) {
    if let Err(e) = signal.await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmail_auth::clock::Clock;

    #[tokio::test]
    async fn shutdown_signal_stops_server_and_sweeper() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let challenges = Arc::new(InMemoryChallengeStore::new());
        let config = SiweConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..SiweConfig::default()
        };
        let shutdown = CancellationToken::new();
        let sweeper = ChallengeSweeper::new(
            challenges.clone(),
            clock.clone(),
            config.nonce_ttl,
            config.sweep_interval,
        );
        let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

        let app = router(AppState::new(config.clone(), challenges, clock).unwrap());
        let handle = Handle::<SocketAddr>::new();
        let server = tokio::spawn(
            axum_server::bind(config.bind_addr)
                .handle(handle.clone())
                .serve(app.into_make_service()),
        );
        assert!(handle.listening().await.is_some());

        let (release, signal) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn(shutdown_on(
            async move { signal.await.map_err(io::Error::other) },
            handle,
            shutdown.clone(),
        ));
        release.send(()).unwrap();
        waiter.await.unwrap();

        assert!(shutdown.is_cancelled());
        server.await.unwrap().unwrap();
        sweeper_task.await.unwrap();
    }
}
