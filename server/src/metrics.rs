// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{future, net::SocketAddr, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sipcore::push::ClientStats;
use tokio::net::TcpListener;
use tracing::{error, info};

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Installs the global `metrics` recorder and serves `/metrics` on
/// `addr` (§2's ambient observability, following the host's pattern of a
/// dedicated metrics listener separate from any request-serving address).
pub async fn serve_metrics(addr: SocketAddr) -> std::io::Result<()> {
    ClientStats::describe();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).expect("metrics already set");

    let listener = TcpListener::bind(addr).await?;
    let router = axum::Router::new().route(
        "/metrics",
        axum::routing::get(|axum::extract::State(handle): axum::extract::State<PrometheusHandle>| {
            future::ready(handle.render())
        })
        .with_state(handle.clone()),
    );

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            handle.run_upkeep();
        }
    });

    tokio::spawn(async move {
        info!(%addr, "serving metrics");
        if let Err(error) = axum::serve(listener, router.into_make_service()).await {
            error!(%error, "metrics server stopped");
        }
    });

    Ok(())
}
