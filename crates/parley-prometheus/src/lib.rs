// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics exporter for the Parley relay.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. The engine
//! records through the helpers in [`recording`]; this crate installs the
//! global recorder and optionally serves `/metrics` over HTTP.

pub mod recording;

use std::net::SocketAddr;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parley_core::ParleyError;
use tracing::{error, info};

pub use recording::{
    record_ai_latency, record_ai_retry, record_stale_deferral, record_step_error,
    record_ticket_completed, record_ticket_created, record_ticket_failed, register_metrics,
    set_active_workers,
};

/// Installed Prometheus recorder.
///
/// Only one recorder can be installed per process.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Installs the recorder and serves scrapes on `listen_address`.
    ///
    /// Must be called from within a Tokio runtime; the HTTP listener runs as
    /// a background task.
    pub fn install(listen_address: &str) -> Result<Self, ParleyError> {
        let addr = parse_listen_address(listen_address)?;

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(addr)
            .build()
            .map_err(|e| ParleyError::Internal(format!("failed to build Prometheus exporter: {e}")))?;
        let handle = recorder.handle();

        metrics::set_global_recorder(recorder).map_err(|e| {
            ParleyError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                error!(error = ?e, "Prometheus HTTP listener stopped");
            }
        });

        register_metrics();
        info!(listen_address = %addr, "prometheus metrics exporter listening");

        Ok(Self { handle })
    }

    /// Get a reference to the Prometheus handle for rendering.
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn parse_listen_address(listen_address: &str) -> Result<SocketAddr, ParleyError> {
    listen_address.parse().map_err(|e| {
        ParleyError::Config(format!(
            "invalid prometheus.listen_address '{listen_address}': {e}"
        ))
    })
}
