#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use push_lifecycle::adapters::memory::{MemoryRenderer, MemoryTransport, MemoryTransportProvider};
use push_lifecycle::config::Config;
use push_lifecycle::domain::notification::RawMessage;
use push_lifecycle::domain::platform::HostPlatform;
use push_lifecycle::{LifecycleCoordinator, telemetry};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Instrument;

/// One line of stdin, driving the in-memory transport.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum DemoEvent {
    Refresh { token: String },
    Foreground { message: RawMessage },
    Opened { message: RawMessage },
    Select { payload: Option<String> },
    Permission,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let platform = config.coordinator.resolve_platform(&HostPlatform);
    let transport = MemoryTransport::new();
    transport.push_token(Some(&format!("demo-{}", std::process::id())));
    let renderer = MemoryRenderer::new();

    let coordinator = Arc::new(LifecycleCoordinator::new(
        &config.coordinator,
        MemoryTransportProvider::new(Arc::clone(&transport)),
        Arc::clone(&renderer) as _,
        platform,
    ));
    coordinator.set_on_token_changed(Some(Arc::new(|token: &str| {
        tracing::info!(token = %token, "Token changed");
    })));

    if !coordinator.prepare(&config.coordinator.app_name).await {
        anyhow::bail!("push coordinator failed to prepare");
    }

    let mut subscription = coordinator.subscribe();
    let consumer = tokio::spawn(
        async move {
            while let Some(payload) = subscription.recv().await {
                tracing::info!(payload = %serde_json::Value::Object(payload), "Push payload");
            }
        }
        .instrument(tracing::info_span!("push_consumer")),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DemoEvent>(&line) {
                    Ok(event) => dispatch(&coordinator, &transport, &renderer, event).await,
                    Err(e) => tracing::warn!(error = %e, "Ignoring unreadable event"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    coordinator.dispose();
    if let Err(e) = consumer.await {
        tracing::warn!(error = %e, "Push consumer task ended abnormally");
    }
    telemetry_guard.shutdown();
    Ok(())
}

async fn dispatch(
    coordinator: &LifecycleCoordinator,
    transport: &MemoryTransport,
    renderer: &MemoryRenderer,
    event: DemoEvent,
) {
    match event {
        DemoEvent::Refresh { token } => transport.emit_refresh(&token),
        DemoEvent::Foreground { message } => transport.deliver_foreground(message),
        DemoEvent::Opened { message } => transport.deliver_opened(message),
        DemoEvent::Select { payload } => {
            if !renderer.select(payload.as_deref()) {
                tracing::warn!(platform = coordinator.platform().as_str(), "No local renderer handler registered");
            }
        }
        DemoEvent::Permission => {
            let status = coordinator.request_permission().await;
            tracing::info!(status = ?status, "Permission status");
        }
    }
}
