/**
 * RTCORE KERNEL - Main entry point
 *
 * ROLE :
 * Loads the configuration, opens the real-time apps, connects to IoT Hub
 * and runs the single event loop.
 *
 * STARTUP ORDER :
 * 1. .env + tracing (RUST_LOG, info by default)
 * 2. rtcore.yaml or $RTCORE_CONFIG, validated
 * 3. Unix intercore transport, dispatch table, IoT Connect adapter
 * 4. MQTT link to the hub, gateway start (session reload + app init)
 *
 * EVENT LOOP :
 * - intercore messages from the per-socket reader tasks
 * - MQTT events (2 s back-off after a poll error)
 * - hello timer while the handshake is missing
 * - sensor timer polling every app
 * - ctrl-c, which closes the sockets and logs the last fault
 */

use anyhow::{Context, Result};
use rtcore_kernel::config::load_config;
use rtcore_kernel::intercore::{DispatchTable, UnixIntercore};
use rtcore_kernel::iotconnect::{FileSessionStore, IotConnectAdapter};
use rtcore_kernel::{Gateway, GatewayOptions, LastFault, MqttCloudLink};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("rtcore kernel starting");

    let cfg = load_config().await.context("Failed to load configuration")?;
    std::fs::create_dir_all(&cfg.intercore.socket_dir)
        .with_context(|| format!("Failed to create {}", cfg.intercore.socket_dir.display()))?;

    let faults = LastFault::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let transport = UnixIntercore::new(&cfg.intercore.socket_dir, events_tx);
    let dispatch = DispatchTable::new(
        cfg.build_apps(),
        Box::new(transport),
        cfg.dispatch_settings(),
        faults.clone(),
    );

    let hello_period = Duration::from_secs(cfg.iotconnect.hello_period_secs.max(1));
    let iotc = IotConnectAdapter::new(
        Box::new(FileSessionStore::new(&cfg.iotconnect.session_file)),
        hello_period,
        faults.clone(),
    );

    let (cloud, mut eventloop) = MqttCloudLink::new(&cfg.cloud);
    let mut gateway = Gateway::new(dispatch, iotc, cloud, GatewayOptions::from(&cfg), faults.clone());

    gateway.start().context("Failed to initialize real-time apps")?;

    let sensor_period = Duration::from_secs(cfg.telemetry.read_sensor_period_secs.max(1));
    let mut sensor_timer = interval_at(Instant::now() + sensor_period, sensor_period);
    let mut hello_timer = interval_at(Instant::now() + hello_period, hello_period);

    info!(
        "connecting to {}:{} as {}",
        cfg.cloud.host, cfg.cloud.port, cfg.cloud.device_id
    );

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => gateway.handle_intercore(event),

            polled = eventloop.poll() => match polled {
                Ok(event) => {
                    let event = gateway.cloud_mut().classify(&event);
                    gateway.on_cloud_event(event);
                }
                Err(e) => {
                    warn!("MQTT error: {}", e);
                    gateway.cloud_mut().mark_disconnected();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            },

            _ = hello_timer.tick() => gateway.on_hello_tick(),

            _ = sensor_timer.tick() => gateway.on_sensor_tick(),

            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("cannot listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    info!("shutting down");
    gateway.shutdown();
    if let Some(fault) = faults.get() {
        info!("last fault: {}", fault);
    }
    Ok(())
}
