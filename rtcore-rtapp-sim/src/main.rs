/**
 * RTCORE RTAPP SIM - Stand-in for a real-time core application
 *
 * ROLE : Answers the kernel's intercore commands over a unix datagram socket
 * so the kernel can run on a plain Linux host.
 *
 * ENV :
 * RTAPP_SIM_SOCKET_DIR   socket directory shared with the kernel (/tmp/rtcore)
 * RTAPP_SIM_COMPONENT_ID component id the kernel is configured with
 * RTAPP_SIM_KIND         als | gps
 * RTAPP_SIM_NO_FIX       1 to emulate a GPS app without module
 */

mod sensor;

use anyhow::{Context, Result};
use rtcore_kernel::intercore::{UnixIntercore, MAX_RT_MESSAGE_SIZE};
use sensor::{SensorKind, SimSensor};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

struct SimConfig {
    socket_dir: PathBuf,
    component_id: String,
    kind: SensorKind,
    has_fix: bool,
}

impl SimConfig {
    fn from_env() -> Result<Self> {
        let socket_dir = std::env::var("RTAPP_SIM_SOCKET_DIR").unwrap_or_else(|_| "/tmp/rtcore".into());
        let component_id = std::env::var("RTAPP_SIM_COMPONENT_ID").context("RTAPP_SIM_COMPONENT_ID is not set")?;
        let kind = std::env::var("RTAPP_SIM_KIND")
            .unwrap_or_else(|_| "als".into())
            .parse::<SensorKind>()?;
        let has_fix = std::env::var("RTAPP_SIM_NO_FIX").map(|v| v != "1").unwrap_or(true);
        Ok(Self {
            socket_dir: PathBuf::from(socket_dir),
            component_id,
            kind,
            has_fix,
        })
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn auto_ticker(seconds: u32) -> Option<Interval> {
    if seconds == 0 {
        return None;
    }
    let mut t = interval(Duration::from_secs(u64::from(seconds)));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(t)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = SimConfig::from_env()?;
    std::fs::create_dir_all(&cfg.socket_dir)
        .with_context(|| format!("Failed to create {}", cfg.socket_dir.display()))?;

    let path = UnixIntercore::peer_path(&cfg.socket_dir, &cfg.component_id);
    let _ = std::fs::remove_file(&path);
    let socket = UnixDatagram::bind(&path).with_context(|| format!("Failed to bind {}", path.display()))?;
    info!("simulated {:?} app listening on {}", cfg.kind, path.display());

    let mut sensor = SimSensor::new(cfg.kind, cfg.has_fix);
    let mut peer: Option<PathBuf> = None;
    let mut ticker: Option<Interval> = None;
    let mut buf = [0u8; MAX_RT_MESSAGE_SIZE];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("receive failed: {}", e);
                        continue;
                    }
                };
                let Some(from) = from.as_pathname().map(PathBuf::from) else {
                    debug!("datagram from unnamed socket ignored");
                    continue;
                };
                let Some(reply) = sensor.respond(&buf[..len]) else {
                    warn!("{} byte datagram is not a command", len);
                    continue;
                };
                if let Some(seconds) = reply.auto_telemetry {
                    info!("auto telemetry {}", if seconds == 0 { "stopped".to_string() } else { format!("every {seconds}s") });
                    ticker = auto_ticker(seconds);
                }
                if let Err(e) = socket.send_to(&reply.bytes, &from).await {
                    warn!("reply to {} failed: {}", from.display(), e);
                }
                peer = Some(from);
            }

            _ = next_tick(&mut ticker) => {
                let Some(to) = peer.as_ref() else { continue };
                let bytes = rtcore_kernel::intercore::command::encode_telemetry(&sensor.telemetry());
                if let Err(e) = socket.send_to(&bytes, to).await {
                    warn!("auto telemetry to {} failed: {}", to.display(), e);
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = std::fs::remove_file(&path);
    info!("simulator stopped");
    Ok(())
}
