//! Kernel configuration: `rtcore.yaml` (or `$RTCORE_CONFIG`), defaults when absent.

use crate::intercore::{
    AlsPt19Decoder, DispatchSettings, Endpoint, GroveGpsDecoder, HookSet, InterfaceVersion, RealTimeApp,
    MAX_REAL_TIME_APPS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub const CONFIG_ENV: &str = "RTCORE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "rtcore.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("app {name}: component id {id} is not a GUID")]
    InvalidComponentId { name: String, id: String },
    #[error("component id {0} is configured twice")]
    DuplicateComponentId(String),
    #[error("{count} real-time apps configured, at most {max} supported")]
    TooManyApps { count: usize, max: usize },
    #[error("intercore.max_apps is {max_apps}, the board has {hardware} real-time cores")]
    AppLimitAboveHardware { max_apps: usize, hardware: usize },
    #[error("intercore.receive_timeout_secs must be at least 1")]
    ZeroReceiveTimeout,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RtcoreConfig {
    pub intercore: IntercoreConf,
    pub apps: Vec<AppConf>,
    pub cloud: CloudConf,
    pub iotconnect: IotConnectConf,
    pub telemetry: TelemetryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IntercoreConf {
    pub socket_dir: PathBuf,
    pub receive_timeout_secs: u64,
    pub max_apps: usize,
}

impl Default for IntercoreConf {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from("/tmp/rtcore"),
            receive_timeout_secs: 5,
            max_apps: MAX_REAL_TIME_APPS,
        }
    }
}

/// Raw block decoder attached to an app.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    #[default]
    None,
    AlsPt19,
    GroveGps,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConf {
    pub name: String,
    pub component_id: String,
    #[serde(default)]
    pub decoder: DecoderKind,
    /// Whether the app is polled with read-sensor-with-telemetry.
    #[serde(default = "default_true")]
    pub telemetry: bool,
    #[serde(default)]
    pub interface_version: InterfaceVersion,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CloudConf {
    pub host: String,
    pub port: u16,
    pub device_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for CloudConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            device_id: "rtcore-device".into(),
            username: None,
            password: None,
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IotConnectConf {
    pub enabled: bool,
    pub hello_period_secs: u64,
    pub session_file: PathBuf,
    /// Largest message handed to the cloud link, envelope included.
    pub telemetry_buffer_size: usize,
}

impl Default for IotConnectConf {
    fn default() -> Self {
        Self {
            enabled: true,
            hello_period_secs: 15,
            session_file: PathBuf::from("./data/iotc_sid"),
            telemetry_buffer_size: 512,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConf {
    pub read_sensor_period_secs: u64,
    /// Sent to every app at startup when set.
    pub auto_telemetry_interval_secs: Option<u32>,
    pub substitute_missing_gps: bool,
}

impl Default for TelemetryConf {
    fn default() -> Self {
        Self {
            read_sensor_period_secs: 30,
            auto_telemetry_interval_secs: None,
            substitute_missing_gps: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RtcoreConfig {
    /// Rejects configurations the dispatch table could never open.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intercore.max_apps > MAX_REAL_TIME_APPS {
            return Err(ConfigError::AppLimitAboveHardware {
                max_apps: self.intercore.max_apps,
                hardware: MAX_REAL_TIME_APPS,
            });
        }
        if self.intercore.receive_timeout_secs == 0 {
            return Err(ConfigError::ZeroReceiveTimeout);
        }
        if self.apps.len() > self.intercore.max_apps {
            return Err(ConfigError::TooManyApps {
                count: self.apps.len(),
                max: self.intercore.max_apps,
            });
        }

        let mut seen = HashSet::new();
        for app in &self.apps {
            let id = Uuid::parse_str(&app.component_id).map_err(|_| ConfigError::InvalidComponentId {
                name: app.name.clone(),
                id: app.component_id.clone(),
            })?;
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateComponentId(app.component_id.clone()));
            }
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            max_apps: self.intercore.max_apps,
            receive_timeout: Duration::from_secs(self.intercore.receive_timeout_secs),
        }
    }

    /// Descriptors in configuration order, with the hooks each entry asks for.
    pub fn build_apps(&self) -> Vec<RealTimeApp> {
        self.apps.iter().map(AppConf::build).collect()
    }
}

impl AppConf {
    pub fn build(&self) -> RealTimeApp {
        let mut hooks = HookSet::generic();
        match self.decoder {
            DecoderKind::None => {}
            DecoderKind::AlsPt19 => hooks = hooks.with_raw_data(Box::new(AlsPt19Decoder)),
            DecoderKind::GroveGps => hooks = hooks.with_raw_data(Box::new(GroveGpsDecoder)),
        }
        if !self.telemetry {
            hooks = hooks.without_telemetry();
        }

        let mut endpoint = Endpoint::new(&self.name, &self.component_id);
        endpoint.interface_version = self.interface_version;
        RealTimeApp::new(endpoint, hooks)
    }
}

/// Parses YAML text; blank text means defaults.
pub fn parse_config(txt: &str) -> Result<RtcoreConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(RtcoreConfig::default());
    }
    let cfg: RtcoreConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config_from(path: &Path) -> Result<RtcoreConfig, ConfigError> {
    if !path.exists() {
        warn!("no {}, using default configuration", path.display());
        return Ok(RtcoreConfig::default());
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = parse_config(&txt)?;
    info!("configuration loaded from {} ({} apps)", path.display(), cfg.apps.len());
    Ok(cfg)
}

pub async fn load_config() -> Result<RtcoreConfig, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LIGHT_ID: &str = "f6768b9a-e086-4f5a-8219-5ffe9684b001";
    const GPS_ID: &str = "7e3f5b3c-9c3a-4b7e-8b64-6d3e4f2a1c02";

    fn sample_yaml() -> String {
        format!(
            r#"
intercore:
  socket_dir: /run/rtcore
apps:
  - name: light
    component_id: {LIGHT_ID}
    decoder: als_pt19
  - name: gps
    component_id: {GPS_ID}
    decoder: grove_gps
    telemetry: false
iotconnect:
  telemetry_buffer_size: 1024
telemetry:
  auto_telemetry_interval_secs: 60
"#
        )
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config(&sample_yaml()).unwrap();
        assert_eq!(cfg.intercore.socket_dir, PathBuf::from("/run/rtcore"));
        assert_eq!(cfg.intercore.receive_timeout_secs, 5);
        assert_eq!(cfg.apps.len(), 2);
        assert_eq!(cfg.apps[0].decoder, DecoderKind::AlsPt19);
        assert!(cfg.apps[0].telemetry);
        assert!(!cfg.apps[1].telemetry);
        assert_eq!(cfg.iotconnect.telemetry_buffer_size, 1024);
        assert!(cfg.iotconnect.enabled);
        assert_eq!(cfg.telemetry.auto_telemetry_interval_secs, Some(60));
        assert_eq!(cfg.cloud.port, 1883);
    }

    #[test]
    fn test_build_apps_hooks() {
        let cfg = parse_config(&sample_yaml()).unwrap();
        let apps = cfg.build_apps();
        assert_eq!(apps[0].name(), "light");
        assert!(apps[0].hooks.raw_data.is_some());
        assert!(apps[0].hooks.telemetry_request.is_some());
        assert!(apps[1].hooks.raw_data.is_some());
        assert!(apps[1].hooks.telemetry_request.is_none());
        assert!(apps.iter().all(|a| a.socket().is_none()));
    }

    #[test]
    fn test_empty_config_is_default() {
        let cfg = parse_config("  \n").unwrap();
        assert!(cfg.apps.is_empty());
        assert_eq!(cfg.intercore.max_apps, MAX_REAL_TIME_APPS);
    }

    #[test]
    fn test_rejects_bad_component_id() {
        let yaml = "apps:\n  - name: x\n    component_id: not-a-guid\n";
        assert!(matches!(parse_config(yaml), Err(ConfigError::InvalidComponentId { .. })));
    }

    #[test]
    fn test_rejects_duplicate_component_id() {
        let yaml = format!(
            "apps:\n  - name: a\n    component_id: {LIGHT_ID}\n  - name: b\n    component_id: {}\n",
            LIGHT_ID.to_uppercase()
        );
        assert!(matches!(parse_config(&yaml), Err(ConfigError::DuplicateComponentId(_))));
    }

    #[test]
    fn test_rejects_too_many_apps() {
        let yaml = format!(
            "intercore:\n  max_apps: 1\napps:\n  - name: a\n    component_id: {LIGHT_ID}\n  - name: b\n    component_id: {GPS_ID}\n"
        );
        assert!(matches!(
            parse_config(&yaml),
            Err(ConfigError::TooManyApps { count: 2, max: 1 })
        ));
    }

    #[test]
    fn test_rejects_limit_above_hardware() {
        let yaml = format!(
            "intercore:\n  max_apps: 3\napps:\n  - name: a\n    component_id: {LIGHT_ID}\n  - name: b\n    component_id: {GPS_ID}\n  - name: c\n    component_id: 0d1c6b2a-3e4f-4a5b-9c8d-7e6f5a4b3c2d\n"
        );
        assert!(matches!(
            parse_config(&yaml),
            Err(ConfigError::AppLimitAboveHardware { max_apps: 3, hardware: MAX_REAL_TIME_APPS })
        ));
    }

    #[test]
    fn test_rejects_zero_receive_timeout() {
        let yaml = "intercore:\n  receive_timeout_secs: 0\n";
        assert!(matches!(parse_config(yaml), Err(ConfigError::ZeroReceiveTimeout)));
    }

    #[tokio::test]
    async fn test_load_from_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sample_yaml().as_bytes()).unwrap();
        let cfg = load_config_from(file.path()).await.unwrap();
        assert_eq!(cfg.apps.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(cfg.apps.is_empty());
    }
}
