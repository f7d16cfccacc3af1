//! Configuration vault – reads/writes `~/.varstream/config.toml`.
//!
//! ```toml
//! [bridge]
//! vars = ["level", "spec"]
//! source_id = "rig-1"
//! rt_strict = true
//! activate = true
//! skip = 0
//!
//! [demo]
//! sample_rate = 48000.0
//! fragment_size = 4800
//! cycles = 100
//! ws_port = 0
//! spectrum_bins = 8
//! realloc_every = 25
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use varstream_runtime::BridgeSettings;

/// Settings of the simulated host pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Audio sampling rate in Hz.
    pub sample_rate: f64,
    /// Samples per processing cycle.
    pub fragment_size: u32,
    /// Cycles to run; `0` runs until Ctrl-C.
    pub cycles: u64,
    /// WebSocket port of the sample server; `0` disables it.
    pub ws_port: u16,
    /// Length of the simulated spectrum.
    pub spectrum_bins: u32,
    /// Reallocate the spectrum buffer every this many cycles; `0` never.
    pub realloc_every: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            fragment_size: 4_800,
            cycles: 100,
            ws_port: 0,
            spectrum_bins: 8,
            realloc_every: 25,
        }
    }
}

/// Persisted configuration stored in `~/.varstream/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Return the path to `~/.varstream/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".varstream").join("config.toml")
}

/// Load the config from `path`, then apply environment overrides.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VARSTREAM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VARSTREAM_VARS` | `bridge.vars` (comma separated) |
/// | `VARSTREAM_SOURCE_ID` | `bridge.source_id` |
/// | `VARSTREAM_SKIP` | `bridge.skip` |
/// | `VARSTREAM_WS_PORT` | `demo.ws_port` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("VARSTREAM_VARS") {
        cfg.bridge.vars = split_vars(&v);
    }
    if let Some(v) = lookup("VARSTREAM_SOURCE_ID") {
        cfg.bridge.source_id = v;
    }
    if let Some(v) = lookup("VARSTREAM_SKIP")
        && let Ok(skip) = v.trim().parse::<u32>()
    {
        cfg.bridge.skip = skip;
    }
    if let Some(v) = lookup("VARSTREAM_WS_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.demo.ws_port = port;
    }
}

/// Split a comma separated variable list, dropping empty entries.
pub fn split_vars(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.demo, DemoConfig::default());
        assert!(loaded.bridge.rt_strict);
        assert_eq!(loaded.bridge.skip, 0);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[bridge]\nvars = [\"level\"]\nskip = 2\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.bridge.vars, vec!["level"]);
        assert_eq!(cfg.bridge.skip, 2);
        assert!(cfg.bridge.activate);
        assert_eq!(cfg.demo.fragment_size, 4_800);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[bridge]\nskip = -3\n").unwrap();
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_varstream_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".varstream"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[
                ("VARSTREAM_VARS", "level, spec,,frame"),
                ("VARSTREAM_SOURCE_ID", "rig-7"),
                ("VARSTREAM_SKIP", "4"),
                ("VARSTREAM_WS_PORT", "9100"),
            ]),
        );
        assert_eq!(cfg.bridge.vars, vec!["level", "spec", "frame"]);
        assert_eq!(cfg.bridge.source_id, "rig-7");
        assert_eq!(cfg.bridge.skip, 4);
        assert_eq!(cfg.demo.ws_port, 9100);
    }

    #[test]
    fn invalid_numbers_are_ignored() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup(&[("VARSTREAM_SKIP", "-1"), ("VARSTREAM_WS_PORT", "not-a-port")]),
        );
        assert_eq!(cfg.bridge.skip, 0);
        assert_eq!(cfg.demo.ws_port, 0);
    }

    #[test]
    fn empty_vars_override_means_discover_all() {
        let mut cfg = Config::default();
        cfg.bridge.vars = vec!["level".into()];
        apply_overrides(&mut cfg, lookup(&[("VARSTREAM_VARS", "")]));
        assert!(cfg.bridge.vars.is_empty());
    }
}
