//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigor_core::{AnalyzerConfig, SpeechRateMethod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Calibration profile used when `--device` is not given.
    pub device_id: Option<String>,
    pub target_lufs: f64,
    /// Written into the metric config on `config method`; read here only as
    /// the first-run default.
    pub speech_rate_method: SpeechRateMethod,
    pub deepgram_api_key: Option<String>,
    pub deepgram_model: String,
    pub stt_timeout_secs: u64,
    /// RMS threshold of the bundled energy VAD.
    pub vad_threshold: f64,
    pub vad_hangover_frames: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_id: None,
            target_lufs: -23.0,
            speech_rate_method: SpeechRateMethod::default(),
            deepgram_api_key: None,
            deepgram_model: "nova-2".into(),
            stt_timeout_secs: 15,
            vad_threshold: 0.02,
            vad_hangover_frames: 8,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.device_id = self
            .device_id
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.deepgram_api_key = self
            .deepgram_api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let model = self.deepgram_model.trim();
        self.deepgram_model = if model.is_empty() {
            "nova-2".into()
        } else {
            model.to_string()
        };
        if !self.target_lufs.is_finite() {
            self.target_lufs = -23.0;
        }
        self.target_lufs = self.target_lufs.clamp(-40.0, -10.0);
        self.stt_timeout_secs = self.stt_timeout_secs.clamp(1, 120);
        self.vad_threshold = self.vad_threshold.clamp(0.001, 0.5);
        self.vad_hangover_frames = self.vad_hangover_frames.min(50);
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("VIGOR_DEEPGRAM_API_KEY") {
            self.deepgram_api_key = Some(key);
        }
        if let Ok(device) = std::env::var("VIGOR_DEVICE_ID") {
            self.device_id = Some(device);
        }
        self.normalize();
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            target_lufs: self.target_lufs,
            stt_timeout: Duration::from_secs(self.stt_timeout_secs),
            ..AnalyzerConfig::default()
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Vigor")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vigor")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
