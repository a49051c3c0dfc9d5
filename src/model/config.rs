//! 設定ファイル
//!
//! 計算デバイス、モデルの場所、前処理、ログの設定をJSONで保存・読み込みします。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::preprocess::ResizeFilter;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
    /// WGPU (GPU) バックエンド（`wgpu` feature が必要）
    Wgpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// モデルバンドルの場所（ファイルパスまたは file:// URL）
    pub model_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/rps_model.tar.gz".to_string(),
        }
    }
}

/// 前処理設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// リサイズフィルタ（既定はTriangle）
    pub filter: ResizeFilter,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// EnvFilter形式のフィルタ（RUST_LOG が設定されていればそちらを優先）
    pub level: String,
    pub ansi: bool,
    /// モジュールパスを出力するか
    pub include_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            include_target: false,
        }
    }
}

/// アプリケーション設定
///
/// 欠けている項目は既定値で補う。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device_type: DeviceType,
    pub model: ModelSettings,
    pub preprocess: PreprocessSettings,
    pub logging: LogSettings,
    /// 最後に分類に成功した画像
    pub last_image_path: Option<String>,
}

impl AppConfig {
    /// 既定の設定ファイル（カレントディレクトリの config.json）
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("設定ファイルを開けません: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("設定ファイルの形式が不正です: {}", path.display()))
    }

    /// 設定を読み込む。ファイルが無いか壊れている場合は既定値を使う
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{:#}。デフォルト設定を使用します", e);
                Self::default()
            }
        }
    }

    /// 既定の場所から設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("設定ファイルを書き込めません: {}", path.display()))
    }

    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().into_owned());
    }

    /// 設定内容をコンソールに表示
    pub fn display(&self) {
        println!("=== 設定 ===");
        println!("デバイス        : {}", self.device_type);
        println!("モデル          : {}", self.model.model_path);
        println!("リサイズフィルタ: {:?}", self.preprocess.filter);
        println!("ログレベル      : {}", self.logging.level);
        if let Some(ref image) = self.last_image_path {
            println!("前回の画像      : {}", image);
        }
        println!("============\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.model.model_path, "models/rps_model.tar.gz");
        assert_eq!(config.preprocess.filter, ResizeFilter::Triangle);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_json_keeps_overrides() {
        let mut config = AppConfig::default();
        config.set_device_type(DeviceType::Wgpu);
        config.update_last_image_path("images/rock.png");

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["device_type"], "Wgpu");

        let restored: AppConfig = serde_json::from_value(value).unwrap();
        assert_eq!(restored.device_type, DeviceType::Wgpu);
        assert_eq!(restored.last_image_path.as_deref(), Some("images/rock.png"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "model": { "model_path": "file:///opt/rps/model.tar.gz" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.model.model_path, "file:///opt/rps/model.tar.gz");
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert!(config.logging.ansi);
    }

    #[test]
    fn test_save_and_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let fallback = AppConfig::load_or_default_from(&path);
        assert_eq!(fallback.device_type, DeviceType::Cpu);

        let mut config = AppConfig::default();
        config.set_model_path("custom/model.tar.gz".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default_from(&path);
        assert_eq!(loaded.model.model_path, "custom/model.tar.gz");

        std::fs::write(&path, "{ broken").unwrap();
        let broken = AppConfig::load_or_default_from(&path);
        assert_eq!(broken.model.model_path, "models/rps_model.tar.gz");
    }

    #[test]
    fn test_device_type_names() {
        assert_eq!(DeviceType::Wgpu.to_string(), "WGPU (GPU)");
        assert_eq!(serde_json::to_string(&DeviceType::Cpu).unwrap(), "\"Cpu\"");
    }
}
