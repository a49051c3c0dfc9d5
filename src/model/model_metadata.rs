//! モデルメタデータの定義
//!
//! tar.gz形式のモデルバンドルに `model.json` として格納されます。
//!
//! ## バンドルの仕様
//! - model.json: このメタデータ（層構成・クラス順・重みシャード一覧）
//! - group1-shard{i}of{n}.bin: 重みのバイナリを分割したもの。manifest順に連結して復元する

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ModelLoadError;
use crate::ml::ml_model::{ModelConfig, OutputActivation, CLASS_NAMES, IMAGE_SIZE};

/// モデルフォーマット名
pub const MODEL_FORMAT: &str = "rps-layers-model";

/// 対応しているフォーマットバージョンの上限
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// 畳み込みブロック1つあたりのチャネル数の上限
pub const MAX_CONV_CHANNELS: usize = 512;

/// 全結合層のユニット数の上限
pub const MAX_HIDDEN_UNITS: usize = 4096;

/// 層構成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureSettings {
    /// 各畳み込みブロックの出力チャネル数
    pub conv_channels: [usize; 4],
    /// 全結合層のユニット数
    pub hidden_units: usize,
    /// 出力層の活性化関数
    pub output_activation: OutputActivation,
}

impl Default for ArchitectureSettings {
    fn default() -> Self {
        Self {
            conv_channels: [64, 64, 128, 128],
            hidden_units: 512,
            output_activation: OutputActivation::Softmax,
        }
    }
}

impl ArchitectureSettings {
    /// 層の大きさが範囲内か検証
    ///
    /// モデルの初期化より前に呼ぶ。
    pub fn validate(&self) -> std::result::Result<(), ModelLoadError> {
        if let Some(channels) = self
            .conv_channels
            .iter()
            .find(|&&c| c == 0 || c > MAX_CONV_CHANNELS)
        {
            return Err(ModelLoadError::Architecture(format!(
                "conv channels must be within 1..={}, found {}",
                MAX_CONV_CHANNELS, channels
            )));
        }

        if self.hidden_units == 0 || self.hidden_units > MAX_HIDDEN_UNITS {
            return Err(ModelLoadError::Architecture(format!(
                "hidden units must be within 1..={}, found {}",
                MAX_HIDDEN_UNITS, self.hidden_units
            )));
        }

        Ok(())
    }
}

/// 重みシャード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightShard {
    /// バンドル内のエントリ名
    pub path: String,
    /// バイト数
    pub size: u64,
}

/// モデルメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// フォーマット名（"rps-layers-model"）
    pub format: String,

    /// フォーマットバージョン
    pub format_version: u32,

    /// クラスラベル（モデル出力のインデックス順）
    /// 必ず ["Paper", "Rock", "Scissors"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常150x150）
    pub input_size: u32,

    /// 層構成
    pub architecture: ArchitectureSettings,

    /// 重みシャード一覧（連結順）
    #[serde(default)]
    pub weights_manifest: Vec<WeightShard>,

    /// 作成時刻（ISO8601形式）
    pub created_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(architecture: ArchitectureSettings) -> Self {
        Self {
            format: MODEL_FORMAT.to_string(),
            format_version: MODEL_FORMAT_VERSION,
            class_labels: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            input_size: IMAGE_SIZE as u32,
            architecture,
            weights_manifest: Vec::new(),
            created_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> std::result::Result<Self, ModelLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// 推論に使えるメタデータか検証
    ///
    /// クラス順は学習時に固定されているため、並べ替えや推測はしない。
    pub fn validate(&self) -> std::result::Result<(), ModelLoadError> {
        if self.format != MODEL_FORMAT
            || self.format_version == 0
            || self.format_version > MODEL_FORMAT_VERSION
        {
            return Err(ModelLoadError::UnsupportedFormat {
                format: self.format.clone(),
                version: self.format_version,
            });
        }

        if self.class_labels.iter().map(String::as_str).ne(CLASS_NAMES.iter().copied()) {
            return Err(ModelLoadError::ClassOrder(self.class_labels.clone()));
        }

        if self.input_size != IMAGE_SIZE as u32 {
            return Err(ModelLoadError::InputSize {
                expected: IMAGE_SIZE as u32,
                actual: self.input_size,
            });
        }

        self.architecture.validate()
    }

    /// モデル設定に変換
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.class_labels.len())
            .with_image_size(self.input_size as usize)
            .with_conv_channels(self.architecture.conv_channels)
            .with_hidden_units(self.architecture.hidden_units)
            .with_softmax_output(self.architecture.output_activation == OutputActivation::Softmax)
    }

    /// 重みの総バイト数
    pub fn weights_size(&self) -> u64 {
        self.weights_manifest
            .iter()
            .fold(0u64, |total, shard| total.saturating_add(shard.size))
    }
}
