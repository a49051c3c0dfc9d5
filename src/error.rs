//! 分類パイプラインのエラー定義
//!
//! パイプラインの各段階ごとにエラー型を分け、コントローラの境界で
//! `PipelineError` にまとめてステータスへ変換します。

use std::path::PathBuf;

use thiserror::Error;

use crate::types::PipelineStatus;

/// モデル読み込みのエラー
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model resource not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read model resource {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported model location: {0}")]
    UnsupportedLocation(String),

    #[error("{0} not found in model bundle")]
    MissingEntry(String),

    #[error("invalid model.json: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("unsupported model format: {format} (version {version})")]
    UnsupportedFormat { format: String, version: u32 },

    #[error("class labels must be [Paper, Rock, Scissors] in that order, found {0:?}")]
    ClassOrder(Vec<String>),

    #[error("unsupported model architecture: {0}")]
    Architecture(String),

    #[error("model input size must be {expected}, found {actual}")]
    InputSize { expected: u32, actual: u32 },

    #[error("weight shard {path} has {actual} bytes, manifest says {expected}")]
    ShardSize {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to restore model weights: {0}")]
    Weights(String),

    #[error("model loading task aborted: {0}")]
    Aborted(String),
}

/// 画像デコードのエラー
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image could not be decoded: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid data URL: {0}")]
    DataUrl(String),

    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image decoding task aborted: {0}")]
    Aborted(String),
}

/// 推論実行のエラー
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("input tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: Vec<usize>,
    },

    #[error("model produced {actual} scores, expected {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("model produced a non-finite score at index {index}")]
    NonFinite { index: usize },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("inference task aborted: {0}")]
    Aborted(String),
}

/// predict要求の前提条件違反（例外ではなくガードで弾く）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Image or model is not ready (model status: {0:?})")]
    ModelNotReady(PipelineStatus),

    #[error("Image or model is not ready (no image selected)")]
    NoImage,
}

/// コントローラ境界で扱うエラー
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
