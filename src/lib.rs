//! じゃんけん画像分類パイプライン
//!
//! 画像を読み込み、学習済みCNNで Paper / Rock / Scissors のどれかに分類します。
//!
//! - `ml` - 前処理・推論・結果デコード・モデル読み込み
//! - `model` - モデルバンドルの保存形式と設定ファイル
//! - `ClassificationController` - UIシェルから使う状態機械

mod types;
mod error;
mod controller;
pub mod logging;

pub mod model;
pub mod ml;

pub use controller::{ClassificationController, CANCELLED_NOTICE, NOT_READY_NOTICE};
pub use error::{DecodeError, InferenceError, ModelLoadError, PipelineError, PreconditionError, Result};
pub use types::{ControllerSnapshot, PipelineStatus, Prediction, RpsClass, StatusChange};
