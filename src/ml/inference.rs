//! モデル推論機能

use burn::tensor::{backend::Backend, Tensor};

use crate::error::InferenceError;
use crate::ml::ml_model::{RpsClassifier, INPUT_SHAPE, NUM_CLASSES};
use crate::ml::preprocess::InputTensor;

/// 入力テンソルからクラスごとのスコアを計算するモデル
///
/// 推論はブロッキングスレッドで実行するため、ハンドルから複製して持ち出せる必要がある。
pub trait ScoreModel: Clone + Send + 'static {
    /// スコアを [Paper, Rock, Scissors] の順で返す
    fn scores(&self, tensor: InputTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Burnモデルとデバイスの組
#[derive(Debug, Clone)]
pub struct BurnModel<B: Backend> {
    model: RpsClassifier<B>,
    device: B::Device,
}

impl<B: Backend> BurnModel<B> {
    pub fn new(model: RpsClassifier<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> ScoreModel for BurnModel<B> {
    fn scores(&self, tensor: InputTensor) -> Result<Vec<f32>, InferenceError> {
        let shape = tensor.shape();
        let input = Tensor::<B, 1>::from_floats(tensor.as_slice(), &self.device).reshape(shape);

        let output = self.model.forward(input);

        output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Backend(format!("推論結果の取得エラー: {:?}", e)))
    }
}

/// 読み込み済みモデルへの参照
///
/// 読み込みに成功した場合にのみ生成される。プロセス中に1つだけ存在し、
/// 以降の推論すべてで使い回す。
#[derive(Debug, Clone)]
pub struct ModelHandle<M> {
    model: M,
    description: String,
}

impl<M: ScoreModel> ModelHandle<M> {
    pub fn new(model: M, description: impl Into<String>) -> Self {
        Self {
            model,
            description: description.into(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// 読み込み元などの説明（ログ用）
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// モデル出力のスコア列 [Paper, Rock, Scissors]
///
/// 合計が1になるとは限らない。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreVector([f32; NUM_CLASSES]);

impl ScoreVector {
    /// 有限値のみからなるスコア列を作る
    pub fn new(scores: [f32; NUM_CLASSES]) -> Result<Self, InferenceError> {
        if let Some(index) = scores.iter().position(|score| !score.is_finite()) {
            return Err(InferenceError::NonFinite { index });
        }

        Ok(Self(scores))
    }

    /// モデル出力を検証して変換
    pub fn from_slice(scores: &[f32]) -> Result<Self, InferenceError> {
        let scores: [f32; NUM_CLASSES] =
            scores
                .try_into()
                .map_err(|_| InferenceError::OutputLength {
                    expected: NUM_CLASSES,
                    actual: scores.len(),
                })?;

        Self::new(scores)
    }

    pub fn as_array(&self) -> &[f32; NUM_CLASSES] {
        &self.0
    }
}

/// 推論エンジン
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceEngine;

impl InferenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// 前処理済みテンソルに対してモデルを実行
    ///
    /// 形状が (1, 150, 150, 3) でないテンソルは実行せずにエラーを返す。
    pub async fn infer<M: ScoreModel>(
        &self,
        handle: &ModelHandle<M>,
        tensor: InputTensor,
    ) -> Result<ScoreVector, InferenceError> {
        let shape = tensor.shape();
        let expected_len: usize = INPUT_SHAPE.iter().product();
        if shape != INPUT_SHAPE || tensor.as_slice().len() != expected_len {
            return Err(InferenceError::ShapeMismatch {
                expected: INPUT_SHAPE,
                actual: shape.to_vec(),
            });
        }

        let model = handle.model.clone();
        let scores = tokio::task::spawn_blocking(move || model.scores(tensor))
            .await
            .map_err(|e| InferenceError::Aborted(e.to_string()))??;

        ScoreVector::from_slice(&scores)
    }
}
