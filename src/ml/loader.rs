//! モデルの読み込み
//!
//! 起動時に一度だけモデルバンドルを読み込み、推論用のハンドルを作ります。
//! 読み込みに失敗しても自動で再試行はしません。

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use url::Url;

use crate::error::ModelLoadError;
use crate::ml::inference::{BurnModel, ModelHandle};
use crate::ml::ml_model::RpsClassifier;
use crate::model::{load_model_bundle, save_model_bundle, ModelMetadata, ModelSettings};

/// モデルバンドルの場所
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    File(PathBuf),
}

impl ModelSource {
    /// ファイルパスまたは `file://` URL を解釈する
    pub fn parse(location: &str) -> Result<Self, ModelLoadError> {
        if !location.contains("://") {
            return Ok(Self::File(PathBuf::from(location)));
        }

        let url = Url::parse(location)
            .map_err(|e| ModelLoadError::UnsupportedLocation(format!("{}: {}", location, e)))?;
        if url.scheme() != "file" {
            return Err(ModelLoadError::UnsupportedLocation(location.to_string()));
        }

        url.to_file_path()
            .map(Self::File)
            .map_err(|_| ModelLoadError::UnsupportedLocation(location.to_string()))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// モデルローダー
pub struct ModelLoader<B: Backend> {
    source: ModelSource,
    device: B::Device,
}

impl<B: Backend> ModelLoader<B> {
    pub fn new(source: ModelSource, device: B::Device) -> Self {
        Self { source, device }
    }

    /// 設定ファイルのモデル設定から作成
    pub fn from_settings(settings: &ModelSettings, device: B::Device) -> Result<Self, ModelLoadError> {
        Ok(Self::new(ModelSource::parse(&settings.model_path)?, device))
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// モデルを読み込む
    ///
    /// ファイル読み込みと重みの復元はブロッキング処理なので別スレッドで実行する。
    pub async fn load(&self) -> Result<ModelHandle<BurnModel<B>>, ModelLoadError> {
        let path = self.source.path().to_path_buf();
        let device = self.device.clone();

        let model = tokio::task::spawn_blocking(move || load_burn_model::<B>(&path, &device))
            .await
            .map_err(|e| ModelLoadError::Aborted(e.to_string()))??;

        Ok(ModelHandle::new(model, self.source.to_string()))
    }
}

/// バンドルからBurnモデルを復元（同期版）
pub fn load_burn_model<B: Backend>(path: &Path, device: &B::Device) -> Result<BurnModel<B>, ModelLoadError> {
    let (metadata, model_binary) = load_model_bundle(path)?;

    // 層構成はメタデータに従う
    let model = metadata.model_config().init::<B>(device);

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(model_binary, device)
        .map_err(|e| ModelLoadError::Weights(format!("{:?}", e)))?;

    Ok(BurnModel::new(model.load_record(record), device.clone()))
}

/// Burnモデルをバンドルとして書き出す
///
/// 学習済みモデルの変換ツールやテストで使う。
pub fn export_model_bundle<B: Backend>(
    model: &RpsClassifier<B>,
    metadata: &ModelMetadata,
    output_path: &Path,
    shard_size: usize,
) -> anyhow::Result<PathBuf> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let model_binary = Recorder::<B>::record(&recorder, model.clone().into_record(), ())
        .map_err(|e| anyhow!("モデル重みの書き出しエラー: {:?}", e))?;

    save_model_bundle(output_path, metadata, &model_binary, shard_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::inference::{InferenceEngine, ScoreModel};
    use crate::ml::ml_model::{OutputActivation, INPUT_SHAPE};
    use crate::ml::preprocess::InputTensor;
    use crate::model::ArchitectureSettings;
    use burn_ndarray::{NdArray, NdArrayDevice};

    fn small_metadata(output_activation: OutputActivation) -> ModelMetadata {
        ModelMetadata::new(ArchitectureSettings {
            conv_channels: [2, 2, 4, 4],
            hidden_units: 8,
            output_activation,
        })
    }

    fn gradient_tensor() -> InputTensor {
        let len: usize = INPUT_SHAPE.iter().product();
        let data = (0..len).map(|i| (i % 256) as f32 / 255.0).collect();
        InputTensor::from_raw(data, INPUT_SHAPE)
    }

    #[test]
    fn test_parse_model_source() {
        assert_eq!(
            ModelSource::parse("models/rps_model.tar.gz").unwrap(),
            ModelSource::File(PathBuf::from("models/rps_model.tar.gz"))
        );
        assert_eq!(
            ModelSource::parse("file:///opt/rps/model.tar.gz").unwrap(),
            ModelSource::File(PathBuf::from("/opt/rps/model.tar.gz"))
        );
        assert!(matches!(
            ModelSource::parse("https://example.com/model.json"),
            Err(ModelLoadError::UnsupportedLocation(_))
        ));
    }

    #[tokio::test]
    async fn test_export_and_load_restores_weights() {
        let dir = tempfile::tempdir().unwrap();
        let device = NdArrayDevice::default();
        let metadata = small_metadata(OutputActivation::Linear);

        let original = metadata.model_config().init::<NdArray>(&device);
        let path = export_model_bundle(&original, &metadata, &dir.path().join("model"), 1024).unwrap();

        let loader = ModelLoader::<NdArray>::new(ModelSource::File(path), device.clone());
        let handle = loader.load().await.unwrap();

        let expected = BurnModel::new(original, device).scores(gradient_tensor()).unwrap();
        let restored = InferenceEngine::new().infer(&handle, gradient_tensor()).await.unwrap();

        for (a, b) in expected.iter().zip(restored.as_array()) {
            assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
        }
    }

    #[tokio::test]
    async fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModelLoader::<NdArray>::new(
            ModelSource::File(dir.path().join("missing.tar.gz")),
            NdArrayDevice::default(),
        );

        let result = loader.load().await;
        assert!(matches!(result, Err(ModelLoadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_weights() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = small_metadata(OutputActivation::Softmax);
        let path = save_model_bundle(&dir.path().join("garbage"), &metadata, &[7u8; 64], 16).unwrap();

        let loader = ModelLoader::<NdArray>::new(ModelSource::File(path), NdArrayDevice::default());
        let result = loader.load().await;
        assert!(matches!(
            result,
            Err(ModelLoadError::Weights(_)) | Err(ModelLoadError::Aborted(_))
        ));
    }
}
