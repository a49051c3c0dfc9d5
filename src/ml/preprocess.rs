//! 画像の前処理
//!
//! ユーザーが選択した任意の画像を、モデル入力用の
//! (1, 150, 150, 3) の正規化済みテンソルに変換します。

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::{self, FilterType}, DynamicImage};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::ml::ml_model::{IMAGE_SIZE, INPUT_SHAPE, NUM_CHANNELS};

/// ユーザーが選択した画像（エンコード済みバイト列）
#[derive(Clone)]
pub struct RawImage {
    bytes: Arc<[u8]>,
    name: Option<String>,
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RawImage {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: Arc::from(bytes),
            name: None,
        }
    }

    /// 表示用の名前を付ける（ファイル名など）
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// ファイルから読み込む
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let image = Self::from_bytes(bytes);
        Ok(match path.file_name() {
            Some(name) => image.with_name(name.to_string_lossy()),
            None => image,
        })
    }

    /// `data:image/png;base64,...` 形式、またはbase64文字列そのものから作成
    pub fn from_data_url(data: &str) -> Result<Self, DecodeError> {
        let payload = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| DecodeError::DataUrl("missing ',' separator".to_string()))?;
                if !header.ends_with(";base64") {
                    return Err(DecodeError::DataUrl(format!(
                        "only base64 data URLs are supported: {}",
                        header
                    )));
                }
                payload
            }
            None => data,
        };

        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// モデル入力テンソル (1, 150, 150, 3)、値は [0, 1]
///
/// チャネルラスト（NHWC）で平坦化して保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl InputTensor {
    pub(crate) fn from_rgb(rgb: &image::RgbImage) -> Self {
        let data = rgb
            .pixels()
            .flat_map(|pixel| pixel.0)
            .map(|value| value as f32 / 255.0)
            .collect();

        Self {
            data,
            shape: [1, rgb.height() as usize, rgb.width() as usize, NUM_CHANNELS],
        }
    }

    /// 任意の形状でテンソルを作る（形状検証のテスト用）
    #[cfg(test)]
    pub(crate) fn from_raw(data: Vec<f32>, shape: [usize; 4]) -> Self {
        Self { data, shape }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// リサイズに使うフィルタ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    /// バイリニア（ブラウザのcanvas描画相当）
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// 画像前処理
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePreprocessor {
    filter: ResizeFilter,
}

impl ImagePreprocessor {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> ResizeFilter {
        self.filter
    }

    /// 画像をデコードしてモデル入力テンソルに変換
    ///
    /// デコードとリサイズはブロッキング処理なので別スレッドで実行する。
    pub async fn prepare(&self, raw: &RawImage) -> Result<InputTensor, DecodeError> {
        let bytes = Arc::clone(&raw.bytes);
        let filter = self.filter;

        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)?;
            Self::to_tensor(&image, filter)
        })
        .await
        .map_err(|e| DecodeError::Aborted(e.to_string()))?
    }

    /// デコード済み画像をテンソルに変換（同期版）
    ///
    /// アスペクト比は無視して 150x150 に引き伸ばし、RGBの3チャネルに揃える。
    pub fn to_tensor(image: &DynamicImage, filter: ResizeFilter) -> Result<InputTensor, DecodeError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage { width, height });
        }

        // アルファは合成せずに捨てる
        let size = IMAGE_SIZE as u32;
        let resized = imageops::resize(&image.to_rgb8(), size, size, filter.into());
        let tensor = InputTensor::from_rgb(&resized);
        debug_assert_eq!(tensor.shape(), INPUT_SHAPE);

        Ok(tensor)
    }
}
