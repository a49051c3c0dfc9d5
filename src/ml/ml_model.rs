//! 機械学習モデルの共通定義
//!
//! じゃんけん画像分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// クラス数
pub const NUM_CLASSES: usize = 3;

/// 画像サイズ（正方形）
pub const IMAGE_SIZE: usize = 150;

/// カラーチャネル数
pub const NUM_CHANNELS: usize = 3;

/// 入力テンソルの形状 (batch, height, width, channels)
pub const INPUT_SHAPE: [usize; 4] = [1, IMAGE_SIZE, IMAGE_SIZE, NUM_CHANNELS];

/// クラス名の定義（モデル出力のインデックス順）
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["Paper", "Rock", "Scissors"];

/// 出力層の活性化関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// 確率分布を出力
    Softmax,
    /// ロジットをそのまま出力
    Linear,
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 150)]
    pub image_size: usize,
    /// 各畳み込みブロックの出力チャネル数
    #[config(default = "[64, 64, 128, 128]")]
    pub conv_channels: [usize; 4],
    /// 全結合層のユニット数
    #[config(default = 512)]
    pub hidden_units: usize,
    /// 出力にsoftmaxを掛けるか
    #[config(default = true)]
    pub softmax_output: bool,
}

impl ModelConfig {
    /// 畳み込みブロック通過後の特徴マップの一辺
    ///
    /// 1ブロック: Conv 3x3 (no padding) で -2、Pool 2x2 で 1/2（切り捨て）
    pub fn feature_map_size(&self) -> usize {
        self.conv_channels
            .iter()
            .fold(self.image_size, |size, _| size.saturating_sub(2) / 2)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> RpsClassifier<B> {
        let feature_map_size = self.feature_map_size();
        if feature_map_size == 0 {
            panic!("入力サイズが小さすぎます: {} (最小46x46が必要)", self.image_size);
        }

        let [c1, c2, c3, c4] = self.conv_channels;
        let d = c4 * feature_map_size * feature_map_size;

        tracing::debug!(
            image_size = self.image_size,
            feature_map_size,
            flatten = d,
            hidden = self.hidden_units,
            "[Model] 構成"
        );

        RpsClassifier {
            conv1: Conv2dConfig::new([NUM_CHANNELS, c1], [3, 3]).init(device),
            conv2: Conv2dConfig::new([c1, c2], [3, 3]).init(device),
            conv3: Conv2dConfig::new([c2, c3], [3, 3]).init(device),
            conv4: Conv2dConfig::new([c3, c4], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, self.hidden_units).init(device),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            activation: Relu::new(),
            softmax_output: self.softmax_output,
        }
    }
}

/// じゃんけん分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x 4層
/// - Flatten
/// - FC: d -> hidden + ReLU
/// - FC: hidden -> num_classes
/// - Softmax（設定時のみ）
///
/// 入力はチャネルラストの [batch, height, width, 3]。
#[derive(Module, Debug)]
pub struct RpsClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    pool: MaxPool2d,

    fc1: Linear<B>,
    fc2: Linear<B>,

    activation: Relu,
    softmax_output: bool,
}

impl<B: Backend> RpsClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, size, size, 3]
    ///
    /// # 戻り値
    /// - クラスごとのスコア [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        // NHWC -> NCHW
        let x = images.permute([0, 3, 1, 2]);

        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv4.forward(x)));

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.fc2.forward(x);

        if self.softmax_output {
            softmax(x, 1)
        } else {
            x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_feature_map_size_default() {
        let config = ModelConfig::new(NUM_CLASSES);
        // 150 -> 74 -> 36 -> 17 -> 7
        assert_eq!(config.feature_map_size(), 7);
    }

    #[test]
    fn test_forward_output_shape() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(NUM_CLASSES)
            .with_conv_channels([2, 2, 4, 4])
            .with_hidden_units(8)
            .init::<NdArray>(&device);

        let images = Tensor::<NdArray, 4>::zeros(INPUT_SHAPE, &device);
        let output = model.forward(images);
        assert_eq!(output.dims(), [1, NUM_CLASSES]);

        let scores = output.into_data().to_vec::<f32>().unwrap();
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }
}
