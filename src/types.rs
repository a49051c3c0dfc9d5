use serde::{Deserialize, Serialize};

/// 分類クラス（学習済みモデルの出力順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpsClass {
    Paper,
    Rock,
    Scissors,
}

impl RpsClass {
    /// モデル出力のインデックス順。並べ替え禁止
    pub const ALL: [RpsClass; 3] = [RpsClass::Paper, RpsClass::Rock, RpsClass::Scissors];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            RpsClass::Paper => 0,
            RpsClass::Rock => 1,
            RpsClass::Scissors => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RpsClass::Paper => "Paper",
            RpsClass::Rock => "Rock",
            RpsClass::Scissors => "Scissors",
        }
    }
}

impl std::fmt::Display for RpsClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 分類結果
///
/// `probability` は最大スコアそのもの。正規化していないので、
/// モデルがロジットを出力する場合は1を超えたり負になったりする。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: RpsClass,
    pub probability: f32,
}

impl Prediction {
    /// 表示用のパーセント文字列（例: 0.9 -> "90.00"）
    ///
    /// 丸めるのは表示だけで、保持している値は変更しない。
    /// 0.5ちょうどは正の無限大方向に丸め、-0は"0.00"と表示する。
    pub fn percentage_text(&self) -> String {
        let percent = (self.probability * 100.0 + 0.5).floor();
        let percent = if percent == 0.0 { 0.0 } else { percent };
        format!("{:.2}", percent)
    }
}

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Idle,
    LoadingModel,
    ModelLoadFailed,
    Ready,
    Predicting,
    PredictionReady,
    PredictionFailed,
}

impl PipelineStatus {
    /// モデル読み込みが完了している状態か
    ///
    /// Predicting中も含む。Predicting中に来たpredict要求は実行中の処理の完了を待つ。
    pub fn model_ready(self) -> bool {
        matches!(
            self,
            PipelineStatus::Ready
                | PipelineStatus::Predicting
                | PipelineStatus::PredictionReady
                | PipelineStatus::PredictionFailed
        )
    }
}

/// 状態遷移の通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
}

/// UIシェルに渡す現在の状態
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub status: PipelineStatus,
    pub prediction: Option<Prediction>,
    pub notice: Option<String>,
    pub has_image: bool,
    pub image_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_index_mapping() {
        assert_eq!(RpsClass::from_index(0), Some(RpsClass::Paper));
        assert_eq!(RpsClass::from_index(1), Some(RpsClass::Rock));
        assert_eq!(RpsClass::from_index(2), Some(RpsClass::Scissors));
        assert_eq!(RpsClass::from_index(3), None);
        for class in RpsClass::ALL {
            assert_eq!(RpsClass::from_index(class.index()), Some(class));
        }
    }

    #[test]
    fn test_percentage_text_rounds_only_presentation() {
        let prediction = Prediction { label: RpsClass::Rock, probability: 0.9 };
        assert_eq!(prediction.percentage_text(), "90.00");
        assert_eq!(prediction.probability, 0.9);

        let logit = Prediction { label: RpsClass::Paper, probability: 3.456 };
        assert_eq!(logit.percentage_text(), "346.00");

        let negative = Prediction { label: RpsClass::Paper, probability: -0.125 };
        assert_eq!(negative.percentage_text(), "-12.00");

        let near_zero = Prediction { label: RpsClass::Paper, probability: -0.004 };
        assert_eq!(near_zero.percentage_text(), "0.00");

        let half = Prediction { label: RpsClass::Rock, probability: 0.125 };
        assert_eq!(half.percentage_text(), "13.00");

        let negative_one = Prediction { label: RpsClass::Rock, probability: -0.006 };
        assert_eq!(negative_one.percentage_text(), "-1.00");
    }

    #[test]
    fn test_prediction_serializes_label_name() {
        let prediction = Prediction { label: RpsClass::Scissors, probability: 0.8 };
        let json = serde_json::to_value(prediction).unwrap();
        assert_eq!(json["label"], "Scissors");
    }

    #[test]
    fn test_model_ready() {
        assert!(PipelineStatus::Ready.model_ready());
        assert!(PipelineStatus::Predicting.model_ready());
        assert!(PipelineStatus::PredictionReady.model_ready());
        assert!(PipelineStatus::PredictionFailed.model_ready());
        assert!(!PipelineStatus::Idle.model_ready());
        assert!(!PipelineStatus::LoadingModel.model_ready());
        assert!(!PipelineStatus::ModelLoadFailed.model_ready());
    }
}
