//! 推論結果のデコード

use crate::ml::inference::ScoreVector;
use crate::types::{Prediction, RpsClass};

/// スコア列を分類結果に変換
///
/// 左から走査して最大値を探す。同値の場合は先に出たインデックスを採用する。
/// `probability` は最大スコアそのもので、合計による正規化はしない。
pub fn decode(scores: &ScoreVector) -> Prediction {
    let scores = scores.as_array();

    let mut best_index = 0;
    let mut best_score = scores[0];
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > best_score {
            best_index = index;
            best_score = score;
        }
    }

    Prediction {
        label: class_index_to_label(best_index),
        probability: best_score,
    }
}

/// クラスインデックスからラベルを取得
///
/// インデックスマッピング（学習済みモデルの出力順で固定）：
/// - 0: Paper
/// - 1: Rock
/// - 2: Scissors
fn class_index_to_label(index: usize) -> RpsClass {
    RpsClass::ALL[index]
}
