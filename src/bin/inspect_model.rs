//! モデルバンドルの検査用バイナリ
//!
//! メタデータの表示、検証、重みシャードの読み込み、CPUでの試し推論を順に行う。

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use image::DynamicImage;

use rps_classifier_lib::ml::{decode, load_burn_model, ImagePreprocessor, ResizeFilter, ScoreModel, ScoreVector, IMAGE_SIZE};
use rps_classifier_lib::model::{load_metadata, load_model_bundle, print_metadata_info, AppConfig};

fn main() -> Result<()> {
    println!("=== Model Bundle Inspector ===\n");

    let model_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(AppConfig::load_or_default().model.model_path),
    };
    println!("対象: {}", model_path.display());

    println!("\nStep 1: メタデータ読み込み");
    let metadata = load_metadata(&model_path)
        .with_context(|| format!("メタデータを読み込めません: {}", model_path.display()))?;
    print_metadata_info(&metadata);

    println!("\nStep 2: メタデータ検証");
    match metadata.validate() {
        Ok(()) => println!("✓ 対応フォーマットです"),
        Err(e) => {
            eprintln!("✗ {}", e);
            return Err(e.into());
        }
    }

    println!("\nStep 3: 重みシャード読み込み");
    let (_, weights) = load_model_bundle(&model_path)?;
    println!("✓ {} バイトの重みを読み込みました", weights.len());

    println!("\nStep 4: 試し推論 (CPU)");
    let device = NdArrayDevice::default();
    let model = load_burn_model::<NdArray>(&model_path, &device)?;

    let blank = DynamicImage::new_rgb8(IMAGE_SIZE as u32, IMAGE_SIZE as u32);
    let tensor = ImagePreprocessor::to_tensor(&blank, ResizeFilter::Nearest)?;
    let scores = ScoreVector::from_slice(&model.scores(tensor)?)?;
    let prediction = decode(&scores);

    println!("スコア: {:?}", scores.as_array());
    println!(
        "✓ 黒画像の分類結果: {} ({}%)",
        prediction.label,
        prediction.percentage_text()
    );

    Ok(())
}
