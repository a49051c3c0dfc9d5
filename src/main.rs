//! じゃんけん画像分類のコンソールシェル
//!
//! 使い方:
//!   rps_classifier [--config <path>] [--model <path>] [--device cpu|wgpu]
//!                  [--show-config] [--save-config] <image>...
//!
//! 画像を指定しない場合は設定ファイルの `last_image_path` を使う。

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn_ndarray::{NdArray, NdArrayDevice};
use tracing::{error, info, warn};

use rps_classifier_lib::logging::init_logging;
use rps_classifier_lib::ml::{ImagePreprocessor, ModelLoader, RawImage};
use rps_classifier_lib::model::{AppConfig, DeviceType};
use rps_classifier_lib::{ClassificationController, PipelineStatus};

#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    model_path: Option<String>,
    device_type: Option<DeviceType>,
    show_config: bool,
    save_config: bool,
    images: Vec<PathBuf>,
}

impl CliArgs {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Result<Self> {
        let mut cli = CliArgs::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args.next().context("--config にはパスが必要です")?;
                    cli.config_path = Some(PathBuf::from(value));
                }
                "--model" => {
                    cli.model_path = Some(args.next().context("--model にはパスが必要です")?);
                }
                "--device" => {
                    let value = args.next().context("--device には cpu か wgpu が必要です")?;
                    cli.device_type = Some(match value.as_str() {
                        "cpu" => DeviceType::Cpu,
                        "wgpu" => DeviceType::Wgpu,
                        other => bail!("不明なデバイス: {}", other),
                    });
                }
                "--show-config" => cli.show_config = true,
                "--save-config" => cli.save_config = true,
                _ if arg.starts_with("--") => bail!("不明なオプション: {}", arg),
                _ => cli.images.push(PathBuf::from(&arg)),
            }
        }

        Ok(cli)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse(std::env::args().skip(1))?;

    let config_path = cli.config_path.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default_from(&config_path);
    if let Some(ref model_path) = cli.model_path {
        config.set_model_path(model_path.clone());
    }
    if let Some(device_type) = cli.device_type {
        config.set_device_type(device_type);
    }

    init_logging(&config.logging)?;
    info!("設定ファイル: {}", config_path.display());

    if cli.show_config {
        config.display();
    }

    match config.device_type {
        DeviceType::Cpu => run::<NdArray>(NdArrayDevice::default(), &mut config, &cli.images).await?,
        DeviceType::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                run::<burn_wgpu::Wgpu>(burn_wgpu::WgpuDevice::default(), &mut config, &cli.images).await?;
            }
            #[cfg(not(feature = "wgpu"))]
            {
                warn!("wgpu feature が無効なビルドです。CPUで実行します");
                run::<NdArray>(NdArrayDevice::default(), &mut config, &cli.images).await?;
            }
        }
    }

    if cli.save_config {
        config.save(&config_path)?;
        info!("設定ファイルを保存しました: {}", config_path.display());
    }

    Ok(())
}

async fn run<B: Backend>(device: B::Device, config: &mut AppConfig, images: &[PathBuf]) -> Result<()> {
    let loader = ModelLoader::<B>::from_settings(&config.model, device)?;
    let controller = ClassificationController::new(ImagePreprocessor::new(config.preprocess.filter));

    println!("モデルを読み込んでいます: {}", loader.source());
    if controller.start(&loader).await.is_err() {
        // 読み込み失敗は回復しない。以降の要求は未準備として拒否される
        if let Some(notice) = controller.notice() {
            println!("{}", notice);
        }
    }

    let mut targets = images.to_vec();
    if targets.is_empty() {
        match config.last_image_path {
            Some(ref path) => targets.push(PathBuf::from(path)),
            None => {
                println!("分類する画像を指定してください");
                return Ok(());
            }
        }
    }

    let mut failures = 0;
    for path in &targets {
        let image = match RawImage::from_path(path).await {
            Ok(image) => image,
            Err(e) => {
                error!("画像の読み込みに失敗しました: {}", e);
                println!("{}: 画像を読み込めません ({})", path.display(), e);
                failures += 1;
                continue;
            }
        };
        controller.select_image(image);

        match controller.predict().await {
            Ok(prediction) => {
                println!(
                    "{}: {} ({}%)",
                    path.display(),
                    prediction.label,
                    prediction.percentage_text()
                );
                config.update_last_image_path(path);
            }
            Err(_) => {
                println!("{}: {}", path.display(), controller.notice().unwrap_or_default());
                failures += 1;
            }
        }
    }

    if controller.status() == PipelineStatus::ModelLoadFailed {
        bail!("モデルを読み込めませんでした: {}", loader.source());
    }
    if failures > 0 {
        bail!("{} 件の画像を分類できませんでした", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let cli = parse(&["--device", "wgpu", "--model", "m.tar.gz", "a.png", "b.jpg"]).unwrap();
        assert_eq!(cli.device_type, Some(DeviceType::Wgpu));
        assert_eq!(cli.model_path.as_deref(), Some("m.tar.gz"));
        assert_eq!(cli.images, vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]);
        assert!(!cli.save_config);
    }

    #[test]
    fn test_parse_rejects_unknown_options() {
        assert!(parse(&["--device", "tpu"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["--config"]).is_err());
    }
}
