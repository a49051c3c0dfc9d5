//! モデルバンドルの永続化
//!
//! Tar.gz形式でメタデータと重みシャードを1ファイルにまとめて保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - model.json                  - メタデータ（クラス順、層構成、シャード一覧）
//! - group1-shard{i}of{n}.bin    - モデルの重み（分割バイナリ）

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

use crate::error::ModelLoadError;
use crate::model::model_metadata::{ModelMetadata, WeightShard};

/// メタデータのエントリ名
pub const METADATA_ENTRY: &str = "model.json";

/// シャードの既定サイズ（4MiB）
pub const DEFAULT_SHARD_SIZE: usize = 4 * 1024 * 1024;

fn shard_name(index: usize, total: usize) -> String {
    format!("group1-shard{}of{}.bin", index + 1, total)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// メタデータと重みをTar.gz形式で保存
///
/// 重みは `shard_size` バイトごとに分割し、manifestを書き換えてから保存する。
/// 保存先のパスを返す。
pub fn save_model_bundle(
    output_path: &Path,
    metadata: &ModelMetadata,
    weights: &[u8],
    shard_size: usize,
) -> Result<PathBuf> {
    // output_pathがすでに.gzで終わっている場合はそのまま、そうでなければ拡張子を追加
    let tar_gz_path = if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    };

    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let chunks: Vec<&[u8]> = weights.chunks(shard_size.max(1)).collect();
    let mut metadata = metadata.clone();
    metadata.weights_manifest = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| WeightShard {
            path: shard_name(i, chunks.len()),
            size: chunk.len() as u64,
        })
        .collect();

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;

    for (shard, chunk) in metadata.weights_manifest.iter().zip(&chunks) {
        append_entry(&mut tar_builder, &shard.path, chunk)?;
    }

    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize tar.gz archive")?;

    Ok(tar_gz_path)
}

fn open_archive(tar_gz_path: &Path) -> std::result::Result<Archive<GzDecoder<File>>, ModelLoadError> {
    if !tar_gz_path.exists() {
        return Err(ModelLoadError::NotFound(tar_gz_path.to_path_buf()));
    }

    let tar_gz_file = File::open(tar_gz_path).map_err(|source| ModelLoadError::Io {
        path: tar_gz_path.to_path_buf(),
        source,
    })?;

    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Tar.gzの全エントリを読み込む
fn read_entries(tar_gz_path: &Path) -> std::result::Result<HashMap<String, Vec<u8>>, ModelLoadError> {
    let io_error = |source| ModelLoadError::Io {
        path: tar_gz_path.to_path_buf(),
        source,
    };

    let mut archive = open_archive(tar_gz_path)?;
    let mut entries = HashMap::new();

    for entry in archive.entries().map_err(io_error)? {
        let mut entry = entry.map_err(io_error)?;
        let name = entry.path().map_err(io_error)?.to_string_lossy().to_string();

        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer).map_err(io_error)?;
        entries.insert(name, buffer);
    }

    Ok(entries)
}

/// Tar.gzからモデルメタデータを読み込む（検証はしない）
pub fn load_metadata(tar_gz_path: &Path) -> std::result::Result<ModelMetadata, ModelLoadError> {
    let io_error = |source| ModelLoadError::Io {
        path: tar_gz_path.to_path_buf(),
        source,
    };

    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries().map_err(io_error)? {
        let mut entry = entry.map_err(io_error)?;
        let path = entry.path().map_err(io_error)?;

        if path.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str).map_err(io_error)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(ModelLoadError::MissingEntry(METADATA_ENTRY.to_string()))
}

/// メタデータと重みを共に読み込む
///
/// メタデータを検証し、シャードをmanifest順に連結した重みを返す。
pub fn load_model_bundle(
    tar_gz_path: &Path,
) -> std::result::Result<(ModelMetadata, Vec<u8>), ModelLoadError> {
    let mut entries = read_entries(tar_gz_path)?;

    let json = entries
        .remove(METADATA_ENTRY)
        .ok_or_else(|| ModelLoadError::MissingEntry(METADATA_ENTRY.to_string()))?;
    let metadata: ModelMetadata = serde_json::from_slice(&json)?;
    metadata.validate()?;

    // manifestの申告値ではなく実際に読んだ量で確保する
    let mut weights = Vec::with_capacity(entries.values().map(Vec::len).sum());
    for shard in &metadata.weights_manifest {
        let data = entries
            .remove(&shard.path)
            .ok_or_else(|| ModelLoadError::MissingEntry(shard.path.clone()))?;

        if data.len() as u64 != shard.size {
            return Err(ModelLoadError::ShardSize {
                path: shard.path.clone(),
                expected: shard.size,
                actual: data.len() as u64,
            });
        }
        weights.extend_from_slice(&data);
    }

    Ok((metadata, weights))
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("フォーマット: {} (v{})", metadata.format, metadata.format_version);
    println!("クラスラベル: {}", metadata.class_labels.join(", "));
    println!("モデル入力サイズ: {}x{}", metadata.input_size, metadata.input_size);
    println!("畳み込みチャネル: {:?}", metadata.architecture.conv_channels);
    println!("全結合ユニット数: {}", metadata.architecture.hidden_units);
    println!("出力活性化: {:?}", metadata.architecture.output_activation);
    println!(
        "重みシャード: {} 個 ({} バイト)",
        metadata.weights_manifest.len(),
        metadata.weights_size()
    );
    println!("作成日時: {}", metadata.created_at);
    println!("========================");
}
