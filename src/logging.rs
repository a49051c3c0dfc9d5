//! ログ初期化
//!
//! `tracing` のサブスクライバを設定ファイルのログ設定から組み立てます。
//! 環境変数 `RUST_LOG` が設定されている場合はそちらのフィルタを優先します。

use anyhow::anyhow;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::model::LogSettings;

/// ログ設定からフィルタを作る
pub fn build_filter(settings: &LogSettings) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&settings.level)
        .map_err(|e| anyhow!("ログレベルの指定が不正です ({}): {}", settings.level, e))
}

/// グローバルなサブスクライバを設定する
///
/// 二重に初期化した場合はエラーを返す。
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let filter = build_filter(settings)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(settings.ansi)
                .with_target(settings.include_target)
                .compact(),
        )
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("ロガーの初期化に失敗しました: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_settings() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let settings = LogSettings {
            level: "rps_classifier_lib=debug,warn".to_string(),
            ..LogSettings::default()
        };
        let filter = build_filter(&settings).unwrap();
        assert!(filter.to_string().contains("rps_classifier_lib=debug"));
    }

    #[test]
    fn test_build_filter_rejects_invalid_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let settings = LogSettings {
            level: "rps_classifier_lib=loud".to_string(),
            ..LogSettings::default()
        };
        assert!(build_filter(&settings).is_err());
    }
}
