//! 書き出し設定（CLI/ワーカー共通）

use crate::error::{Error, Result};
use crate::types::ColumnLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUTPUT_DIRECTORY: &str = "ANHTHE";
pub const DEFAULT_SCALE_FACTOR: f64 = 3.0;
pub const DEFAULT_WAIT_SECONDS: f64 = 0.5;
pub const DEFAULT_COPY_ATTEMPTS: u32 = 3;

pub const SCALE_RANGE: (f64, f64) = (1.0, 10.0);
pub const WAIT_RANGE: (f64, f64) = (0.1, 5.0);
pub const ATTEMPTS_RANGE: (u32, u32) = (1, 10);

/// 1回の書き出しに使うパラメータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub output_directory: PathBuf,
    /// 一時的に拡大する倍率
    pub scale_factor: f64,
    /// コピー後にレンダリングを待つ秒数
    pub wait_seconds: f64,
    /// クリップボードが空だった場合のコピー試行回数
    pub max_copy_attempts: u32,
    /// 識別子・表示名・基準セルの列
    #[serde(default)]
    pub columns: ColumnLayout,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            scale_factor: DEFAULT_SCALE_FACTOR,
            wait_seconds: DEFAULT_WAIT_SECONDS,
            max_copy_attempts: DEFAULT_COPY_ATTEMPTS,
            columns: ColumnLayout::default(),
        }
    }
}

impl ExportSettings {
    /// 範囲外の値を拒否する
    pub fn validate(&self) -> Result<()> {
        if !(SCALE_RANGE.0..=SCALE_RANGE.1).contains(&self.scale_factor) {
            return Err(Error::Config(format!(
                "拡大倍率は {}〜{} の範囲で指定してください: {}",
                SCALE_RANGE.0, SCALE_RANGE.1, self.scale_factor
            )));
        }
        if !(WAIT_RANGE.0..=WAIT_RANGE.1).contains(&self.wait_seconds) {
            return Err(Error::Config(format!(
                "待機時間は {}〜{} 秒の範囲で指定してください: {}",
                WAIT_RANGE.0, WAIT_RANGE.1, self.wait_seconds
            )));
        }
        if !(ATTEMPTS_RANGE.0..=ATTEMPTS_RANGE.1).contains(&self.max_copy_attempts) {
            return Err(Error::Config(format!(
                "コピー試行回数は {}〜{} の範囲で指定してください: {}",
                ATTEMPTS_RANGE.0, ATTEMPTS_RANGE.1, self.max_copy_attempts
            )));
        }
        let ColumnLayout { identifier, display_name, reference } = self.columns;
        if identifier == 0 || display_name == 0 || reference == 0 {
            return Err(Error::Config(format!(
                "列番号は1以上で指定してください: 識別子={}, 名前={}, 基準={}",
                identifier, display_name, reference
            )));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(Error::Config("出力フォルダが指定されていません".into()));
        }
        Ok(())
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs_f64(self.wait_seconds)
    }
}
