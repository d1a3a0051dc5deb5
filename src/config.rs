use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use sheet_photo_common::settings::{
    DEFAULT_COPY_ATTEMPTS, DEFAULT_OUTPUT_DIRECTORY, DEFAULT_SCALE_FACTOR, DEFAULT_WAIT_SECONDS,
};
use sheet_photo_common::{ColumnLayout, ExportSettings};
use std::path::{Path, PathBuf};

/// 永続化される既定値（~/.config/sheet-photo/config.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub output_directory: PathBuf,
    pub scale_factor: f64,
    pub wait_seconds: f64,
    pub max_copy_attempts: u32,
    /// 読み取る列（CLI からは変更しない）
    pub columns: ColumnLayout,
}

impl Default for Config {
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

/// CLI から上書きする値
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub output_directory: Option<PathBuf>,
    pub scale_factor: Option<f64>,
    pub wait_seconds: Option<f64>,
    pub max_copy_attempts: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.settings().validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ExportError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("sheet-photo").join("config.json"))
    }

    /// 保存値をそのまま書き出し設定にする
    pub fn settings(&self) -> ExportSettings {
        ExportSettings {
            output_directory: self.output_directory.clone(),
            scale_factor: self.scale_factor,
            wait_seconds: self.wait_seconds,
            max_copy_attempts: self.max_copy_attempts,
            columns: self.columns,
        }
    }

    /// CLI の指定を優先して設定を組み立て、範囲を検証する
    pub fn resolve(&self, overrides: &Overrides) -> Result<ExportSettings> {
        let settings = ExportSettings {
            output_directory: overrides
                .output_directory
                .clone()
                .unwrap_or_else(|| self.output_directory.clone()),
            scale_factor: overrides.scale_factor.unwrap_or(self.scale_factor),
            wait_seconds: overrides.wait_seconds.unwrap_or(self.wait_seconds),
            max_copy_attempts: overrides.max_copy_attempts.unwrap_or(self.max_copy_attempts),
            columns: self.columns,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// 指定された項目だけ更新する
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(directory) = &overrides.output_directory {
            self.output_directory = directory.clone();
        }
        if let Some(scale) = overrides.scale_factor {
            self.scale_factor = scale;
        }
        if let Some(wait) = overrides.wait_seconds {
            self.wait_seconds = wait;
        }
        if let Some(attempts) = overrides.max_copy_attempts {
            self.max_copy_attempts = attempts;
        }
    }
}
