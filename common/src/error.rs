//! 共通エラー型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("設定エラー: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
