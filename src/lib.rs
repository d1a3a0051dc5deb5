//! Excelシートの画像を行ごとに高解像度PNGで書き出す
//!
//! - `host`: スプレッドシートとクリップボードの境界（xlsx 実装とメモリ実装）
//! - `snapshot` / `pipeline`: ジオメトリ取得・照合・書き出しの流れ
//! - `extractor`: 拡大コピーと確実な復元
//! - `worker`: バックグラウンド実行とキャンセル

pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod host;
pub mod pipeline;
pub mod reporter;
pub mod snapshot;
pub mod worker;

pub use error::{ExportError, ExportFailure, Result};
pub use extractor::{DirectorySink, ImageSink};
pub use pipeline::{run_export, run_match, ExportContext, MatchPreview};
pub use reporter::{ReportEvent, Reporter};
pub use worker::{CancelToken, ExtractionWorker};
