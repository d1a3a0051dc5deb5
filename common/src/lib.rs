//! Sheet Photo Common Library
//!
//! 図形と行の照合ロジック、出力ファイル名、設定、レポート。
//! スプレッドシートのホストには依存しない。

pub mod error;
pub mod geometry;
pub mod matching;
pub mod naming;
pub mod report;
pub mod settings;
pub mod types;

pub use error::{Error, Result};
pub use geometry::{Point, Rect};
pub use matching::{
    MatchBasis, MatchDecision, MatchOutcome, MatchPass, MatchRecord, Matcher, PictureSnapshot,
    UnmatchedPicture,
};
pub use naming::{output_file_name, sanitize};
pub use report::{RowOutcome, RunReport};
pub use settings::ExportSettings;
pub use types::{CellValue, ColumnLayout, RowKey, ShapeId, FIRST_DATA_ROW, HEADER_ROW};
