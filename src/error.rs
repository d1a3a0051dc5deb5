use sheet_photo_common::RunReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("Excelファイルを開けません: {path}: {reason}")]
    OpenDocument { path: String, reason: String },

    #[error("サポートされていないファイル形式です: {0}")]
    UnsupportedFormat(String),

    #[error("シートに画像が見つかりません: {0}")]
    NoPictures(String),

    #[error("画像の列挙に失敗: {0}")]
    EnumeratePictures(String),

    #[error("図形が見つかりません: {0}")]
    ShapeNotFound(String),

    #[error("位置情報の取得に失敗: {0}")]
    Geometry(String),

    #[error("セル値の読み込みに失敗: {0}")]
    CellRead(String),

    #[error("画像のコピーに失敗: {0}")]
    Render(String),

    #[error("{attempts}回コピーしてもクリップボードに画像がありません")]
    ClipboardEmpty { attempts: u32 },

    #[error("クリップボードエラー: {0}")]
    Clipboard(String),

    #[error("XML解析エラー: {0}")]
    Xml(String),

    #[error("ZIPエラー: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("画像処理エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] sheet_photo_common::Error),

    #[error("ドキュメントは既に閉じられています")]
    SessionClosed,

    #[error("別の書き出し処理が実行中です")]
    RunInProgress,

    #[error("ワーカースレッドが異常終了しました")]
    WorkerPanicked,
}

/// 致命的エラーで中断した書き出し。そこまでのレポートを持つ
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ExportFailure {
    pub error: ExportError,
    pub report: Box<RunReport>,
}

impl From<ExportFailure> for ExportError {
    fn from(failure: ExportFailure) -> Self {
        failure.error
    }
}

impl ExportError {
    /// 実行全体を中断すべきエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExportError::FileNotFound(_)
                | ExportError::OpenDocument { .. }
                | ExportError::UnsupportedFormat(_)
                | ExportError::NoPictures(_)
                | ExportError::EnumeratePictures(_)
                | ExportError::Config(_)
                | ExportError::Common(_)
                | ExportError::RunInProgress
        )
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
