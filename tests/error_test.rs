//! エラーケーステスト
//!
//! 各種エラー条件でのエラーハンドリングを検証

use sheet_photo_export::error::ExportError;
use sheet_photo_export::host::{DocumentHost, MemoryClipboard, XlsxHost};
use std::path::Path;
use tempfile::tempdir;

/// 存在しないファイルを開いた場合
#[test]
fn test_open_nonexistent_file() {
    let host = XlsxHost::new(MemoryClipboard::new());
    let result = host.open(Path::new("/nonexistent/path/12345.xlsx"));

    let err = result.err().expect("open should fail");
    assert!(matches!(err, ExportError::FileNotFound(_)));
    assert!(err.is_fatal());
}

/// 対応していない拡張子
#[test]
fn test_open_unsupported_format() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("staff.xls");
    std::fs::write(&path, b"legacy").unwrap();

    let host = XlsxHost::new(MemoryClipboard::new());
    let err = host.open(&path).err().expect("open should fail");
    assert!(matches!(err, ExportError::UnsupportedFormat(_)));
}

/// ExportErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        ExportError::Config("テスト設定エラー".to_string()),
        ExportError::FileNotFound("staff.xlsx".to_string()),
        ExportError::OpenDocument {
            path: "staff.xlsx".to_string(),
            reason: "locked".to_string(),
        },
        ExportError::NoPictures("Sheet1".to_string()),
        ExportError::EnumeratePictures("shapes".to_string()),
        ExportError::ClipboardEmpty { attempts: 3 },
        ExportError::RunInProgress,
        ExportError::WorkerPanicked,
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

/// 試行回数がメッセージに含まれる
#[test]
fn test_clipboard_empty_message() {
    let err = ExportError::ClipboardEmpty { attempts: 3 };
    assert!(format!("{}", err).contains('3'));
    assert!(!err.is_fatal());
}

/// 行単位のエラーは致命的ではない
#[test]
fn test_row_errors_are_not_fatal() {
    assert!(!ExportError::Render("x".into()).is_fatal());
    assert!(!ExportError::Geometry("x".into()).is_fatal());
    assert!(!ExportError::CellRead("x".into()).is_fatal());
    assert!(ExportError::NoPictures("Sheet1".into()).is_fatal());
}

/// IOエラーからの変換
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: ExportError = io_err.into();

    assert!(matches!(err, ExportError::Io(_)));
    let display = format!("{}", err);
    assert!(display.contains("IO"));
}

/// JSONエラーからの変換
#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{ invalid }").unwrap_err();
    let err: ExportError = json_err.into();

    assert!(matches!(err, ExportError::JsonParse(_)));
}

/// common::Errorからの変換（透過的エラー）
#[test]
fn test_common_error_conversion() {
    let common_err = sheet_photo_common::Error::Config("設定エラー".to_string());
    let err: ExportError = common_err.into();

    assert!(matches!(err, ExportError::Common(_)));
    assert!(format!("{}", err).contains("設定エラー"));
}
