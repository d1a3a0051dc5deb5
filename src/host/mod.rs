//! スプレッドシートホストとの境界
//!
//! - `DocumentHost`: ドキュメントをヘッドレスで開く
//! - `DocumentSession`: 開いたシートへの読み取り・図形の変更・コピー
//! - `Clipboard`: コピー結果の画像を受け取る共有クリップボード
//!
//! セッションとクリップボードはどちらもプロセス内で1つの可変リソース。
//! 同時に2つの処理からアクセスしてはならない。

pub mod clipboard;
pub mod memory;
pub mod xlsx;

use crate::error::{ExportError, Result};
use image::RgbaImage;
use sheet_photo_common::{CellValue, Rect, ShapeId};
use std::path::Path;

/// 描画解像度（1pt = 96/72 px）
pub const PIXELS_PER_POINT: f64 = 96.0 / 72.0;

/// レンダリング1辺の上限
pub const MAX_RENDER_SIDE: u32 = 20_000;

/// 図形の現在サイズを描画ピクセル数に換算
pub fn render_dimensions(rect: &Rect) -> Result<(u32, u32)> {
    let width = (rect.width * PIXELS_PER_POINT).round();
    let height = (rect.height * PIXELS_PER_POINT).round();
    if !width.is_finite() || !height.is_finite() || width < 1.0 || height < 1.0 {
        return Err(ExportError::Render(format!("描画サイズが不正です: {}", rect)));
    }
    if width > MAX_RENDER_SIDE as f64 || height > MAX_RENDER_SIDE as f64 {
        return Err(ExportError::Render(format!(
            "描画サイズが大きすぎます: {}x{} px",
            width, height
        )));
    }
    Ok((width as u32, height as u32))
}

pub use clipboard::MemoryClipboard;
pub use memory::{MemoryDocument, MemoryHost, RenderBehavior};
pub use xlsx::XlsxHost;

/// ドキュメントを開くホスト
pub trait DocumentHost {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentSession>>;
}

/// 開いているシート（アクティブシートのみ）
pub trait DocumentSession: Send {
    fn sheet_name(&self) -> &str;

    /// シート上で値のある最大行（1始まり）
    fn max_row(&self) -> Result<u32>;

    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue>;

    fn cell_rect(&self, row: u32, column: u32) -> Result<Rect>;

    /// 浮動画像をホストの順序で列挙
    fn picture_ids(&self) -> Result<Vec<ShapeId>>;

    fn picture_rect(&self, id: ShapeId) -> Result<Rect>;

    fn set_picture_rect(&mut self, id: ShapeId, rect: Rect) -> Result<()>;

    /// 現在のサイズで画像をクリップボードへコピー
    fn copy_picture(&mut self, id: ShapeId) -> Result<()>;

    /// ドキュメントを閉じる（保存しない）。2回目以降は何もしない
    fn close(&mut self) -> Result<()>;
}

/// 共有クリップボード
pub trait Clipboard: Send + Sync {
    /// 現在の画像（なければ None）
    fn read_image(&self) -> Result<Option<RgbaImage>>;

    /// 内容が変わるたびに増えるカウンタ。提供できない実装は None
    fn change_count(&self) -> Option<u64> {
        None
    }

    fn clear(&self) -> Result<()>;
}
