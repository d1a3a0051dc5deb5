//! メモリ上のスプレッドシートホスト
//!
//! セル値・基準セル・画像をコードで組み立てる。テストと組み込み用途向け。
//! 開いたセッションと `MemoryDocument` は同じ状態を共有するので、
//! 実行後に図形の位置やクローズ状態を確認できる。

use super::{render_dimensions, Clipboard, DocumentHost, DocumentSession, MemoryClipboard};
use crate::error::{ExportError, Result};
use image::{Rgba, RgbaImage};
use sheet_photo_common::{CellValue, Rect, ShapeId};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// コピー操作時の振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderBehavior {
    /// 現在サイズで描画してクリップボードへ
    Render,
    /// コピーは成功するがクリップボードに何も入らない
    Never,
    /// 最初の N 回は何も入らず、その後は描画する
    Delayed { empty_attempts: u32 },
    /// コピー操作自体がエラー
    FailCopy,
}

#[derive(Debug, Clone)]
struct MemoryPicture {
    rect: Rect,
    behavior: RenderBehavior,
    geometry_readable: bool,
    copies: u32,
    /// set_picture_rect で設定された矩形の履歴
    history: Vec<Rect>,
}

#[derive(Debug, Default)]
struct DocumentState {
    sheet_name: String,
    cells: BTreeMap<(u32, u32), CellValue>,
    cell_rects: BTreeMap<(u32, u32), Rect>,
    pictures: Vec<MemoryPicture>,
    enumerate_error: Option<String>,
    open_count: u32,
    close_count: u32,
}

/// 共有されるメモリ上のドキュメント
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    state: Arc<Mutex<DocumentState>>,
}

fn lock(state: &Mutex<DocumentState>) -> Result<MutexGuard<'_, DocumentState>> {
    state
        .lock()
        .map_err(|_| ExportError::Geometry("ドキュメントのロックに失敗".into()))
}

impl MemoryDocument {
    pub fn new(sheet_name: &str) -> Self {
        let state = DocumentState {
            sheet_name: sheet_name.to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut DocumentState)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    pub fn with_value(self, row: u32, column: u32, value: impl Into<CellValue>) -> Self {
        let value = value.into();
        self.with_state(|s| {
            s.cells.insert((row, column), value);
        })
    }

    pub fn with_cell_rect(self, row: u32, column: u32, rect: Rect) -> Self {
        self.with_state(|s| {
            s.cell_rects.insert((row, column), rect);
        })
    }

    /// 1〜3列目をまとめて設定（識別子・表示名・基準セル）
    pub fn with_row(
        self,
        row: u32,
        identifier: impl Into<CellValue>,
        name: impl Into<CellValue>,
        reference: Rect,
    ) -> Self {
        self.with_value(row, 1, identifier)
            .with_value(row, 2, name)
            .with_cell_rect(row, 3, reference)
    }

    pub fn with_picture(self, rect: Rect, behavior: RenderBehavior) -> Self {
        self.with_state(|s| {
            s.pictures.push(MemoryPicture {
                rect,
                behavior,
                geometry_readable: true,
                copies: 0,
                history: Vec::new(),
            })
        })
    }

    /// 位置情報を読めない画像
    pub fn with_unreadable_picture(self, rect: Rect) -> Self {
        self.with_state(|s| {
            s.pictures.push(MemoryPicture {
                rect,
                behavior: RenderBehavior::Render,
                geometry_readable: false,
                copies: 0,
                history: Vec::new(),
            })
        })
    }

    /// 画像の列挙そのものを失敗させる
    pub fn with_enumerate_error(self, reason: &str) -> Self {
        let reason = reason.to_string();
        self.with_state(|s| s.enumerate_error = Some(reason))
    }

    /// 現在の画像矩形
    pub fn picture_rect(&self, id: ShapeId) -> Option<Rect> {
        let state = self.state.lock().ok()?;
        state.pictures.get(id.0).map(|p| p.rect)
    }

    /// 画像に設定された矩形の履歴
    pub fn picture_history(&self, id: ShapeId) -> Vec<Rect> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.pictures.get(id.0).map(|p| p.history.clone()))
            .unwrap_or_default()
    }

    pub fn copy_count(&self, id: ShapeId) -> u32 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.pictures.get(id.0).map(|p| p.copies))
            .unwrap_or(0)
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().map(|s| s.close_count).unwrap_or(0)
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().map(|s| s.open_count).unwrap_or(0)
    }
}

/// `MemoryDocument` を開くホスト
#[derive(Debug, Clone)]
pub struct MemoryHost {
    document: MemoryDocument,
    clipboard: MemoryClipboard,
    open_error: Option<String>,
}

impl MemoryHost {
    pub fn new(document: MemoryDocument, clipboard: MemoryClipboard) -> Self {
        Self {
            document,
            clipboard,
            open_error: None,
        }
    }

    /// open が常に失敗するホスト
    pub fn failing(reason: &str) -> Self {
        Self {
            document: MemoryDocument::new("Sheet1"),
            clipboard: MemoryClipboard::new(),
            open_error: Some(reason.to_string()),
        }
    }
}

impl DocumentHost for MemoryHost {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentSession>> {
        if let Some(reason) = &self.open_error {
            return Err(ExportError::OpenDocument {
                path: path.display().to_string(),
                reason: reason.clone(),
            });
        }

        let sheet_name = {
            let mut state = lock(&self.document.state)?;
            state.open_count += 1;
            state.sheet_name.clone()
        };

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.document.state),
            clipboard: self.clipboard.clone(),
            sheet_name,
            closed: false,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<DocumentState>>,
    clipboard: MemoryClipboard,
    sheet_name: String,
    closed: bool,
}

impl MemorySession {
    fn state(&self) -> Result<MutexGuard<'_, DocumentState>> {
        if self.closed {
            return Err(ExportError::SessionClosed);
        }
        lock(&self.state)
    }
}

/// 画像ごとに色を変えた単色の描画結果
fn solid_render(id: ShapeId, width: u32, height: u32) -> RgbaImage {
    let shade = (id.0 as u8).wrapping_mul(37);
    RgbaImage::from_pixel(width, height, Rgba([shade, 128, 255 - shade, 255]))
}

impl DocumentSession for MemorySession {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn max_row(&self) -> Result<u32> {
        let state = self.state()?;
        let value_max = state.cells.keys().map(|(row, _)| *row).max().unwrap_or(0);
        let rect_max = state.cell_rects.keys().map(|(row, _)| *row).max().unwrap_or(0);
        Ok(value_max.max(rect_max))
    }

    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue> {
        let state = self.state()?;
        Ok(state.cells.get(&(row, column)).cloned().unwrap_or_default())
    }

    fn cell_rect(&self, row: u32, column: u32) -> Result<Rect> {
        let state = self.state()?;
        state
            .cell_rects
            .get(&(row, column))
            .copied()
            .ok_or_else(|| ExportError::Geometry(format!("セル({}, {})の位置が不明", row, column)))
    }

    fn picture_ids(&self) -> Result<Vec<ShapeId>> {
        let state = self.state()?;
        if let Some(reason) = &state.enumerate_error {
            return Err(ExportError::EnumeratePictures(reason.clone()));
        }
        Ok((0..state.pictures.len()).map(ShapeId).collect())
    }

    fn picture_rect(&self, id: ShapeId) -> Result<Rect> {
        let state = self.state()?;
        let picture = state
            .pictures
            .get(id.0)
            .ok_or_else(|| ExportError::ShapeNotFound(id.to_string()))?;
        if !picture.geometry_readable {
            return Err(ExportError::Geometry(format!("画像{}の位置を読めません", id)));
        }
        Ok(picture.rect)
    }

    fn set_picture_rect(&mut self, id: ShapeId, rect: Rect) -> Result<()> {
        let mut state = self.state()?;
        let picture = state
            .pictures
            .get_mut(id.0)
            .ok_or_else(|| ExportError::ShapeNotFound(id.to_string()))?;
        picture.rect = rect;
        picture.history.push(rect);
        Ok(())
    }

    fn copy_picture(&mut self, id: ShapeId) -> Result<()> {
        let (behavior, rect, copies) = {
            let mut state = self.state()?;
            let picture = state
                .pictures
                .get_mut(id.0)
                .ok_or_else(|| ExportError::ShapeNotFound(id.to_string()))?;
            picture.copies += 1;
            (picture.behavior, picture.rect, picture.copies)
        };

        match behavior {
            RenderBehavior::FailCopy => Err(ExportError::Render(format!("画像{}をコピーできません", id))),
            RenderBehavior::Never => Ok(()),
            RenderBehavior::Delayed { empty_attempts } if copies <= empty_attempts => Ok(()),
            RenderBehavior::Render | RenderBehavior::Delayed { .. } => {
                let (width, height) = render_dimensions(&rect)?;
                self.clipboard.write_image(solid_render(id, width, height))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.clipboard.clear()?;
        lock(&self.state)?.close_count += 1;
        Ok(())
    }
}
