//! .xlsx / .xlsm ファイルを直接読むホスト
//!
//! セル値は calamine、図形の配置はドローイングパートを quick-xml で解析する。
//! 図形の移動・拡大はセッション内だけで行い、ファイルには書き戻さない。

mod drawing;
mod layout;
mod package;

use super::{render_dimensions, Clipboard, DocumentHost, DocumentSession, MemoryClipboard};
use crate::error::{ExportError, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use drawing::{parse_drawing, SourceCrop};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use layout::SheetLayout;
use package::Package;
use sheet_photo_common::{CellValue, Rect, ShapeId};
use std::collections::HashMap;
use std::path::Path;

/// 対応する拡張子
const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

/// ファイルを開くホスト。コピー結果は共有クリップボードへ書き込む
#[derive(Debug, Clone, Default)]
pub struct XlsxHost {
    clipboard: MemoryClipboard,
}

impl XlsxHost {
    pub fn new(clipboard: MemoryClipboard) -> Self {
        Self { clipboard }
    }
}

impl DocumentHost for XlsxHost {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentSession>> {
        Ok(Box::new(XlsxSession::open(path, self.clipboard.clone())?))
    }
}

#[derive(Debug, Clone)]
struct XlsxPicture {
    name: String,
    /// メディアのパート名
    media: Option<String>,
    crop: Option<SourceCrop>,
    rect: Option<Rect>,
}

struct XlsxSession {
    sheet_name: String,
    package: Package,
    layout: SheetLayout,
    values: Range<Data>,
    pictures: Vec<XlsxPicture>,
    /// デコード済みの元画像
    decoded: HashMap<String, RgbaImage>,
    clipboard: MemoryClipboard,
    closed: bool,
}

fn open_error(path: &Path, reason: impl std::fmt::Display) -> ExportError {
    ExportError::OpenDocument {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn to_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Bool(value) => CellValue::Bool(*value),
        other => CellValue::Text(other.to_string()),
    }
}

impl XlsxSession {
    fn open(path: &Path, clipboard: MemoryClipboard) -> Result<Self> {
        if !path.exists() {
            return Err(ExportError::FileNotFound(path.display().to_string()));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExportError::UnsupportedFormat(path.display().to_string()));
        }

        let package = Package::open(path).map_err(|e| open_error(path, e))?;
        let sheet = package.active_sheet().map_err(|e| open_error(path, e))?;
        tracing::debug!(sheet = %sheet.name, part = %sheet.part, "アクティブシート");

        let layout = SheetLayout::parse(&sheet.part, package.require(&sheet.part)?)?;

        let mut workbook = open_workbook_auto(path).map_err(|e| open_error(path, e))?;
        let values = workbook
            .worksheet_range(&sheet.name)
            .map_err(|e| open_error(path, e))?;

        let pictures = match &layout.drawing_rel_id {
            Some(rel_id) => load_pictures(&package, &sheet.part, rel_id, &layout)?,
            None => Vec::new(),
        };
        tracing::debug!(count = pictures.len(), "ドローイングの画像を読み込みました");

        Ok(Self {
            sheet_name: sheet.name,
            package,
            layout,
            values,
            pictures,
            decoded: HashMap::new(),
            clipboard,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ExportError::SessionClosed);
        }
        Ok(())
    }

    fn picture(&self, id: ShapeId) -> Result<&XlsxPicture> {
        self.ensure_open()?;
        self.pictures
            .get(id.0)
            .ok_or_else(|| ExportError::ShapeNotFound(id.to_string()))
    }

    /// 元画像をデコード（パートごとに1回）
    fn source_image(&mut self, media: &str) -> Result<&RgbaImage> {
        if !self.decoded.contains_key(media) {
            let data = self.package.require(media)?;
            let image = image::load_from_memory(data)?.to_rgba8();
            self.decoded.insert(media.to_string(), image);
        }
        self.decoded
            .get(media)
            .ok_or_else(|| ExportError::Render(format!("画像をデコードできません: {}", media)))
    }
}

fn load_pictures(
    package: &Package,
    sheet_part: &str,
    rel_id: &str,
    layout: &SheetLayout,
) -> Result<Vec<XlsxPicture>> {
    let drawing_part = package.relationship_target(sheet_part, rel_id)?;
    let contents = parse_drawing(&drawing_part, package.require(&drawing_part)?)?;
    if contents.other_shapes > 0 {
        tracing::debug!(count = contents.other_shapes, "画像以外の図形を除外");
    }

    let pictures = contents
        .pictures
        .into_iter()
        .map(|picture| {
            let media = picture
                .embed
                .as_deref()
                .and_then(|embed| package.relationship_target(&drawing_part, embed).ok());
            XlsxPicture {
                name: picture.name,
                media,
                crop: picture.crop,
                rect: picture.anchor.map(|anchor| anchor.rect(layout)),
            }
        })
        .collect();

    Ok(pictures)
}

fn incomplete_anchor(picture: &XlsxPicture, id: ShapeId) -> ExportError {
    ExportError::Geometry(format!("{}（{}）のアンカーが不完全です", picture.name, id))
}

impl DocumentSession for XlsxSession {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn max_row(&self) -> Result<u32> {
        self.ensure_open()?;
        Ok(self.values.end().map(|(row, _)| row + 1).unwrap_or(0))
    }

    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue> {
        self.ensure_open()?;
        if row == 0 || column == 0 {
            return Err(ExportError::CellRead(format!(
                "セル({}, {})は範囲外です",
                row, column
            )));
        }
        Ok(self
            .values
            .get_value((row - 1, column - 1))
            .map(to_cell_value)
            .unwrap_or_default())
    }

    fn cell_rect(&self, row: u32, column: u32) -> Result<Rect> {
        self.ensure_open()?;
        if row == 0 || column == 0 {
            return Err(ExportError::Geometry(format!(
                "セル({}, {})は範囲外です",
                row, column
            )));
        }
        Ok(self.layout.cell_rect(row, column))
    }

    fn picture_ids(&self) -> Result<Vec<ShapeId>> {
        self.ensure_open()?;
        Ok((0..self.pictures.len()).map(ShapeId).collect())
    }

    fn picture_rect(&self, id: ShapeId) -> Result<Rect> {
        let picture = self.picture(id)?;
        picture.rect.ok_or_else(|| incomplete_anchor(picture, id))
    }

    fn set_picture_rect(&mut self, id: ShapeId, rect: Rect) -> Result<()> {
        self.ensure_open()?;
        let picture = self
            .pictures
            .get_mut(id.0)
            .ok_or_else(|| ExportError::ShapeNotFound(id.to_string()))?;
        picture.rect = Some(rect);
        Ok(())
    }

    /// 表示されている範囲（切り抜き後）を図形のサイズで描画する
    fn copy_picture(&mut self, id: ShapeId) -> Result<()> {
        let picture = self.picture(id)?.clone();
        let rect = picture.rect.ok_or_else(|| incomplete_anchor(&picture, id))?;
        let media = picture.media.as_deref().ok_or_else(|| {
            ExportError::Render(format!("{}（{}）に画像データがありません", picture.name, id))
        })?;

        let (width, height) = render_dimensions(&rect)?;
        let source = self.source_image(media)?;
        let rendered = match picture.crop {
            Some(crop) => {
                let (x, y, visible_width, visible_height) = crop
                    .visible_region(source.width(), source.height())
                    .ok_or_else(|| {
                        ExportError::Render(format!("{}（{}）の表示範囲が空です", picture.name, id))
                    })?;
                let visible =
                    imageops::crop_imm(source, x, y, visible_width, visible_height).to_image();
                imageops::resize(&visible, width, height, FilterType::Lanczos3)
            }
            None => imageops::resize(source, width, height, FilterType::Lanczos3),
        };
        tracing::trace!(%id, width, height, "描画");
        self.clipboard.write_image(rendered)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.decoded.clear();
        self.clipboard.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let host = XlsxHost::default();
        let result = host.open(Path::new("/nonexistent/staff.xlsx"));
        assert!(matches!(result, Err(ExportError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staff.csv");
        std::fs::write(&path, "id,name\n").unwrap();

        let host = XlsxHost::default();
        let result = host.open(&path);
        assert!(matches!(result, Err(ExportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_corrupt_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();

        let host = XlsxHost::default();
        let result = host.open(&path);
        assert!(matches!(result, Err(ExportError::OpenDocument { .. })));
    }

    #[test]
    fn test_cell_value_conversion() {
        assert_eq!(to_cell_value(&Data::Int(1001)), CellValue::Number(1001.0));
        assert_eq!(to_cell_value(&Data::String("A-12".into())), CellValue::Text("A-12".into()));
        assert_eq!(to_cell_value(&Data::Empty), CellValue::Empty);
        assert_eq!(to_cell_value(&Data::Bool(true)), CellValue::Bool(true));
    }
}
