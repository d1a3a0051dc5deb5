//! 照合前のジオメトリ取得
//!
//! 画像の矩形と各データ行の基準セル矩形を一度だけ読み取る。
//! 以後の照合はこのスナップショットだけを使い、ホストを再度読まない。

use crate::error::{ExportError, Result};
use crate::host::DocumentSession;
use sheet_photo_common::{CellValue, ColumnLayout, PictureSnapshot, Rect, RowKey, HEADER_ROW};
use std::collections::BTreeMap;

/// 1回の実行で取得したジオメトリ
#[derive(Debug, Clone, Default)]
pub struct GeometrySnapshot {
    /// 位置を読めた画像（列挙順）
    pub pictures: Vec<PictureSnapshot>,
    /// 基準セルの矩形（位置を読めなかった行は含まない）
    pub cells: BTreeMap<RowKey, Rect>,
    /// 識別子列で値のある最終行
    pub last_row: u32,
    /// 列挙された画像の総数
    pub pictures_found: usize,
    /// 位置を読めず除外した画像
    pub picture_errors: Vec<String>,
}

/// 識別子列を下から走査して最終データ行を求める
pub fn last_data_row(session: &dyn DocumentSession, layout: &ColumnLayout) -> Result<u32> {
    let max_row = session.max_row()?;
    for row in (HEADER_ROW + 1..=max_row).rev() {
        let value = session.cell_value(row, layout.identifier)?;
        if !value.is_blank() {
            return Ok(row);
        }
    }
    Ok(HEADER_ROW)
}

impl GeometrySnapshot {
    pub fn capture(session: &dyn DocumentSession, layout: &ColumnLayout) -> Result<Self> {
        let ids = session.picture_ids().map_err(|e| match e {
            ExportError::EnumeratePictures(_) => e,
            other => ExportError::EnumeratePictures(other.to_string()),
        })?;

        if ids.is_empty() {
            return Err(ExportError::NoPictures(session.sheet_name().to_string()));
        }

        let mut snapshot = GeometrySnapshot {
            pictures_found: ids.len(),
            ..Default::default()
        };

        for id in ids {
            match session.picture_rect(id) {
                Ok(rect) if rect.is_finite() => {
                    snapshot.pictures.push(PictureSnapshot { id, rect });
                }
                Ok(rect) => {
                    tracing::warn!(%id, %rect, "画像の位置が不正なため除外");
                    snapshot.picture_errors.push(format!("画像{}: 位置が不正です ({})", id, rect));
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "画像の位置を取得できないため除外");
                    snapshot.picture_errors.push(format!("画像{}: {}", id, e));
                }
            }
        }

        snapshot.last_row = last_data_row(session, layout)?;

        for row in RowKey::data_rows(snapshot.last_row) {
            match session.cell_rect(row.get(), layout.reference) {
                Ok(rect) if rect.is_finite() => {
                    snapshot.cells.insert(row, rect);
                }
                Ok(_) | Err(_) => {
                    tracing::debug!(%row, "基準セルの位置を取得できないため照合対象外");
                }
            }
        }

        Ok(snapshot)
    }
}

/// 行の識別子と表示名（どちらかが空なら None）
pub fn row_labels(
    session: &dyn DocumentSession,
    row: RowKey,
    layout: &ColumnLayout,
) -> Result<Option<(String, String)>> {
    let identifier = session.cell_value(row.get(), layout.identifier)?;
    let name = session.cell_value(row.get(), layout.display_name)?;
    if identifier.is_blank() || name.is_blank() {
        return Ok(None);
    }
    Ok(Some((label(&identifier), label(&name))))
}

fn label(value: &CellValue) -> String {
    value.display_text().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DocumentHost, MemoryClipboard, MemoryDocument, MemoryHost, RenderBehavior};
    use std::path::Path;

    const COLUMNS: ColumnLayout = ColumnLayout {
        identifier: 1,
        display_name: 2,
        reference: 3,
    };

    fn cell(row: u32) -> Rect {
        Rect::new(15.0 + (row as f64 - 2.0) * 60.0, 100.0, 80.0, 60.0)
    }

    fn open(document: MemoryDocument) -> Box<dyn DocumentSession> {
        MemoryHost::new(document, MemoryClipboard::new())
            .open(Path::new("staff.xlsx"))
            .unwrap()
    }

    #[test]
    fn test_capture_reads_pictures_and_cells() {
        let document = MemoryDocument::new("Sheet1")
            .with_value(1, 1, "ID")
            .with_row(2, 1001.0, "Tanaka", cell(2))
            .with_row(3, 1002.0, "Suzuki", cell(3))
            .with_picture(cell(2), RenderBehavior::Render)
            .with_unreadable_picture(cell(3));
        let session = open(document);

        let snapshot = GeometrySnapshot::capture(session.as_ref(), &COLUMNS).unwrap();
        assert_eq!(snapshot.pictures_found, 2);
        assert_eq!(snapshot.pictures.len(), 1);
        assert_eq!(snapshot.picture_errors.len(), 1);
        assert_eq!(snapshot.last_row, 3);
        assert_eq!(snapshot.cells.len(), 2);
    }

    #[test]
    fn test_last_row_ignores_trailing_blank_identifiers() {
        let document = MemoryDocument::new("Sheet1")
            .with_row(2, 1001.0, "Tanaka", cell(2))
            .with_value(6, 2, "name only")
            .with_value(7, 1, "   ");
        let session = open(document);
        assert_eq!(last_data_row(session.as_ref(), &COLUMNS).unwrap(), 2);
    }

    #[test]
    fn test_header_only_sheet() {
        let document = MemoryDocument::new("Sheet1").with_value(1, 1, "ID");
        let session = open(document);
        assert_eq!(last_data_row(session.as_ref(), &COLUMNS).unwrap(), 1);
    }

    #[test]
    fn test_no_pictures_is_fatal() {
        let document = MemoryDocument::new("Sheet1").with_row(2, 1001.0, "Tanaka", cell(2));
        let session = open(document);
        let err = GeometrySnapshot::capture(session.as_ref(), &COLUMNS).unwrap_err();
        assert!(matches!(err, ExportError::NoPictures(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_enumerate_error_is_fatal() {
        let document = MemoryDocument::new("Sheet1").with_enumerate_error("shapes unavailable");
        let session = open(document);
        let err = GeometrySnapshot::capture(session.as_ref(), &COLUMNS).unwrap_err();
        assert!(matches!(err, ExportError::EnumeratePictures(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_row_without_reference_rect_is_omitted() {
        let document = MemoryDocument::new("Sheet1")
            .with_row(2, 1001.0, "Tanaka", cell(2))
            .with_value(3, 1, 1002.0)
            .with_value(3, 2, "Suzuki")
            .with_picture(cell(2), RenderBehavior::Render);
        let session = open(document);
        let snapshot = GeometrySnapshot::capture(session.as_ref(), &COLUMNS).unwrap();
        assert_eq!(snapshot.last_row, 3);
        assert!(snapshot.cells.contains_key(&RowKey(2)));
        assert!(!snapshot.cells.contains_key(&RowKey(3)));
    }

    #[test]
    fn test_row_labels() {
        let document = MemoryDocument::new("Sheet1")
            .with_row(2, 1001.0, " Tanaka ", cell(2))
            .with_row(3, "", "Suzuki", cell(3));
        let session = open(document);
        let layout = ColumnLayout::default();
        assert_eq!(
            row_labels(session.as_ref(), RowKey(2), &layout).unwrap(),
            Some(("1001".to_string(), "Tanaka".to_string()))
        );
        assert_eq!(row_labels(session.as_ref(), RowKey(3), &layout).unwrap(), None);
    }
}
