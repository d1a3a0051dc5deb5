//! シートのグリッド寸法（列幅・行高）
//!
//! 列幅は文字数単位で保存されている。最大桁幅 7px（Calibri 11pt）で
//! ピクセルに換算し、0.75pt/px でポイントにする。行高はポイントのまま。

use super::package::{attribute, xml_error};
use crate::error::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sheet_photo_common::Rect;
use std::collections::BTreeMap;
use std::str::FromStr;

/// 最大桁幅（px）
const MAX_DIGIT_WIDTH: f64 = 7.0;
const POINTS_PER_PIXEL: f64 = 0.75;
/// 既定の列幅 64px
const DEFAULT_COLUMN_WIDTH_PT: f64 = 48.0;
const DEFAULT_ROW_HEIGHT_PT: f64 = 15.0;

/// 1pt = 12700 EMU
pub(crate) const EMU_PER_POINT: f64 = 12_700.0;

pub(crate) fn emu_to_points(emu: i64) -> f64 {
    emu as f64 / EMU_PER_POINT
}

fn parsed<T: FromStr, R>(reader: &Reader<R>, element: &BytesStart<'_>, name: &[u8]) -> Option<T> {
    attribute(reader, element, name).and_then(|value| value.parse().ok())
}

fn flag<R>(reader: &Reader<R>, element: &BytesStart<'_>, name: &[u8]) -> bool {
    attribute(reader, element, name).is_some_and(|value| value == "1" || value == "true")
}

/// 文字数単位の列幅をポイントに換算
fn column_width_to_points(width: f64) -> f64 {
    let padded = (256.0 * width + (128.0 / MAX_DIGIT_WIDTH).trunc()) / 256.0;
    let pixels = (padded * MAX_DIGIT_WIDTH).trunc();
    pixels * POINTS_PER_PIXEL
}

/// baseColWidth（余白を含まない文字数）からの既定列幅
fn base_column_width_to_points(base: f64) -> f64 {
    // 左右の余白 2px ずつ + 罫線 1px、8px 単位に切り上げ
    let pixels = ((base * MAX_DIGIT_WIDTH + 5.0) / 8.0).ceil() * 8.0;
    pixels * POINTS_PER_PIXEL
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnSpan {
    min: u32,
    max: u32,
    width: f64,
}

/// シートのレイアウトとドローイング参照
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetLayout {
    default_column_width: f64,
    default_row_height: f64,
    columns: Vec<ColumnSpan>,
    /// 既定と異なる行の高さ（非表示行は 0）
    rows: BTreeMap<u32, f64>,
    /// `<drawing r:id>` のリレーションシップID
    pub drawing_rel_id: Option<String>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            default_column_width: DEFAULT_COLUMN_WIDTH_PT,
            default_row_height: DEFAULT_ROW_HEIGHT_PT,
            columns: Vec::new(),
            rows: BTreeMap::new(),
            drawing_rel_id: None,
        }
    }
}

impl SheetLayout {
    pub fn parse(part: &str, data: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::with_capacity(1024);
        let mut layout = SheetLayout::default();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"sheetFormatPr" => {
                        if let Some(height) = parsed::<f64, _>(&reader, &e, b"defaultRowHeight") {
                            layout.default_row_height = height;
                        }
                        let default_width = parsed::<f64, _>(&reader, &e, b"defaultColWidth");
                        let base_width = parsed::<f64, _>(&reader, &e, b"baseColWidth");
                        if let Some(width) = default_width {
                            layout.default_column_width = column_width_to_points(width);
                        } else if let Some(base) = base_width {
                            layout.default_column_width = base_column_width_to_points(base);
                        }
                    }
                    b"col" => {
                        let min = parsed::<u32, _>(&reader, &e, b"min");
                        let max = parsed::<u32, _>(&reader, &e, b"max");
                        let hidden = flag(&reader, &e, b"hidden");
                        let width = parsed::<f64, _>(&reader, &e, b"width");
                        if let (Some(min), Some(max)) = (min, max) {
                            let width = match width {
                                _ if hidden => 0.0,
                                Some(width) => column_width_to_points(width),
                                None => layout.default_column_width,
                            };
                            layout.columns.push(ColumnSpan { min, max: max.max(min), width });
                        }
                    }
                    b"row" => {
                        let Some(index) = parsed::<u32, _>(&reader, &e, b"r") else {
                            continue;
                        };
                        let hidden = flag(&reader, &e, b"hidden");
                        let height = parsed::<f64, _>(&reader, &e, b"ht");
                        if hidden {
                            layout.rows.insert(index, 0.0);
                        } else if let Some(height) = height {
                            layout.rows.insert(index, height);
                        }
                    }
                    b"drawing" => {
                        layout.drawing_rel_id = attribute(&reader, &e, b"id");
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(part, e)),
                _ => {}
            }
        }

        Ok(layout)
    }

    /// 列幅（1始まり）
    pub fn column_width(&self, column: u32) -> f64 {
        self.columns
            .iter()
            .find(|span| span.min <= column && column <= span.max)
            .map(|span| span.width)
            .unwrap_or(self.default_column_width)
    }

    /// 列の左端（1始まり）
    pub fn column_left(&self, column: u32) -> f64 {
        let preceding = column.saturating_sub(1);
        let mut left = preceding as f64 * self.default_column_width;
        for span in &self.columns {
            if span.min > preceding {
                continue;
            }
            let covered = span.max.min(preceding) - span.min + 1;
            left += covered as f64 * (span.width - self.default_column_width);
        }
        left
    }

    pub fn row_height(&self, row: u32) -> f64 {
        self.rows.get(&row).copied().unwrap_or(self.default_row_height)
    }

    /// 行の上端（1始まり）
    pub fn row_top(&self, row: u32) -> f64 {
        let preceding = row.saturating_sub(1);
        let mut top = preceding as f64 * self.default_row_height;
        for (_, height) in self.rows.range(..row) {
            top += height - self.default_row_height;
        }
        top
    }

    pub fn cell_rect(&self, row: u32, column: u32) -> Rect {
        Rect::new(
            self.row_top(row),
            self.column_left(column),
            self.column_width(column),
            self.row_height(row),
        )
    }
}
