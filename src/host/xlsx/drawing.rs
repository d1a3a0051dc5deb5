//! ドローイングパート（xl/drawings/drawingN.xml）の解析
//!
//! アンカー直下の `xdr:pic` だけを画像として扱う。
//! 図形・グループ・グラフなどは件数だけ数えて列挙対象から外す。

use super::layout::{emu_to_points, SheetLayout};
use super::package::{attribute, xml_error};
use crate::error::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sheet_photo_common::Rect;

/// セル位置 + EMUオフセット（列・行は0始まり）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Marker {
    pub col: u32,
    pub col_off: i64,
    pub row: u32,
    pub row_off: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    TwoCell { from: Marker, to: Marker },
    OneCell { from: Marker, ext: (i64, i64) },
    Absolute { pos: (i64, i64), ext: (i64, i64) },
}

impl Anchor {
    /// シート座標（ポイント）の矩形
    pub fn rect(&self, layout: &SheetLayout) -> Rect {
        let point = |marker: &Marker| {
            (
                layout.column_left(marker.col + 1) + emu_to_points(marker.col_off),
                layout.row_top(marker.row + 1) + emu_to_points(marker.row_off),
            )
        };

        match self {
            Anchor::TwoCell { from, to } => {
                let (left, top) = point(from);
                let (right, bottom) = point(to);
                Rect::new(top, left, right - left, bottom - top)
            }
            Anchor::OneCell { from, ext } => {
                let (left, top) = point(from);
                Rect::new(top, left, emu_to_points(ext.0), emu_to_points(ext.1))
            }
            Anchor::Absolute { pos, ext } => Rect::new(
                emu_to_points(pos.1),
                emu_to_points(pos.0),
                emu_to_points(ext.0),
                emu_to_points(ext.1),
            ),
        }
    }
}

/// 100% を表す `a:srcRect` の値
const CROP_FULL: f64 = 100_000.0;

/// `a:srcRect` の切り抜き量（各辺、1/1000 %）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SourceCrop {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl SourceCrop {
    /// 元画像のうち表示される範囲 `(x, y, width, height)`。
    /// 負の値（枠内の余白）は切り抜きなしとして扱う。範囲が空なら None
    pub fn visible_region(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let fraction = |value: i64| (value.max(0) as f64 / CROP_FULL).min(1.0);
        let (width, height) = (width as f64, height as f64);

        let x0 = (width * fraction(self.left)).round();
        let x1 = (width * (1.0 - fraction(self.right))).round();
        let y0 = (height * fraction(self.top)).round();
        let y1 = (height * (1.0 - fraction(self.bottom))).round();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// アンカー付きの画像
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnchoredPicture {
    pub name: String,
    /// `a:blip@r:embed`
    pub embed: Option<String>,
    /// `xdr:blipFill/a:srcRect`（指定がなければ None）
    pub crop: Option<SourceCrop>,
    /// 必要な要素が欠けていれば None
    pub anchor: Option<Anchor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DrawingContents {
    pub pictures: Vec<AnchoredPicture>,
    /// 画像以外のオブジェクト数
    pub other_shapes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorKind {
    TwoCell,
    OneCell,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerField {
    Col,
    ColOff,
    Row,
    RowOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Picture,
    Other,
}

/// 解析中のアンカー
#[derive(Debug)]
struct AnchorBuilder {
    kind: AnchorKind,
    /// アンカー内で開いている要素の深さ
    depth: usize,
    from: Option<Marker>,
    to: Option<Marker>,
    pos: Option<(i64, i64)>,
    ext: Option<(i64, i64)>,
    object: Option<ObjectKind>,
    name: Option<String>,
    embed: Option<String>,
    crop: Option<SourceCrop>,
    /// 解析中のマーカー（true = from）
    marker: Option<(bool, Marker)>,
    field: Option<MarkerField>,
}

impl AnchorBuilder {
    fn new(kind: AnchorKind) -> Self {
        Self {
            kind,
            depth: 0,
            from: None,
            to: None,
            pos: None,
            ext: None,
            object: None,
            name: None,
            embed: None,
            crop: None,
            marker: None,
            field: None,
        }
    }

    fn anchor(&self) -> Option<Anchor> {
        match self.kind {
            AnchorKind::TwoCell => Some(Anchor::TwoCell { from: self.from?, to: self.to? }),
            AnchorKind::OneCell => Some(Anchor::OneCell { from: self.from?, ext: self.ext? }),
            AnchorKind::Absolute => Some(Anchor::Absolute { pos: self.pos?, ext: self.ext? }),
        }
    }

    fn set_field(&mut self, text: &str) {
        let (Some((_, marker)), Some(field)) = (self.marker.as_mut(), self.field) else {
            return;
        };
        match field {
            MarkerField::Col => marker.col = text.trim().parse().unwrap_or(0),
            MarkerField::Row => marker.row = text.trim().parse().unwrap_or(0),
            MarkerField::ColOff => marker.col_off = text.trim().parse().unwrap_or(0),
            MarkerField::RowOff => marker.row_off = text.trim().parse().unwrap_or(0),
        }
    }
}

fn parse_pair<R>(
    reader: &Reader<R>,
    element: &BytesStart<'_>,
    a: &[u8],
    b: &[u8],
) -> Option<(i64, i64)> {
    let first = attribute(reader, element, a)?.parse().ok()?;
    let second = attribute(reader, element, b)?.parse().ok()?;
    Some((first, second))
}

/// 省略された辺は 0
fn parse_crop<R>(reader: &Reader<R>, element: &BytesStart<'_>) -> Option<SourceCrop> {
    let side = |name: &[u8]| {
        attribute(reader, element, name)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    };
    let crop = SourceCrop {
        left: side(b"l"),
        top: side(b"t"),
        right: side(b"r"),
        bottom: side(b"b"),
    };
    (crop != SourceCrop::default()).then_some(crop)
}

pub(crate) fn parse_drawing(part: &str, data: &[u8]) -> Result<DrawingContents> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::with_capacity(1024);
    let mut contents = DrawingContents::default();
    let mut current: Option<AnchorBuilder> = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Err(xml_error(part, e)),
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                let local = e.local_name();
                let name = local.as_ref();

                let Some(builder) = current.as_mut() else {
                    let kind = match name {
                        b"twoCellAnchor" => Some(AnchorKind::TwoCell),
                        b"oneCellAnchor" => Some(AnchorKind::OneCell),
                        b"absoluteAnchor" => Some(AnchorKind::Absolute),
                        _ => None,
                    };
                    if let (Some(kind), true) = (kind, is_start) {
                        current = Some(AnchorBuilder::new(kind));
                    }
                    continue;
                };

                // アンカー直下の要素
                if builder.depth == 0 {
                    match name {
                        b"from" | b"to" if is_start => {
                            builder.marker = Some((name == b"from", Marker::default()));
                        }
                        b"pos" => builder.pos = parse_pair(&reader, e, b"x", b"y"),
                        b"ext" => builder.ext = parse_pair(&reader, e, b"cx", b"cy"),
                        b"pic" => builder.object = Some(ObjectKind::Picture),
                        b"sp" | b"grpSp" | b"graphicFrame" | b"cxnSp" | b"contentPart" => {
                            builder.object.get_or_insert(ObjectKind::Other);
                        }
                        _ => {}
                    }
                } else if builder.marker.is_some() && builder.depth == 1 {
                    builder.field = match name {
                        b"col" => Some(MarkerField::Col),
                        b"colOff" => Some(MarkerField::ColOff),
                        b"row" => Some(MarkerField::Row),
                        b"rowOff" => Some(MarkerField::RowOff),
                        _ => None,
                    };
                } else if builder.object == Some(ObjectKind::Picture) {
                    match name {
                        b"cNvPr" if builder.name.is_none() => {
                            builder.name = attribute(&reader, e, b"name");
                        }
                        b"blip" => builder.embed = attribute(&reader, e, b"embed"),
                        b"srcRect" => builder.crop = parse_crop(&reader, e),
                        _ => {}
                    }
                }

                if is_start {
                    builder.depth += 1;
                }
            }
            Event::Text(ref t) => {
                if let Some(builder) = current.as_mut() {
                    if let Ok(text) = std::str::from_utf8(t) {
                        builder.set_field(text);
                    }
                }
            }
            Event::End(_) => {
                let Some(builder) = current.as_mut() else {
                    continue;
                };

                if builder.depth == 0 {
                    // アンカーの終了
                    if let Some(builder) = current.take() {
                        match builder.object {
                            Some(ObjectKind::Picture) => {
                                let index = contents.pictures.len() + 1;
                                let anchor = builder.anchor();
                                let name =
                                    builder.name.unwrap_or_else(|| format!("Picture {}", index));
                                contents.pictures.push(AnchoredPicture {
                                    name,
                                    embed: builder.embed,
                                    crop: builder.crop,
                                    anchor,
                                });
                            }
                            Some(ObjectKind::Other) => contents.other_shapes += 1,
                            None => {}
                        }
                    }
                    continue;
                }

                builder.depth -= 1;
                if builder.depth == 1 {
                    builder.field = None;
                }
                if builder.depth == 0 {
                    if let Some((is_from, marker)) = builder.marker.take() {
                        if is_from {
                            builder.from = Some(marker);
                        } else {
                            builder.to = Some(marker);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:twoCellAnchor editAs="oneCell">
    <xdr:from><xdr:col>2</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:to><xdr:col>2</xdr:col><xdr:colOff>381000</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>95250</xdr:rowOff></xdr:to>
    <xdr:pic>
      <xdr:nvPicPr><xdr:cNvPr id="2" name="Picture 1"/><xdr:cNvPicPr/></xdr:nvPicPr>
      <xdr:blipFill><a:blip r:embed="rId1"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>
      <xdr:spPr><a:xfrm><a:off x="1" y="2"/><a:ext cx="999" cy="999"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
  <xdr:oneCellAnchor>
    <xdr:from><xdr:col>2</xdr:col><xdr:colOff>12700</xdr:colOff><xdr:row>3</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:ext cx="254000" cy="127000"/>
    <xdr:pic>
      <xdr:nvPicPr><xdr:cNvPr id="3" name="Photo B"/><xdr:cNvPicPr/></xdr:nvPicPr>
      <xdr:blipFill><a:blip r:embed="rId2"/></xdr:blipFill>
      <xdr:spPr/>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:oneCellAnchor>
  <xdr:absoluteAnchor>
    <xdr:pos x="127000" y="254000"/>
    <xdr:ext cx="635000" cy="317500"/>
    <xdr:sp>
      <xdr:nvSpPr><xdr:cNvPr id="4" name="Logo Box"/><xdr:cNvSpPr/></xdr:nvSpPr>
      <xdr:spPr/>
    </xdr:sp>
    <xdr:clientData/>
  </xdr:absoluteAnchor>
</xdr:wsDr>"#;

    #[test]
    fn test_parse_pictures_and_shapes() {
        let contents = parse_drawing("drawing1.xml", DRAWING.as_bytes()).unwrap();
        assert_eq!(contents.pictures.len(), 2);
        assert_eq!(contents.other_shapes, 1);

        let first = &contents.pictures[0];
        assert_eq!(first.name, "Picture 1");
        assert_eq!(first.embed.as_deref(), Some("rId1"));
        assert_eq!(
            first.anchor,
            Some(Anchor::TwoCell {
                from: Marker { col: 2, col_off: 0, row: 1, row_off: 0 },
                to: Marker { col: 2, col_off: 381000, row: 2, row_off: 95250 },
            })
        );

        let second = &contents.pictures[1];
        assert_eq!(second.name, "Photo B");
        assert_eq!(
            second.anchor,
            Some(Anchor::OneCell {
                from: Marker { col: 2, col_off: 12700, row: 3, row_off: 0 },
                ext: (254000, 127000),
            })
        );
    }

    #[test]
    fn test_anchor_rects() {
        let layout = SheetLayout::default();
        let contents = parse_drawing("drawing1.xml", DRAWING.as_bytes()).unwrap();

        // C2 起点、幅 30pt、高さ 15pt + 7.5pt
        let rect = contents.pictures[0].anchor.unwrap().rect(&layout);
        assert_eq!(rect, Rect::new(15.0, 96.0, 30.0, 22.5));

        let rect = contents.pictures[1].anchor.unwrap().rect(&layout);
        assert_eq!(rect, Rect::new(45.0, 97.0, 20.0, 10.0));

        let absolute = Anchor::Absolute { pos: (127000, 254000), ext: (635000, 317500) };
        assert_eq!(absolute.rect(&layout), Rect::new(20.0, 10.0, 50.0, 25.0));
    }

    #[test]
    fn test_incomplete_anchor() {
        let xml = r#"<xdr:wsDr xmlns:xdr="x"><xdr:oneCellAnchor><xdr:pic><xdr:nvPicPr><xdr:cNvPr id="1" name="P"/></xdr:nvPicPr></xdr:pic></xdr:oneCellAnchor></xdr:wsDr>"#;
        let contents = parse_drawing("drawing1.xml", xml.as_bytes()).unwrap();
        assert_eq!(contents.pictures.len(), 1);
        assert_eq!(contents.pictures[0].anchor, None);
    }

    #[test]
    fn test_source_crop() {
        let xml = r#"<xdr:wsDr xmlns:xdr="x" xmlns:a="a" xmlns:r="r">
  <xdr:oneCellAnchor>
    <xdr:from><xdr:col>2</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:ext cx="381000" cy="285750"/>
    <xdr:pic>
      <xdr:nvPicPr><xdr:cNvPr id="2" name="Cropped"/></xdr:nvPicPr>
      <xdr:blipFill><a:blip r:embed="rId1"/><a:srcRect l="10000" r="50000"/><a:stretch/></xdr:blipFill>
    </xdr:pic>
  </xdr:oneCellAnchor>
</xdr:wsDr>"#;
        let contents = parse_drawing("drawing1.xml", xml.as_bytes()).unwrap();
        let crop = contents.pictures[0].crop.unwrap();
        assert_eq!(crop, SourceCrop { left: 10000, top: 0, right: 50000, bottom: 0 });
        assert_eq!(crop.visible_region(40, 30), Some((4, 0, 16, 30)));

        // srcRect がなければ切り抜きなし
        let contents = parse_drawing("drawing1.xml", DRAWING.as_bytes()).unwrap();
        assert_eq!(contents.pictures[0].crop, None);
    }

    #[test]
    fn test_visible_region_edges() {
        let padded = SourceCrop { left: -5000, top: -5000, right: 0, bottom: 0 };
        assert_eq!(padded.visible_region(40, 30), Some((0, 0, 40, 30)));

        let nothing_left = SourceCrop { left: 60000, right: 40000, ..Default::default() };
        assert_eq!(nothing_left.visible_region(40, 30), None);
    }
}
