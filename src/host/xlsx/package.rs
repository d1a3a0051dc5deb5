//! OOXMLパッケージ（ZIP）とリレーションシップの解決

use crate::error::{ExportError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// 1パートあたりの上限
const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;
/// ヘッダの宣言サイズで先に確保する上限
const MAX_PREALLOCATION: u64 = 1024 * 1024;

/// ZIP内の全パートをメモリに保持したパッケージ
pub(crate) struct Package {
    parts: HashMap<String, Vec<u8>>,
}

/// 解決済みのリレーションシップ
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship {
    pub id: String,
    /// パッケージ内の絶対パート名（先頭の `/` なし）
    pub target: String,
    pub rel_type: String,
    pub external: bool,
}

/// ワークブック内のシート
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub part: String,
}

/// 要素の属性をローカル名で取得
pub(crate) fn attribute<R>(
    reader: &Reader<R>,
    element: &BytesStart<'_>,
    name: &[u8],
) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.decode_and_unescape_value(reader.decoder()).ok())
        .map(|value| value.into_owned())
}

pub(crate) fn xml_error(part: &str, err: impl std::fmt::Display) -> ExportError {
    ExportError::Xml(format!("{}: {}", part, err))
}

/// `base` パートから見た相対ターゲットを絶対パート名にする
pub(crate) fn resolve_target(base: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match base.rfind('/') {
        Some(index) => base[..index].split('/').collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// パートを読み込む。宣言サイズは信用せず、`limit` を超えたら失敗
fn read_part(reader: impl Read, name: &str, declared: u64, limit: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
    reader.take(limit.saturating_add(1)).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(ExportError::Xml(format!("パートが大きすぎます: {}", name)));
    }
    Ok(data)
}

/// パートに対応する .rels のパート名
fn relationships_part(part: &str) -> String {
    match part.rfind('/') {
        Some(index) => format!("{}/_rels/{}.rels", &part[..index], &part[index + 1..]),
        None => format!("_rels/{}.rels", part),
    }
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
        let mut parts = HashMap::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let declared = entry.size();
            let data = read_part(&mut entry, &name, declared, MAX_PART_SIZE)?;
            parts.insert(name, data);
        }

        Ok(Self { parts })
    }

    #[cfg(test)]
    pub fn from_parts(parts: Vec<(&str, &str)>) -> Self {
        Self {
            parts: parts
                .into_iter()
                .map(|(name, data)| (name.to_string(), data.as_bytes().to_vec()))
                .collect(),
        }
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn require(&self, name: &str) -> Result<&[u8]> {
        self.part(name)
            .ok_or_else(|| ExportError::Xml(format!("パートが見つかりません: {}", name)))
    }

    /// パートのリレーションシップ一覧（.rels がなければ空）
    pub fn relationships(&self, part: &str) -> Result<Vec<Relationship>> {
        let rels_name = relationships_part(part);
        let Some(data) = self.part(&rels_name) else {
            return Ok(Vec::new());
        };

        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut relationships = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let id = attribute(&reader, &e, b"Id");
                    let target = attribute(&reader, &e, b"Target");
                    let rel_type = attribute(&reader, &e, b"Type").unwrap_or_default();
                    let external =
                        attribute(&reader, &e, b"TargetMode").as_deref() == Some("External");
                    if let (Some(id), Some(target)) = (id, target) {
                        let target = if external { target } else { resolve_target(part, &target) };
                        relationships.push(Relationship { id, target, rel_type, external });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(&rels_name, e)),
                _ => {}
            }
        }

        Ok(relationships)
    }

    /// リレーションシップIDからターゲットのパート名を引く
    pub fn relationship_target(&self, part: &str, id: &str) -> Result<String> {
        self.relationships(part)?
            .into_iter()
            .find(|rel| rel.id == id && !rel.external)
            .map(|rel| rel.target)
            .ok_or_else(|| {
                ExportError::Xml(format!("{}: リレーションシップ {} が見つかりません", part, id))
            })
    }

    /// ワークブックの既定パート名（ルートの officeDocument）
    fn workbook_part(&self) -> Result<String> {
        let root = self.relationships("")?;
        Ok(root
            .into_iter()
            .find(|rel| rel.rel_type.ends_with("officeDocument"))
            .map(|rel| rel.target)
            .unwrap_or_else(|| "xl/workbook.xml".to_string()))
    }

    /// アクティブシート（workbookView@activeTab）を特定
    pub fn active_sheet(&self) -> Result<SheetEntry> {
        let workbook = self.workbook_part()?;
        let data = self.require(&workbook)?;

        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut active_tab = 0usize;
        let mut sheets: Vec<(String, String)> = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"workbookView" => {
                        let tab = attribute(&reader, &e, b"activeTab").and_then(|v| v.parse().ok());
                        if let Some(tab) = tab {
                            active_tab = tab;
                        }
                    }
                    b"sheet" => {
                        let name = attribute(&reader, &e, b"name");
                        let rel_id = attribute(&reader, &e, b"id");
                        if let (Some(name), Some(rel_id)) = (name, rel_id) {
                            sheets.push((name, rel_id));
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(&workbook, e)),
                _ => {}
            }
        }

        let (name, rel_id) = sheets
            .get(active_tab)
            .or_else(|| sheets.first())
            .cloned()
            .ok_or_else(|| ExportError::Xml(format!("{}: シートがありません", workbook)))?;
        let part = self.relationship_target(&workbook, &rel_id)?;

        Ok(SheetEntry { name, part })
    }
}
