//! シートと図形を識別する型

use serde::{Deserialize, Serialize};

/// 1行目はヘッダー行
pub const HEADER_ROW: u32 = 1;

/// データ行の最初の行番号
pub const FIRST_DATA_ROW: u32 = 2;

/// 1始まりの行番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(pub u32);

impl RowKey {
    pub fn get(self) -> u32 {
        self.0
    }

    /// `2..=last_row` の行を昇順に列挙
    pub fn data_rows(last_row: u32) -> impl Iterator<Item = RowKey> {
        (FIRST_DATA_ROW..=last_row).map(RowKey)
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ホスト側の図形ID（列挙順のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(pub usize);

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// セル値
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// 空セル・空白のみの文字列を空とみなす
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            CellValue::Bool(_) => false,
        }
    }

    /// ファイル名・ログ用の表示文字列
    ///
    /// 整数値の数値は小数部なしで表示する（`1001.0` → `1001`）。
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Bool(b) => if *b { "TRUE".into() } else { "FALSE".into() },
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// 読み取る列（1始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnLayout {
    /// 識別子（社員番号など）の列
    pub identifier: u32,
    /// 表示名の列
    pub display_name: u32,
    /// 位置合わせの基準セルの列
    pub reference: u32,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            identifier: 1,
            display_name: 2,
            reference: 3,
        }
    }
}
