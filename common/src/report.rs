//! 実行結果の集計
//!
//! 行ごとの結果と件数を保持し、最終サマリーの文面を組み立てる。

use crate::types::RowKey;
use serde::{Deserialize, Serialize};

/// 行ごとの処理結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RowOutcome {
    /// 画像を保存した
    Saved {
        row: RowKey,
        file_name: String,
        width: u32,
        height: u32,
        /// 保存した画像の SHA-256（hex）
        digest: String,
    },
    /// 対応する画像がない
    MissingImage { row: RowKey },
    /// 識別子または表示名が空
    Skipped { row: RowKey },
    /// 抽出に失敗した
    Failed { row: RowKey, reason: String },
}

impl RowOutcome {
    pub fn row(&self) -> RowKey {
        match self {
            RowOutcome::Saved { row, .. }
            | RowOutcome::MissingImage { row }
            | RowOutcome::Skipped { row }
            | RowOutcome::Failed { row, .. } => *row,
        }
    }
}

/// 実行レポート
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// 走査対象の行数（2行目〜最終行）
    pub rows_iterated: usize,
    pub saved: usize,
    pub missing_images: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 見つかった画像の数
    pub pictures_found: usize,
    /// 行に割り当てられた画像の数
    pub pictures_matched: usize,
    /// 図形単位のエラー（ジオメトリ取得失敗・復元失敗など）
    pub picture_errors: Vec<String>,
    pub outcomes: Vec<RowOutcome>,
    pub cancelled: bool,
    /// 実行を中断した致命的エラー
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    /// 出力したログ行（順序どおり）
    pub lines: Vec<String>,
}

/// 1枚も保存できなかった場合の確認事項
pub const ZERO_SUCCESS_HINTS: &[&str] = &[
    "画像の位置を特定できなかった（基準列のセルと画像が離れている）",
    "画像のコピー中にエラーが発生した（待機時間が短すぎる可能性）",
    "画像の形式がサポートされていない",
    "Excelファイルの構成が想定と異なる（1列目: 識別子, 2列目: 名前, 3列目: 画像）",
];

impl RunReport {
    /// 行の結果を記録して件数を更新
    pub fn record(&mut self, outcome: RowOutcome) {
        match &outcome {
            RowOutcome::Saved { .. } => self.saved += 1,
            RowOutcome::MissingImage { .. } => self.missing_images += 1,
            RowOutcome::Skipped { .. } => self.skipped += 1,
            RowOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn outcome_for(&self, row: RowKey) -> Option<&RowOutcome> {
        self.outcomes.iter().find(|o| o.row() == row)
    }

    /// 最終サマリーの行
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "📊 完了レポート:".to_string(),
            format!("- 処理した行数: {}", self.rows_iterated),
            format!("- 保存した画像: {}", self.saved),
            format!("- 画像のない行: {}", self.missing_images),
            format!("- スキップした行: {}", self.skipped),
            format!("- 抽出に失敗した行: {}", self.failed),
            format!("- 割り当てた画像: {}/{}", self.pictures_matched, self.pictures_found),
        ];

        if !self.picture_errors.is_empty() {
            lines.push(format!("- 図形エラー: {}", self.picture_errors.len()));
        }

        if self.cancelled {
            lines.push("⏹ 途中でキャンセルされました".to_string());
        }

        if self.saved == 0 {
            lines.push("⚠️ 警告: 画像が1枚も保存されませんでした。考えられる原因:".to_string());
            for (i, hint) in ZERO_SUCCESS_HINTS.iter().enumerate() {
                lines.push(format!("   {}. {}", i + 1, hint));
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let mut report = RunReport::default();
        report.record(RowOutcome::Saved {
            row: RowKey(2),
            file_name: "1_.png".into(),
            width: 10,
            height: 10,
            digest: String::new(),
        });
        report.record(RowOutcome::MissingImage { row: RowKey(3) });
        report.record(RowOutcome::Skipped { row: RowKey(4) });
        report.record(RowOutcome::Failed { row: RowKey(5), reason: "x".into() });

        assert_eq!(report.saved, 1);
        assert_eq!(report.missing_images, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(report.outcome_for(RowKey(3)), Some(RowOutcome::MissingImage { .. })));
    }

    #[test]
    fn test_zero_success_adds_hints() {
        let report = RunReport::default();
        let lines = report.summary_lines();
        assert!(lines.iter().any(|l| l.contains("警告")));
        assert!(lines.iter().any(|l| l.starts_with("   4.")));
    }

    #[test]
    fn test_success_has_no_hints() {
        let mut report = RunReport::default();
        report.record(RowOutcome::Saved {
            row: RowKey(2),
            file_name: "1_.png".into(),
            width: 1,
            height: 1,
            digest: String::new(),
        });
        assert!(!report.summary_lines().iter().any(|l| l.contains("警告")));
    }

    #[test]
    fn test_serialize_outcome_tag() {
        let json = serde_json::to_string(&RowOutcome::MissingImage { row: RowKey(7) }).unwrap();
        assert_eq!(json, r#"{"status":"missingImage","row":7}"#);
    }
}
