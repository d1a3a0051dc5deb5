//! 1回の書き出し処理
//!
//! 開く → ジオメトリ取得 → 照合 → 行ごとの取り出し → 閉じる → サマリー
//! の順に進める。致命的なエラーでもサマリーは必ず出力する。

use crate::error::{ExportError, ExportFailure, Result};
use crate::extractor::{Extractor, ImageSink};
use crate::host::{Clipboard, DocumentHost, DocumentSession};
use crate::reporter::Reporter;
use crate::snapshot::GeometrySnapshot;
use crate::worker::CancelToken;
use sheet_photo_common::{
    ColumnLayout, ExportSettings, MatchDecision, MatchOutcome, MatchPass, Matcher, RowKey,
    RowOutcome, RunReport,
};
use std::path::Path;

/// 開いているドキュメント。スコープを抜けると保存せずに閉じる
pub struct OpenDocument {
    session: Box<dyn DocumentSession>,
    closed: bool,
}

impl OpenDocument {
    pub fn open(host: &dyn DocumentHost, path: &Path) -> Result<Self> {
        let session = host.open(path)?;
        Ok(Self { session, closed: false })
    }

    pub fn session(&self) -> &dyn DocumentSession {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> &mut dyn DocumentSession {
        self.session.as_mut()
    }

    /// 明示的に閉じる
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.close()
    }
}

impl Drop for OpenDocument {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.close() {
            tracing::warn!(error = %e, "ドキュメントを閉じる際にエラー");
        }
    }
}

/// ドライラン（照合のみ）の結果
#[derive(Debug, Clone)]
pub struct MatchPreview {
    pub sheet_name: String,
    pub snapshot: GeometrySnapshot,
    pub outcome: MatchOutcome,
}

/// 照合の判断をログ行にする
pub fn describe_decision(decision: &MatchDecision) -> String {
    match decision {
        MatchDecision::Accepted(record) => {
            let pass = match record.pass {
                MatchPass::Strict => "Pass 1",
                MatchPass::Relaxed => "Pass 2",
            };
            format!(
                "  ✔ [{}] 画像{} → 行{}（{}, 距離 {:.1}）",
                pass, record.picture, record.row, record.basis, record.distance
            )
        }
        MatchDecision::Deferred(unmatched) => match unmatched.nearest_row {
            Some(row) => format!(
                "  … [Pass 1] 画像{}: 最も近い行{}（距離 {:.1}）の条件外、Pass 2 へ",
                unmatched.picture, row, unmatched.distance
            ),
            None => format!("  … [Pass 1] 画像{}: 基準セルがありません", unmatched.picture),
        },
        MatchDecision::RowAlreadyClaimed { picture, row, claimed_by, pass } => {
            let pass = match pass {
                MatchPass::Strict => "Pass 1",
                MatchPass::Relaxed => "Pass 2",
            };
            format!(
                "  ⚠ [{}] 画像{}: 行{}は画像{}に割り当て済みのため除外",
                pass, picture, row, claimed_by
            )
        }
        MatchDecision::Rejected(unmatched) => {
            format!("  ✗ [Pass 2] 画像{}: どの行にも割り当てられません", unmatched.picture)
        }
    }
}

fn describe_outcome(outcome: &RowOutcome) -> String {
    match outcome {
        RowOutcome::Saved { row, file_name, width, height, .. } => {
            format!("✔ 行{}: {} を保存 ({}x{})", row, file_name, width, height)
        }
        RowOutcome::MissingImage { row } => format!("- 行{}: 画像が見つかりません", row),
        RowOutcome::Skipped { row } => {
            format!("- 行{}: 識別子または名前が空のためスキップ", row)
        }
        RowOutcome::Failed { row, reason } => format!("✗ 行{}: {}", row, reason),
    }
}

/// ジオメトリ取得と照合
fn snapshot_and_match(
    session: &dyn DocumentSession,
    columns: &ColumnLayout,
    reporter: &mut Reporter,
) -> Result<(GeometrySnapshot, MatchOutcome)> {
    let snapshot = GeometrySnapshot::capture(session, columns)?;
    let rows = snapshot.last_row.saturating_sub(1);
    reporter.line(format!("📄 シート: {}", session.sheet_name()));
    reporter.line(format!("🔢 データ行: {}行", rows));
    reporter.line(format!("🖼 画像: {}枚", snapshot.pictures_found));
    for error in &snapshot.picture_errors {
        reporter.line(format!("  ⚠ {}", error));
    }

    let outcome = Matcher::default().run(&snapshot.pictures, &snapshot.cells);
    reporter.line("🔍 画像と行を照合中...");
    for decision in &outcome.decisions {
        reporter.line(describe_decision(decision));
    }
    reporter.line(format!(
        "🔗 割り当て: {}/{}枚（Pass 2 候補 {}枚, 未割り当て {}枚）",
        outcome.matched_count(),
        snapshot.pictures.len(),
        outcome.pass2_candidates.len(),
        outcome.unmatched.len()
    ));

    Ok((snapshot, outcome))
}

/// 照合だけを行い、図形には触れない
pub fn run_match(
    host: &dyn DocumentHost,
    source: &Path,
    columns: &ColumnLayout,
    reporter: &mut Reporter,
) -> Result<MatchPreview> {
    let document = OpenDocument::open(host, source)?;
    let (snapshot, outcome) = snapshot_and_match(document.session(), columns, reporter)?;
    let sheet_name = document.session().sheet_name().to_string();
    if let Err(e) = document.close() {
        tracing::warn!(error = %e, "ドキュメントを閉じる際にエラー");
    }
    Ok(MatchPreview {
        sheet_name,
        snapshot,
        outcome,
    })
}

/// 書き出しの入出力
pub struct ExportContext<'a> {
    pub host: &'a dyn DocumentHost,
    pub clipboard: &'a dyn Clipboard,
    pub sink: &'a dyn ImageSink,
}

/// 書き出しを実行してレポートを返す。
/// 致命的エラーの場合もそこまでのレポートを `ExportFailure` に入れて返す
pub fn run_export(
    context: &ExportContext<'_>,
    source: &Path,
    settings: &ExportSettings,
    reporter: &mut Reporter,
    cancel: &CancelToken,
) -> std::result::Result<RunReport, ExportFailure> {
    let mut report = RunReport::default();
    let started = chrono::Local::now();
    reporter.line(format!("🚀 開始: {}", started.format("%Y-%m-%d %H:%M:%S")));

    let result = export_rows(context, source, settings, reporter, cancel, &mut report);

    if let Err(e) = &result {
        reporter.line(format!("❌ エラー: {}", e));
        report.fatal_error = Some(e.to_string());
    }
    for line in report.summary_lines() {
        reporter.line(line);
    }
    let elapsed = chrono::Local::now() - started;
    reporter.line(format!("⏱ 所要時間: {:.1}秒", elapsed.num_milliseconds() as f64 / 1000.0));
    report.lines = reporter.lines().to_vec();

    match result {
        Ok(()) => Ok(report),
        Err(error) => Err(ExportFailure {
            error,
            report: Box::new(report),
        }),
    }
}

fn export_rows(
    context: &ExportContext<'_>,
    source: &Path,
    settings: &ExportSettings,
    reporter: &mut Reporter,
    cancel: &CancelToken,
    report: &mut RunReport,
) -> Result<()> {
    settings.validate()?;
    reporter.line(format!("📁 出力フォルダ: {}", settings.output_directory.display()));
    context.sink.prepare()?;

    let mut document = OpenDocument::open(context.host, source)?;
    reporter.line(format!("📂 ファイルを開きました: {}", source.display()));

    let (snapshot, matches) = snapshot_and_match(document.session(), &settings.columns, reporter)?;
    report.pictures_found = snapshot.pictures_found;
    report.pictures_matched = matches.matched_count();
    report.picture_errors.extend(snapshot.picture_errors.iter().cloned());

    let rows: Vec<RowKey> = RowKey::data_rows(snapshot.last_row).collect();
    let total = rows.len();
    reporter.line(format!("📸 画像を取り出し中...（倍率 {}x）", settings.scale_factor));

    let mut extractor = Extractor::new(settings, context.clipboard, context.sink);
    for (index, row) in rows.into_iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            reporter.line(format!("⏹ キャンセル要求により行{}で停止", row));
            break;
        }

        let outcome = extractor.process_row(document.session_mut(), row, matches.record_for(row));
        reporter.line(describe_outcome(&outcome));
        report.record(outcome);
        report.rows_iterated += 1;
        reporter.progress(index + 1, total);
    }

    for error in extractor.take_picture_errors() {
        reporter.line(format!("  ⚠ {}", error));
        report.picture_errors.push(error);
    }

    if let Err(e) = document.close() {
        tracing::warn!(error = %e, "ドキュメントを閉じる際にエラー");
        reporter.line(format!("⚠ ドキュメントを閉じる際にエラー: {}", e));
    }

    Ok(())
}

/// 致命的エラーのうち、設定値の誤りかどうか
pub fn is_configuration_error(error: &ExportError) -> bool {
    matches!(error, ExportError::Config(_) | ExportError::Common(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryClipboard, MemoryDocument, MemoryHost, RenderBehavior};
    use sheet_photo_common::{MatchBasis, MatchRecord, Rect, ShapeId, UnmatchedPicture};
    use std::path::PathBuf;

    struct NullSink;

    impl ImageSink for NullSink {
        fn prepare(&self) -> Result<()> {
            Ok(())
        }

        fn write_png(&self, file_name: &str, _image: &image::RgbaImage) -> Result<PathBuf> {
            Ok(PathBuf::from(file_name))
        }
    }

    #[test]
    fn test_describe_decisions() {
        let accepted = MatchDecision::Accepted(MatchRecord {
            row: RowKey(2),
            picture: ShapeId(0),
            distance: 1.0,
            basis: MatchBasis::InCell,
            pass: MatchPass::Strict,
        });
        assert_eq!(describe_decision(&accepted), "  ✔ [Pass 1] 画像#0 → 行2（セル内, 距離 1.0）");

        let rejected = MatchDecision::Rejected(UnmatchedPicture {
            picture: ShapeId(3),
            nearest_row: Some(RowKey(4)),
            distance: 80.0,
        });
        assert!(describe_decision(&rejected).contains("画像#3"));
    }

    #[test]
    fn test_fatal_open_still_emits_summary() {
        let host = MemoryHost::failing("locked by another process");
        let clipboard = MemoryClipboard::new();
        let context = ExportContext {
            host: &host,
            clipboard: &clipboard,
            sink: &NullSink,
        };
        let mut reporter = Reporter::silent();
        let result = run_export(
            &context,
            Path::new("staff.xlsx"),
            &ExportSettings::default(),
            &mut reporter,
            &CancelToken::new(),
        );

        let failure = result.unwrap_err();
        assert!(failure.error.is_fatal());
        assert!(reporter.lines().iter().any(|l| l.starts_with("❌")));
        assert!(reporter.lines().iter().any(|l| l == "📊 完了レポート:"));

        // 中断時のレポートにもエラーと出力行が残る
        assert!(failure.report.fatal_error.as_deref().is_some_and(|e| e.contains("locked")));
        assert_eq!(failure.report.lines, reporter.lines());
        assert_eq!(failure.report.rows_iterated, 0);
    }

    #[test]
    fn test_invalid_settings_rejected_before_open() {
        let document = MemoryDocument::new("Sheet1");
        let host = MemoryHost::new(document.clone(), MemoryClipboard::new());
        let clipboard = MemoryClipboard::new();
        let context = ExportContext {
            host: &host,
            clipboard: &clipboard,
            sink: &NullSink,
        };
        let settings = ExportSettings {
            scale_factor: 0.5,
            ..Default::default()
        };
        let failure = run_export(
            &context,
            Path::new("staff.xlsx"),
            &settings,
            &mut Reporter::silent(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(is_configuration_error(&failure.error));
        assert_eq!(document.open_count(), 0);
    }

    #[test]
    fn test_match_preview_does_not_mutate() {
        let cell = Rect::new(15.0, 96.0, 48.0, 60.0);
        let document = MemoryDocument::new("Staff")
            .with_row(2, 1001.0, "Tanaka", cell)
            .with_picture(Rect::new(20.0, 100.0, 40.0, 50.0), RenderBehavior::Render);
        let host = MemoryHost::new(document.clone(), MemoryClipboard::new());

        let columns = ColumnLayout::default();
        let preview =
            run_match(&host, Path::new("staff.xlsx"), &columns, &mut Reporter::silent()).unwrap();
        assert_eq!(preview.sheet_name, "Staff");
        assert_eq!(preview.outcome.matched_count(), 1);
        assert!(document.picture_history(ShapeId(0)).is_empty());
        assert_eq!(document.close_count(), 1);
    }
}
