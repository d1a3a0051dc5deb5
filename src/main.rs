use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sheet_photo_common::{MatchPass, RowKey, RunReport};
use sheet_photo_export::config::{Config, Overrides};
use sheet_photo_export::host::{MemoryClipboard, XlsxHost};
use sheet_photo_export::pipeline::is_configuration_error;
use sheet_photo_export::{
    cli, run_export, run_match, DirectorySink, ExportContext, ExportFailure, ExtractionWorker,
    ReportEvent, Reporter,
};
use cli::{Cli, Commands};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Export { source, output, scale, wait, attempts, report_json, yes } => {
            println!("📸 sheet-photo - 画像書き出し\n");

            let overrides = Overrides {
                output_directory: output,
                scale_factor: scale,
                wait_seconds: wait,
                max_copy_attempts: attempts,
            };
            let settings = config.resolve(&overrides).map_err(|e| {
                if is_configuration_error(&e) {
                    eprintln!("設定は `sheet-photo config --show` で確認できます");
                }
                e
            })?;

            let sink = DirectorySink::new(&settings.output_directory);
            let existing = sink.existing_outputs();
            if !existing.is_empty() && !yes && std::io::stdin().is_terminal() {
                let proceed = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "{} に既存のファイルが{}個あります。上書きしますか?",
                        sink.directory().display(),
                        existing.len()
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("中止しました");
                    return Ok(());
                }
            }

            let (report, error) = match export(source, settings, sink).await? {
                Ok(report) => (report, None),
                Err(ExportFailure { error, report }) => (*report, Some(error)),
            };

            if let Some(path) = report_json {
                save_report(&report, &path)?;
                println!("✔ レポートを保存: {}", path.display());
            }

            if let Some(error) = error {
                if error.is_fatal() {
                    eprintln!("❌ 処理を開始できませんでした");
                }
                return Err(error.into());
            }

            if report.cancelled {
                println!("\n⏹ キャンセルされました");
            } else {
                println!("\n✅ 書き出し完了");
            }
        }

        Commands::Match { source } => {
            println!("🔍 sheet-photo - 照合（ドライラン）\n");

            let clipboard = MemoryClipboard::new();
            let host = XlsxHost::new(clipboard);
            let mut reporter = Reporter::new(|event| {
                if let ReportEvent::Line(line) = event {
                    println!("{}", line);
                }
            });
            let preview = run_match(&host, &source, &config.columns, &mut reporter)?;

            println!("\n行ごとの割り当て（{}）:", preview.sheet_name);
            for row in RowKey::data_rows(preview.snapshot.last_row) {
                match preview.outcome.record_for(row) {
                    Some(record) => {
                        let pass = match record.pass {
                            MatchPass::Strict => 1,
                            MatchPass::Relaxed => 2,
                        };
                        println!(
                            "  行{}: 画像{}（{}, Pass {}, 距離 {:.1}）",
                            row, record.picture, record.basis, pass, record.distance
                        );
                    }
                    None => println!("  行{}: -", row),
                }
            }
            if !preview.outcome.unmatched.is_empty() {
                let ids: Vec<String> =
                    preview.outcome.unmatched.iter().map(|id| id.to_string()).collect();
                println!("未割り当ての画像: {}", ids.join(", "));
            }
        }

        Commands::Config { show, set_output, set_scale, set_wait, set_attempts } => {
            let mut config = config;
            let overrides = Overrides {
                output_directory: set_output,
                scale_factor: set_scale,
                wait_seconds: set_wait,
                max_copy_attempts: set_attempts,
            };

            if overrides != Overrides::default() {
                config.apply(&overrides);
                config.save()?;
                println!("✔ 設定を保存しました: {}", Config::config_path()?.display());
            }

            if show || overrides == Overrides::default() {
                println!("設定:");
                println!("  出力フォルダ: {}", config.output_directory.display());
                println!("  拡大倍率: {}", config.scale_factor);
                println!("  待機時間: {}秒", config.wait_seconds);
                println!("  コピー試行回数: {}", config.max_copy_attempts);
                println!(
                    "  列: 識別子={} 名前={} 基準={}",
                    config.columns.identifier, config.columns.display_name, config.columns.reference
                );
            }
        }
    }

    Ok(())
}

/// ワーカーで書き出し、Ctrl-C で行の境目から停止する
async fn export(
    source: PathBuf,
    settings: sheet_photo_common::ExportSettings,
    sink: DirectorySink,
) -> anyhow::Result<Result<RunReport, ExportFailure>> {
    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} 行")?
            .progress_chars("#>-"),
    );

    let bar = progress.clone();
    let mut reporter = Reporter::new(move |event| match event {
        ReportEvent::Line(line) => bar.println(line),
        ReportEvent::Progress { done, total } => {
            bar.set_length(*total as u64);
            bar.set_position(*done as u64);
        }
    });

    let worker = ExtractionWorker::new();
    let handle = worker.spawn(move |cancel| {
        let clipboard = MemoryClipboard::new();
        let host = XlsxHost::new(clipboard.clone());
        let context = ExportContext {
            host: &host,
            clipboard: &clipboard,
            sink: &sink,
        };
        Ok(run_export(&context, &source, &settings, &mut reporter, &cancel))
    })?;

    let cancel = handle.cancel_token();
    let mut join = tokio::task::spawn_blocking(move || handle.join());
    let joined = tokio::select! {
        joined = &mut join => joined,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            progress.println("⏹ キャンセルを受け付けました。処理中の行が終わり次第停止します");
            join.await
        }
    };
    progress.finish_and_clear();

    let outcome = joined.context("ワーカーの終了待ちに失敗しました")??;
    Ok(outcome)
}

fn save_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("レポートを保存できません: {}", path.display()))?;
    Ok(())
}
