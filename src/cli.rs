use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheet-photo")]
#[command(about = "Excelシートの画像を行ごとに高解像度PNGで書き出すツール", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像を行ごとにPNGで書き出す
    Export {
        /// Excelファイル（.xlsx / .xlsm）
        #[arg(required = true)]
        source: PathBuf,

        /// 出力フォルダ（デフォルト: 設定値、未設定なら ANHTHE）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 拡大倍率（1〜10）
        #[arg(short, long)]
        scale: Option<f64>,

        /// コピー後の待機秒数（0.1〜5）
        #[arg(short, long)]
        wait: Option<f64>,

        /// クリップボードが空だった場合の試行回数（1〜10）
        #[arg(long)]
        attempts: Option<u32>,

        /// 実行レポートをJSONで保存
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// 既存のファイルを確認なしで上書き
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// 画像と行の照合結果だけを表示（図形は変更しない）
    Match {
        /// Excelファイル（.xlsx / .xlsm）
        #[arg(required = true)]
        source: PathBuf,
    },

    /// 設定を表示・変更
    Config {
        /// 現在の設定を表示
        #[arg(long)]
        show: bool,

        /// 出力フォルダの既定値
        #[arg(long)]
        set_output: Option<PathBuf>,

        /// 拡大倍率の既定値
        #[arg(long)]
        set_scale: Option<f64>,

        /// 待機秒数の既定値
        #[arg(long)]
        set_wait: Option<f64>,

        /// 試行回数の既定値
        #[arg(long)]
        set_attempts: Option<u32>,
    },
}
