//! 進捗ログの出力先
//!
//! 人が読むログ行を順番どおりに保持し、コールバックへも流す。
//! 同じ内容は tracing にも INFO で記録する。

use std::sync::Arc;

/// コールバックへ届くイベント
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    /// ログ行
    Line(String),
    /// 行処理の進捗（処理済み行数, 総行数）
    Progress { done: usize, total: usize },
}

pub type ReportCallback = Arc<dyn Fn(&ReportEvent) + Send + Sync>;

/// ログ行を蓄積するレポーター
#[derive(Clone, Default)]
pub struct Reporter {
    callback: Option<ReportCallback>,
    lines: Vec<String>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("callback", &self.callback.is_some())
            .field("lines", &self.lines.len())
            .finish()
    }
}

impl Reporter {
    pub fn new(callback: impl Fn(&ReportEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
            lines: Vec::new(),
        }
    }

    /// コールバックなし（行の蓄積だけ）
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn line(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "sheet_photo::report", "{}", message);
        if let Some(callback) = &self.callback {
            callback(&ReportEvent::Line(message.clone()));
        }
        self.lines.push(message);
    }

    pub fn progress(&self, done: usize, total: usize) {
        if let Some(callback) = &self.callback {
            callback(&ReportEvent::Progress { done, total });
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
