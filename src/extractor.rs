//! 高解像度での画像取り出し
//!
//! 1枚ごとに「拡大して画面外へ移動 → コピー → クリップボードから読む → 元に戻す」
//! を行う。元の位置とサイズへの復元は `ScopedMutation` の Drop が保証する。

use crate::error::{ExportError, Result};
use crate::host::{Clipboard, DocumentSession};
use crate::snapshot::row_labels;
use image::{ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};
use sheet_photo_common::{
    output_file_name, ExportSettings, MatchRecord, Rect, RowKey, RowOutcome, ShapeId,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// 拡大中の図形を置く座標（上・左）
pub const OFFSCREEN_OFFSET: f64 = -1000.0;

const INITIAL_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_millis(100);

/// 保存先
pub trait ImageSink {
    /// 出力先を用意する（なければ作成）
    fn prepare(&self) -> Result<()>;

    /// PNG を書き込み、保存先のパスを返す
    fn write_png(&self, file_name: &str, image: &RgbaImage) -> Result<PathBuf>;
}

/// ディレクトリへ PNG を保存する
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 既にある出力ファイル（`*_.png`）
    pub fn existing_outputs(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(sheet_photo_common::naming::OUTPUT_SUFFIX))
            })
            .collect();
        files.sort();
        files
    }
}

impl ImageSink for DirectorySink {
    fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    fn write_png(&self, file_name: &str, image: &RgbaImage) -> Result<PathBuf> {
        let path = self.directory.join(file_name);
        image.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }
}

/// 図形の一時的な変更。Drop 時に元の矩形へ戻す
pub struct ScopedMutation<'s, S: DocumentSession + ?Sized> {
    session: &'s mut S,
    id: ShapeId,
    original: Rect,
    restored: bool,
}

impl<'s, S: DocumentSession + ?Sized> ScopedMutation<'s, S> {
    /// 現在の矩形を記録して変更を開始
    pub fn begin(session: &'s mut S, id: ShapeId) -> Result<Self> {
        let original = session.picture_rect(id)?;
        Ok(Self {
            session,
            id,
            original,
            restored: false,
        })
    }

    pub fn original(&self) -> Rect {
        self.original
    }

    pub fn apply(&mut self, rect: Rect) -> Result<()> {
        self.session.set_picture_rect(self.id, rect)
    }

    pub fn session(&mut self) -> &mut S {
        self.session
    }

    /// 元に戻す。失敗はここで返し、Drop では再試行しない
    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.session.set_picture_rect(self.id, self.original)
    }
}

impl<S: DocumentSession + ?Sized> Drop for ScopedMutation<'_, S> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if let Err(e) = self.session.set_picture_rect(self.id, self.original) {
            tracing::error!(id = %self.id, error = %e, "図形を元の位置に戻せませんでした");
        }
    }
}

/// コピー後の描画待ち
#[derive(Debug, Clone, Copy)]
pub struct RenderWait {
    limit: Duration,
}

impl RenderWait {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    /// カウンタが `baseline` から変わるか上限に達するまで待つ。
    /// カウンタがなければ上限まで待つ
    pub fn settle(&self, clipboard: &dyn Clipboard, baseline: Option<u64>) {
        let Some(baseline) = baseline else {
            thread::sleep(self.limit);
            return;
        };

        let deadline = Instant::now() + self.limit;
        let mut interval = INITIAL_POLL;
        loop {
            if clipboard.change_count().is_some_and(|count| count != baseline) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(interval.min(deadline - now));
            interval = (interval * 2).min(MAX_POLL);
        }
    }
}

/// 取り出した画像
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: RgbaImage,
    /// SHA-256（hex）
    pub digest: String,
}

pub fn image_digest(image: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hex::encode(hasher.finalize())
}

/// 行単位の取り出し
pub struct Extractor<'a> {
    settings: &'a ExportSettings,
    clipboard: &'a dyn Clipboard,
    sink: &'a dyn ImageSink,
    wait: RenderWait,
    previous_digest: Option<String>,
    picture_errors: Vec<String>,
}

impl<'a> Extractor<'a> {
    pub fn new(
        settings: &'a ExportSettings,
        clipboard: &'a dyn Clipboard,
        sink: &'a dyn ImageSink,
    ) -> Self {
        Self {
            settings,
            clipboard,
            sink,
            wait: RenderWait::new(settings.wait()),
            previous_digest: None,
            picture_errors: Vec::new(),
        }
    }

    /// 復元失敗など図形単位のエラーを取り出す
    pub fn take_picture_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.picture_errors)
    }

    /// 1行を処理する。エラーは行の結果に閉じ込め、呼び出し側へは返さない
    pub fn process_row(
        &mut self,
        session: &mut dyn DocumentSession,
        row: RowKey,
        record: Option<&MatchRecord>,
    ) -> RowOutcome {
        let (identifier, _name) = match row_labels(session, row, &self.settings.columns) {
            Ok(Some(labels)) => labels,
            Ok(None) => return RowOutcome::Skipped { row },
            Err(e) => {
                return RowOutcome::Failed {
                    row,
                    reason: e.to_string(),
                }
            }
        };

        let file_name = output_file_name(&identifier);
        let Some(record) = record else {
            return RowOutcome::MissingImage { row };
        };

        match self.extract(session, record.picture, &file_name) {
            Ok(capture) => RowOutcome::Saved {
                row,
                file_name,
                width: capture.image.width(),
                height: capture.image.height(),
                digest: capture.digest,
            },
            Err(e) => {
                tracing::warn!(%row, picture = %record.picture, error = %e, "取り出しに失敗");
                RowOutcome::Failed {
                    row,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn extract(
        &mut self,
        session: &mut dyn DocumentSession,
        id: ShapeId,
        file_name: &str,
    ) -> Result<Capture> {
        let mut guard = ScopedMutation::begin(session, id)?;
        let enlarged = guard
            .original()
            .scaled_at(self.settings.scale_factor, OFFSCREEN_OFFSET, OFFSCREEN_OFFSET);
        tracing::debug!(%id, from = %guard.original(), to = %enlarged, "一時的に拡大");

        let captured = guard.apply(enlarged).and_then(|_| self.capture(guard.session(), id));

        if let Err(e) = guard.restore() {
            self.picture_errors.push(format!("画像{}: 元の位置に戻せません: {}", id, e));
        }

        let capture = captured?;
        let path = self.sink.write_png(file_name, &capture.image)?;
        tracing::debug!(path = %path.display(), "保存");
        self.previous_digest = Some(capture.digest.clone());
        Ok(capture)
    }

    /// コピーと待機を試行回数まで繰り返す
    fn capture(&self, session: &mut dyn DocumentSession, id: ShapeId) -> Result<Capture> {
        let attempts = self.settings.max_copy_attempts.max(1);

        for attempt in 1..=attempts {
            self.clipboard.clear()?;
            let baseline = self.clipboard.change_count();
            session.copy_picture(id)?;
            self.wait.settle(self.clipboard, baseline);

            let Some(image) = self.clipboard.read_image()? else {
                tracing::debug!(%id, attempt, "クリップボードが空");
                continue;
            };

            let digest = image_digest(&image);
            if baseline.is_none() && self.previous_digest.as_deref() == Some(digest.as_str()) {
                tracing::debug!(%id, attempt, "前の画像と同じ内容のため再試行");
                continue;
            }

            return Ok(Capture { image, digest });
        }

        Err(ExportError::ClipboardEmpty { attempts })
    }
}
