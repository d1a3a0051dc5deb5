//! プロセス内クリップボード

use super::Clipboard;
use crate::error::{ExportError, Result};
use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ClipboardState {
    image: Option<RgbaImage>,
    sequence: u64,
}

/// ホストとエクストラクタで共有するクリップボード
///
/// `clone()` は同じ中身を指す。
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<ClipboardState>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ClipboardState>> {
        self.state
            .lock()
            .map_err(|_| ExportError::Clipboard("クリップボードのロックに失敗".into()))
    }

    /// 画像を書き込む（ホスト側のコピー操作）
    pub fn write_image(&self, image: RgbaImage) -> Result<()> {
        let mut state = self.lock()?;
        state.image = Some(image);
        state.sequence += 1;
        Ok(())
    }
}

impl Clipboard for MemoryClipboard {
    fn read_image(&self) -> Result<Option<RgbaImage>> {
        Ok(self.lock()?.image.clone())
    }

    fn change_count(&self) -> Option<u64> {
        self.lock().ok().map(|state| state.sequence)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.image.take().is_some() {
            state.sequence += 1;
        }
        Ok(())
    }
}
