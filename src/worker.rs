//! バックグラウンド実行
//!
//! ドキュメントとクリップボードはプロセスで共有される1つの資源なので、
//! 同時に走る書き出しは1つだけ。実行中の依頼は `RunInProgress` で拒否する。

use crate::error::{ExportError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// 行の境目で確認するキャンセル要求
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// スレッド終了時（パニック含む）に実行中フラグを戻す
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 書き出しを1本ずつ実行するワーカー
#[derive(Debug, Clone, Default)]
pub struct ExtractionWorker {
    busy: Arc<AtomicBool>,
}

/// 実行中のジョブ
#[derive(Debug)]
pub struct RunHandle<T> {
    handle: JoinHandle<Result<T>>,
    cancel: CancelToken,
}

impl ExtractionWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// ジョブを別スレッドで開始する
    pub fn spawn<T, F>(&self, job: F) -> Result<RunHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(CancelToken) -> Result<T> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ExportError::RunInProgress);
        }

        let busy = BusyGuard(Arc::clone(&self.busy));
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let spawned = std::thread::Builder::new()
            .name("sheet-photo-worker".into())
            .spawn(move || {
                let _busy = busy;
                job(token)
            });

        match spawned {
            Ok(handle) => Ok(RunHandle { handle, cancel }),
            Err(e) => Err(ExportError::Io(e)),
        }
    }
}

impl<T> RunHandle<T> {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 終了を待つ。ジョブのパニックは `WorkerPanicked` になる
    pub fn join(self) -> Result<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("ワーカースレッドがパニックしました");
                Err(ExportError::WorkerPanicked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_second_run_is_rejected() {
        let worker = ExtractionWorker::new();
        let (release, wait) = mpsc::channel::<()>();

        let first = worker
            .spawn(move |_| {
                let _ = wait.recv();
                Ok(1)
            })
            .unwrap();
        assert!(worker.is_busy());

        let second = worker.spawn(|_| Ok(2));
        assert!(matches!(second, Err(ExportError::RunInProgress)));

        release.send(()).unwrap();
        assert_eq!(first.join().unwrap(), 1);
        assert!(!worker.is_busy());

        let third = worker.spawn(|_| Ok(3)).unwrap();
        assert_eq!(third.join().unwrap(), 3);
    }

    #[test]
    fn test_cancel_reaches_job() {
        let worker = ExtractionWorker::new();
        let handle = worker
            .spawn(|token| {
                while !token.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok("cancelled")
            })
            .unwrap();

        handle.cancel();
        assert_eq!(handle.join().unwrap(), "cancelled");
    }

    #[test]
    fn test_panic_becomes_error() {
        let worker = ExtractionWorker::new();
        let handle = worker.spawn::<(), _>(|_| panic!("boom")).unwrap();
        assert!(matches!(handle.join(), Err(ExportError::WorkerPanicked)));
        assert!(!worker.is_busy());
    }
}
