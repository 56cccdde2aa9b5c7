//! Background export jobs
//!
//! Extraction and muxing run on their own worker thread with a single-shot
//! result channel, so every terminal state (success, failure, cancellation)
//! is observable by the caller. A job's result is delivered at most once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{Result, VocoError};

/// Handle to a background export
pub struct ExportJob {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    rx: Receiver<Result<PathBuf>>,
    handle: Option<JoinHandle<()>>,
}

impl ExportJob {
    /// Spawn `work` on a worker thread
    ///
    /// The closure receives the job's cancel flag and should poll it at
    /// natural checkpoints.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(&AtomicBool) -> Result<PathBuf> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let cancel_flag = Arc::clone(&cancelled);
        let finished_flag = Arc::clone(&finished);
        let handle = std::thread::spawn(move || {
            let result = work(&cancel_flag);
            finished_flag.store(true, Ordering::SeqCst);
            // The receiver may already be gone; that is not the worker's
            // problem.
            let _ = tx.send(result);
        });

        Self {
            cancelled,
            finished,
            rx,
            handle: Some(handle),
        }
    }

    /// A job that completed before it started, for cache hits
    pub fn completed(result: Result<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(true)),
            rx,
            handle: None,
        }
    }

    /// Request cancellation
    ///
    /// The worker observes the flag at its next checkpoint; the result
    /// channel still delivers a terminal `Cancelled`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once the worker has produced its result
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Block until the job finishes and consume its result
    pub fn wait(mut self) -> Result<PathBuf> {
        let result = self.rx.recv().map_err(|_| VocoError::ExportFailed {
            reason: "export worker exited without a result".to_string(),
        });
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result?
    }

    /// Non-blocking poll; `None` while the job is still running
    pub fn try_wait(&mut self) -> Option<Result<PathBuf>> {
        match self.rx.try_recv() {
            Ok(result) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(VocoError::ExportFailed {
                reason: "export worker exited without a result".to_string(),
            })),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn test_job_delivers_success() {
        let job = ExportJob::spawn(|_| Ok(PathBuf::from("/tmp/out.mp4")));
        let path = job.wait().unwrap();
        assert_eq!(path, Path::new("/tmp/out.mp4"));
    }

    #[test]
    fn test_job_delivers_failure() {
        let job = ExportJob::spawn(|_| {
            Err(VocoError::ExportFailed {
                reason: "boom".to_string(),
            })
        });
        let err = job.wait().unwrap_err();
        assert_eq!(err.error_code(), "EXPORT_FAILED");
    }

    #[test]
    fn test_cancel_is_observed() {
        let job = ExportJob::spawn(|cancelled| {
            while !cancelled.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(VocoError::Cancelled)
        });

        job.cancel();
        let err = job.wait().unwrap_err();
        assert_eq!(err.error_code(), "CANCELLED");
    }

    #[test]
    fn test_try_wait_polls() {
        let mut job = ExportJob::spawn(|_| {
            std::thread::sleep(Duration::from_millis(30));
            Ok(PathBuf::from("/tmp/slow.mp4"))
        });

        // Eventually the result shows up
        let mut result = None;
        for _ in 0..500 {
            if let Some(r) = job.try_wait() {
                result = Some(r);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(result.unwrap().is_ok());
    }

    #[test]
    fn test_completed_job_is_immediate() {
        let job = ExportJob::completed(Ok(PathBuf::from("/tmp/cached.mp4")));
        assert!(job.is_finished());
        assert_eq!(job.wait().unwrap(), Path::new("/tmp/cached.mp4"));
    }
}
