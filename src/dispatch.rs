//! # Execution Contexts
//!
//! A print request runs on two contexts:
//!
//! - the **UI-affine** context, the only place allowed to read the rendered
//!   view, used for capture only;
//! - a **background worker** (tokio's blocking pool) for encoding and all
//!   transport I/O.
//!
//! [`UiContext`] abstracts the first so the orchestrator never touches a
//! platform threading primitive. Two implementations are provided:
//!
//! | Context | Behaviour |
//! |---------|-----------|
//! | [`UiThread`] | A dedicated, named thread fed through a channel, standing in for a platform main loop |
//! | [`CurrentThread`] | Captures inline on the calling thread, for callers already on the UI context |

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::capture::{FrameSource, PixelBuffer};
use crate::error::{PrintError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The context that owns the view.
#[async_trait]
pub trait UiContext: Send + Sync {
    /// Run `source.capture_pixels()` on this context and hand back the result.
    async fn capture(&self, source: Arc<dyn FrameSource>) -> Result<PixelBuffer>;
}

// ============================================================================
// DEDICATED UI THREAD
// ============================================================================

/// # UI Thread
///
/// Runs submitted jobs one at a time, in order, on a single thread.
/// Dropping the handle drains queued jobs and joins the thread.
///
/// ## Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use snapprint::dispatch::UiThread;
///
/// let ui = UiThread::spawn("ui").unwrap();
/// let name = ui.run(|| std::thread::current().name().map(str::to_string)).await.unwrap();
/// assert_eq!(name.as_deref(), Some("ui"));
/// # }
/// ```
pub struct UiThread {
    sender: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl UiThread {
    /// Start the thread.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                // A panicking job drops its reply sender; keep serving the rest
                let _ = panic::catch_unwind(AssertUnwindSafe(job));
            }
        })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Run `job` on the UI thread and await its result.
    pub async fn run<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| PrintError::CaptureFailed("UI thread has shut down".to_string()))?;

        sender
            .send(Box::new(move || {
                let _ = tx.send(job());
            }))
            .map_err(|_| PrintError::CaptureFailed("UI thread has shut down".to_string()))?;

        // A dropped sender means the job panicked on the UI thread
        rx.await
            .map_err(|_| PrintError::CaptureFailed("UI job did not complete".to_string()))
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("UI thread exited with a panic");
            }
        }
    }
}

#[async_trait]
impl UiContext for UiThread {
    async fn capture(&self, source: Arc<dyn FrameSource>) -> Result<PixelBuffer> {
        self.run(move || source.capture_pixels()).await?
    }
}

// ============================================================================
// INLINE CONTEXT
// ============================================================================

/// Captures on whichever thread awaits the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentThread;

#[async_trait]
impl UiContext for CurrentThread {
    async fn capture(&self, source: Arc<dyn FrameSource>) -> Result<PixelBuffer> {
        source.capture_pixels()
    }
}
