// ==========================================
// STREAM RESOLUTION
// ==========================================
// Turns a track id into a time-limited playable URL by shelling out to
// yt-dlp. Resolution takes seconds, so everything here is async and the
// video path hands back a cancel handle (the UI kills the fetch when a
// video overlay is closed mid-load).

use std::future::Future;
use std::pin::Pin;

use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Asks an external tool for a playable URL. Slow; may be in flight
/// several times over, in any completion order.
pub trait StreamResolver: Send + Sync {
    fn resolve_stream(&self, track_id: &str) -> BoxFuture<Result<String>>;
    /// Like `resolve_stream` but for the video rendition, with a handle
    /// that cancels the fetch best-effort.
    fn resolve_video_stream(&self, track_id: &str) -> (BoxFuture<Result<String>>, CancelHandle);
}

/// Best-effort cancellation for an in-flight resolution. Canceling after
/// the underlying work finished is fine; the result is simply dropped by
/// the caller.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        CancelHandle { tx }
    }

    pub fn cancel(&self) {
        // send() drops the value when no receiver is subscribed yet, and
        // the racing future only subscribes at its first poll. send_replace
        // stores unconditionally, so an early cancel is never lost.
        self.tx.send_replace(true);
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Race `work` against the cancel handle. A cancellation wins with
/// `Error::Canceled`; the abandoned work is dropped (killing the child
/// process on the yt-dlp path).
pub async fn with_cancel<F>(handle: &CancelHandle, work: F) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    let mut canceled = handle.watch();
    tokio::select! {
        _ = canceled.wait_for(|c| *c) => {
            debug!("resolution canceled by user");
            Err(Error::Canceled)
        }
        result = work => result,
    }
}

pub struct YtDlpResolver;

impl YtDlpResolver {
    pub fn new() -> Self {
        YtDlpResolver
    }

    fn watch_url(track_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={track_id}")
    }

    /// Run yt-dlp with `--get-url` for the given format selector.
    /// `kill_on_drop` makes cancellation reap the child.
    async fn get_url(track_id: String, format: &'static str) -> Result<String> {
        let output = Command::new("yt-dlp")
            .arg("--get-url")
            .arg("-f")
            .arg(format)
            .arg("--no-playlist")
            .arg(Self::watch_url(&track_id))
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolve {
                id: track_id,
                reason: stderr.trim().to_string(),
            });
        }

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            return Err(Error::Resolve {
                id: track_id,
                reason: "yt-dlp returned no URL".into(),
            });
        }
        Ok(url)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamResolver for YtDlpResolver {
    fn resolve_stream(&self, track_id: &str) -> BoxFuture<Result<String>> {
        let id = track_id.to_string();
        Box::pin(Self::get_url(id, "bestaudio/best"))
    }

    fn resolve_video_stream(&self, track_id: &str) -> (BoxFuture<Result<String>>, CancelHandle) {
        let id = track_id.to_string();
        let handle = CancelHandle::new();
        let guard = handle.clone();
        let fut = Box::pin(async move { with_cancel(&guard, Self::get_url(id, "best")).await });
        (fut, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wins_over_pending_work() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            other.cancel();
        });
        let result = with_cancel(&handle, std::future::pending::<Result<String>>()).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn completed_work_beats_later_cancel() {
        let handle = CancelHandle::new();
        let result = with_cancel(&handle, async { Ok("http://stream".to_string()) }).await;
        assert_eq!(result.unwrap(), "http://stream");
        // Canceling after completion must not panic or error anywhere.
        handle.cancel();
    }

    #[tokio::test]
    async fn cancel_before_await_still_cancels() {
        let handle = CancelHandle::new();
        handle.cancel();
        let result = with_cancel(&handle, std::future::pending::<Result<String>>()).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
