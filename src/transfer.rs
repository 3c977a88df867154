//! Resumable transfer loop / 可恢复分片传输
//!
//! Drives a chunked upload to completion. Transport, I/O and 5xx errors are
//! retried with randomized exponential backoff (`random() * 2^n` seconds) up
//! to a fixed budget of consecutive progressless attempts; 4xx errors and
//! anything else surface immediately, unmodified.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DriveError, Result};

/// Number of consecutive progressless attempts tolerated / 最大连续重试次数
pub const NUM_RETRIES: u32 = 5;

/// Chunk sizes must be a positive multiple of this / 分片对齐
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Bytes sent per chunk request / 分片大小
pub const CHUNK_SIZE: usize = 8 * CHUNK_ALIGNMENT;

/// Bytes acknowledged by the server so far / 传输进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn new(bytes_sent: u64, total_bytes: u64) -> Self {
        Self { bytes_sent, total_bytes }
    }

    /// Fraction in [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_sent as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }
}

/// Result of one chunk request / 单个分片的结果
#[derive(Debug)]
pub enum ChunkOutcome<T> {
    /// Chunk accepted, transfer not finished yet
    Pending(Option<TransferProgress>),
    /// Final response of the transfer
    Complete(T),
}

/// One resumable operation, advanced a chunk at a time / 分片传输源
#[async_trait]
pub trait ChunkedTransfer: Send {
    type Output: Send;

    /// Send the next chunk. Must be callable again after an error.
    async fn next_chunk(&mut self) -> Result<ChunkOutcome<Self::Output>>;
}

/// Details of a scheduled retry / 重试信息
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// Consecutive progressless attempts, starting at 1
    pub attempt: u32,
    pub delay: Duration,
    pub upper_bound: Duration,
    pub error: &'a DriveError,
}

/// Observer for progress and retry notifications / 进度回调
///
/// Purely observational: nothing a sink does changes the outcome of a transfer.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, _fraction: f64) {}

    fn on_retry(&self, _notice: &RetryNotice<'_>) {}
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        self(fraction)
    }
}

/// Sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Single-line console progress, overwritten in place with `\r` / 控制台进度
#[derive(Debug, Clone)]
pub struct ConsoleProgress {
    label: String,
}

impl ConsoleProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new("Upload")
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, fraction: f64) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{} {}%", self.label, (fraction * 100.0) as u32);
        let _ = out.flush();
    }

    fn on_retry(&self, notice: &RetryNotice<'_>) {
        eprintln!(
            "\nCaught error ({}). Sleeping for {:.2} seconds before retry #{}.",
            notice.error,
            notice.delay.as_secs_f64(),
            notice.attempt
        );
    }
}

/// Backoff and retry budget / 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Floor applied to every randomized delay. Zero keeps the plain formula.
    pub min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: NUM_RETRIES,
            min_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// `2^attempt` seconds
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(2f64.powi(attempt.min(32) as i32))
    }

    /// Uniform random in [0, 1) scaled by the upper bound
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.upper_bound(attempt).mul_f64(rand::random::<f64>());
        delay.max(self.min_delay)
    }
}

/// Per-call loop state, never shared between transfers
#[derive(Debug, Default)]
struct LoopState {
    progressless_iters: u32,
    last_fraction: f64,
}

impl LoopState {
    fn advance(&mut self, progress: Option<TransferProgress>) -> Option<f64> {
        self.progressless_iters = 0;
        let fraction = progress?.fraction().max(self.last_fraction);
        self.last_fraction = fraction;
        Some(fraction)
    }
}

/// Run `transfer` until it completes or fails for good / 执行分片传输直到完成
pub async fn run_resumable_transfer<T>(
    transfer: &mut T,
    policy: &RetryPolicy,
    sink: &dyn ProgressSink,
) -> Result<T::Output>
where
    T: ChunkedTransfer + ?Sized,
{
    let mut state = LoopState::default();

    loop {
        let error = match transfer.next_chunk().await {
            Ok(ChunkOutcome::Pending(progress)) => {
                if let Some(fraction) = state.advance(progress) {
                    sink.on_progress(fraction);
                }
                continue;
            }
            Ok(ChunkOutcome::Complete(output)) => {
                sink.on_progress(1.0);
                return Ok(output);
            }
            Err(e) if e.is_retryable() => e,
            Err(e) => {
                tracing::debug!("transfer failed with non-retryable error: {}", e);
                return Err(e);
            }
        };

        state.progressless_iters += 1;
        let attempt = state.progressless_iters;
        if attempt > policy.max_retries {
            tracing::warn!(
                "failed to make progress for {} consecutive attempts: {}",
                attempt - 1,
                error
            );
            return Err(error);
        }

        let upper_bound = policy.upper_bound(attempt);
        let delay = policy.backoff(attempt);
        tracing::warn!(
            "chunk failed ({}), sleeping {:.2}s before retry #{}",
            error,
            delay.as_secs_f64(),
            attempt
        );
        sink.on_retry(&RetryNotice {
            attempt,
            delay,
            upper_bound,
            error: &error,
        });
        tokio::time::sleep(delay).await;
    }
}
