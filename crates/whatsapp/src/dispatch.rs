//! Background dispatch queue: decouples inbound-message acknowledgment
//! latency from full pipeline latency. One bounded FIFO, one worker task,
//! per-attempt timeouts, delayed re-enqueue retries and a final apology
//! when an item is out of attempts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use palco_core::config::QueueConfig;
use palco_core::domain::conversation::{CollectedFields, Stage};

use crate::commands::immediate_ack;
use crate::transport::MessageTransport;

/// Returned synchronously when the queue is at capacity; the item is
/// dropped, never blocked on.
pub const QUEUE_FULL_REPLY: &str =
    "Sistema temporariamente sobrecarregado. Tente novamente em alguns instantes.";

/// Sent to the user once every retry has been spent.
const FINAL_APOLOGY: &str =
    "Desculpe, houve um problema técnico persistente. Tente novamente mais tarde.";

/// Rolling latency window size.
const LATENCY_WINDOW: usize = 100;

/// The full message-processing pipeline the worker drives per item. The
/// server implements this over the flow engine and state manager.
#[async_trait]
pub trait MessagePipeline: Send + Sync {
    async fn process(&self, subject_id: &str, message: &str) -> Result<String>;
}

#[derive(Clone, Debug)]
struct WorkItem {
    subject_id: String,
    message: String,
    attempt: u32,
}

enum QueueInput {
    Work(WorkItem),
    Shutdown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueueStatsSnapshot {
    pub depth: usize,
    pub queued: u64,
    pub processed: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub avg_processing_secs: f64,
    pub running: bool,
}

#[derive(Default)]
struct SharedStats {
    queued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    depth: AtomicUsize,
    running: AtomicBool,
    latencies: Mutex<VecDeque<f64>>,
}

impl SharedStats {
    fn record_latency(&self, elapsed: Duration) {
        if let Ok(mut window) = self.latencies.lock() {
            window.push_back(elapsed.as_secs_f64());
            while window.len() > LATENCY_WINDOW {
                window.pop_front();
            }
        }
    }

    fn snapshot(&self) -> QueueStatsSnapshot {
        let processed = self.processed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let attempts_settled = processed + failed;
        let avg = self
            .latencies
            .lock()
            .ok()
            .filter(|window| !window.is_empty())
            .map(|window| window.iter().sum::<f64>() / window.len() as f64)
            .unwrap_or(0.0);

        QueueStatsSnapshot {
            depth: self.depth.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            processed,
            failed,
            success_rate: if attempts_settled == 0 {
                100.0
            } else {
                (processed as f64 / attempts_settled as f64) * 100.0
            },
            avg_processing_secs: avg,
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

pub struct DispatchQueue {
    sender: mpsc::Sender<QueueInput>,
    stats: Arc<SharedStats>,
    config: QueueConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchQueue {
    /// Starts the single worker task immediately.
    pub fn start(
        config: QueueConfig,
        pipeline: Arc<dyn MessagePipeline>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<QueueInput>(config.capacity);
        let stats = Arc::new(SharedStats::default());
        stats.running.store(true, Ordering::SeqCst);

        let worker = tokio::spawn(worker_loop(
            receiver,
            sender.clone(),
            pipeline,
            transport,
            stats.clone(),
            config.clone(),
        ));

        Self { sender, stats, config, worker: Mutex::new(Some(worker)) }
    }

    /// Pushes a work item and returns the context-aware placeholder. A full
    /// queue answers with the busy text and drops the item.
    pub fn enqueue(
        &self,
        subject_id: &str,
        message: &str,
        stage: Stage,
        collected: &CollectedFields,
    ) -> String {
        let item = WorkItem {
            subject_id: subject_id.to_string(),
            message: message.to_string(),
            attempt: 0,
        };

        match self.sender.try_send(QueueInput::Work(item)) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::SeqCst);
                self.stats.depth.fetch_add(1, Ordering::SeqCst);
                immediate_ack(stage, message, collected)
            }
            Err(_) => {
                warn!(subject = subject_id, "dispatch queue full, dropping message");
                QUEUE_FULL_REPLY.to_string()
            }
        }
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Stops the worker after the current item.
    pub async fn stop(&self) {
        self.stats.running.store(false, Ordering::SeqCst);
        let _ = self.sender.send(QueueInput::Shutdown).await;
        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    mut receiver: mpsc::Receiver<QueueInput>,
    sender: mpsc::Sender<QueueInput>,
    pipeline: Arc<dyn MessagePipeline>,
    transport: Arc<dyn MessageTransport>,
    stats: Arc<SharedStats>,
    config: QueueConfig,
) {
    info!("dispatch queue worker started");

    while let Some(input) = receiver.recv().await {
        let item = match input {
            QueueInput::Work(item) => item,
            QueueInput::Shutdown => break,
        };
        stats.depth.fetch_sub(1, Ordering::SeqCst);

        let started = Instant::now();
        let attempt_timeout = Duration::from_secs(config.attempt_timeout_secs);
        let outcome =
            tokio::time::timeout(attempt_timeout, pipeline.process(&item.subject_id, &item.message))
                .await;

        match outcome {
            Ok(Ok(reply)) => {
                stats.record_latency(started.elapsed());
                stats.processed.fetch_add(1, Ordering::SeqCst);
                let delivery = transport.send(&item.subject_id, &reply).await;
                if !delivery.success {
                    warn!(subject = %item.subject_id,
                          error = delivery.error.as_deref().unwrap_or("unknown"),
                          "reply delivery failed");
                }
            }
            Ok(Err(error)) => {
                warn!(subject = %item.subject_id, %error, attempt = item.attempt + 1,
                      "pipeline attempt failed");
                retry_or_give_up(item, &sender, &transport, &stats, &config).await;
            }
            Err(_) => {
                warn!(subject = %item.subject_id, attempt = item.attempt + 1,
                      "pipeline attempt timed out");
                retry_or_give_up(item, &sender, &transport, &stats, &config).await;
            }
        }
    }

    info!("dispatch queue worker stopped");
}

/// Failed items are re-enqueued after an exponential delay rather than
/// blocking the worker; out of retries, the user gets the final apology.
async fn retry_or_give_up(
    mut item: WorkItem,
    sender: &mpsc::Sender<QueueInput>,
    transport: &Arc<dyn MessageTransport>,
    stats: &Arc<SharedStats>,
    config: &QueueConfig,
) {
    if item.attempt < config.max_retries {
        let delay =
            Duration::from_secs(config.retry_base_delay_secs.max(1) << item.attempt.min(5));
        item.attempt += 1;
        let sender = sender.clone();
        let stats = stats.clone();
        info!(subject = %item.subject_id, attempt = item.attempt, delay_secs = delay.as_secs(),
              "re-enqueueing for retry");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.try_send(QueueInput::Work(item)).is_ok() {
                stats.depth.fetch_add(1, Ordering::SeqCst);
            }
        });
        return;
    }

    stats.failed.fetch_add(1, Ordering::SeqCst);
    let delivery = transport.send(&item.subject_id, FINAL_APOLOGY).await;
    if !delivery.success {
        warn!(subject = %item.subject_id, "final apology delivery failed");
    }
}
