use crate::buffer::RecordBuffer;
use chrono::Utc;
use logship_core::{AgentConfig, AgentError, LogRecord, Transport};
use logship_tail::{discovery, record_channel, WatcherHandle, DEFAULT_CHANNEL_SIZE};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Owns the agent lifecycle: discovery, the flush/heartbeat loop, and
/// graceful shutdown
///
/// Startup order: discovery completes (all watchers running) before the
/// timers start. Shutdown order: watchers first (no new lines), then the
/// loop is signalled, which cancels both timers, drains the channel, and
/// performs one final flush.
pub struct Agent {
    config: AgentConfig,
    transport: Arc<dyn Transport>,
    watchers: HashMap<String, WatcherHandle>,
    sender: Option<mpsc::Sender<LogRecord>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    loop_task: Option<JoinHandle<()>>,
    running: bool,
}

impl Agent {
    pub fn new(config: AgentConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            watchers: HashMap::new(),
            sender: None,
            shutdown_tx: None,
            loop_task: None,
            running: false,
        }
    }

    /// Discover sources, start watchers, then start the flush and
    /// heartbeat timers
    pub async fn start(&mut self) -> Result<(), AgentError> {
        info!(application = %self.config.application, "Starting log agent");

        let (sender, receiver) = record_channel(DEFAULT_CHANNEL_SIZE);

        self.watchers = discovery::start_watchers(&self.config.sources, &sender).await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let agent_loop = AgentLoop::new(
            receiver,
            shutdown_rx,
            Arc::clone(&self.transport),
            self.config.batch_size.max(1),
            Duration::from_millis(self.config.flush_interval_ms.max(1)),
            Duration::from_millis(self.config.heartbeat_interval_ms.max(1)),
        );

        self.loop_task = Some(tokio::spawn(agent_loop.run()));
        self.sender = Some(sender);
        self.shutdown_tx = Some(shutdown_tx);
        self.running = true;

        info!(watchers = self.watchers.len(), "Log agent started");
        Ok(())
    }

    /// Graceful shutdown: stop watchers, cancel timers, drain, final flush
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        info!("Stopping log agent");

        // No new lines once every watcher has stopped
        for (name, handle) in self.watchers.drain() {
            debug!(source = %name, "Stopping watcher");
            handle.stop().await;
        }
        // Drop our sender clone so the loop sees the channel close even if
        // the shutdown signal is lost
        drop(self.sender.take());

        // The loop cancels its timers, drains the channel, and flushes
        // once more before exiting
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }

        info!("Log agent stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

/// The single task that owns the buffer and both timers
///
/// Every buffer mutation happens here, so append, detach-for-flush, and
/// requeue-on-failure never interleave, and a flush can never run
/// concurrently with itself.
struct AgentLoop {
    receiver: mpsc::Receiver<LogRecord>,
    shutdown: oneshot::Receiver<()>,
    transport: Arc<dyn Transport>,
    batch_size: usize,
    flush_interval: Duration,
    heartbeat_interval: Duration,
}

impl AgentLoop {
    fn new(
        receiver: mpsc::Receiver<LogRecord>,
        shutdown: oneshot::Receiver<()>,
        transport: Arc<dyn Transport>,
        batch_size: usize,
        flush_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            shutdown,
            transport,
            batch_size,
            flush_interval,
            heartbeat_interval,
        }
    }

    async fn run(self) {
        let AgentLoop {
            mut receiver,
            mut shutdown,
            transport,
            batch_size,
            flush_interval,
            heartbeat_interval,
        } = self;

        let mut buffer = RecordBuffer::new();

        // First tick lands one full period out, not immediately
        let mut flush_tick = interval_at(Instant::now() + flush_interval, flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat_tick =
            interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Agent loop started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                maybe_record = receiver.recv() => match maybe_record {
                    Some(record) => {
                        buffer.append(record);
                        if buffer.len() >= batch_size {
                            flush(&mut buffer, transport.as_ref()).await;
                        }
                    }
                    // All senders gone; shutdown is already draining us
                    None => break,
                },
                _ = flush_tick.tick() => {
                    flush(&mut buffer, transport.as_ref()).await;
                }
                _ = heartbeat_tick.tick() => {
                    match transport.send_heartbeat(Utc::now()).await {
                        Ok(()) => debug!("Heartbeat sent"),
                        Err(e) => error!(error = %e, "Failed to send heartbeat"),
                    }
                }
            }
        }

        // Timers are gone once the select loop exits. Pull whatever is
        // still queued into the buffer, then flush one final time.
        while let Ok(record) = receiver.try_recv() {
            buffer.append(record);
        }
        flush(&mut buffer, transport.as_ref()).await;

        debug!("Agent loop stopped");
    }
}

/// Detach the buffer contents and attempt delivery; a failed batch goes
/// back to the front of the buffer for the next attempt
async fn flush(buffer: &mut RecordBuffer, transport: &dyn Transport) {
    if buffer.is_empty() {
        return;
    }

    let batch = buffer.detach();
    let count = batch.len();

    match transport.send_batch(&batch).await {
        Ok(()) => debug!(count, "Flushed records"),
        Err(e) => {
            error!(count, error = %e, "Failed to flush records, re-buffering");
            buffer.requeue_front(batch);
        }
    }
}
