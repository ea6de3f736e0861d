use crate::db::SnapshotSink;
use crate::error::PersistenceError;
use crate::models::Snapshot;
use crate::tally::TallyStore;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Pending,
    Flushing,
}

enum Command {
    Dirty,
    Flush(oneshot::Sender<Result<(), PersistenceError>>),
    Shutdown(oneshot::Sender<Result<(), PersistenceError>>),
}

/// Handle to the task that batches tally changes into snapshot writes.
///
/// The first change after a write arms a timer; changes while it is armed
/// ride along, since the write re-reads the live tally when the timer fires.
pub struct WriteCoalescer {
    commands: mpsc::UnboundedSender<Command>,
    scheduled: Arc<AtomicBool>,
    state: watch::Receiver<FlushState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriteCoalescer {
    pub fn spawn(tally: Arc<TallyStore>, sink: Arc<dyn SnapshotSink>, debounce: Duration) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(FlushState::Idle);
        let scheduled = Arc::new(AtomicBool::new(false));

        let flusher = Flusher {
            commands: receiver,
            tally,
            sink,
            debounce,
            scheduled: Arc::clone(&scheduled),
            state: state_tx,
        };
        let task = tokio::spawn(flusher.run());

        Self {
            commands,
            scheduled,
            state,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> FlushState {
        *self.state.borrow()
    }

    /// Records that the tally changed. Only the first change since the last
    /// snapshot sends anything to the task.
    pub fn mark_dirty(&self) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.commands.send(Command::Dirty).is_err() {
            warn!("Flush task has stopped; change will not be persisted");
        }
    }

    /// Writes the current tally now, cancelling any armed timer.
    pub async fn force_flush(&self) -> Result<(), PersistenceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| PersistenceError::FlusherStopped)?;
        response.await.map_err(|_| PersistenceError::FlusherStopped)?
    }

    /// Writes a final snapshot and stops the task.
    pub async fn shutdown(&self) -> Result<(), PersistenceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(reply))
            .map_err(|_| PersistenceError::FlusherStopped)?;
        let result = response.await.map_err(|_| PersistenceError::FlusherStopped)?;

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Flush task ended abnormally: {}", e);
            }
        }
        result
    }
}

struct Flusher {
    commands: mpsc::UnboundedReceiver<Command>,
    tally: Arc<TallyStore>,
    sink: Arc<dyn SnapshotSink>,
    debounce: Duration,
    scheduled: Arc<AtomicBool>,
    state: watch::Sender<FlushState>,
}

impl Flusher {
    async fn run(mut self) {
        let mut deadline: Option<Instant> = None;

        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    // Failures are only logged; the next vote schedules another attempt.
                    let _ = self.flush().await;
                    continue;
                }
            };

            match command {
                Some(Command::Dirty) => {
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + self.debounce);
                        self.state.send_replace(FlushState::Pending);
                    }
                }
                Some(Command::Flush(reply)) => {
                    deadline = None;
                    let _ = reply.send(self.flush().await);
                }
                Some(Command::Shutdown(reply)) => {
                    info!("Writing final snapshot before shutdown");
                    let _ = reply.send(self.flush().await);
                    break;
                }
                None => {
                    // Every handle is gone; keep what is still waiting on the timer.
                    if deadline.is_some() {
                        let _ = self.flush().await;
                    }
                    break;
                }
            }
        }
        debug!("Flush task stopped");
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        self.state.send_replace(FlushState::Flushing);
        // Cleared before copying, so any vote that misses this copy re-arms.
        self.scheduled.store(false, Ordering::Release);
        let votes = self.tally.snapshot().await;
        let polls = votes.len();

        let result = self.sink.store(&Snapshot::new(votes)).await;
        match &result {
            Ok(()) => debug!("Wrote snapshot covering {} poll(s)", polls),
            Err(e) => error!("{}", e),
        }
        self.state.send_replace(FlushState::Idle);
        result
    }
}
