//! Serialized FIFO queue for workspace mutations.
//!
//! A single worker task applies operations strictly in submission order. Each
//! submission gets a ticket that resolves with its own result, and a pending
//! counter (a `watch` channel) lets callers wait until everything submitted so
//! far has been applied.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::file_store::{FileOpError, FileStore};
use crate::core::actions::FileAction;
use crate::core::types::FileOpResult;

struct QueuedOp {
    action: FileAction,
    done: oneshot::Sender<FileOpResult>,
}

/// Outcome of [`FileOpQueue::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    Drained,
    TimedOut { pending: usize },
}

/// Handle for one submitted operation.
#[derive(Debug)]
pub struct FileOpTicket {
    path: String,
    inner: TicketState,
}

#[derive(Debug)]
enum TicketState {
    Waiting(oneshot::Receiver<FileOpResult>),
    Ready(FileOpResult),
}

impl FileOpTicket {
    pub async fn wait(self) -> FileOpResult {
        match self.inner {
            TicketState::Ready(result) => result,
            TicketState::Waiting(rx) => rx.await.unwrap_or_else(|_| {
                FileOpResult::failed(self.path, FileOpError::QueueClosed.to_string())
            }),
        }
    }
}

pub struct FileOpQueue {
    sender: mpsc::UnboundedSender<QueuedOp>,
    pending: Arc<watch::Sender<usize>>,
}

impl FileOpQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(store: FileStore) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        tokio::spawn(run_worker(Arc::new(store), receiver, Arc::clone(&pending)));
        Self { sender, pending }
    }

    pub fn submit(&self, action: FileAction) -> FileOpTicket {
        let path = action.path.clone();
        let (done, rx) = oneshot::channel();
        self.pending.send_modify(|n| *n += 1);
        match self.sender.send(QueuedOp { action, done }) {
            Ok(()) => FileOpTicket {
                path,
                inner: TicketState::Waiting(rx),
            },
            Err(_) => {
                self.pending.send_modify(|n| *n = n.saturating_sub(1));
                warn!(path = %path, "file queue worker is gone");
                FileOpTicket {
                    inner: TicketState::Ready(FileOpResult::failed(
                        path.clone(),
                        FileOpError::QueueClosed.to_string(),
                    )),
                    path,
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every operation submitted so far has completed.
    ///
    /// Reports rather than fails when `timeout` elapses first.
    pub async fn drain(&self, timeout: Duration) -> DrainStatus {
        let mut rx = self.pending.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => DrainStatus::Drained,
            Err(_) => {
                let pending = self.pending();
                warn!(pending, timeout_ms = timeout.as_millis() as u64, "file queue drain timed out");
                DrainStatus::TimedOut { pending }
            }
        }
    }
}

async fn run_worker(
    store: Arc<FileStore>,
    mut receiver: mpsc::UnboundedReceiver<QueuedOp>,
    pending: Arc<watch::Sender<usize>>,
) {
    while let Some(op) = receiver.recv().await {
        let QueuedOp { action, done } = op;
        let path = action.path.clone();
        let worker_store = Arc::clone(&store);
        let result = match tokio::task::spawn_blocking(move || worker_store.apply(&action)).await {
            Ok(result) => result,
            Err(err) => FileOpResult::failed(
                path,
                FileOpError::Io(format!("file operation task failed: {err}")).to_string(),
            ),
        };
        if done.send(result).is_err() {
            debug!("file operation ticket dropped before completion");
        }
        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
    debug!("file queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::actions::FileActionKind;

    fn create(path: &str, content: &str) -> FileAction {
        FileAction {
            kind: FileActionKind::CreateFile,
            path: path.to_string(),
            content: Some(content.to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn operations_apply_in_submission_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("store");
        let queue = FileOpQueue::start(store.clone());

        let tickets: Vec<_> = (0..20)
            .map(|n| queue.submit(create("log.txt", &format!("write {n}"))))
            .collect();
        assert_eq!(queue.drain(Duration::from_secs(5)).await, DrainStatus::Drained);
        assert_eq!(queue.pending(), 0);

        for ticket in tickets {
            assert!(ticket.wait().await.success);
        }
        let final_text = std::fs::read_to_string(store.root().join("log.txt")).expect("read");
        assert_eq!(final_text, "write 19");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn each_ticket_gets_its_own_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = FileOpQueue::start(FileStore::open(temp.path()).expect("store"));

        let good = queue.submit(create("ok.txt", "fine"));
        let bad = queue.submit(create("../escape.txt", "nope"));
        let modify = queue.submit(FileAction {
            kind: FileActionKind::ModifyFile,
            path: "ok.txt".to_string(),
            content: Some("changed".to_string()),
        });

        let bad = bad.wait().await;
        let good = good.wait().await;
        let modify = modify.wait().await;
        assert!(good.success);
        assert_eq!(good.path, "ok.txt");
        assert!(!bad.success);
        assert_eq!(bad.path, "../escape.txt");
        assert!(modify.success, "modify runs after create: {modify:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn distinct_paths_each_read_back_their_own_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("store");
        let queue = FileOpQueue::start(store.clone());

        let tickets: Vec<_> = (0..32)
            .map(|n| queue.submit(create(&format!("f{n}.txt"), &n.to_string())))
            .collect();

        for (n, ticket) in tickets.into_iter().enumerate() {
            let result = ticket.wait().await;
            assert!(result.success, "{result:?}");
            assert_eq!(result.path, format!("f{n}.txt"));
        }
        for n in 0..32 {
            let text = std::fs::read_to_string(store.root().join(format!("f{n}.txt")))
                .expect("read");
            assert_eq!(text, n.to_string());
        }
    }

    #[tokio::test]
    async fn drain_on_idle_queue_returns_immediately() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = FileOpQueue::start(FileStore::open(temp.path()).expect("store"));
        assert_eq!(queue.drain(Duration::from_millis(50)).await, DrainStatus::Drained);
    }
}
