//! Periodic task state polling.
//!
//! [`TaskPoller`] refetches one task on a fixed period and on demand, and
//! publishes the latest record on a watch channel. Fetches may overlap;
//! a response is published only if no later-issued fetch has already been
//! published.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::error::{Result, DeskError};
use crate::task::{TaskData, TaskStatus};

/// Lets a consumer (the editor session) ask for an immediate refetch.
#[derive(Debug, Clone, Default)]
pub struct RefreshHandle {
    notify: Arc<Notify>,
    requests: Arc<AtomicU64>,
}

impl RefreshHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Number of refetches requested so far
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    async fn requested(&self) {
        self.notify.notified().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// Voice generation status changed between two published records
    StatusChanged {
        previous: TaskStatus,
        current: TaskStatus,
        at: DateTime<Utc>,
    },
    /// Voice generation went from any other status back to idle
    VoiceGenerationFinished { at: DateTime<Utc> },
}

/// Fetch a task record, failing on a non-success envelope.
pub async fn fetch_task(api: &dyn TaskApi, task_id: &str) -> Result<TaskData> {
    api.get_task(task_id)
        .await?
        .into_result()?
        .task_info
        .ok_or_else(|| DeskError::NotFound(format!("task {}", task_id)))
}

struct PollerShared {
    api: Arc<dyn TaskApi>,
    task_id: String,
    sender: watch::Sender<TaskData>,
    events: broadcast::Sender<TaskEvent>,
    issued: AtomicU64,
    applied: Mutex<u64>,
    stopped: AtomicBool,
}

impl PollerShared {
    async fn fetch_once(&self) {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Fetching task {} (#{})", self.task_id, seq);

        let response = self.api.get_task(&self.task_id).await;
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        match response {
            Ok(response) if response.is_success() => match response.data.task_info {
                Some(task) => self.publish(seq, task),
                None => warn!("Task {} response carried no task_info", self.task_id),
            },
            Ok(response) => warn!("Error fetching task info: {}", response.error_message()),
            Err(e) => warn!("Error fetching task info: {}", e),
        }
    }

    fn publish(&self, seq: u64, task: TaskData) {
        let mut applied = self.applied.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if seq < *applied {
            debug!("Dropping stale task fetch #{} (already at #{})", seq, *applied);
            return;
        }
        *applied = seq;

        let previous = self.sender.borrow().voice_generation_status;
        let current = task.voice_generation_status;
        self.sender.send_replace(task);

        if previous != current {
            let at = Utc::now();
            info!("Task {} voice generation: {} -> {}", self.task_id, previous, current);
            // No subscribers is fine
            let _ = self.events.send(TaskEvent::StatusChanged { previous, current, at });
            if current == TaskStatus::Idle {
                let _ = self.events.send(TaskEvent::VoiceGenerationFinished { at });
            }
        }
    }
}

pub struct TaskPoller {
    shared: Arc<PollerShared>,
    refresh: RefreshHandle,
    handle: Option<JoinHandle<()>>,
}

impl TaskPoller {
    /// Start polling `initial.id` every `interval`, seeded with `initial`.
    pub fn start(api: Arc<dyn TaskApi>, initial: TaskData, interval: Duration) -> Self {
        let task_id = initial.id.clone();
        let (sender, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(32);
        let shared = Arc::new(PollerShared {
            api,
            task_id,
            sender,
            events,
            issued: AtomicU64::new(0),
            applied: Mutex::new(0),
            stopped: AtomicBool::new(false),
        });
        let refresh = RefreshHandle::new();

        info!("Polling task {} every {:?}", shared.task_id, interval);
        let handle = tokio::spawn(run_poll_loop(Arc::clone(&shared), refresh.clone(), interval));

        Self {
            shared,
            refresh,
            handle: Some(handle),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskData> {
        self.shared.sender.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn latest(&self) -> TaskData {
        self.shared.sender.borrow().clone()
    }

    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Stopped polling task {}", self.shared.task_id);
        }
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop(shared: Arc<PollerShared>, refresh: RefreshHandle, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = refresh.requested() => debug!("Refetch requested for task {}", shared.task_id),
        }
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        let shared = Arc::clone(&shared);
        tokio::spawn(async move { shared.fetch_once().await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResponse, MockTaskApi, TaskPayload};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Weak;

    fn task(status: TaskStatus) -> TaskData {
        TaskData {
            id: "task-1".into(),
            voice_generation_status: status,
            ..Default::default()
        }
    }

    fn scripted(statuses: Vec<TaskStatus>) -> (MockTaskApi, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut api = MockTaskApi::new();
        api.expect_get_task().returning(move |task_id| {
            assert_eq!(task_id, "task-1");
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let status = statuses[n.min(statuses.len() - 1)];
            Ok(ApiResponse::success(TaskPayload { task_info: Some(task(status)) }))
        });
        (api, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_and_reports_finish() {
        let (api, calls) = scripted(vec![TaskStatus::Processing, TaskStatus::Idle]);
        let poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Queued), Duration::from_secs(10));
        let mut events = poller.events();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Processing);
        assert!(matches!(
            events.try_recv(),
            Ok(TaskEvent::StatusChanged { previous: TaskStatus::Queued, current: TaskStatus::Processing, .. })
        ));

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Idle);
        assert!(matches!(events.try_recv(), Ok(TaskEvent::StatusChanged { current: TaskStatus::Idle, .. })));
        assert!(matches!(events.try_recv(), Ok(TaskEvent::VoiceGenerationFinished { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fetches_immediately() {
        let (api, calls) = scripted(vec![TaskStatus::Queued]);
        let poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Idle), Duration::from_secs(10));
        let receiver = poller.subscribe();

        poller.refresh_handle().request();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(receiver.borrow().voice_generation_status, TaskStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_last_record() {
        let mut api = MockTaskApi::new();
        api.expect_get_task()
            .returning(|_| Ok(ApiResponse::failure("Task not found")));
        let poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Processing), Duration::from_secs(10));

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_is_dropped() {
        let api = MockTaskApi::new();
        let mut poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Idle), Duration::from_secs(3600));
        let mut events = poller.events();

        poller.shared.publish(2, task(TaskStatus::Processing));
        poller.shared.publish(1, task(TaskStatus::Queued));
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Processing);
        assert!(matches!(events.try_recv(), Ok(TaskEvent::StatusChanged { current: TaskStatus::Processing, .. })));
        assert!(events.try_recv().is_err());

        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_polling() {
        let (api, calls) = scripted(vec![TaskStatus::Queued]);
        let mut poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Idle), Duration::from_secs(10));

        poller.stop();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_answer_after_stop_is_dropped() {
        let slot: Arc<Mutex<Weak<PollerShared>>> = Arc::new(Mutex::new(Weak::new()));
        let in_flight = Arc::clone(&slot);
        let mut api = MockTaskApi::new();
        api.expect_get_task().times(1).returning(move |_| {
            // Stop lands while the request is outstanding
            if let Some(shared) = in_flight.lock().unwrap().upgrade() {
                shared.stopped.store(true, Ordering::SeqCst);
            }
            Ok(ApiResponse::success(TaskPayload { task_info: Some(task(TaskStatus::Processing)) }))
        });
        let mut poller = TaskPoller::start(Arc::new(api), task(TaskStatus::Idle), Duration::from_secs(10));
        *slot.lock().unwrap() = Arc::downgrade(&poller.shared);
        let mut events = poller.events();

        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Idle);
        assert!(events.try_recv().is_err());

        time::sleep(Duration::from_secs(30)).await;
        poller.stop();
        assert_eq!(poller.latest().voice_generation_status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn test_fetch_task_unwraps_record() {
        let (api, _) = scripted(vec![TaskStatus::Error]);
        let fetched = fetch_task(&api, "task-1").await.unwrap();
        assert_eq!(fetched.voice_generation_status, TaskStatus::Error);

        let mut missing = MockTaskApi::new();
        missing.expect_get_task()
            .returning(|_| Ok(ApiResponse::success(TaskPayload { task_info: None })));
        assert!(matches!(fetch_task(&missing, "task-1").await, Err(DeskError::NotFound(_))));
    }
}
