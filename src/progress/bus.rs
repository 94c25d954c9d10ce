//! Per-job append-only event log
//!
//! One [`ProgressBus`] exists per job key. The owning runner is the only
//! writer; any number of pollers and streams read concurrently. Every
//! critical section is a short `Vec` operation under a `parking_lot::Mutex`,
//! so readers never observe a half-written entry and never wait on a job.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::ProgressError;
use super::event::ProgressEvent;

/// One recorded event with its position in the job's sequence
#[derive(Debug, Clone, PartialEq)]
pub struct BusEntry {
    pub seq: u64,
    pub event: ProgressEvent,
    /// Whether live stream listeners should be sent this entry.
    /// Throttled progress updates are recorded with `live = false`.
    pub live: bool,
}

#[derive(Debug)]
struct BusState {
    entries: Vec<BusEntry>,
    sealed: bool,
    last_activity: Instant,
}

#[derive(Debug)]
pub struct ProgressBus {
    key: String,
    state: Mutex<BusState>,
    appended: Notify,
}

impl ProgressBus {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(BusState {
                entries: Vec::new(),
                sealed: false,
                last_activity: Instant::now(),
            }),
            appended: Notify::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append an event and wake every waiting listener
    pub fn append(&self, event: ProgressEvent) -> Result<u64, ProgressError> {
        let seq = self.push(event, true)?;
        self.appended.notify_waiters();
        Ok(seq)
    }

    /// Append an event to the durable log without forwarding it to live listeners
    pub fn record(&self, event: ProgressEvent) -> Result<u64, ProgressError> {
        self.push(event, false)
    }

    fn push(&self, event: ProgressEvent, live: bool) -> Result<u64, ProgressError> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(ProgressError::Sealed(self.key.clone()));
        }

        let seq = state.entries.len() as u64;
        if event.is_terminal() {
            state.sealed = true;
        }
        // Terminal events always reach listeners so streams can close
        let live = live || state.sealed;
        state.entries.push(BusEntry { seq, event, live });
        state.last_activity = Instant::now();
        Ok(seq)
    }

    /// Most recently appended event, if any
    pub fn latest(&self) -> Option<ProgressEvent> {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.entries.last().map(|entry| entry.event.clone())
    }

    /// Copy of the whole sequence at call time
    pub fn all(&self) -> Vec<ProgressEvent> {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.entries.iter().map(|entry| entry.event.clone()).collect()
    }

    /// Entries with `seq >= from`, in append order
    pub fn since(&self, from: u64) -> Vec<BusEntry> {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        state.entries.get(start..).map(<[BusEntry]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a Complete or Error event has been recorded
    pub fn is_terminal(&self) -> bool {
        self.state.lock().sealed
    }

    /// Time since the last append or read
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_activity.elapsed()
    }

    /// Future resolving on the next live append
    ///
    /// Callers must `enable()` the pinned future before re-checking the log,
    /// otherwise an append between the check and the await is missed.
    pub fn appended(&self) -> tokio::sync::futures::Notified<'_> {
        self.appended.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::event::STAGE_LOG;
    use std::sync::Arc;

    fn log(message: &str) -> ProgressEvent {
        ProgressEvent::status(STAGE_LOG, message)
    }

    #[test]
    fn test_latest_on_empty_bus() {
        let bus = ProgressBus::new("job");
        assert!(bus.latest().is_none());
        assert!(bus.all().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_append_order_and_sequence() {
        let bus = ProgressBus::new("job");
        assert_eq!(bus.append(log("a")).unwrap(), 0);
        assert_eq!(bus.record(log("b")).unwrap(), 1);
        assert_eq!(bus.append(log("c")).unwrap(), 2);

        assert_eq!(bus.all(), vec![log("a"), log("b"), log("c")]);
        assert_eq!(bus.latest(), Some(log("c")));

        let tail = bus.since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 1);
        assert!(!tail[0].live);
        assert!(tail[1].live);
        assert!(bus.since(10).is_empty());
    }

    #[test]
    fn test_terminal_event_seals_bus() {
        let bus = ProgressBus::new("job");
        bus.append(log("a")).unwrap();
        bus.append(ProgressEvent::complete("x.mp4")).unwrap();

        assert!(bus.is_terminal());
        let err = bus.append(ProgressEvent::error("late")).unwrap_err();
        assert!(matches!(err, ProgressError::Sealed(_)));
        assert!(bus.record(log("late")).is_err());

        let events = bus.all();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn test_recorded_terminal_is_live() {
        let bus = ProgressBus::new("job");
        bus.record(ProgressEvent::error("boom")).unwrap();
        assert!(bus.since(0)[0].live);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let bus = ProgressBus::new("job");
        bus.append(log("a")).unwrap();
        let snapshot = bus.all();
        bus.append(log("b")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(bus.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_ordered_prefixes() {
        let bus = Arc::new(ProgressBus::new("job"));

        let writer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    bus.append(log(&i.to_string())).unwrap();
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let bus = bus.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let snapshot = bus.all();
                    for (i, event) in snapshot.iter().enumerate() {
                        assert_eq!(event, &log(&i.to_string()));
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(bus.len(), 500);
    }

    #[tokio::test]
    async fn test_append_wakes_listener() {
        let bus = Arc::new(ProgressBus::new("job"));

        let listener = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let notified = bus.appended();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if bus.is_empty() {
                    notified.await;
                }
                bus.latest()
            })
        };

        tokio::task::yield_now().await;
        bus.append(log("wake")).unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should wake")
            .unwrap();
        assert_eq!(seen, Some(log("wake")));
    }
}
