//! Lazy encoder turning a [`ProgressBus`] into a push stream
//!
//! The encoder only reads the bus; dropping it (client disconnect) has no
//! effect on the job writing into that bus.

use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::bus::{BusEntry, ProgressBus};
use super::event::WireMessage;

/// One message on the outbound stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event { seq: u64, message: WireMessage },
    /// Sent exactly once, after the terminal event
    Done,
}

pub struct StreamEncoder {
    bus: Arc<ProgressBus>,
    cursor: u64,
    /// Entries below this sequence number existed at subscribe time and are
    /// replayed in full; throttling only applies past it
    replay_until: u64,
    poll_interval: Duration,
    pending: VecDeque<BusEntry>,
    saw_terminal: bool,
    done: bool,
}

impl StreamEncoder {
    pub fn new(bus: Arc<ProgressBus>, poll_interval: Duration) -> Self {
        Self {
            replay_until: bus.len() as u64,
            bus,
            cursor: 0,
            poll_interval,
            pending: VecDeque::new(),
            saw_terminal: false,
            done: false,
        }
    }

    /// Resume after the given sequence number instead of replaying from the start
    pub fn resume_after(mut self, last_seq: Option<u64>) -> Self {
        if let Some(seq) = last_seq {
            self.cursor = seq.saturating_add(1);
        }
        self
    }

    /// Next message, waiting on the bus if nothing new has been appended.
    /// Returns `None` once the sentinel has been produced.
    pub async fn next_item(&mut self) -> Option<StreamItem> {
        loop {
            if self.done {
                return None;
            }

            if let Some(entry) = self.pending.pop_front() {
                self.cursor = entry.seq + 1;
                if entry.event.is_terminal() {
                    self.saw_terminal = true;
                }
                if entry.live || entry.seq < self.replay_until {
                    return Some(StreamItem::Event {
                        seq: entry.seq,
                        message: WireMessage::from(&entry.event),
                    });
                }
                continue;
            }

            if self.saw_terminal {
                self.done = true;
                return Some(StreamItem::Done);
            }

            let bus = self.bus.clone();
            let appended = bus.appended();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let fresh = bus.since(self.cursor);
            if !fresh.is_empty() {
                self.pending.extend(fresh);
                continue;
            }
            // A resumed cursor past the end of a finished log still needs the sentinel
            if bus.is_terminal() {
                self.saw_terminal = true;
                continue;
            }

            let _ = tokio::time::timeout(self.poll_interval, appended).await;
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamItem> + Send + 'static {
        futures::stream::unfold(self, |mut encoder| async move {
            encoder.next_item().await.map(|item| (item, encoder))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::event::{ProgressEvent, STAGE_LOG};
    use crate::progress::hook::{ProgressHook, RawProgress};
    use futures::StreamExt;

    fn log(message: &str) -> ProgressEvent {
        ProgressEvent::status(STAGE_LOG, message)
    }

    async fn collect(encoder: StreamEncoder) -> Vec<StreamItem> {
        tokio::time::timeout(Duration::from_secs(5), encoder.into_stream().collect())
            .await
            .expect("stream should finish")
    }

    #[tokio::test]
    async fn test_finished_job_replays_and_ends_with_sentinel() {
        let bus = Arc::new(ProgressBus::new("job"));
        bus.append(log("a")).unwrap();
        bus.append(ProgressEvent::complete("out.mp4")).unwrap();

        let items = collect(StreamEncoder::new(bus, Duration::from_millis(10))).await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], StreamItem::Event { seq: 0, .. }));
        assert!(matches!(
            &items[1],
            StreamItem::Event { seq: 1, message: WireMessage::Complete { filename } } if filename == "out.mp4"
        ));
        assert_eq!(items[2], StreamItem::Done);
    }

    #[tokio::test]
    async fn test_waits_for_live_appends() {
        let bus = Arc::new(ProgressBus::new("job"));
        let writer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..3 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    bus.append(log(&i.to_string())).unwrap();
                }
                bus.append(ProgressEvent::error("network down")).unwrap();
            })
        };

        let items = collect(StreamEncoder::new(bus, Duration::from_millis(500))).await;
        writer.await.unwrap();

        assert_eq!(items.len(), 5);
        assert!(matches!(
            &items[3],
            StreamItem::Event { message: WireMessage::Error { .. }, .. }
        ));
        assert_eq!(items.iter().filter(|i| **i == StreamItem::Done).count(), 1);
    }

    #[tokio::test]
    async fn test_throttled_entries_not_forwarded() {
        let bus = Arc::new(ProgressBus::new("job"));
        let encoder = StreamEncoder::new(bus.clone(), Duration::from_millis(10));
        bus.append(log("live")).unwrap();
        bus.record(log("quiet")).unwrap();
        bus.append(ProgressEvent::complete("x")).unwrap();

        let items = collect(encoder).await;

        assert_eq!(items.len(), 3);
        assert_eq!(bus.all().len(), 3);
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_throttled_history() {
        let bus = Arc::new(ProgressBus::new("job"));
        let mut hook = ProgressHook::new(bus.clone(), Duration::from_secs(1));
        for percent in ["10%", "20%", "30%", "40%"] {
            hook.on_progress(&RawProgress::downloading(percent, "1MiB/s", "00:10"));
        }
        bus.append(ProgressEvent::complete("out.mp4")).unwrap();

        let items = collect(StreamEncoder::new(bus.clone(), Duration::from_millis(10))).await;

        let seqs: Vec<u64> = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Event { seq, .. } => Some(*seq),
                StreamItem::Done => None,
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(seqs.len(), bus.all().len());
        assert_eq!(items.last(), Some(&StreamItem::Done));
    }

    #[tokio::test]
    async fn test_resume_skips_seen_events() {
        let bus = Arc::new(ProgressBus::new("job"));
        bus.append(log("a")).unwrap();
        bus.append(log("b")).unwrap();
        bus.append(ProgressEvent::complete("x")).unwrap();

        let items = collect(
            StreamEncoder::new(bus.clone(), Duration::from_millis(10)).resume_after(Some(0)),
        )
        .await;
        assert!(matches!(items[0], StreamItem::Event { seq: 1, .. }));
        assert_eq!(items.len(), 3);

        let past_end = collect(
            StreamEncoder::new(bus, Duration::from_millis(10)).resume_after(Some(2)),
        )
        .await;
        assert_eq!(past_end, vec![StreamItem::Done]);
    }
}
