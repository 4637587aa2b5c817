//! Pending-event queue between the detection callback and the dispatcher

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;

use crate::analytics::AnalyticsEvent;

/// Multi-producer queue drained wholesale by a single consumer.
///
/// Producers run on engine threads and only hold the lock for a push. The
/// consumer swaps the whole buffer out, so each event is drained exactly once.
pub struct EventQueue {
    events: Mutex<VecDeque<AnalyticsEvent>>,
    /// Drop-oldest bound, `None` for unbounded
    capacity: Option<usize>,

    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    enqueued: AtomicUsize,
    drained: AtomicUsize,
    dropped: AtomicUsize,
}

/// Counters since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: usize,
    pub drained: usize,
    pub dropped: usize,
}

impl EventQueue {
    pub fn unbounded() -> Self {
        Self::with_limit(0)
    }

    /// `max_pending == 0` means unbounded
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: (max_pending > 0).then_some(max_pending),
            stats: CachePadded::new(Stats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AnalyticsEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: append an event, evicting the oldest when bounded and full
    pub fn enqueue(&self, event: AnalyticsEvent) {
        {
            let mut events = self.lock();
            if let Some(capacity) = self.capacity {
                while events.len() >= capacity {
                    events.pop_front();
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("bridge_events_dropped").increment(1);
                }
            }
            events.push_back(event);
            metrics::gauge!("bridge_queue_depth").set(events.len() as f64);
        }

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bridge_events_enqueued").increment(1);
    }

    /// Consumer: take everything pending, in enqueue order
    pub fn drain_all(&self) -> Vec<AnalyticsEvent> {
        let drained = {
            let mut events = self.lock();
            metrics::gauge!("bridge_queue_depth").set(0.0);
            mem::take(&mut *events)
        };

        self.stats.drained.fetch_add(drained.len(), Ordering::Relaxed);
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            drained: self.stats.drained.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::sync::Arc;
    use std::thread;

    use metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };

    use super::*;

    /// Records only `bridge_queue_depth`, shared across the threads that
    /// install it locally
    #[derive(Clone, Default)]
    struct DepthRecorder {
        depth: Arc<AtomicU64>,
    }

    impl DepthRecorder {
        fn depth(&self) -> f64 {
            f64::from_bits(self.depth.load(Ordering::SeqCst))
        }
    }

    impl Recorder for DepthRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            if key.name() == "bridge_queue_depth" {
                Gauge::from_arc(self.depth.clone())
            } else {
                Gauge::noop()
            }
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn event(timestamp: u64) -> AnalyticsEvent {
        AnalyticsEvent::new(51000, String::new(), timestamp, vec![])
    }

    #[test]
    fn drain_returns_fifo_and_empties() {
        let queue = EventQueue::unbounded();
        for ts in 0..5 {
            queue.enqueue(event(ts));
        }
        assert_eq!(queue.len(), 5);

        let drained: Vec<u64> = queue.drain_all().iter().map(|e| e.timestamp).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());

        assert_eq!(
            queue.stats(),
            QueueStats {
                enqueued: 5,
                drained: 5,
                dropped: 0
            }
        );
    }

    #[test]
    fn bounded_queue_drops_oldest() {
        let queue = EventQueue::with_limit(3);
        for ts in 0..5 {
            queue.enqueue(event(ts));
        }

        let drained: Vec<u64> = queue.drain_all().iter().map(|e| e.timestamp).collect();
        assert_eq!(drained, vec![2, 3, 4]);
        assert_eq!(queue.stats().dropped, 2);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(EventQueue::unbounded());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.enqueue(event(p * 1000 + i));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            seen.extend(queue.drain_all().into_iter().map(|e| e.timestamp));
            thread::yield_now();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        seen.extend(queue.drain_all().into_iter().map(|e| e.timestamp));

        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn depth_gauge_tracks_queue() {
        let recorder = DepthRecorder::default();
        let queue = EventQueue::unbounded();

        metrics::with_local_recorder(&recorder, || {
            queue.enqueue(event(1));
            queue.enqueue(event(2));
            assert_eq!(recorder.depth(), 2.0);

            queue.drain_all();
            assert_eq!(recorder.depth(), 0.0);

            queue.enqueue(event(3));
            assert_eq!(recorder.depth(), 1.0);
        });
    }

    #[test]
    fn depth_gauge_survives_racing_drains() {
        for _ in 0..50 {
            let recorder = DepthRecorder::default();
            let queue = Arc::new(EventQueue::unbounded());
            let done = Arc::new(AtomicBool::new(false));

            let consumer = {
                let (recorder, queue, done) = (recorder.clone(), queue.clone(), done.clone());
                thread::spawn(move || {
                    metrics::with_local_recorder(&recorder, || {
                        while !done.load(Ordering::SeqCst) {
                            queue.drain_all();
                        }
                    })
                })
            };

            let producers: Vec<_> = (0..2)
                .map(|p| {
                    let (recorder, queue) = (recorder.clone(), queue.clone());
                    thread::spawn(move || {
                        metrics::with_local_recorder(&recorder, || {
                            for i in 0..100 {
                                queue.enqueue(event(p * 1000 + i));
                            }
                        })
                    })
                })
                .collect();

            for producer in producers {
                producer.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
            consumer.join().unwrap();

            assert_eq!(recorder.depth(), queue.len() as f64);
        }
    }
}
