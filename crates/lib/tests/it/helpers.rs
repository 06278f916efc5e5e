use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bagtree::{
    Bag, Clock, Item, ResolverHandle, Subscription,
    bag::{BagEvent, EventKind},
};

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(millis),
        })
    }

    pub fn advance_secs(&self, secs: u64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Builds `[a, b, c]` with values 1, 2, 3
pub fn abc() -> Bag {
    let mut bag = Bag::new();
    for (label, value) in [("a", 1), ("b", 2), ("c", 3)] {
        bag.set_item(label, value).unwrap();
    }
    bag
}

/// A resolver returning how many times it has been loaded
pub fn counting_resolver(bag: &Bag, cache_time: i64) -> (ResolverHandle, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handle = bag
        .resolver("counter", move |_| {
            Ok(Item::from(counter.fetch_add(1, Ordering::SeqCst) as i64 + 1))
        })
        .with_cache_time(cache_time);
    (handle, calls)
}

/// One delivered event, copied out of the callback
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub kind: EventKind,
    pub path: Vec<String>,
    pub labels: Vec<String>,
    pub index: Option<usize>,
}

/// Collects every event delivered to a subscription
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn subscription(&self) -> Subscription {
        let events = Arc::clone(&self.events);
        Subscription::new().on_any(move |event: &BagEvent<'_>| {
            events.lock().unwrap().push(Recorded {
                kind: event.kind(),
                path: event.path().to_vec(),
                labels: event.nodes().iter().map(|n| n.label().to_string()).collect(),
                index: event.index(),
            });
            Ok(())
        })
    }

    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}
