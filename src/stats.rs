//! The statistics sink: one record per processed packet, fanned out to a
//! registry of observers.
//!
//! Observers are registered once at startup and invoked from every worker
//! task, so they must be cheap and safe to call concurrently; anything
//! expensive belongs behind the observer's own queue.

use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

use crate::db::SubnetId;
use crate::link::Address;
use crate::MacAddr;

/// Everything known about one handled packet at task completion.
#[derive(Clone, Debug, PartialEq)]
pub struct Statistics {
    /// Where the packet came from
    pub source_address: Address,
    /// The client MAC, when the packet decoded far enough to have one
    pub mac: Option<MacAddr>,
    /// The IP chosen for (or claimed by) the client
    pub ip: Option<Ipv4Addr>,
    /// The subnet row the served definition belongs to
    pub subnet: Option<SubnetId>,
    /// The logical packet type, e.g. `"REQUEST:SELECTING"` or `"OTHER"`
    pub packet_type: String,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
    /// True iff the task sent a reply or otherwise considered the packet addressed
    pub processed: bool,
    /// True if the packet arrived on the PXE port
    pub pxe: bool,
}

/// A consumer of per-packet statistics records.
pub trait StatsObserver: Send + Sync {
    /// Digest one record; called concurrently from worker tasks
    fn emit(&self, statistics: &Statistics);
}

/// The list of registered observers.
#[derive(Default)]
pub struct StatsRegistry {
    observers: RwLock<Vec<Arc<dyn StatsObserver>>>,
}

impl StatsRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer to the fan-out list
    pub fn register(&self, observer: Arc<dyn StatsObserver>) {
        self.observers
            .write()
            .expect("stats registry lock poisoned")
            .push(observer);
    }

    /// Removes a previously registered observer; true if it was present
    pub fn unregister(&self, observer: &Arc<dyn StatsObserver>) -> bool {
        let mut observers = self
            .observers
            .write()
            .expect("stats registry lock poisoned");
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    /// Hands `statistics` to every observer
    pub fn emit(&self, statistics: &Statistics) {
        let observers = self
            .observers
            .read()
            .expect("stats registry lock poisoned");
        for observer in observers.iter() {
            observer.emit(statistics);
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::Mutex;

    /// Collects every record it sees; shared with the engine tests
    pub(crate) struct Recorder {
        /// The records in arrival order
        pub records: Mutex<Vec<Statistics>>,
    }

    impl StatsObserver for Recorder {
        fn emit(&self, statistics: &Statistics) {
            self.records.lock().unwrap().push(statistics.clone());
        }
    }

    fn sample() -> Statistics {
        Statistics {
            source_address: Address {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                port: 68,
            },
            mac: Some(MacAddr::new([2, 0, 0, 0, 0, 1])),
            ip: Some(Ipv4Addr::new(10, 0, 0, 5)),
            subnet: Some(("s".to_string(), 0)),
            packet_type: "REQUEST:SELECTING".to_string(),
            processing_time: 0.0021,
            processed: true,
            pxe: false,
        }
    }

    #[test]
    fn test_fan_out_and_unregister() {
        let registry = StatsRegistry::new();
        let first: Arc<Recorder> = Arc::new(Recorder {
            records: Mutex::new(Vec::new()),
        });
        let second: Arc<Recorder> = Arc::new(Recorder {
            records: Mutex::new(Vec::new()),
        });
        let first_dyn: Arc<dyn StatsObserver> = first.clone();
        let second_dyn: Arc<dyn StatsObserver> = second.clone();
        registry.register(first_dyn.clone());
        registry.register(second_dyn);

        registry.emit(&sample());
        assert_eq!(first.records.lock().unwrap().len(), 1);
        assert_eq!(second.records.lock().unwrap().len(), 1);

        assert!(registry.unregister(&first_dyn));
        assert!(!registry.unregister(&first_dyn));
        registry.emit(&sample());
        assert_eq!(first.records.lock().unwrap().len(), 1);
        assert_eq!(second.records.lock().unwrap().len(), 2);
    }
}
