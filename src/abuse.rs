//! Per-MAC abuse control: an activity counter that suspends over-active
//! clients and an ignore list with per-entry expiry, both decayed by a
//! once-per-second tick.

use std::collections::HashMap;

use std::sync::Mutex;
use tracing::warn;

use crate::MacAddr;

/// The outcome of checking a packet's sender against the abuse state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbuseCheck {
    /// Proceed with handling
    Ok,
    /// The MAC is on cooldown; drop before option parsing
    Cooldown {
        /// Seconds until requests are honoured again
        remaining: u32,
    },
    /// This packet tripped the suspend threshold; the MAC is now ignored
    Suspended,
}

#[derive(Default)]
struct AbuseState {
    /// Packets seen per MAC, decremented once per tick
    action_counts: HashMap<MacAddr, u32>,
    /// Ignored MACs and the seconds remaining until requests are honoured
    ignored: HashMap<MacAddr, u32>,
}

/// The dispatcher's accounting and blacklist state. One mutex guards both
/// maps; every hold is O(1) except the tick, which is linear in the number
/// of recently active MACs.
pub struct AbuseMonitor {
    state: Mutex<AbuseState>,
    enable_suspend: bool,
    suspend_threshold: u32,
    misbehaving_timeout: u32,
    unauthorized_timeout: u32,
}

impl AbuseMonitor {
    /// Policy knobs as in the configuration contract
    pub fn new(
        enable_suspend: bool,
        suspend_threshold: u32,
        misbehaving_timeout: u32,
        unauthorized_timeout: u32,
    ) -> Self {
        AbuseMonitor {
            state: Mutex::new(AbuseState::default()),
            enable_suspend,
            suspend_threshold,
            misbehaving_timeout,
            unauthorized_timeout,
        }
    }

    /// Checks the sender against the ignore list and, when suspension is
    /// enabled, charges this packet against its activity budget
    pub fn evaluate(&self, mac: MacAddr) -> AbuseCheck {
        let mut state = self.state.lock().expect("abuse state lock poisoned");
        if let Some(&remaining) = state.ignored.get(&mac) {
            return AbuseCheck::Cooldown { remaining };
        }

        if self.enable_suspend {
            let count = state.action_counts.entry(mac).or_insert(0);
            *count += 1;
            if *count > self.suspend_threshold {
                warn!(
                    %mac,
                    timeout = self.misbehaving_timeout,
                    "issuing too many requests; ignoring"
                );
                state.ignored.insert(mac, self.misbehaving_timeout);
                return AbuseCheck::Suspended;
            }
        }
        AbuseCheck::Ok
    }

    /// Marks a MAC as ignorable for the unauthorized-client period,
    /// following a policy violation in a handler
    pub fn blacklist(&self, mac: MacAddr, packet_type: &str, reason: &str) {
        self.state
            .lock()
            .expect("abuse state lock poisoned")
            .ignored
            .insert(mac, self.unauthorized_timeout);
        warn!(
            %mac,
            timeout = self.unauthorized_timeout,
            packet_type,
            reason,
            "temporarily blacklisted"
        );
    }

    /// Whether the MAC is currently on the ignore list
    pub fn is_ignored(&self, mac: MacAddr) -> bool {
        self.state
            .lock()
            .expect("abuse state lock poisoned")
            .ignored
            .contains_key(&mac)
    }

    /// Decays the ignore list and the activity counters; intended to be
    /// driven once per second by an external scheduler
    pub fn tick(&self) {
        let mut state = self.state.lock().expect("abuse state lock poisoned");
        state.ignored.retain(|_, remaining| {
            if *remaining <= 1 {
                false
            } else {
                *remaining -= 1;
                true
            }
        });
        if self.enable_suspend {
            state.action_counts.retain(|_, count| {
                if *count <= 1 {
                    false
                } else {
                    *count -= 1;
                    true
                }
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mac() -> MacAddr {
        MacAddr::new([2, 0, 0, 0, 0, 1])
    }

    #[test]
    fn test_suspend_after_threshold() {
        let monitor = AbuseMonitor::new(true, 3, 150, 60);
        for _ in 0..3 {
            assert_eq!(monitor.evaluate(mac()), AbuseCheck::Ok);
        }
        assert_eq!(monitor.evaluate(mac()), AbuseCheck::Suspended);
        assert!(matches!(
            monitor.evaluate(mac()),
            AbuseCheck::Cooldown { remaining: 150 }
        ));
    }

    #[test]
    fn test_suspend_disabled_never_counts() {
        let monitor = AbuseMonitor::new(false, 1, 150, 60);
        for _ in 0..100 {
            assert_eq!(monitor.evaluate(mac()), AbuseCheck::Ok);
        }
    }

    #[test]
    fn test_blacklist_expires_after_exact_timeout() {
        let monitor = AbuseMonitor::new(true, 10, 150, 3);
        monitor.blacklist(mac(), "INFORM", "ciaddr was not specified");

        // Dropped on every tick before the timeout elapses
        for tick in 0..2 {
            assert!(
                matches!(monitor.evaluate(mac()), AbuseCheck::Cooldown { .. }),
                "still ignored before tick {}",
                tick
            );
            monitor.tick();
        }
        assert!(monitor.is_ignored(mac()));
        monitor.tick();
        assert!(!monitor.is_ignored(mac()));
        assert_eq!(monitor.evaluate(mac()), AbuseCheck::Ok);
    }

    #[test]
    fn test_action_counts_decay_to_empty() {
        let monitor = AbuseMonitor::new(true, 10, 150, 60);
        monitor.evaluate(mac());
        monitor.evaluate(mac());
        monitor.tick();
        monitor.tick();
        let state = monitor.state.lock().unwrap();
        assert!(state.action_counts.is_empty());
    }
}
