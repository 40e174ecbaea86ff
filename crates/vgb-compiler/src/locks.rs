//! One compilation per event at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use vgb_models::EventId;

/// Set of events with a compilation (or output removal) in flight.
#[derive(Debug, Clone, Default)]
pub struct EventLocks {
    held: Arc<Mutex<HashSet<EventId>>>,
}

impl EventLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<EventId>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock for `event_id`, or `None` if it is already held.
    pub fn try_acquire(&self, event_id: &EventId) -> Option<EventLease> {
        if !self.held().insert(event_id.clone()) {
            return None;
        }
        Some(EventLease {
            event_id: event_id.clone(),
            locks: self.clone(),
        })
    }

    pub fn is_locked(&self, event_id: &EventId) -> bool {
        self.held().contains(event_id)
    }

    /// Number of events currently locked.
    pub fn active_count(&self) -> usize {
        self.held().len()
    }

    pub fn active_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self.held().iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// Held lock on one event. Released on drop.
#[derive(Debug)]
pub struct EventLease {
    event_id: EventId,
    locks: EventLocks,
}

impl EventLease {
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }
}

impl Drop for EventLease {
    fn drop(&mut self) {
        self.locks.held().remove(&self.event_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let locks = EventLocks::new();
        let id = EventId::new("E1");

        let lease = locks.try_acquire(&id).unwrap();
        assert!(locks.try_acquire(&id).is_none());
        assert!(locks.is_locked(&id));
        assert_eq!(locks.active_count(), 1);

        drop(lease);
        assert!(!locks.is_locked(&id));
        assert!(locks.try_acquire(&id).is_some());
    }

    #[test]
    fn test_events_lock_independently() {
        let locks = EventLocks::new();
        let _a = locks.try_acquire(&EventId::new("A")).unwrap();
        let _b = locks.try_acquire(&EventId::new("B")).unwrap();
        assert_eq!(locks.active_ids(), vec![EventId::new("A"), EventId::new("B")]);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let locks = EventLocks::new();
        let id = EventId::new("E1");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = locks.clone();
                let id = id.clone();
                tokio::spawn(async move { locks.try_acquire(&id) })
            })
            .collect();

        let mut leases = Vec::new();
        for handle in handles {
            if let Some(lease) = handle.await.unwrap() {
                leases.push(lease);
            }
        }
        assert_eq!(leases.len(), 1);
    }
}
