use crate::icmp::v4::{Identifier, SequenceNumber};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

const IDENTIFIER_SPACE: usize = 1 << 16;

/// One outstanding probe. Never mutated once it is in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeRequest {
    pub identifier: Identifier,
    pub sequence_number: SequenceNumber,
    pub sent_at: Instant,
    pub target: Ipv4Addr,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("identifier {0} is already in flight")]
    DuplicateId(Identifier),
    #[error("all 65536 identifiers are in flight")]
    Exhausted,
}

struct LedgerState {
    requests: HashMap<Identifier, ProbeRequest>,
    next_sequence_number: SequenceNumber,
}

/// The in-flight request table, keyed by correlation id.
///
/// The sequence counter lives under the same lock as the table, so insert,
/// remove and sweep are serialized against each other.
pub struct RequestLedger {
    state: Mutex<LedgerState>,
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLedger {
    pub fn new() -> Self {
        RequestLedger {
            state: Mutex::new(LedgerState {
                requests: HashMap::new(),
                next_sequence_number: SequenceNumber::start_value(),
            }),
        }
    }

    /// Records a probe under a fresh random identifier not currently in flight.
    pub fn insert(&self, target: Ipv4Addr, sent_at: Instant) -> Result<ProbeRequest, LedgerError> {
        let mut state = self.lock();
        if state.requests.len() >= IDENTIFIER_SPACE {
            return Err(LedgerError::Exhausted);
        }
        let mut rng = rand::thread_rng();
        let identifier = loop {
            let candidate = Identifier::random(&mut rng);
            if !state.requests.contains_key(&candidate) {
                break candidate;
            }
        };
        Ok(Self::insert_locked(&mut state, identifier, target, sent_at))
    }

    /// Records a probe under a caller-chosen identifier. Fails if it is in flight.
    pub fn insert_with_id(
        &self,
        identifier: Identifier,
        target: Ipv4Addr,
        sent_at: Instant,
    ) -> Result<ProbeRequest, LedgerError> {
        let mut state = self.lock();
        if state.requests.contains_key(&identifier) {
            return Err(LedgerError::DuplicateId(identifier));
        }
        Ok(Self::insert_locked(&mut state, identifier, target, sent_at))
    }

    fn insert_locked(
        state: &mut LedgerState,
        identifier: Identifier,
        target: Ipv4Addr,
        sent_at: Instant,
    ) -> ProbeRequest {
        let sequence_number = state.next_sequence_number;
        state.next_sequence_number = sequence_number.next();
        let request = ProbeRequest { identifier, sequence_number, sent_at, target };
        state.requests.insert(identifier, request);
        request
    }

    /// Removes and returns the request; `None` if it was never sent or already completed.
    pub fn remove_by_id(&self, identifier: Identifier) -> Option<ProbeRequest> {
        self.lock().requests.remove(&identifier)
    }

    pub fn sweep_expired(&self, deadline: Duration) -> Vec<ProbeRequest> {
        self.sweep_expired_at(Instant::now(), deadline)
    }

    /// Removes every request sent more than `deadline` before `now`, oldest first.
    pub fn sweep_expired_at(&self, now: Instant, deadline: Duration) -> Vec<ProbeRequest> {
        let mut expired = Vec::new();
        self.lock().requests.retain(|_, request| {
            let is_expired = now.saturating_duration_since(request.sent_at) > deadline;
            if is_expired {
                expired.push(*request);
            }
            !is_expired
        });
        expired.sort_by_key(|request| request.sent_at);
        expired
    }

    /// Removes everything still in flight, oldest first.
    pub(crate) fn drain(&self) -> Vec<ProbeRequest> {
        let mut remaining: Vec<ProbeRequest> = self.lock().requests.drain().map(|(_, request)| request).collect();
        remaining.sort_by_key(|request| request.sent_at);
        remaining
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

    #[test]
    fn insert_then_remove_returns_request_once() {
        let ledger = RequestLedger::new();
        let request = ledger.insert(LOCALHOST, Instant::now()).unwrap();

        assert_eq!(Some(request), ledger.remove_by_id(request.identifier));
        assert_eq!(None, ledger.remove_by_id(request.identifier));
        assert!(ledger.is_empty());
    }

    #[test]
    fn sequence_numbers_increase_per_insert() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        let first = ledger.insert(LOCALHOST, now).unwrap();
        let second = ledger.insert(LOCALHOST, now).unwrap();
        let third = ledger.insert_with_id(Identifier(3), LOCALHOST, now).unwrap();

        assert_eq!(SequenceNumber(0), first.sequence_number);
        assert_eq!(SequenceNumber(1), second.sequence_number);
        assert_eq!(SequenceNumber(2), third.sequence_number);
        assert_ne!(first.identifier, second.identifier);
        assert_eq!(3, ledger.len());
    }

    #[test]
    fn duplicate_identifier_is_rejected_without_overwriting() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        let original = ledger.insert_with_id(Identifier(42), LOCALHOST, now).unwrap();

        let duplicate = ledger.insert_with_id(Identifier(42), Ipv4Addr::new(10, 0, 0, 1), now);

        assert_eq!(Err(LedgerError::DuplicateId(Identifier(42))), duplicate);
        assert_eq!(Some(original), ledger.remove_by_id(Identifier(42)));
    }

    #[test]
    fn identifier_can_be_reused_after_removal() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        ledger.insert_with_id(Identifier(7), LOCALHOST, now).unwrap();
        ledger.remove_by_id(Identifier(7)).unwrap();

        let reused = ledger.insert_with_id(Identifier(7), LOCALHOST, now).unwrap();

        assert_eq!(SequenceNumber(1), reused.sequence_number);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        let deadline = Duration::from_millis(100);
        let old_1 = ledger.insert_with_id(Identifier(1), LOCALHOST, now).unwrap();
        let old_2 = ledger.insert_with_id(Identifier(2), LOCALHOST, now + Duration::from_millis(10)).unwrap();
        let fresh = ledger.insert_with_id(Identifier(3), LOCALHOST, now + Duration::from_millis(150)).unwrap();

        let expired = ledger.sweep_expired_at(now + Duration::from_millis(200), deadline);

        assert_eq!(vec![old_1, old_2], expired);
        assert_eq!(1, ledger.len());
        assert_eq!(Some(fresh), ledger.remove_by_id(Identifier(3)));
    }

    #[test]
    fn sweep_keeps_entries_exactly_at_deadline() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        ledger.insert_with_id(Identifier(1), LOCALHOST, now).unwrap();

        assert!(ledger.sweep_expired_at(now + Duration::from_millis(100), Duration::from_millis(100)).is_empty());
        assert_eq!(1, ledger.len());
    }

    #[test]
    fn drain_empties_ledger() {
        let ledger = RequestLedger::new();
        let now = Instant::now();
        ledger.insert(LOCALHOST, now).unwrap();
        ledger.insert(LOCALHOST, now + Duration::from_millis(1)).unwrap();

        let drained = ledger.drain();

        assert_eq!(2, drained.len());
        assert_eq!(SequenceNumber(0), drained[0].sequence_number);
        assert!(ledger.is_empty());
    }

    #[test]
    fn concurrent_inserts_and_removes_do_not_lose_entries() {
        let ledger = Arc::new(RequestLedger::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let request = ledger.insert(LOCALHOST, Instant::now()).unwrap();
                        assert_eq!(Some(request), ledger.remove_by_id(request.identifier));
                    }
                    ledger.insert(LOCALHOST, Instant::now()).unwrap()
                })
            })
            .collect();

        let kept: Vec<ProbeRequest> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(4, ledger.len());
        for request in kept {
            assert_eq!(Some(request), ledger.remove_by_id(request.identifier));
        }
    }
}
