//! Local view of the user's deposit/withdrawal request queue, reconciled
//! against the chain. The contract is the ledger of truth; this state only
//! mirrors a suffix of it (most recent first) plus optimistic patches applied
//! after confirmed transactions.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use serde::Serialize;

/// Batch size for the initial load.
pub const INITIAL_BATCH: u64 = 5;
/// Maximum batch size for each subsequent backward page.
pub const LOAD_MORE_BATCH: u64 = 10;

/// Request settlement status as stored on chain. Anything past `Successful`
/// is a failed terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RequestStatus {
    Pending,
    Cancelled,
    Successful,
    FailedAmountTooLarge,
    FailedExpired,
    FailedInsufficientOutput,
    FailedIncentiveNotFound,
    FailedIncentiveNotQualified,
    FailedUnhandled,
}

impl RequestStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Cancelled,
            2 => Self::Successful,
            3 => Self::FailedAmountTooLarge,
            4 => Self::FailedExpired,
            5 => Self::FailedInsufficientOutput,
            6 => Self::FailedIncentiveNotFound,
            7 => Self::FailedIncentiveNotQualified,
            _ => Self::FailedUnhandled,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::FailedAmountTooLarge
                | Self::FailedExpired
                | Self::FailedInsufficientOutput
                | Self::FailedIncentiveNotFound
                | Self::FailedIncentiveNotQualified
                | Self::FailedUnhandled
        )
    }
}

/// The identity tuple distinguishing a request before its full record is
/// known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Accessor {
    pub is_deposit: bool,
    pub token: Address,
    pub queue_number: U256,
}

/// Where a locally-held record came from. `LocalPatch` entries are
/// unconfirmed-authoritative: derived from a confirmed transaction's event
/// rather than a chain read, and cleared by the next full resync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Origin {
    Chain,
    LocalPatch,
}

#[derive(Clone, Debug, Serialize)]
pub struct RequestRecord {
    pub index: u64,
    pub accessor: Accessor,
    pub user: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub block_deadline: U256,
    pub incentive: Address,
    pub status: RequestStatus,
    pub block_updated: u64,
    pub computed_amount_out: U256,
    pub is_reclaimed: bool,
    pub origin: Origin,
}

/// Suffix-consistent window over the user's requests: entries run newest
/// first from index `total - 1` down to `total - len`, contiguous, no
/// duplicates. `total` is always >= the number of materialized entries.
#[derive(Debug, Default)]
pub struct Ledger {
    total: u64,
    entries: Vec<RequestRecord>,
}

impl Ledger {
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn entries(&self) -> &[RequestRecord] {
        &self.entries
    }

    pub fn head(&self) -> Option<&RequestRecord> {
        self.entries.first()
    }

    pub fn has_more(&self) -> bool {
        self.total > self.len()
    }

    /// Replaces the whole window. Used by the initial load and by resync;
    /// both supply chain-origin records, so this clears any local patches.
    pub fn reset(&mut self, total: u64, newest_first: Vec<RequestRecord>) {
        self.total = total;
        self.entries = newest_first;
    }

    /// Logical indexes of the next older batch, descending, at most `batch`
    /// of them. Empty when the window already covers everything.
    pub fn next_indexes(&self, batch: u64) -> Vec<u64> {
        let remaining = self.total.saturating_sub(self.len());
        let count = remaining.min(batch);
        (0..count).map(|i| self.total - self.len() - 1 - i).collect()
    }

    /// Appends an older batch fetched for `next_indexes`.
    pub fn extend_older(&mut self, batch: Vec<RequestRecord>) {
        self.entries.extend(batch);
    }

    /// Admits a newly-created request learned from a confirmation event.
    /// Returns false (and changes nothing) if an entry with the same accessor
    /// tuple is already held, suppressing duplicate notifications.
    pub fn admit_new(&mut self, record: RequestRecord) -> bool {
        if self.entries.iter().any(|e| e.accessor == record.accessor) {
            return false;
        }
        self.entries.insert(0, record);
        self.total += 1;
        true
    }

    /// Marks the most recent request cancelled. Only the head of the list is
    /// eligible; the protocol allows a single outstanding pending request per
    /// user, so the cancellable request is always the newest one.
    pub fn cancel_head(&mut self, block_updated: u64) -> Result<()> {
        let Some(head) = self.entries.first_mut() else {
            bail!("no requests to cancel");
        };
        if head.status != RequestStatus::Pending {
            bail!("latest request is not pending");
        }
        head.status = RequestStatus::Cancelled;
        head.block_updated = block_updated;
        head.origin = Origin::LocalPatch;
        Ok(())
    }

    /// Flags the request with the given logical index as reclaimed. Matching
    /// is by index, not array position: the list may have grown since the
    /// caller picked the request.
    pub fn mark_reclaimed(&mut self, index: u64) -> Result<()> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.index == index) else {
            bail!("no request with index {index}");
        };
        entry.is_reclaimed = true;
        entry.origin = Origin::LocalPatch;
        Ok(())
    }

    /// Event-driven variant of `mark_reclaimed`, keyed by accessor tuple.
    /// Returns false if no held entry matches.
    pub fn mark_reclaimed_by_accessor(&mut self, accessor: &Accessor) -> bool {
        match self.entries.iter_mut().find(|e| e.accessor == *accessor) {
            Some(entry) => {
                entry.is_reclaimed = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accessor(queue_number: u64) -> Accessor {
        Accessor {
            is_deposit: true,
            token: Address::ZERO,
            queue_number: U256::from(queue_number),
        }
    }

    fn record(index: u64, status: RequestStatus) -> RequestRecord {
        RequestRecord {
            index,
            accessor: accessor(index),
            user: Address::ZERO,
            amount_in: U256::from(1000),
            min_amount_out: U256::from(900),
            block_deadline: U256::from(5000),
            incentive: Address::ZERO,
            status,
            block_updated: 0,
            computed_amount_out: U256::ZERO,
            is_reclaimed: false,
            origin: Origin::Chain,
        }
    }

    fn window(total: u64, count: u64) -> Ledger {
        let mut ledger = Ledger::default();
        let newest_first = (0..count).map(|i| record(total - 1 - i, RequestStatus::Pending)).collect();
        ledger.reset(total, newest_first);
        ledger
    }

    #[test]
    fn test_pagination_window_is_contiguous_descending() {
        let mut ledger = window(23, 0);
        // Simulate initial load then repeated load_more until exhausted.
        let mut fetched = Vec::new();
        let initial = ledger.next_indexes(INITIAL_BATCH);
        assert_eq!(initial, vec![22, 21, 20, 19, 18]);
        ledger.extend_older(initial.iter().map(|&i| record(i, RequestStatus::Successful)).collect());
        fetched.extend(initial);

        while ledger.has_more() {
            let batch = ledger.next_indexes(LOAD_MORE_BATCH);
            assert!(!batch.is_empty());
            assert!(batch.len() <= LOAD_MORE_BATCH as usize);
            ledger.extend_older(batch.iter().map(|&i| record(i, RequestStatus::Successful)).collect());
            fetched.extend(batch);
        }

        // Exactly total-1 down to 0, no duplicates, no gaps.
        assert_eq!(fetched, (0..23).rev().collect::<Vec<u64>>());
        assert_eq!(ledger.len(), 23);
        assert!(!ledger.has_more());
        assert!(ledger.next_indexes(LOAD_MORE_BATCH).is_empty());
    }

    #[test]
    fn test_next_indexes_caps_at_remaining() {
        let ledger = window(3, 0);
        assert_eq!(ledger.next_indexes(INITIAL_BATCH), vec![2, 1, 0]);
    }

    #[test]
    fn test_admit_new_prepends_and_bumps_total() {
        let mut ledger = window(2, 2);
        let index = ledger.total();
        let mut new = record(index, RequestStatus::Pending);
        new.origin = Origin::LocalPatch;

        assert!(ledger.admit_new(new));
        assert_eq!(ledger.total(), 3);
        assert_eq!(ledger.head().unwrap().index, 2);
        assert_eq!(ledger.head().unwrap().status, RequestStatus::Pending);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_admit_new_suppresses_duplicate_accessor() {
        let mut ledger = window(2, 2);
        // Same accessor tuple as the held head (queue number 1).
        let duplicate = record(1, RequestStatus::Pending);

        assert!(!ledger.admit_new(duplicate));
        assert_eq!(ledger.total(), 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_cancel_head_mutates_only_position_zero() {
        let mut ledger = window(3, 3);
        ledger.cancel_head(777).unwrap();

        let entries = ledger.entries();
        assert_eq!(entries[0].status, RequestStatus::Cancelled);
        assert_eq!(entries[0].block_updated, 777);
        assert_eq!(entries[0].origin, Origin::LocalPatch);
        assert_eq!(entries[1].status, RequestStatus::Pending);
        assert_eq!(entries[2].status, RequestStatus::Pending);
    }

    #[test]
    fn test_cancel_head_rejects_non_pending_head() {
        let mut ledger = Ledger::default();
        ledger.reset(1, vec![record(0, RequestStatus::Successful)]);

        assert!(ledger.cancel_head(1).is_err());
        assert_eq!(ledger.entries()[0].status, RequestStatus::Successful);
    }

    #[test]
    fn test_cancel_head_on_empty_ledger() {
        let mut ledger = Ledger::default();
        assert!(ledger.cancel_head(1).is_err());
    }

    #[test]
    fn test_mark_reclaimed_matches_logical_index() {
        let mut ledger = window(4, 4);
        // Grow the list after the caller picked index 1.
        let index = ledger.total();
        ledger.admit_new(record(index, RequestStatus::Pending));

        ledger.mark_reclaimed(1).unwrap();

        let reclaimed: Vec<u64> = ledger
            .entries()
            .iter()
            .filter(|e| e.is_reclaimed)
            .map(|e| e.index)
            .collect();
        assert_eq!(reclaimed, vec![1]);
    }

    #[test]
    fn test_mark_reclaimed_unknown_index() {
        let mut ledger = window(2, 2);
        assert!(ledger.mark_reclaimed(9).is_err());
    }

    #[test]
    fn test_mark_reclaimed_by_accessor() {
        let mut ledger = window(3, 3);
        assert!(ledger.mark_reclaimed_by_accessor(&accessor(2)));
        assert!(!ledger.mark_reclaimed_by_accessor(&accessor(42)));
        assert!(ledger.entries()[0].is_reclaimed);
    }

    #[test]
    fn test_status_failed_partition() {
        assert!(!RequestStatus::Pending.is_failed());
        assert!(!RequestStatus::Cancelled.is_failed());
        assert!(!RequestStatus::Successful.is_failed());
        assert!(RequestStatus::FailedExpired.is_failed());
        assert!(RequestStatus::from_u8(200).is_failed());
    }
}
