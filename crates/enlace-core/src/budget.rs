//! Byte-count memory budget standing in for the firmware allocator.
//!
//! On the target every staging buffer, local sink buffer, and shadow queue
//! comes out of a fixed runtime heap and allocation can fail. The budget
//! models that: owners charge it before allocating and refund on release,
//! so prepare-time rollback paths can be exercised deterministically by
//! capping the budget in tests. The default budget is unbounded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::AdapterError;

/// Shared allocation budget for one adapter (or a whole pipeline).
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// Bytes still grantable; `usize::MAX` means unbounded.
    remaining: AtomicUsize,
    /// Number of successful charges, monotonic. Lets tests observe whether
    /// a prepare call allocated anything at all.
    charges: AtomicU64,
}

impl MemoryBudget {
    /// An unbounded budget; charges always succeed.
    pub fn unbounded() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// A budget capped at `limit` bytes outstanding.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                remaining: AtomicUsize::new(limit),
                charges: AtomicU64::new(0),
            }),
        }
    }

    /// Charge `bytes` for `what`, or fail leaving the budget untouched.
    pub fn charge(&self, what: &'static str, bytes: usize) -> Result<(), AdapterError> {
        let res = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rem| {
                if rem == usize::MAX {
                    Some(rem)
                } else {
                    rem.checked_sub(bytes)
                }
            });
        match res {
            Ok(_) => {
                self.inner.charges.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(AdapterError::OutOfMemory {
                what,
                requested: bytes,
            }),
        }
    }

    /// Return `bytes` to the budget.
    pub fn refund(&self, bytes: usize) {
        let _ = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rem| {
                if rem == usize::MAX {
                    Some(rem)
                } else {
                    Some(rem.saturating_add(bytes))
                }
            });
    }

    /// Bytes still grantable (`usize::MAX` when unbounded).
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Total successful charges since creation.
    pub fn charge_count(&self) -> u64 {
        self.inner.charges.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_fails() {
        let b = MemoryBudget::unbounded();
        b.charge("x", usize::MAX).unwrap();
        b.charge("x", usize::MAX).unwrap();
        assert_eq!(b.remaining(), usize::MAX);
    }

    #[test]
    fn capped_budget_refuses_overdraft() {
        let b = MemoryBudget::with_limit(100);
        b.charge("a", 60).unwrap();
        let err = b.charge("b", 50).unwrap_err();
        assert!(matches!(
            err,
            AdapterError::OutOfMemory {
                what: "b",
                requested: 50
            }
        ));
        // Failed charge must not consume anything.
        assert_eq!(b.remaining(), 40);
        b.charge("c", 40).unwrap();
        assert_eq!(b.remaining(), 0);
    }

    #[test]
    fn refund_restores_capacity() {
        let b = MemoryBudget::with_limit(64);
        b.charge("a", 64).unwrap();
        b.refund(64);
        b.charge("a", 64).unwrap();
        assert_eq!(b.charge_count(), 2);
    }

    #[test]
    fn clones_share_the_pool() {
        let b = MemoryBudget::with_limit(10);
        let b2 = b.clone();
        b.charge("a", 10).unwrap();
        assert!(b2.charge("b", 1).is_err());
    }
}
