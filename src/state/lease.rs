//! In-process exclusive leases on page records
//!
//! The PROCESSING flag in storage is only a signal for outside observers.
//! `PageLeases` is the part that actually keeps two spiders in this process
//! from walking the same page record at once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared registry of page record ids currently being crawled
#[derive(Debug, Clone, Default)]
pub struct PageLeases {
    held: Arc<Mutex<HashSet<i64>>>,
}

impl PageLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `page_id`, or returns None if another holder has it
    pub fn try_acquire(&self, page_id: i64) -> Option<PageLease> {
        if self.lock().insert(page_id) {
            Some(PageLease {
                page_id,
                leases: self.clone(),
            })
        } else {
            None
        }
    }

    /// Returns true if some spider currently holds `page_id`
    pub fn is_held(&self, page_id: i64) -> bool {
        self.lock().contains(&page_id)
    }

    fn release(&self, page_id: i64) {
        self.lock().remove(&page_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive hold on one page record; released on drop
#[derive(Debug)]
pub struct PageLease {
    page_id: i64,
    leases: PageLeases,
}

impl PageLease {
    pub fn page_id(&self) -> i64 {
        self.page_id
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        self.leases.release(self.page_id);
    }
}
