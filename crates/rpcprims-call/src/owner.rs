use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity of one execution context entering guarded regions.
///
/// A call context creates one `Owner` and passes it to every guarded-region
/// entry it performs. Owners are unique per process and not `Clone`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Owner {
    id: u64,
}

impl Owner {
    pub fn new() -> Self {
        Self {
            id: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}
