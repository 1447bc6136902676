use std::cell::RefCell;
use std::collections::BTreeMap;

/// Proof that a build started; compare against the latest with
/// [`BuildTokens::is_current`] after every await.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTicket<K> {
    pub key: K,
    pub token: u64,
}

/// Per-key generation counters for asynchronous builds.
#[derive(Debug)]
pub struct BuildTokens<K> {
    latest: RefCell<BTreeMap<K, u64>>,
}

impl<K: Ord + Clone> Default for BuildTokens<K> {
    fn default() -> Self {
        Self {
            latest: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone> BuildTokens<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a build for `key`, superseding any earlier one.
    pub fn begin(&self, key: K) -> BuildTicket<K> {
        let mut latest = self.latest.borrow_mut();
        let token = latest.entry(key.clone()).or_insert(0);
        *token += 1;
        BuildTicket { key, token: *token }
    }

    pub fn is_current(&self, ticket: &BuildTicket<K>) -> bool {
        self.latest.borrow().get(&ticket.key) == Some(&ticket.token)
    }
}
