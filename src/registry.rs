use std::collections::HashMap;
use std::sync::Mutex;

use crate::UserId;

/// The live set of active members and their nicknames. Single runtime source
/// of truth: hydrated once from the store at startup, written through to the
/// store on every nickname change, never re-queried per operation.
///
/// All access goes through this type; the raw map is never exposed. Reads
/// hand out snapshots so an in-flight eviction cannot race an iteration.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<HashMap<UserId, String>>,
}

impl Registry {
    pub fn hydrate(members: Vec<(UserId, String)>) -> Self {
        Self {
            inner: Mutex::new(members.into_iter().collect()),
        }
    }

    pub fn insert(&self, id: UserId, nickname: String) {
        self.inner.lock().unwrap().insert(id, nickname);
    }

    /// Removes a member, returning the nickname they had. Registry-only:
    /// the store keeps their nickname and message history.
    pub fn remove(&self, id: UserId) -> Option<String> {
        self.inner.lock().unwrap().remove(&id)
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.inner.lock().unwrap().contains_key(&id)
    }

    pub fn nickname(&self, id: UserId) -> Option<String> {
        self.inner.lock().unwrap().get(&id).cloned()
    }

    /// Point-in-time copy of the membership. No ordering guarantee.
    pub fn snapshot(&self) -> Vec<(UserId, String)> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(id, nick)| (*id, nick.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_nickname_without_dropping_membership() {
        let registry = Registry::default();
        registry.insert(1, "Ann".into());
        registry.insert(1, "Annie".into());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.nickname(1).as_deref(), Some("Annie"));
    }

    #[test]
    fn remove_returns_the_old_nickname_and_leaves_others_alone() {
        let registry = Registry::hydrate(vec![(1, "Ann".into()), (2, "Bo".into())]);
        assert_eq!(registry.remove(1).as_deref(), Some("Ann"));
        assert_eq!(registry.remove(1), None);
        assert!(registry.contains(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = Registry::hydrate(vec![(1, "Ann".into()), (2, "Bo".into())]);
        let snapshot = registry.snapshot();
        registry.remove(2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }
}
