//! In-memory keyed table with freshness tracking and change subscriptions.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::traits::Freshness;

/// Receives a snapshot of the table on subscription and after every committed change.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`]) detaches it; the
/// table prunes it on the next change.
#[derive(Debug)]
pub struct Subscription<V> {
  rx: mpsc::UnboundedReceiver<Vec<V>>,
}

impl<V> Subscription<V> {
  /// Wait for the next snapshot. Returns `None` once the table is gone.
  pub async fn recv(&mut self) -> Option<Vec<V>> {
    self.rx.recv().await
  }

  /// Take the next snapshot if one is already queued.
  pub fn try_recv(&mut self) -> Option<Vec<V>> {
    self.rx.try_recv().ok()
  }

  /// Stop receiving updates.
  pub fn unsubscribe(self) {}
}

struct TableState<K, V> {
  entries: BTreeMap<K, V>,
  freshness: Freshness,
  refreshed_at: Option<DateTime<Utc>>,
  subscribers: Vec<mpsc::UnboundedSender<Vec<V>>>,
}

impl<K: Ord, V: Clone> TableState<K, V> {
  fn snapshot(&self) -> Vec<V> {
    self.entries.values().cloned().collect()
  }

  /// Push the current contents to every live subscriber.
  ///
  /// Runs under the table lock, so all subscribers observe changes in commit order.
  fn notify(&mut self) {
    if self.subscribers.is_empty() {
      return;
    }
    let snapshot = self.snapshot();
    self
      .subscribers
      .retain(|tx| tx.send(snapshot.clone()).is_ok());
  }
}

/// Thread-safe keyed cache table.
///
/// All mutations run under one mutex, so readers never see a partially applied change.
/// The map itself never leaves the table; callers only get cloned snapshots.
pub struct CacheTable<K, V> {
  state: Mutex<TableState<K, V>>,
}

impl<K: Ord + Clone, V: Clone> CacheTable<K, V> {
  /// Create an empty table.
  pub fn new() -> Self {
    Self {
      state: Mutex::new(TableState {
        entries: BTreeMap::new(),
        freshness: Freshness::Empty,
        refreshed_at: None,
        subscribers: Vec::new(),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, TableState<K, V>> {
    // Every mutation leaves the state whole before it can panic, so a poisoned
    // lock still guards consistent data.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Discard all entries and install `items` as the complete contents.
  pub fn replace_all<I, F>(&self, items: I, key_of: F)
  where
    I: IntoIterator<Item = V>,
    F: Fn(&V) -> K,
  {
    let entries: BTreeMap<K, V> = items.into_iter().map(|v| (key_of(&v), v)).collect();

    let mut state = self.lock();
    state.entries = entries;
    state.freshness = Freshness::Fresh;
    state.refreshed_at = Some(Utc::now());
    state.notify();
  }

  /// Insert or overwrite one entry. The table becomes stale.
  pub fn upsert(&self, key: K, value: V) {
    let mut state = self.lock();
    state.entries.insert(key, value);
    state.freshness = Freshness::Stale;
    state.notify();
  }

  /// Atomically compute a new value for `key` from its current value.
  ///
  /// `f` returns `None` to leave the entry unchanged. Returns whether the entry was written.
  pub fn upsert_with<F>(&self, key: K, f: F) -> bool
  where
    F: FnOnce(Option<&V>) -> Option<V>,
  {
    let mut state = self.lock();
    match f(state.entries.get(&key)) {
      Some(value) => {
        state.entries.insert(key, value);
        state.freshness = Freshness::Stale;
        state.notify();
        true
      }
      None => false,
    }
  }

  /// Delete one entry. Freshness is unchanged.
  pub fn remove(&self, key: &K) -> Option<V> {
    let mut state = self.lock();
    let removed = state.entries.remove(key);
    if removed.is_some() {
      state.notify();
    }
    removed
  }

  /// Mark a fresh table stale without touching its entries.
  pub fn invalidate(&self) {
    let mut state = self.lock();
    if state.freshness == Freshness::Fresh {
      state.freshness = Freshness::Stale;
    }
  }

  /// Get a copy of a single entry.
  pub fn get(&self, key: &K) -> Option<V> {
    self.lock().entries.get(key).cloned()
  }

  /// Copy of all values, in key order.
  pub fn snapshot(&self) -> Vec<V> {
    self.lock().snapshot()
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().entries.is_empty()
  }

  pub fn freshness(&self) -> Freshness {
    self.lock().freshness
  }

  /// When the last full replacement happened.
  pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
    self.lock().refreshed_at
  }

  /// Register an observer. The current contents are delivered immediately.
  pub fn subscribe(&self) -> Subscription<V> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut state = self.lock();
    // The receiver is alive, so this send cannot fail
    let _ = tx.send(state.snapshot());
    state.subscribers.push(tx);
    Subscription { rx }
  }
}

impl<K: Ord + Clone, V: Clone> Default for CacheTable<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V> std::fmt::Debug for CacheTable<K, V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheTable").finish_non_exhaustive()
  }
}
