//! Cache-aside repository with write-through mutations and coalesced refreshes.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::outcome::{ErrorKind, Failure, Outcome};
use super::remote::{RemoteError, RemoteSource};
use crate::cache::{sort_for_listing, CacheTable, Entity, Freshness, Subscription};

/// A listing result every waiter can clone.
type SharedListing<E> = Shared<BoxFuture<'static, Outcome<Vec<E>>>>;

struct Flight<E> {
  seq: u64,
  /// Mutation epoch when this listing was issued
  epoch: u64,
  listing: SharedListing<E>,
}

/// A status change confirmed by the remote after `epoch` was reached.
struct StatusPatch<E: Entity> {
  epoch: u64,
  key: E::Key,
  status: E::Status,
}

struct FlightState<E: Entity> {
  current: Option<Flight<E>>,
  next_seq: u64,
  /// Sequence number of the listing last written to the table
  applied_seq: u64,
  /// Number of remote mutations that have succeeded so far
  epoch: u64,
  /// Status changes that listings issued before them do not reflect yet
  patches: Vec<StatusPatch<E>>,
}

impl<E: Entity> FlightState<E> {
  /// Re-apply status changes newer than a listing issued at `epoch`, and forget
  /// the ones the listing already reflects.
  fn patch_listing(&mut self, epoch: u64, items: &mut [E]) {
    self.patches.retain(|patch| patch.epoch > epoch);
    for patch in &self.patches {
      if let Some(item) = items.iter_mut().find(|item| item.key() == patch.key) {
        *item = item.with_status(&patch.status);
      }
    }
  }
}

fn lock_flights<E: Entity>(flights: &Mutex<FlightState<E>>) -> MutexGuard<'_, FlightState<E>> {
  flights.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Repository that keeps a [`CacheTable`] consistent with a [`RemoteSource`].
///
/// - Reads are cache-aside: a fresh table is served without touching the network.
/// - Concurrent listings collapse into one remote call whose result every caller shares.
/// - Create and update reload the full listing once the remote confirms them.
///
/// Cloning is cheap and every clone shares the same table and in-flight state.
pub struct SyncRepository<E: Entity, R> {
  table: Arc<CacheTable<E::Key, E>>,
  remote: Arc<R>,
  flights: Arc<Mutex<FlightState<E>>>,
}

impl<E: Entity, R: RemoteSource<E>> SyncRepository<E, R> {
  /// Create a repository with an empty table.
  pub fn new(remote: Arc<R>) -> Self {
    Self {
      table: Arc::new(CacheTable::new()),
      remote,
      flights: Arc::new(Mutex::new(FlightState {
        current: None,
        next_seq: 0,
        applied_seq: 0,
        epoch: 0,
        patches: Vec::new(),
      })),
    }
  }

  /// Fetch all entities, sorted by name then key.
  ///
  /// 1. Unless forced, serve a fresh table directly
  /// 2. Otherwise join the in-flight listing or start one
  /// 3. On failure the table is left as it was
  pub async fn fetch_all(&self, force_refresh: bool) -> Outcome<Vec<E>> {
    if !force_refresh && self.table.freshness().is_fresh() {
      debug!(entity = E::entity_type(), "serving listing from cache");
      return Ok(sort_for_listing(self.table.snapshot()));
    }

    self.listing(0).await
  }

  /// Create an entity remotely, then reload the listing.
  ///
  /// Returns the entity as the remote stored it. A failed reload does not fail the call.
  pub async fn create(&self, draft: E) -> Outcome<E> {
    draft
      .validate()
      .map_err(|reason| Failure::new(ErrorKind::Malformed, reason))?;

    let created = self
      .remote
      .create(&draft)
      .await
      .map_err(|e| Self::mutation_failed("create", e))?;

    self.reload_after_mutation("create").await;
    Ok(created)
  }

  /// Update an entity remotely, then reload the listing.
  pub async fn update(&self, entity: E) -> Outcome<E> {
    entity
      .validate()
      .map_err(|reason| Failure::new(ErrorKind::Malformed, reason))?;

    let updated = self
      .remote
      .update(&entity)
      .await
      .map_err(|e| Self::mutation_failed("update", e))?;

    self.reload_after_mutation("update").await;
    Ok(updated)
  }

  /// Change the status of an entity remotely.
  ///
  /// The cached copy is patched in place and the table becomes stale, so the next
  /// regular read reconciles with the remote source. Listings issued before the
  /// change keep the patch when they are applied.
  pub async fn set_status(&self, key: E::Key, status: E::Status) -> Outcome<()> {
    self
      .remote
      .set_status(&key, &status)
      .await
      .map_err(|e| Self::mutation_failed("set_status", e))?;

    let mut flights = lock_flights(&self.flights);
    flights.epoch += 1;
    let epoch = flights.epoch;
    flights.patches.push(StatusPatch {
      epoch,
      key: key.clone(),
      status: status.clone(),
    });
    let patched = self
      .table
      .upsert_with(key.clone(), |current| {
        current.map(|entity| entity.with_status(&status))
      });
    if !patched {
      debug!(entity = E::entity_type(), %key, "status changed for uncached entity");
      self.table.invalidate();
    }
    drop(flights);

    Ok(())
  }

  /// Cached copy of one entity, without contacting the remote source.
  pub fn get(&self, key: &E::Key) -> Option<E> {
    self.table.get(key)
  }

  /// Cached entities in listing order, without contacting the remote source.
  pub fn cached(&self) -> Vec<E> {
    sort_for_listing(self.table.snapshot())
  }

  pub fn freshness(&self) -> Freshness {
    self.table.freshness()
  }

  pub fn refreshed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
    self.table.refreshed_at()
  }

  /// Observe the cached entities. See [`CacheTable::subscribe`].
  pub fn subscribe(&self) -> Subscription<E> {
    self.table.subscribe()
  }

  fn mutation_failed(operation: &str, error: RemoteError) -> Failure {
    let failure = Failure::from_remote(&error);
    warn!(entity = E::entity_type(), operation, error = %failure, "remote mutation failed");
    failure
  }

  /// Advance the mutation epoch. Returns the new epoch.
  fn record_mutation(&self) -> u64 {
    let mut flights = lock_flights(&self.flights);
    flights.epoch += 1;
    flights.epoch
  }

  async fn reload_after_mutation(&self, operation: &str) {
    let epoch = self.record_mutation();
    if let Err(failure) = self.listing(epoch).await {
      warn!(
        entity = E::entity_type(),
        operation,
        error = %failure,
        "reload after mutation failed, cache marked stale"
      );
      self.table.invalidate();
    }
  }

  /// Join the in-flight listing if it was issued at or after `min_epoch`,
  /// otherwise start a new one.
  fn listing(&self, min_epoch: u64) -> SharedListing<E> {
    let mut flights = lock_flights(&self.flights);

    if let Some(flight) = flights.current.as_ref().filter(|f| f.epoch >= min_epoch) {
      debug!(entity = E::entity_type(), seq = flight.seq, "joining in-flight listing");
      return flight.listing.clone();
    }

    flights.next_seq += 1;
    let seq = flights.next_seq;
    let epoch = flights.epoch;
    debug!(entity = E::entity_type(), seq, "starting listing");

    // The listing runs in its own task so callers that give up waiting never
    // cancel it for the others, and its result still reaches the table.
    let task = tokio::spawn(run_listing(
      Arc::clone(&self.remote),
      Arc::clone(&self.table),
      Arc::clone(&self.flights),
      seq,
      epoch,
    ));

    let shared_flights = Arc::clone(&self.flights);
    let listing = async move {
      match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
          let mut flights = lock_flights(&shared_flights);
          if flights.current.as_ref().is_some_and(|f| f.seq == seq) {
            flights.current = None;
          }
          Err(Failure::new(
            ErrorKind::Coalesced,
            format!("listing ended without a result: {}", e),
          ))
        }
      }
    }
    .boxed()
    .shared();

    flights.current = Some(Flight {
      seq,
      epoch,
      listing: listing.clone(),
    });
    listing
  }
}

async fn run_listing<E, R>(
  remote: Arc<R>,
  table: Arc<CacheTable<E::Key, E>>,
  flights: Arc<Mutex<FlightState<E>>>,
  seq: u64,
  epoch: u64,
) -> Outcome<Vec<E>>
where
  E: Entity,
  R: RemoteSource<E>,
{
  let result = remote.list_all().await;

  let mut state = lock_flights(&flights);
  if state.current.as_ref().is_some_and(|f| f.seq == seq) {
    state.current = None;
  }

  match result {
    Ok(mut items) => {
      if seq > state.applied_seq {
        state.patch_listing(epoch, &mut items);
        state.applied_seq = seq;
        table.replace_all(items.iter().cloned(), E::key);
        if epoch < state.epoch {
          // Issued before the latest mutation: usable, but not authoritative
          table.invalidate();
        }
        info!(entity = E::entity_type(), seq, count = items.len(), "listing applied");
      } else {
        warn!(
          entity = E::entity_type(),
          seq,
          applied = state.applied_seq,
          "listing superseded by a newer one, not applied"
        );
      }
      Ok(sort_for_listing(items))
    }
    Err(error) => {
      let failure = Failure::from_remote(&error);
      warn!(entity = E::entity_type(), seq, error = %failure, "listing failed");
      Err(failure)
    }
  }
}

impl<E: Entity, R> Clone for SyncRepository<E, R> {
  fn clone(&self) -> Self {
    Self {
      table: Arc::clone(&self.table),
      remote: Arc::clone(&self.remote),
      flights: Arc::clone(&self.flights),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
  use tokio::sync::Semaphore;

  #[derive(Debug, Clone, PartialEq)]
  struct Dish {
    id: u32,
    name: String,
    active: bool,
  }

  impl Entity for Dish {
    type Key = u32;
    type Status = bool;

    fn key(&self) -> u32 {
      self.id
    }

    fn sort_name(&self) -> &str {
      &self.name
    }

    fn validate(&self) -> Result<(), String> {
      if self.name.trim().is_empty() {
        return Err("name is required".to_string());
      }
      Ok(())
    }

    fn with_status(&self, active: &bool) -> Self {
      Self {
        active: *active,
        ..self.clone()
      }
    }

    fn entity_type() -> &'static str {
      "dish"
    }
  }

  fn dish(id: u32, name: &str) -> Dish {
    Dish {
      id,
      name: name.to_string(),
      active: true,
    }
  }

  /// In-memory remote with call counters and an optional gate on listings.
  #[derive(Default)]
  struct FakeRemote {
    dishes: Mutex<BTreeMap<u32, Dish>>,
    next_id: AtomicU32,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_list: Mutex<Option<RemoteError>>,
    fail_status: Mutex<Option<RemoteError>>,
    gate: Option<Semaphore>,
    /// One gate per listing call, in call order
    call_gates: Vec<Semaphore>,
    panic_list: AtomicBool,
  }

  impl FakeRemote {
    fn with_dishes(dishes: &[Dish]) -> Self {
      let remote = Self::default();
      remote.seed(dishes);
      remote
    }

    fn gated(dishes: &[Dish]) -> Self {
      let remote = Self {
        gate: Some(Semaphore::new(0)),
        ..Self::default()
      };
      remote.seed(dishes);
      remote
    }

    fn gated_per_call(dishes: &[Dish], calls: usize) -> Self {
      let remote = Self {
        call_gates: (0..calls).map(|_| Semaphore::new(0)).collect(),
        ..Self::default()
      };
      remote.seed(dishes);
      remote
    }

    fn seed(&self, dishes: &[Dish]) {
      let mut stored = self.dishes.lock().unwrap();
      for d in dishes {
        stored.insert(d.id, d.clone());
      }
    }

    fn release(&self, permits: usize) {
      if let Some(gate) = &self.gate {
        gate.add_permits(permits);
      }
    }

    fn release_call(&self, call: usize) {
      self.call_gates[call].add_permits(1);
    }

    fn list_calls(&self) -> usize {
      self.list_calls.load(Ordering::SeqCst)
    }

    fn fail_listings(&self, error: Option<RemoteError>) {
      *self.fail_list.lock().unwrap() = error;
    }
  }

  fn not_found() -> RemoteError {
    RemoteError::Status {
      code: 404,
      body: "no such dish".to_string(),
    }
  }

  #[async_trait]
  impl RemoteSource<Dish> for FakeRemote {
    async fn list_all(&self) -> Result<Vec<Dish>, RemoteError> {
      let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
      // The listing reflects the state at the time it was issued
      let snapshot: Vec<Dish> = self.dishes.lock().unwrap().values().cloned().collect();
      let gate = self.gate.as_ref().or(self.call_gates.get(call));
      if let Some(gate) = gate {
        let _permit = gate
          .acquire()
          .await
          .map_err(|e| RemoteError::Transport(e.to_string()))?;
      }
      if self.panic_list.load(Ordering::SeqCst) {
        panic!("listing blew up");
      }
      if let Some(error) = self.fail_list.lock().unwrap().clone() {
        return Err(error);
      }
      Ok(snapshot)
    }

    async fn create(&self, draft: &Dish) -> Result<Dish, RemoteError> {
      self.create_calls.fetch_add(1, Ordering::SeqCst);
      // The server assigns ids and normalizes names
      let created = Dish {
        id: 100 + self.next_id.fetch_add(1, Ordering::SeqCst),
        name: draft.name.trim().to_string(),
        active: true,
      };
      self
        .dishes
        .lock()
        .unwrap()
        .insert(created.id, created.clone());
      Ok(created)
    }

    async fn update(&self, dish: &Dish) -> Result<Dish, RemoteError> {
      let mut dishes = self.dishes.lock().unwrap();
      if !dishes.contains_key(&dish.id) {
        return Err(not_found());
      }
      dishes.insert(dish.id, dish.clone());
      Ok(dish.clone())
    }

    async fn set_status(&self, id: &u32, active: &bool) -> Result<(), RemoteError> {
      if let Some(error) = self.fail_status.lock().unwrap().clone() {
        return Err(error);
      }
      let mut dishes = self.dishes.lock().unwrap();
      match dishes.get_mut(id) {
        Some(d) => {
          d.active = *active;
          Ok(())
        }
        None => Err(not_found()),
      }
    }
  }

  fn repository(remote: &Arc<FakeRemote>) -> SyncRepository<Dish, FakeRemote> {
    SyncRepository::new(Arc::clone(remote))
  }

  async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
      if condition() {
        return;
      }
      tokio::task::yield_now().await;
    }
    panic!("condition was never reached");
  }

  #[tokio::test]
  async fn test_listing_is_sorted_by_name() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(2, "Pasta"), dish(1, "Pizza")]));
    let repo = repository(&remote);

    let dishes = repo.fetch_all(false).await.unwrap();
    assert_eq!(dishes, vec![dish(2, "Pasta"), dish(1, "Pizza")]);
  }

  #[tokio::test]
  async fn test_equal_names_are_ordered_by_key() {
    let remote = Arc::new(FakeRemote::with_dishes(&[
      dish(9, "Soup"),
      dish(3, "Soup"),
      dish(5, "Bread"),
    ]));
    let repo = repository(&remote);

    let ids: Vec<u32> = repo
      .fetch_all(false)
      .await
      .unwrap()
      .iter()
      .map(|d| d.id)
      .collect();
    assert_eq!(ids, vec![5, 3, 9]);
  }

  #[tokio::test]
  async fn test_fresh_cache_skips_remote() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);

    let first = repo.fetch_all(false).await.unwrap();
    let second = repo.fetch_all(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(remote.list_calls(), 1);
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_forced_refresh_goes_remote() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);

    repo.fetch_all(false).await.unwrap();
    remote.seed(&[dish(2, "Pasta")]);
    let dishes = repo.fetch_all(true).await.unwrap();

    assert_eq!(dishes.len(), 2);
    assert_eq!(remote.list_calls(), 2);
  }

  #[tokio::test]
  async fn test_failed_refresh_keeps_cached_items() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "A"), dish(2, "B")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    remote.fail_listings(Some(RemoteError::Transport("offline".to_string())));
    let failure = repo.fetch_all(true).await.unwrap_err();
    assert_eq!(failure.kind, ErrorKind::Transport);

    let cached = repo.fetch_all(false).await.unwrap();
    assert_eq!(cached, vec![dish(1, "A"), dish(2, "B")]);
  }

  #[tokio::test]
  async fn test_not_found_on_empty_cache() {
    let remote = Arc::new(FakeRemote::default());
    remote.fail_listings(Some(not_found()));
    let repo = repository(&remote);

    let failure = repo.fetch_all(false).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert_eq!(repo.freshness(), Freshness::Empty);
    assert!(repo.cached().is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_refreshes_share_one_listing() {
    let remote = Arc::new(FakeRemote::gated(&[dish(1, "Pizza"), dish(2, "Pasta")]));
    let repo = repository(&remote);

    let callers = (0..5).map(|_| repo.fetch_all(true));
    let release = async {
      wait_until(|| remote.list_calls() == 1).await;
      remote.release(1);
    };
    let (results, ()) = tokio::join!(futures::future::join_all(callers), release);

    assert_eq!(remote.list_calls(), 1);
    let first = results[0].clone().unwrap();
    assert_eq!(first, vec![dish(2, "Pasta"), dish(1, "Pizza")]);
    for result in results {
      assert_eq!(result.unwrap(), first);
    }
  }

  #[tokio::test]
  async fn test_cache_miss_joins_forced_refresh() {
    let remote = Arc::new(FakeRemote::gated(&[dish(1, "Pizza")]));
    let repo = repository(&remote);

    let release = async {
      wait_until(|| remote.list_calls() == 1).await;
      remote.release(1);
    };
    let (forced, missed, ()) = tokio::join!(repo.fetch_all(true), repo.fetch_all(false), release);

    assert_eq!(forced.unwrap(), missed.unwrap());
    assert_eq!(remote.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_cancelled_caller_does_not_abort_listing() {
    let remote = Arc::new(FakeRemote::gated(&[dish(1, "Pizza")]));
    let repo = repository(&remote);

    // Poll once, then drop the caller while the listing is still pending
    assert!(repo.fetch_all(true).now_or_never().is_none());

    wait_until(|| remote.list_calls() == 1).await;
    remote.release(1);
    wait_until(|| repo.freshness() == Freshness::Fresh).await;

    assert_eq!(repo.cached(), vec![dish(1, "Pizza")]);
    assert_eq!(remote.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_create_rejects_blank_name_locally() {
    let remote = Arc::new(FakeRemote::default());
    let repo = repository(&remote);

    let failure = repo.create(dish(0, "")).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Malformed);
    assert_eq!(remote.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(remote.list_calls(), 0);
  }

  #[tokio::test]
  async fn test_create_reloads_listing() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    let created = repo.create(dish(0, "  Soup ")).await.unwrap();
    assert_eq!(created, dish(100, "Soup"));

    let dishes = repo.fetch_all(false).await.unwrap();
    assert!(dishes.contains(&created));
    assert_eq!(remote.list_calls(), 2);
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_create_succeeds_when_reload_fails() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    remote.fail_listings(Some(RemoteError::Transport("offline".to_string())));
    let created = repo.create(dish(0, "Soup")).await.unwrap();

    assert_eq!(created.name, "Soup");
    assert_eq!(repo.cached(), vec![dish(1, "Pizza")]);
    assert_eq!(repo.freshness(), Freshness::Stale);

    remote.fail_listings(None);
    let dishes = repo.fetch_all(false).await.unwrap();
    assert!(dishes.contains(&created));
  }

  #[tokio::test]
  async fn test_mutation_reload_does_not_join_older_listing() {
    let remote = Arc::new(FakeRemote::gated(&[dish(1, "Pizza")]));
    let repo = repository(&remote);

    let refresh = tokio::spawn({
      let repo = repo.clone();
      async move { repo.fetch_all(true).await }
    });
    wait_until(|| remote.list_calls() == 1).await;

    let create = tokio::spawn({
      let repo = repo.clone();
      async move { repo.create(dish(0, "Soup")).await }
    });
    wait_until(|| remote.list_calls() == 2).await;
    remote.release(2);

    refresh.await.unwrap().unwrap();
    let created = create.await.unwrap().unwrap();

    assert!(repo.cached().contains(&created));
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_late_older_listing_is_not_applied() {
    let remote = Arc::new(FakeRemote::gated_per_call(&[dish(1, "Pizza")], 2));
    let repo = repository(&remote);

    let refresh = tokio::spawn({
      let repo = repo.clone();
      async move { repo.fetch_all(true).await }
    });
    wait_until(|| remote.list_calls() == 1).await;

    let create = tokio::spawn({
      let repo = repo.clone();
      async move { repo.create(dish(0, "Soup")).await }
    });
    wait_until(|| remote.list_calls() == 2).await;

    // The reload finishes first, the older refresh after it
    remote.release_call(1);
    let created = create.await.unwrap().unwrap();
    assert_eq!(repo.freshness(), Freshness::Fresh);

    remote.release_call(0);
    let older = refresh.await.unwrap().unwrap();

    assert_eq!(older, vec![dish(1, "Pizza")]);
    assert_eq!(repo.cached(), vec![dish(1, "Pizza"), created]);
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_panicked_listing_reports_coalesced() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    remote.panic_list.store(true, Ordering::SeqCst);
    let repo = repository(&remote);

    let (first, second) = tokio::join!(repo.fetch_all(true), repo.fetch_all(true));

    assert_eq!(first.unwrap_err().kind, ErrorKind::Coalesced);
    assert_eq!(second.unwrap_err().kind, ErrorKind::Coalesced);
    assert_eq!(remote.list_calls(), 1);
    assert_eq!(repo.freshness(), Freshness::Empty);

    // The slot was cleared, so the next call starts a new listing
    remote.panic_list.store(false, Ordering::SeqCst);
    let dishes = repo.fetch_all(true).await.unwrap();

    assert_eq!(dishes, vec![dish(1, "Pizza")]);
    assert_eq!(remote.list_calls(), 2);
  }

  #[tokio::test]
  async fn test_update_failure_leaves_cache_untouched() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    let failure = repo.update(dish(7, "Ghost")).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert_eq!(repo.cached(), vec![dish(1, "Pizza")]);
    assert_eq!(repo.freshness(), Freshness::Fresh);
    assert_eq!(remote.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_update_reloads_listing() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    let updated = repo.update(dish(1, "Calzone")).await.unwrap();

    assert_eq!(repo.get(&1), Some(updated));
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_set_status_patches_cached_entity() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    repo.set_status(1, false).await.unwrap();

    assert_eq!(repo.get(&1).map(|d| d.active), Some(false));
    assert_eq!(repo.freshness(), Freshness::Stale);
    assert_eq!(remote.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_older_listing_keeps_status_change() {
    let remote = Arc::new(FakeRemote::gated(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    let release = async {
      wait_until(|| remote.list_calls() == 1).await;
      remote.release(1);
    };
    let (loaded, ()) = tokio::join!(repo.fetch_all(false), release);
    loaded.unwrap();

    let refresh = tokio::spawn({
      let repo = repo.clone();
      async move { repo.fetch_all(true).await }
    });
    wait_until(|| remote.list_calls() == 2).await;

    repo.set_status(1, false).await.unwrap();
    let mut sub = repo.subscribe();
    assert_eq!(sub.try_recv().map(|d| d[0].active), Some(false));

    remote.release(1);
    let listed = refresh.await.unwrap().unwrap();

    assert!(!listed[0].active);
    assert_eq!(repo.get(&1).map(|d| d.active), Some(false));
    assert_eq!(sub.try_recv().map(|d| d[0].active), Some(false));
    assert_eq!(repo.freshness(), Freshness::Stale);
  }

  #[tokio::test]
  async fn test_set_status_failure_is_classified() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    *remote.fail_status.lock().unwrap() = Some(RemoteError::Status {
      code: 409,
      body: "already inactive".to_string(),
    });
    let repo = repository(&remote);
    repo.fetch_all(false).await.unwrap();

    let failure = repo.set_status(1, false).await.unwrap_err();

    assert_eq!(failure.kind, ErrorKind::Rejected(409));
    assert_eq!(repo.get(&1).map(|d| d.active), Some(true));
    assert_eq!(repo.freshness(), Freshness::Fresh);
  }

  #[tokio::test]
  async fn test_subscribers_see_applied_listing() {
    let remote = Arc::new(FakeRemote::with_dishes(&[dish(1, "Pizza")]));
    let repo = repository(&remote);
    let mut sub = repo.subscribe();
    assert_eq!(sub.try_recv(), Some(vec![]));

    repo.fetch_all(false).await.unwrap();

    assert_eq!(sub.try_recv(), Some(vec![dish(1, "Pizza")]));
  }
}
