//! Request coalescing.
//!
//! At most one producer runs per key. Callers that arrive while it runs attach to its
//! outcome instead of starting their own. The producer runs on its own task, so a
//! caller that gives up waiting never cancels the work other callers depend on.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Flight<T, E> {
    id: u64,
    outcome: SharedOutcome<T, E>,
}

/// Unregisters a flight when its producer task ends, whether it returns, panics or is
/// dropped with the runtime.
struct Unregister<K: Eq + Hash, T, E> {
    flights: Arc<DashMap<K, Flight<T, E>>>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, T, E> Drop for Unregister<K, T, E> {
    fn drop(&mut self) {
        let id = self.id;
        self.flights.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

/// Whether a call produced the value itself or attached to a running producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Leader,
    Follower,
}

pub struct SingleFlight<K, T, E> {
    flights: Arc<DashMap<K, Flight<T, E>>>,
    next_id: AtomicU64,
}

impl<K, T, E> Default for SingleFlight<K, T, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<tokio::task::JoinError> + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `produce` for `key` unless a producer for `key` is already running, in which
    /// case wait for that producer's outcome. `produce` is only called by the leader.
    pub async fn run<F, Fut>(&self, key: K, produce: F) -> (Result<T, E>, FlightRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        // The shard lock is held from lookup to registration, so two callers can
        // never both see the key vacant.
        let (outcome, role) = match self.flights.entry(key.clone()) {
            Entry::Occupied(running) => (running.get().outcome.clone(), FlightRole::Follower),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let unregister = Unregister {
                    flights: Arc::clone(&self.flights),
                    key,
                    id,
                };
                let work = produce();
                let task = tokio::spawn(async move {
                    let _unregister = unregister;
                    work.await
                });
                let outcome = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(join_error) => Err(E::from(join_error)),
                    }
                }
                .boxed()
                .shared();
                slot.insert(Flight {
                    id,
                    outcome: outcome.clone(),
                });
                (outcome, FlightRole::Leader)
            }
        };

        (outcome.await, role)
    }

    /// Number of producers currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}
