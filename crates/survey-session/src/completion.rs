//! CompletionIndex: which survey editions a user has already completed.
//!
//! Answers come from [`RemoteDraftStore::load_completed`], one lookup per
//! edition run concurrently, and are cached per user for a short TTL (30 s by
//! default). Concurrent callers for the same user share one lookup. Lookup
//! failures count as "not completed" for that edition and are logged; they
//! are cached exactly as long as a successful answer.
//!
//! Subscribers hear about a user whenever a fresh answer differs from the
//! last one seen.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::reactive::{CompletionChange, EventEmitter, Unsubscribe};
use crate::storage::RemoteDraftStore;
use crate::types::{SessionKey, SurveyKey, UserId};

const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    /// `None` once invalidated; the answer is kept for change detection.
    fetched_at: Option<Instant>,
    completed: BTreeSet<SurveyKey>,
}

pub struct CompletionIndex {
    remote: Arc<RemoteDraftStore>,
    editions: Vec<SurveyKey>,
    ttl: Duration,
    cache: Mutex<HashMap<UserId, CacheEntry>>,
    lookups: Mutex<HashMap<UserId, Arc<TokioMutex<()>>>>,
    changes: Arc<EventEmitter<CompletionChange>>,
}

impl CompletionIndex {
    /// Track `editions` for every user. `ttl` defaults to 30 seconds.
    pub fn new(
        remote: Arc<RemoteDraftStore>,
        editions: impl IntoIterator<Item = SurveyKey>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            remote,
            editions: editions.into_iter().collect(),
            ttl: ttl.unwrap_or(DEFAULT_TTL),
            cache: Mutex::new(HashMap::new()),
            lookups: Mutex::new(HashMap::new()),
            changes: Arc::new(EventEmitter::new()),
        }
    }

    /// Editions `user` has completed.
    pub async fn completed(&self, user: &UserId) -> BTreeSet<SurveyKey> {
        if let Some(hit) = self.cached(user) {
            return hit;
        }

        let gate = self.lookup_gate(user);
        let _turn = gate.lock().await;
        if let Some(hit) = self.cached(user) {
            debug!(user = %user, "joined concurrent completion lookup");
            return hit;
        }

        let completed = self.fetch(user).await;
        let changed = {
            let mut cache = self.cache.lock();
            let previous = cache.insert(
                user.clone(),
                CacheEntry {
                    fetched_at: Some(Instant::now()),
                    completed: completed.clone(),
                },
            );
            previous.map_or(true, |p| p.completed != completed)
        };
        if changed {
            self.changes.emit(&CompletionChange {
                user_id: user.clone(),
                completed: completed.clone(),
            });
        }
        completed
    }

    pub async fn is_completed(&self, user: &UserId, edition: &SurveyKey) -> bool {
        self.completed(user).await.contains(edition)
    }

    /// Expire the cached answer for `user`, e.g. right after a submission.
    pub fn invalidate(&self, user: &UserId) {
        if let Some(entry) = self.cache.lock().get_mut(user) {
            entry.fetched_at = None;
        }
    }

    /// Call `callback` whenever a user's completed set changes.
    pub fn subscribe(
        &self,
        callback: impl Fn(&CompletionChange) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.changes.subscribe(callback)
    }

    fn cached(&self, user: &UserId) -> Option<BTreeSet<SurveyKey>> {
        let cache = self.cache.lock();
        let entry = cache.get(user)?;
        let fetched_at = entry.fetched_at?;
        (fetched_at.elapsed() < self.ttl).then(|| entry.completed.clone())
    }

    fn lookup_gate(&self, user: &UserId) -> Arc<TokioMutex<()>> {
        Arc::clone(self.lookups.lock().entry(user.clone()).or_default())
    }

    async fn fetch(&self, user: &UserId) -> BTreeSet<SurveyKey> {
        let mut lookups = JoinSet::new();
        for edition in &self.editions {
            let remote = Arc::clone(&self.remote);
            let key = SessionKey::new(user.clone(), edition.clone());
            lookups.spawn(async move {
                let found = remote.load_completed(&key).await;
                (key, found)
            });
        }

        let mut completed = BTreeSet::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((key, Ok(Some(_)))) => {
                    completed.insert(key.survey_key);
                }
                Ok((_, Ok(None))) => {}
                Ok((key, Err(e))) => {
                    warn!(
                        session = %key,
                        error = %e,
                        "completion lookup failed; treating as not completed"
                    );
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "completion lookup task did not finish");
                }
            }
        }
        completed
    }
}
