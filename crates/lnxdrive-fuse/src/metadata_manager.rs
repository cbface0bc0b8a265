//! Prioritised, deduplicating metadata request manager.
//!
//! Three kinds of metadata request compete for two priority lanes:
//!
//! - `DIRECTORY_LIST` — list the children of a directory.
//! - `LOOKUP` — resolve a single child name under a parent.
//! - `METADATA_REFRESH` — re-fetch a single item's metadata.
//!
//! Concurrent requests for the same `(type, target)` key are coalesced: only
//! one fetch runs at a time per key, and every caller attached to it observes
//! the same result. Directory listings additionally carry a staleness policy
//! (see [`Staleness`]) so a foreground `readdir` is never blocked behind a
//! background prefetch, and a moderately-stale cached listing can be served
//! immediately while a refresh happens behind it.
//!
//! The worker pool mirrors [`crate::hydration::HydrationManager`]'s shape
//! (bounded queues draining into a fixed pool of tasks) but splits the single
//! priority-ordered queue there into two literal queues, because a foreground
//! reader here must never wait behind a queued background refresh the way a
//! lower-priority hydration request may wait behind a higher-priority one.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lnxdrive_core::domain::{sync_item::SyncItem, UniqueId};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

use crate::error::FuseError;

/// The kind of metadata request being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataRequestType {
    DirectoryList,
    Lookup,
    MetadataRefresh,
}

/// Request priority. Foreground requests are for a blocked kernel call
/// (`lookup`, a cold `readdir`); background requests are prefetch/refresh
/// work that may be delayed arbitrarily behind foreground traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataPriority {
    Foreground,
    Background,
}

/// The outcome of a metadata fetch: either a full child listing or a single
/// item's metadata, depending on the request type that produced it.
#[derive(Debug, Clone)]
pub enum MetadataResult {
    Listing(Vec<SyncItem>),
    Item(SyncItem),
}

/// Deduplication key: a request kind plus the target it addresses
/// (a parent id for `DirectoryList`/`Lookup`, an item id for `MetadataRefresh`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub kind: MetadataRequestType,
    pub target: UniqueId,
}

impl RequestKey {
    pub fn new(kind: MetadataRequestType, target: UniqueId) -> Self {
        Self { kind, target }
    }
}

/// Boxed async fetch performed by a worker once it dequeues a request.
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<MetadataResult, FuseError>> + Send>>;

/// How stale a cached directory listing is relative to the configured TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Below `stale_ttl`: serve the cached value, no refresh needed.
    Fresh,
    /// Between `stale_ttl` and `hard_ttl`: serve the cached value, but also
    /// enqueue a background refresh.
    Stale,
    /// At or beyond `hard_ttl`: the cached value must not be served; a
    /// foreground refresh is required before returning.
    Hard,
}

/// Evaluate cache age against the configured TTLs.
///
/// Pure function, independent of the manager's runtime state, so the policy
/// in SPEC_FULL §4.3 is directly testable without spinning up workers.
pub fn classify_staleness(age: chrono::Duration, stale_ttl: chrono::Duration, hard_ttl: chrono::Duration) -> Staleness {
    if age < stale_ttl {
        Staleness::Fresh
    } else if age < hard_ttl {
        Staleness::Stale
    } else {
        Staleness::Hard
    }
}

/// A cached directory listing and when it was fetched.
#[derive(Debug, Clone)]
struct CachedListing {
    items: Vec<SyncItem>,
    fetched_at: DateTime<Utc>,
}

/// Shared completion slot for one in-flight request. Every caller attached to
/// the same [`RequestKey`] clones this `Arc` and awaits its `Notify`.
struct Inflight {
    result: Mutex<Option<Result<MetadataResult, Arc<FuseError>>>>,
    notify: Notify,
}

impl Inflight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    fn complete(&self, result: Result<MetadataResult, Arc<FuseError>>) {
        *self.result.lock().expect("inflight mutex poisoned") = Some(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Result<MetadataResult, Arc<FuseError>> {
        loop {
            if let Some(result) = self.result.lock().expect("inflight mutex poisoned").clone() {
                return result;
            }
            self.notify.notified().await;
        }
    }
}

/// A queued unit of work: the key that identifies it, the fetch to perform,
/// and the inflight record its result is published to.
struct QueuedRequest {
    key: RequestKey,
    fetch: FetchFuture,
    inflight: Arc<Inflight>,
}

/// Sizing for the manager's two queues and its worker pool.
#[derive(Debug, Clone, Copy)]
pub struct MetadataManagerConfig {
    pub workers: usize,
    pub high_priority_queue_size: usize,
    pub low_priority_queue_size: usize,
    pub stale_ttl: chrono::Duration,
    pub hard_ttl: chrono::Duration,
}

impl From<&lnxdrive_core::config::MetadataConfig> for MetadataManagerConfig {
    fn from(cfg: &lnxdrive_core::config::MetadataConfig) -> Self {
        Self {
            workers: cfg.workers.max(1) as usize,
            high_priority_queue_size: cfg.high_priority_queue_size.max(1) as usize,
            low_priority_queue_size: cfg.low_priority_queue_size.max(1) as usize,
            stale_ttl: chrono::Duration::seconds(cfg.stale_ttl_secs as i64),
            hard_ttl: chrono::Duration::seconds(cfg.hard_ttl_secs as i64),
        }
    }
}

/// Prioritised, deduplicating, stale-cache-serving metadata request manager.
///
/// One worker is always reserved to drain the foreground queue first; the
/// remaining workers drain foreground-then-background. All workers share the
/// same in-flight table so a background prefetch for a key already being
/// fetched in the foreground attaches to that fetch instead of issuing a
/// second request.
pub struct MetadataRequestManager {
    config: MetadataManagerConfig,
    inflight: Arc<DashMap<RequestKey, Arc<Inflight>>>,
    listings: Arc<DashMap<UniqueId, CachedListing>>,
    high_tx: mpsc::Sender<QueuedRequest>,
    low_tx: mpsc::Sender<QueuedRequest>,
}

impl MetadataRequestManager {
    /// Construct a manager and spawn its worker pool.
    pub fn new(config: MetadataManagerConfig) -> Self {
        let (high_tx, high_rx) = mpsc::channel(config.high_priority_queue_size);
        let (low_tx, low_rx) = mpsc::channel(config.low_priority_queue_size);
        let inflight = Arc::new(DashMap::new());
        let listings = Arc::new(DashMap::new());

        let shared_high_rx = Arc::new(tokio::sync::Mutex::new(high_rx));
        let shared_low_rx = Arc::new(tokio::sync::Mutex::new(low_rx));

        for worker_id in 0..config.workers {
            let high_rx = shared_high_rx.clone();
            let low_rx = shared_low_rx.clone();
            tokio::spawn(Self::worker_loop(worker_id, high_rx, low_rx));
        }

        Self {
            config,
            inflight,
            listings,
            high_tx,
            low_tx,
        }
    }

    /// Worker body: always prefer a foreground item; only poll background
    /// when the foreground queue has nothing ready.
    async fn worker_loop(
        worker_id: usize,
        high_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedRequest>>>,
        low_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedRequest>>>,
    ) {
        loop {
            let next = {
                let mut high = high_rx.lock().await;
                match high.try_recv() {
                    Ok(req) => Some(req),
                    Err(mpsc::error::TryRecvError::Empty) => {
                        drop(high);
                        tokio::select! {
                            biased;
                            req = async { high_rx.lock().await.recv().await } => req,
                            req = async { low_rx.lock().await.recv().await } => req,
                        }
                    }
                    Err(mpsc::error::TryRecvError::Disconnected) => None,
                }
            };

            let Some(req) = next else {
                debug!(worker_id, "metadata request worker shutting down");
                return;
            };

            trace!(worker_id, key = ?req.key, "processing metadata request");
            let result = req.fetch.await;
            match result {
                Ok(value) => req.inflight.complete(Ok(value)),
                Err(e) => {
                    warn!(worker_id, key = ?req.key, error = %e, "metadata request failed");
                    req.inflight.complete(Err(Arc::new(e)));
                }
            }
        }
    }

    /// Submit a fetch for `key`, coalescing with any in-flight request for
    /// the same key, and await its result.
    ///
    /// `make_fetch` is only invoked if no fetch for `key` is already running.
    pub async fn request(
        &self,
        key: RequestKey,
        priority: MetadataPriority,
        make_fetch: impl FnOnce() -> FetchFuture,
    ) -> Result<MetadataResult, Arc<FuseError>> {
        let inflight = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                trace!(key = ?key, "attaching to in-flight metadata request");
                entry.get().clone()
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let inflight = Arc::new(Inflight::new());
                entry.insert(inflight.clone());
                let queued = QueuedRequest {
                    key: key.clone(),
                    fetch: make_fetch(),
                    inflight: inflight.clone(),
                };
                let sender = match priority {
                    MetadataPriority::Foreground => &self.high_tx,
                    MetadataPriority::Background => &self.low_tx,
                };
                if sender.send(queued).await.is_err() {
                    inflight.complete(Err(Arc::new(FuseError::IoError(
                        "metadata request manager shut down".to_string(),
                    ))));
                }
                inflight
            }
        };

        let result = inflight.wait().await;
        self.inflight.remove(&key);
        result
    }

    /// Serve a directory listing under the stale-cache policy (SPEC_FULL §4.3):
    /// fresh → return cached value; stale → return cached value and also
    /// enqueue a background refresh; hard-stale or missing → fetch in the
    /// foreground and wait.
    pub async fn list_directory(
        self: Arc<Self>,
        parent: UniqueId,
        make_fetch: impl Fn() -> FetchFuture + Send + Sync + 'static,
    ) -> Result<Vec<SyncItem>, Arc<FuseError>> {
        let cached = self.listings.get(&parent).map(|e| e.clone());

        if let Some(cached) = cached {
            let age = Utc::now() - cached.fetched_at;
            match classify_staleness(age, self.config.stale_ttl, self.config.hard_ttl) {
                Staleness::Fresh => return Ok(cached.items),
                Staleness::Stale => {
                    // Serve the stale value immediately; refresh in the
                    // background without blocking this caller.
                    let manager = self.clone();
                    tokio::spawn(async move {
                        let key = RequestKey::new(MetadataRequestType::DirectoryList, parent);
                        if let Ok(MetadataResult::Listing(items)) = manager
                            .request(key, MetadataPriority::Background, make_fetch)
                            .await
                        {
                            manager.listings.insert(
                                parent,
                                CachedListing {
                                    items,
                                    fetched_at: Utc::now(),
                                },
                            );
                        }
                    });
                    return Ok(cached.items);
                }
                Staleness::Hard => {}
            }
        }

        let key = RequestKey::new(MetadataRequestType::DirectoryList, parent);
        let result = self
            .request(key, MetadataPriority::Foreground, || make_fetch())
            .await?;
        match result {
            MetadataResult::Listing(items) => {
                self.listings.insert(
                    parent,
                    CachedListing {
                        items: items.clone(),
                        fetched_at: Utc::now(),
                    },
                );
                Ok(items)
            }
            MetadataResult::Item(_) => Err(Arc::new(FuseError::IoError(
                "directory list fetch returned a single item".to_string(),
            ))),
        }
    }

    /// Invalidate a cached directory listing, e.g. after a local mutation
    /// that changes its children (create/unlink/rename).
    pub fn invalidate_listing(&self, parent: &UniqueId) {
        self.listings.remove(parent);
    }

    /// Number of requests currently in flight (any priority). Test/metrics hook.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn test_item(name: &str) -> SyncItem {
        use lnxdrive_core::domain::newtypes::{RemotePath, SyncPath};
        let local = SyncPath::new(std::path::PathBuf::from(format!("/tmp/{name}"))).unwrap();
        let remote = RemotePath::new(format!("/{name}")).unwrap();
        SyncItem::new(local, remote, false).unwrap()
    }

    #[test]
    fn staleness_below_stale_ttl_is_fresh() {
        let stale = chrono::Duration::seconds(30);
        let hard = chrono::Duration::seconds(300);
        assert_eq!(
            classify_staleness(chrono::Duration::seconds(5), stale, hard),
            Staleness::Fresh
        );
    }

    #[test]
    fn staleness_between_ttls_is_stale() {
        let stale = chrono::Duration::seconds(30);
        let hard = chrono::Duration::seconds(300);
        assert_eq!(
            classify_staleness(chrono::Duration::seconds(60), stale, hard),
            Staleness::Stale
        );
    }

    #[test]
    fn staleness_at_or_beyond_hard_ttl_is_hard() {
        let stale = chrono::Duration::seconds(30);
        let hard = chrono::Duration::seconds(300);
        assert_eq!(
            classify_staleness(chrono::Duration::seconds(300), stale, hard),
            Staleness::Hard
        );
        assert_eq!(
            classify_staleness(chrono::Duration::seconds(600), stale, hard),
            Staleness::Hard
        );
    }

    #[test]
    fn request_key_equality_is_by_kind_and_target() {
        let id = UniqueId::new();
        let a = RequestKey::new(MetadataRequestType::Lookup, id.clone());
        let b = RequestKey::new(MetadataRequestType::Lookup, id.clone());
        let c = RequestKey::new(MetadataRequestType::MetadataRefresh, id);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    fn default_config() -> MetadataManagerConfig {
        MetadataManagerConfig {
            workers: 2,
            high_priority_queue_size: 16,
            low_priority_queue_size: 16,
            stale_ttl: chrono::Duration::seconds(30),
            hard_ttl: chrono::Duration::seconds(300),
        }
    }

    #[tokio::test]
    async fn concurrent_identical_requests_issue_one_fetch() {
        let manager = Arc::new(MetadataRequestManager::new(default_config()));
        let call_count = Arc::new(AtomicUsize::new(0));
        let target = UniqueId::new();

        let mut join_set = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let manager = manager.clone();
            let call_count = call_count.clone();
            join_set.spawn(async move {
                let key = RequestKey::new(MetadataRequestType::MetadataRefresh, target);
                manager
                    .request(key, MetadataPriority::Foreground, || {
                        let call_count = call_count.clone();
                        Box::pin(async move {
                            call_count.fetch_add(1, AtomicOrdering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            Ok(MetadataResult::Item(test_item("dup")))
                        })
                    })
                    .await
            });
        }

        while let Some(result) = join_set.join_next().await {
            assert!(result.expect("task panicked").is_ok());
        }
        assert_eq!(call_count.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_directory_serves_fresh_cache_without_refetch() {
        let manager = Arc::new(MetadataRequestManager::new(default_config()));
        let call_count = Arc::new(AtomicUsize::new(0));
        let parent = UniqueId::new();

        let make_fetch = {
            let call_count = call_count.clone();
            move || {
                let call_count = call_count.clone();
                Box::pin(async move {
                    call_count.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(MetadataResult::Listing(vec![test_item("a")]))
                }) as FetchFuture
            }
        };

        let first = manager
            .clone()
            .list_directory(parent.clone(), make_fetch.clone())
            .await;
        assert!(first.is_ok());
        let second = manager.clone().list_directory(parent, make_fetch).await;
        assert!(second.is_ok());
        assert_eq!(call_count.load(AtomicOrdering::SeqCst), 1);
    }
}
