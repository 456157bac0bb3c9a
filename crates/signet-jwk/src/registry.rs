//! Auto-refreshing key-set registry
//!
//! [`KeySetCache`] keeps one [`KeySet`] per configured URL and refreshes
//! them behind the scenes. URLs must be registered with
//! [`configure`](KeySetCache::configure) before they can be fetched.
//!
//! Concurrency model: callers invoke the cache from any task; one dedicated
//! background task owns the refresh schedule and lives until the supplied
//! cancellation token fires. Cold-cache fetches are coalesced so that at
//! most one HTTP request per URL is in flight no matter how many callers
//! race. A failed refresh never evicts the previous value.
//!
//! Lock order, where more than one is held: `fetching` → `targets` →
//! `cache`. Guards are never held across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{RegistryError, Result};
use crate::fetch;
use crate::keyset::KeySet;

/// Default floor between two refreshes of the same URL
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

// A fresh target carries a far-future deadline until its first successful
// refresh reports a real one
const PLACEHOLDER_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-URL configuration
///
/// `configure` treats the options as a whole: re-configuring a URL replaces
/// every option, and fields left at their defaults here reset whatever was
/// configured before.
#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    /// Retry pacing for background refresh attempts
    pub fetch_backoff: BackoffPolicy,

    /// Fixed refresh interval; overrides whatever response headers say
    pub refresh_interval: Option<Duration>,

    /// Floor for header-derived refresh intervals, and the retry distance
    /// after a failed refresh; `None` means one hour
    pub min_refresh_interval: Option<Duration>,

    /// HTTP client to fetch with; `None` means a default client
    pub http_client: Option<reqwest::Client>,
}

/// Observability snapshot of one configured URL
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    /// The configured URL
    pub url: String,
    /// When the last successful refresh completed
    pub last_refresh: Option<SystemTime>,
    /// When the next refresh is due
    pub next_refresh: Option<SystemTime>,
    /// The most recent refresh error, cleared on success
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct TargetConfig {
    backoff: BackoffPolicy,
    refresh_interval: Option<Duration>,
    min_refresh_interval: Duration,
    http_client: reqwest::Client,
}

#[derive(Debug, Default)]
struct TargetState {
    last_refresh: Option<SystemTime>,
    next_refresh: Option<SystemTime>,
    last_error: Option<String>,
}

#[derive(Debug)]
struct Target {
    config: RwLock<TargetConfig>,
    state: Mutex<TargetState>,
    // One permit: at most one background refresh per URL at a time
    refresh_slot: Arc<Semaphore>,
}

enum WorkerCommand {
    Register { url: String },
    ResetTimer { url: String, after: Duration },
}

struct Shared {
    fetching: Mutex<HashMap<String, watch::Receiver<bool>>>,
    targets: RwLock<HashMap<String, Arc<Target>>>,
    cache: RwLock<HashMap<String, Arc<KeySet>>>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

/// A concurrent cache of key sets, refreshed by a background worker
///
/// Cached values are shared read-only: every caller of the same URL gets the
/// same `Arc<KeySet>` until the next refresh replaces it.
pub struct KeySetCache {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl KeySetCache {
    /// Create a cache whose background worker lives until `cancel` fires
    ///
    /// Must be called from within a tokio runtime; the worker task is
    /// spawned immediately.
    pub fn new(cancel: CancellationToken) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            fetching: Mutex::new(HashMap::new()),
            targets: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            commands,
        });
        tokio::spawn(refresh_worker(
            Arc::clone(&shared),
            command_rx,
            cancel.clone(),
        ));
        Self { shared, cancel }
    }

    /// Register `url`, replacing any previous options wholesale
    ///
    /// Unspecified options revert to their defaults rather than keeping
    /// earlier values, so a second `configure` call cannot leave a target
    /// half-updated. Any effective change wakes the background worker so it
    /// can rebuild its schedule.
    pub fn configure(&self, url: impl Into<String>, options: TargetOptions) {
        let url = url.into();
        let custom_client = options.http_client.is_some();
        let next = TargetConfig {
            backoff: options.fetch_backoff,
            refresh_interval: options.refresh_interval,
            min_refresh_interval: options
                .min_refresh_interval
                .unwrap_or(DEFAULT_MIN_REFRESH_INTERVAL),
            http_client: options.http_client.unwrap_or_default(),
        };

        let mut notify_worker = false;
        {
            let mut targets = self.shared.targets.write();
            match targets.get(&url) {
                Some(target) => {
                    let mut config = target.config.write();
                    if config.backoff != next.backoff
                        || config.refresh_interval != next.refresh_interval
                        || config.min_refresh_interval != next.min_refresh_interval
                        || custom_client
                    {
                        notify_worker = true;
                    }
                    *config = next;
                }
                None => {
                    targets.insert(
                        url.clone(),
                        Arc::new(Target {
                            config: RwLock::new(next),
                            state: Mutex::new(TargetState::default()),
                            refresh_slot: Arc::new(Semaphore::new(1)),
                        }),
                    );
                    notify_worker = true;
                }
            }
        }

        if notify_worker {
            debug!(url = %url, "key set target configured");
            let _ = self
                .shared
                .commands
                .send(WorkerCommand::Register { url });
        }
    }

    /// The cached key set for `url`, fetching it on a cold cache
    ///
    /// On a cold cache at most one caller per URL performs the HTTP fetch;
    /// the rest wait for its completion and read the cache. Waiters observe
    /// the registry's cancellation token and detach without affecting the
    /// in-flight fetch.
    pub async fn fetch(&self, url: &str) -> Result<Arc<KeySet>> {
        if !self.is_registered(url) {
            return Err(RegistryError::UrlNotConfigured {
                url: url.to_string(),
            });
        }
        if let Some(cached) = self.cached(url) {
            return Ok(cached);
        }
        self.refresh_coalesced(url).await
    }

    /// Force a synchronous refresh of `url`, bypassing the cache lookup
    ///
    /// Still coalesces with any in-flight fetch of the same URL. Errors are
    /// surfaced to the caller and recorded on the target; the previously
    /// cached value, if any, stays available.
    pub async fn refresh(&self, url: &str) -> Result<Arc<KeySet>> {
        if !self.is_registered(url) {
            return Err(RegistryError::UrlNotConfigured {
                url: url.to_string(),
            });
        }
        self.refresh_coalesced(url).await
    }

    /// Per-URL observability data
    pub fn snapshot(&self) -> Vec<TargetSnapshot> {
        let targets = self.shared.targets.read();
        targets
            .iter()
            .map(|(url, target)| {
                let state = target.state.lock();
                TargetSnapshot {
                    url: url.clone(),
                    last_refresh: state.last_refresh,
                    next_refresh: state.next_refresh,
                    last_error: state.last_error.clone(),
                }
            })
            .collect()
    }

    fn is_registered(&self, url: &str) -> bool {
        self.shared.targets.read().contains_key(url)
    }

    fn cached(&self, url: &str) -> Option<Arc<KeySet>> {
        self.shared.cache.read().get(url).cloned()
    }

    async fn refresh_coalesced(&self, url: &str) -> Result<Arc<KeySet>> {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }

        enum Role {
            Leader(watch::Sender<bool>),
            Waiter(watch::Receiver<bool>),
        }

        let role = {
            let mut fetching = self.shared.fetching.lock();
            match fetching.get(url) {
                Some(receiver) => Role::Waiter(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(false);
                    fetching.insert(url.to_string(), receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Waiter(mut receiver) => {
                // Completion is signalled by a send or by the sender going
                // away; either way the leader is done.
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(RegistryError::Cancelled),
                    _ = receiver.changed() => {}
                }
                self.cached(url)
                    .ok_or_else(|| RegistryError::FetchFailed {
                        reason: "cache was not populated after refresh".to_string(),
                    })
            }
            Role::Leader(sender) => {
                // The guard releases the coalescing slot and wakes waiters
                // however this scope exits, including caller cancellation.
                let _slot = FetchingSlot {
                    shared: &self.shared,
                    url,
                    sender,
                };
                // First-time and forced fetches never apply backoff
                do_refresh(&self.shared, url, false).await
            }
        }
    }
}

struct FetchingSlot<'a> {
    shared: &'a Shared,
    url: &'a str,
    sender: watch::Sender<bool>,
}

impl Drop for FetchingSlot<'_> {
    fn drop(&mut self) {
        // Remove the entry before signalling so a late caller becomes a new
        // leader instead of waiting on a finished channel
        self.shared.fetching.lock().remove(self.url);
        let _ = self.sender.send(true);
    }
}

async fn do_refresh(shared: &Shared, url: &str, background: bool) -> Result<Arc<KeySet>> {
    let target = shared
        .targets
        .read()
        .get(url)
        .cloned()
        .ok_or_else(|| RegistryError::UrlNotConfigured {
            url: url.to_string(),
        })?;

    let (client, backoff, explicit_interval, min_interval) = {
        let config = target.config.read();
        (
            config.http_client.clone(),
            if background {
                config.backoff.clone()
            } else {
                BackoffPolicy::Null
            },
            config.refresh_interval,
            config.min_refresh_interval,
        )
    };

    let fetched = fetch::fetch_key_set_document(&client, url, &backoff).await;
    let parsed = fetched.and_then(|outcome| {
        KeySet::parse(&outcome.body).map(|key_set| (key_set, outcome.headers))
    });

    match parsed {
        Ok((key_set, headers)) => {
            let key_set = Arc::new(key_set);
            shared
                .cache
                .write()
                .insert(url.to_string(), Arc::clone(&key_set));

            let next = fetch::next_refresh_interval(&headers, explicit_interval, min_interval);
            let now = SystemTime::now();
            {
                let mut state = target.state.lock();
                state.last_refresh = Some(now);
                state.next_refresh = Some(now + next);
                state.last_error = None;
            }
            let _ = shared.commands.send(WorkerCommand::ResetTimer {
                url: url.to_string(),
                after: next,
            });

            info!(
                url,
                key_count = key_set.len(),
                next_refresh_secs = next.as_secs(),
                "key set refreshed"
            );
            Ok(key_set)
        }
        Err(err) => {
            // Stale-but-available: the previous cached value is kept, and the
            // next attempt is scheduled at the minimum interval regardless of
            // what the failed response said
            warn!(url, error = %err, "key set refresh failed");
            {
                let mut state = target.state.lock();
                state.last_error = Some(err.to_string());
                state.next_refresh = Some(SystemTime::now() + min_interval);
            }
            let _ = shared.commands.send(WorkerCommand::ResetTimer {
                url: url.to_string(),
                after: min_interval,
            });
            Err(err)
        }
    }
}

async fn refresh_worker(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    cancel: CancellationToken,
) {
    let mut schedule: HashMap<String, Instant> = HashMap::new();
    debug!("key set refresh worker started");

    loop {
        // Rebuilding the earliest deadline every iteration keeps the wait
        // set trivially in sync with (re)configuration
        let next_deadline = schedule
            .iter()
            .min_by_key(|entry| *entry.1)
            .map(|(url, at)| (url.clone(), *at));

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("key set refresh worker stopping");
                return;
            }
            command = commands.recv() => {
                match command {
                    Some(WorkerCommand::Register { url }) => {
                        schedule
                            .entry(url)
                            .or_insert_with(|| Instant::now() + PLACEHOLDER_INTERVAL);
                    }
                    Some(WorkerCommand::ResetTimer { url, after }) => {
                        if shared.targets.read().contains_key(&url) {
                            schedule.insert(url, Instant::now() + after);
                        }
                    }
                    None => return,
                }
            }
            _ = deadline_sleep(next_deadline.as_ref().map(|(_, at)| *at)) => {
                if let Some((url, _)) = next_deadline {
                    // Park the deadline until the spawned refresh reports its
                    // real schedule back through ResetTimer
                    schedule.insert(url.clone(), Instant::now() + PLACEHOLDER_INTERVAL);
                    start_scheduled_refresh(&shared, &url);
                }
            }
        }
    }
}

async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn start_scheduled_refresh(shared: &Arc<Shared>, url: &str) {
    let Some(target) = shared.targets.read().get(url).cloned() else {
        return;
    };
    // One refresh per target at a time; a held slot means the previous run
    // is still going, and this cycle is skipped rather than queued
    let Ok(permit) = Arc::clone(&target.refresh_slot).try_acquire_owned() else {
        debug!(url, "refresh still in flight; skipping scheduled run");
        return;
    };

    let shared = Arc::clone(shared);
    let url = url.to_string();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(err) = do_refresh(&shared, &url, true).await {
            debug!(url, error = %err, "background refresh failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_requires_configuration() {
        let cache = KeySetCache::new(CancellationToken::new());
        let err = cache.fetch("https://keys.example.com/jwks.json").await.unwrap_err();
        assert!(matches!(err, RegistryError::UrlNotConfigured { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_lists_configured_targets() {
        let cache = KeySetCache::new(CancellationToken::new());
        cache.configure("https://a.example.com/jwks.json", TargetOptions::default());
        cache.configure("https://b.example.com/jwks.json", TargetOptions::default());

        let mut urls: Vec<String> = cache.snapshot().into_iter().map(|s| s.url).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://a.example.com/jwks.json".to_string(),
                "https://b.example.com/jwks.json".to_string()
            ]
        );

        for snapshot in cache.snapshot() {
            assert!(snapshot.last_refresh.is_none());
            assert!(snapshot.last_error.is_none());
        }
    }

    #[tokio::test]
    async fn test_cancelled_registry_rejects_refresh() {
        let cancel = CancellationToken::new();
        let cache = KeySetCache::new(cancel.clone());
        cache.configure("https://a.example.com/jwks.json", TargetOptions::default());

        cancel.cancel();
        let err = cache.refresh("https://a.example.com/jwks.json").await.unwrap_err();
        assert!(matches!(err, RegistryError::Cancelled));
    }
}
