//! Periodic leaderboard refresh with single-flight coalescing.
//!
//! One refresh cycle runs at a time per board. Callers that request a
//! refresh while a cycle is in flight await that cycle's commit instead
//! of issuing duplicate upstream pulls; the periodic driver goes
//! through the same path.

use crate::leaderboard::{rank, LeaderboardEntry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tradeboard_core::{Result, TraderProfile};

/// Default refresh cadence.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Supplies the current profile set for ranking.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Loads all profiles eligible for the board.
    async fn load_profiles(&self) -> Result<Vec<TraderProfile>>;
}

/// Owns the ranked board and keeps it current.
pub struct LeaderboardRefresher {
    source: Arc<dyn ProfileSource>,
    interval: Duration,
    entries: RwLock<Vec<LeaderboardEntry>>,
    /// Held for the duration of one pull-and-commit cycle.
    inflight: Mutex<()>,
    /// Bumped at the end of every cycle, committed or failed; waiters
    /// key off it to coalesce.
    generation: watch::Sender<u64>,
}

impl std::fmt::Debug for LeaderboardRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardRefresher")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl LeaderboardRefresher {
    /// Creates a refresher over a profile source.
    #[must_use]
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self::with_interval(source, DEFAULT_REFRESH_INTERVAL)
    }

    /// Creates a refresher with a custom cadence (tests).
    #[must_use]
    pub fn with_interval(source: Arc<dyn ProfileSource>, interval: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            source,
            interval,
            entries: RwLock::new(Vec::new()),
            inflight: Mutex::new(()),
            generation,
        }
    }

    /// Returns the last committed board without blocking a refresh.
    pub async fn snapshot(&self) -> Vec<LeaderboardEntry> {
        self.entries.read().await.clone()
    }

    /// Re-pulls and re-ranks, or awaits the refresh already in flight.
    ///
    /// A coalesced caller returns `Ok` as soon as the in-flight cycle
    /// finishes, whatever its outcome; only the caller driving the
    /// cycle sees its error.
    ///
    /// # Errors
    /// Propagates the source's load error; the previous board stays
    /// committed on failure.
    pub async fn refresh(&self) -> Result<()> {
        // Subscribe before probing the lock so a cycle that finishes
        // between the two is still observed.
        let mut seen = self.generation.subscribe();

        let Ok(_guard) = self.inflight.try_lock() else {
            seen.changed().await.ok();
            return Ok(());
        };

        let outcome = self.pull_and_commit().await;
        // Release waiters even when the pull failed; a failed cycle
        // must not strand them until some later cycle succeeds.
        self.generation.send_modify(|g| *g += 1);
        outcome
    }

    async fn pull_and_commit(&self) -> Result<()> {
        let profiles = self.source.load_profiles().await?;
        let ranked = rank(&profiles);
        tracing::debug!(entries = ranked.len(), "committing leaderboard refresh");

        *self.entries.write().await = ranked;
        Ok(())
    }

    /// Drives the refresh cadence until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(error) = self.refresh().await {
                tracing::warn!(%error, "leaderboard refresh failed, keeping previous board");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
        delay: Duration,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                delay,
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ProfileSource for CountingSource {
        async fn load_profiles(&self) -> Result<Vec<TraderProfile>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(tradeboard_core::ExchangeError::Network(
                    "source down".to_string(),
                ));
            }
            Ok(vec![TraderProfile {
                id: "p-1".to_string(),
                nickname: "trader".to_string(),
                broker: "bybit".to_string(),
                is_live_account: true,
                total_trades: 12,
                win_rate: 60.0,
                elo_score: 2700.0,
                updated_at: Utc::now(),
            }])
        }
    }

    #[tokio::test]
    async fn test_refresh_commits_ranked_board() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let refresher = LeaderboardRefresher::new(source);

        assert!(refresher.snapshot().await.is_empty());
        refresher.refresh().await.unwrap();

        let board = refresher.snapshot().await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].trader_profile_id, "p-1");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(50)));
        let refresher = Arc::new(LeaderboardRefresher::new(source.clone()));

        let (a, b, c) = tokio::join!(
            refresher.refresh(),
            refresher.refresh(),
            refresher.refresh()
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        // One upstream pull served all three callers.
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_board() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let refresher = LeaderboardRefresher::new(source.clone());
        refresher.refresh().await.unwrap();
        assert_eq!(refresher.snapshot().await.len(), 1);

        source.fail.store(true, Ordering::SeqCst);
        assert!(refresher.refresh().await.is_err());
        assert_eq!(refresher.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_waiter_released_when_inflight_refresh_fails() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(100)));
        source.fail.store(true, Ordering::SeqCst);
        let refresher = Arc::new(LeaderboardRefresher::new(source.clone()));

        let driver = refresher.clone();
        let driver = tokio::spawn(async move { driver.refresh().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The coalesced caller must come back as soon as the failing
        // cycle finishes, not hang for a later successful one.
        let waited = tokio::time::timeout(Duration::from_secs(2), refresher.refresh())
            .await
            .expect("coalesced refresh should return when the cycle fails");
        waited.unwrap();

        assert!(driver.await.unwrap().is_err());
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }
}
