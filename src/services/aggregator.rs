use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::address::WalletAddress;
use crate::chains::ChainRequestSpec;
use crate::datasource::types::ProtocolList;
use crate::datasource::PortfolioSource;
use crate::error::FetchError;
use crate::services::merger::{PortfolioMerger, Position};
use crate::services::queue::RateLimitedQueue;
use crate::services::retry::{RetryPolicy, TerminalFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainStatus::Completed | ChainStatus::Failed)
    }
}

/// Per-chain state within one aggregation run.
#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    pub chain_id: u64,
    pub display_name: String,
    pub status: ChainStatus,
    #[serde(skip)]
    pub payload: Option<ProtocolList>,
    pub position_count: usize,
    pub fetched_at_epoch_ms: Option<i64>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ChainResult {
    fn pending(spec: &ChainRequestSpec) -> Self {
        Self {
            chain_id: spec.chain_id,
            display_name: spec.display_name.to_string(),
            status: ChainStatus::Pending,
            payload: None,
            position_count: 0,
            fetched_at_epoch_ms: None,
            attempts: 0,
            error: None,
        }
    }
}

/// Everything one run produced. Replaced wholesale by the next run.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedPortfolio {
    pub run_id: Uuid,
    #[serde(skip)]
    pub sequence: u64,
    pub address: WalletAddress,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub positions: Vec<Position>,
    pub per_chain_status: BTreeMap<u64, ChainStatus>,
    pub chains: Vec<ChainResult>,
    pub total_value_usd: f64,
}

impl AggregatedPortfolio {
    /// True when chains were requested and none of them completed.
    pub fn all_failed(&self) -> bool {
        !self.per_chain_status.is_empty()
            && self
                .per_chain_status
                .values()
                .all(|s| *s == ChainStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainProgress {
    pub chain_id: u64,
    pub display_name: String,
    pub status: ChainStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationProgress {
    pub run_id: Uuid,
    pub address: WalletAddress,
    pub settled: usize,
    pub total: usize,
    pub finished: bool,
    pub chains: Vec<ChainProgress>,
}

struct RunState {
    sequence: u64,
    run_id: Uuid,
    address: WalletAddress,
    started_at: DateTime<Utc>,
    results: RwLock<Vec<ChainResult>>,
}

impl RunState {
    async fn set_in_flight(&self, index: usize) {
        if let Some(result) = self.results.write().await.get_mut(index) {
            result.status = ChainStatus::InFlight;
        }
    }

    async fn settle(&self, index: usize, outcome: Result<(ProtocolList, u32), TerminalFailure>) {
        let mut results = self.results.write().await;
        let Some(result) = results.get_mut(index) else {
            return;
        };
        result.fetched_at_epoch_ms = Some(Utc::now().timestamp_millis());
        match outcome {
            Ok((list, attempts)) => {
                result.status = ChainStatus::Completed;
                result.position_count = list.len();
                result.attempts = attempts;
                result.payload = Some(list);
            }
            Err(failure) => {
                result.status = ChainStatus::Failed;
                result.attempts = failure.attempts;
                result.error = Some(failure.last_error.to_string());
            }
        }
    }

    async fn progress(&self) -> AggregationProgress {
        let results = self.results.read().await;
        let settled = results.iter().filter(|r| r.status.is_terminal()).count();
        AggregationProgress {
            run_id: self.run_id,
            address: self.address.clone(),
            settled,
            total: results.len(),
            finished: settled == results.len(),
            chains: results
                .iter()
                .map(|r| ChainProgress {
                    chain_id: r.chain_id,
                    display_name: r.display_name.clone(),
                    status: r.status,
                })
                .collect(),
        }
    }
}

/// Fetches one protocol snapshot per configured chain, one chain at a time.
///
/// Chain `k+1` is requested only after chain `k` settled and
/// `inter_chain_delay` elapsed. Every request also goes through the shared
/// `RateLimitedQueue`, so concurrent runs never hit the upstream at once.
/// A failing chain is recorded as `Failed` and the run moves on.
pub struct ChainAggregator {
    source: Arc<dyn PortfolioSource>,
    queue: Arc<RateLimitedQueue>,
    retry: RetryPolicy,
    chains: Vec<ChainRequestSpec>,
    inter_chain_delay: Duration,
    merger: PortfolioMerger,
    next_sequence: AtomicU64,
    /// Most recently started run per address
    current: RwLock<HashMap<WalletAddress, Arc<RunState>>>,
    /// Newest completed run per address, by start order
    latest: RwLock<HashMap<WalletAddress, Arc<AggregatedPortfolio>>>,
}

impl ChainAggregator {
    pub fn new(
        source: Arc<dyn PortfolioSource>,
        queue: Arc<RateLimitedQueue>,
        retry: RetryPolicy,
        chains: Vec<ChainRequestSpec>,
        inter_chain_delay: Duration,
    ) -> Self {
        Self {
            source,
            queue,
            retry,
            chains,
            inter_chain_delay,
            merger: PortfolioMerger::new(),
            next_sequence: AtomicU64::new(1),
            current: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
        }
    }

    pub fn chains(&self) -> &[ChainRequestSpec] {
        &self.chains
    }

    /// Runs to completion; never fails as a whole.
    pub async fn aggregate(&self, address: &WalletAddress) -> AggregatedPortfolio {
        self.aggregate_with_cancel(address, &CancellationToken::new())
            .await
    }

    /// Like `aggregate`, but stops issuing requests once `cancel` fires.
    /// Chains not fetched by then settle as `Failed`.
    pub async fn aggregate_with_cancel(
        &self,
        address: &WalletAddress,
        cancel: &CancellationToken,
    ) -> AggregatedPortfolio {
        self.aggregate_run(Uuid::new_v4(), address, cancel).await
    }

    /// Runs under a caller-chosen id, so the id can be handed out before
    /// the run is spawned.
    pub async fn aggregate_run(
        &self,
        run_id: Uuid,
        address: &WalletAddress,
        cancel: &CancellationToken,
    ) -> AggregatedPortfolio {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let run = Arc::new(RunState {
            sequence,
            run_id,
            address: address.clone(),
            started_at: Utc::now(),
            results: RwLock::new(self.chains.iter().map(ChainResult::pending).collect()),
        });
        {
            let mut current = self.current.write().await;
            let slot = current.entry(address.clone()).or_insert_with(|| run.clone());
            if slot.sequence < sequence {
                *slot = run.clone();
            }
        }

        tracing::info!(
            "Aggregation run {} started for {} across {} chains",
            run.run_id,
            address.short(),
            self.chains.len()
        );

        for (index, chain) in self.chains.iter().enumerate() {
            if index > 0 && !self.inter_chain_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.inter_chain_delay) => {}
                }
            }

            if cancel.is_cancelled() {
                run.settle(index, Err(cancelled())).await;
                continue;
            }

            run.set_in_flight(index).await;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(cancelled()),
                outcome = self.fetch_chain(chain, address) => outcome,
            };

            match &outcome {
                Ok((list, _)) => tracing::debug!(
                    "Chain {} returned {} protocols",
                    chain.display_name,
                    list.len()
                ),
                Err(failure) => tracing::warn!(
                    "Chain {} failed after {} attempt(s): {}",
                    chain.display_name,
                    failure.attempts,
                    failure.last_error
                ),
            }
            run.settle(index, outcome).await;
        }

        let portfolio = self.finish(&run).await;
        tracing::info!(
            "Aggregation run {} finished: {} positions, {}/{} chains completed",
            portfolio.run_id,
            portfolio.positions.len(),
            portfolio
                .per_chain_status
                .values()
                .filter(|s| **s == ChainStatus::Completed)
                .count(),
            portfolio.per_chain_status.len()
        );
        portfolio
    }

    async fn fetch_chain(
        &self,
        chain: &ChainRequestSpec,
        address: &WalletAddress,
    ) -> Result<(ProtocolList, u32), TerminalFailure> {
        let label = format!("protocols[{}]", chain.display_name);
        let (queue, source, chain_id) = (&self.queue, &self.source, chain.chain_id);
        let mut attempts = 0;
        let list = self
            .retry
            .run(&label, |attempt| {
                attempts = attempt;
                queue.enqueue(move || source.get_protocols(chain_id, address))
            })
            .await?;
        Ok((list, attempts))
    }

    async fn finish(&self, run: &RunState) -> AggregatedPortfolio {
        let results = run.results.read().await.clone();

        let positions = self.merger.merge(
            results
                .iter()
                .filter_map(|r| r.payload.clone().map(|list| (r.chain_id, list))),
        );
        let total_value_usd = positions.iter().map(|p| p.value_usd).sum();
        let per_chain_status = results.iter().map(|r| (r.chain_id, r.status)).collect();

        let portfolio = AggregatedPortfolio {
            run_id: run.run_id,
            sequence: run.sequence,
            address: run.address.clone(),
            started_at: run.started_at,
            completed_at: Utc::now(),
            positions,
            per_chain_status,
            chains: results,
            total_value_usd,
        };

        // a slower, older run must not overwrite a newer one for the same address
        let mut latest = self.latest.write().await;
        if latest
            .get(&portfolio.address)
            .is_none_or(|existing| existing.sequence < portfolio.sequence)
        {
            latest.insert(portfolio.address.clone(), Arc::new(portfolio.clone()));
        }

        portfolio
    }

    /// Progress of the most recently started run for `address`.
    pub async fn progress(&self, address: &WalletAddress) -> Option<AggregationProgress> {
        let current = self.current.read().await.get(address).cloned();
        match current {
            Some(run) => Some(run.progress().await),
            None => None,
        }
    }

    /// Newest completed run for `address`, by start order.
    pub async fn latest(&self, address: &WalletAddress) -> Option<Arc<AggregatedPortfolio>> {
        self.latest.read().await.get(address).cloned()
    }
}

fn cancelled() -> TerminalFailure {
    TerminalFailure {
        attempts: 0,
        last_error: FetchError::Cancelled,
        history: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::testing::{record, wallet, ChainScript, ScriptedSource};
    use crate::services::metrics::PortfolioMetrics;
    use bigdecimal::BigDecimal;
    use tokio::time::Instant;

    fn chain(chain_id: u64, name: &'static str, order: u32) -> ChainRequestSpec {
        ChainRequestSpec {
            chain_id,
            display_name: name,
            order,
        }
    }

    fn status(portfolio: &AggregatedPortfolio, chain_id: u64) -> Option<ChainStatus> {
        portfolio.per_chain_status.get(&chain_id).copied()
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Some(Duration::from_millis(5000)),
            rate_limit_multiplier: 2.0,
        }
    }

    fn aggregator(source: Arc<ScriptedSource>, chains: Vec<ChainRequestSpec>) -> ChainAggregator {
        ChainAggregator::new(
            source,
            Arc::new(RateLimitedQueue::new(Duration::from_millis(1000))),
            fast_retry(2),
            chains,
            Duration::from_millis(1000),
        )
    }

    fn down() -> FetchError {
        FetchError::Upstream {
            status: 502,
            body: "bad gateway".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_chain_does_not_stop_the_run() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::Ok(vec![record(1, "A", 10.0)]))
                .with_chain(2, ChainScript::FailAlways(down()))
                .with_chain(3, ChainScript::Ok(vec![record(3, "C", 30.0)])),
        );
        let agg = aggregator(
            source.clone(),
            vec![chain(1, "A", 0), chain(2, "B", 1), chain(3, "C", 2)],
        );

        let portfolio = agg.aggregate(&wallet()).await;

        assert_eq!(status(&portfolio, 1), Some(ChainStatus::Completed));
        assert_eq!(status(&portfolio, 2), Some(ChainStatus::Failed));
        assert_eq!(status(&portfolio, 3), Some(ChainStatus::Completed));
        let chains: Vec<u64> = portfolio.positions.iter().map(|p| p.chain_id).collect();
        assert_eq!(chains, vec![1, 3]);
        assert_eq!(source.attempts(2), 3);
        assert!(!portfolio.all_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn chains_are_fetched_in_order_and_spaced() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(10, ChainScript::Ok(vec![]))
                .with_chain(20, ChainScript::Ok(vec![]))
                .with_chain(30, ChainScript::Ok(vec![])),
        );
        let agg = aggregator(
            source.clone(),
            vec![chain(10, "X", 0), chain(20, "Y", 1), chain(30, "Z", 2)],
        );

        agg.aggregate(&wallet()).await;

        let calls = source.calls();
        let order: Vec<u64> = calls.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![10, 20, 30]);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_go_through_the_queue() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::FailTimes(2, vec![record(1, "A", 1.0)])),
        );
        let agg = aggregator(source.clone(), vec![chain(1, "A", 0)]);

        let portfolio = agg.aggregate(&wallet()).await;

        assert_eq!(status(&portfolio, 1), Some(ChainStatus::Completed));
        assert_eq!(portfolio.chains[0].attempts, 3);
        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        // backoff (100ms, 200ms) is shorter than the queue spacing, so the
        // queue decides the gap
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_partial_portfolio() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(
                    1,
                    ChainScript::Ok(vec![record(1, "Aave", 60.0), record(1, "Lido", 40.0)]),
                )
                .with_chain(137, ChainScript::FailAlways(down())),
        );
        let agg = aggregator(
            source.clone(),
            vec![chain(1, "Ethereum", 0), chain(137, "Polygon", 1)],
        );

        let started = Instant::now();
        let portfolio = agg.aggregate(&wallet()).await;
        assert!(started.elapsed() < Duration::from_secs(60));

        assert_eq!(portfolio.positions.len(), 2);
        assert_eq!(status(&portfolio, 137), Some(ChainStatus::Failed));
        assert_eq!(portfolio.total_value_usd, 100.0);

        let summary = PortfolioMetrics::new().summarize(&portfolio.positions);
        assert_eq!(summary.total_value_usd, BigDecimal::from(100));
    }

    #[tokio::test(start_paused = true)]
    async fn every_chain_failing_is_reported() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::FailAlways(FetchError::Validation("bad".into())))
                .with_chain(2, ChainScript::FailAlways(FetchError::Validation("bad".into()))),
        );
        let agg = aggregator(source.clone(), vec![chain(1, "A", 0), chain(2, "B", 1)]);

        let portfolio = agg.aggregate(&wallet()).await;

        assert!(portfolio.all_failed());
        assert!(portfolio.positions.is_empty());
        // validation failures are not retried
        assert_eq!(source.attempts(1), 1);
        assert_eq!(source.attempts(2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_tracks_settled_chains() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::Ok(vec![]))
                .with_chain(2, ChainScript::Ok(vec![])),
        );
        let agg = Arc::new(aggregator(source, vec![chain(1, "A", 0), chain(2, "B", 1)]));
        assert!(agg.progress(&wallet()).await.is_none());

        let runner = {
            let agg = agg.clone();
            tokio::spawn(async move { agg.aggregate(&wallet()).await })
        };

        // first chain settles immediately, the second waits out the delay
        tokio::time::sleep(Duration::from_millis(500)).await;
        let midway = agg.progress(&wallet()).await.unwrap();
        assert_eq!(midway.total, 2);
        assert_eq!(midway.settled, 1);
        assert!(!midway.finished);
        assert_eq!(midway.chains[0].status, ChainStatus::Completed);
        assert_eq!(midway.chains[1].status, ChainStatus::Pending);

        runner.await.unwrap();
        let done = agg.progress(&wallet()).await.unwrap();
        assert!(done.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_settles_remaining_chains_as_failed() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::Ok(vec![record(1, "A", 5.0)]))
                .with_chain(2, ChainScript::Ok(vec![record(2, "B", 5.0)]))
                .with_chain(3, ChainScript::Ok(vec![record(3, "C", 5.0)])),
        );
        let agg = aggregator(
            source.clone(),
            vec![chain(1, "A", 0), chain(2, "B", 1), chain(3, "C", 2)],
        );
        let cancel = CancellationToken::new();

        let trigger = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            }
        };
        let address = wallet();
        let (portfolio, _) = tokio::join!(agg.aggregate_with_cancel(&address, &cancel), trigger);

        assert_eq!(status(&portfolio, 1), Some(ChainStatus::Completed));
        assert_eq!(status(&portfolio, 2), Some(ChainStatus::Failed));
        assert_eq!(status(&portfolio, 3), Some(ChainStatus::Failed));
        assert_eq!(portfolio.chains[2].error.as_deref(), Some("Cancelled"));
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_run_supersedes_older_one() {
        let source = Arc::new(
            ScriptedSource::new().with_chain(1, ChainScript::Ok(vec![record(1, "A", 1.0)])),
        );
        let agg = aggregator(source, vec![chain(1, "A", 0)]);

        // both runs share one queue, so the second finishes last
        let address = wallet();
        let (first, second) = tokio::join!(agg.aggregate(&address), agg.aggregate(&address));
        assert!(second.sequence > first.sequence);

        let latest = agg.latest(&address).await.unwrap();
        assert_eq!(latest.run_id, second.run_id);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_run_finishing_late_does_not_replace_newer() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_chain(1, ChainScript::Ok(vec![record(1, "A", 1.0)]))
                .with_chain(2, ChainScript::Ok(vec![record(2, "B", 1.0)])),
        );
        let agg = aggregator(source, vec![chain(1, "A", 0), chain(2, "B", 1)]);

        let address = wallet();
        let older = agg.aggregate(&address);
        let newer = async {
            // starts after the older run, but cancels early so it finishes first
            tokio::time::sleep(Duration::from_millis(10)).await;
            let cancel = CancellationToken::new();
            cancel.cancel();
            agg.aggregate_with_cancel(&address, &cancel).await
        };
        let (older, newer) = tokio::join!(older, newer);
        assert!(older.completed_at >= newer.completed_at);

        let latest = agg.latest(&address).await.unwrap();
        assert_eq!(latest.run_id, newer.run_id);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_are_kept_per_address() {
        let source = Arc::new(
            ScriptedSource::new().with_chain(1, ChainScript::Ok(vec![record(1, "A", 1.0)])),
        );
        let agg = aggregator(source, vec![chain(1, "A", 0)]);
        let first = wallet();
        let second = WalletAddress::parse("0x2222222222222222222222222222222222222222").unwrap();

        let first_run = agg.aggregate(&first).await;
        let second_run = agg.aggregate(&second).await;

        assert_eq!(agg.latest(&first).await.unwrap().run_id, first_run.run_id);
        assert_eq!(agg.latest(&second).await.unwrap().run_id, second_run.run_id);
        assert_eq!(agg.progress(&first).await.unwrap().run_id, first_run.run_id);
        assert!(agg.progress(&first).await.unwrap().finished);
    }
}
