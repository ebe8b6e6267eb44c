//! Parallel candidate search for an operation's site and destination.
//!
//! Pairs every site carrying a trait with its closest markets, orders the
//! pairs by straight-line distance and hands them to a pool of evaluator
//! threads that price each round trip through the routing oracle. The closest
//! pair whose round trip fits in the ship's fuel tank wins.

mod evaluator;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::core::routing::{Location, RoutingOracle, ShipProfile};
use crate::core::{CancelSignal, CoordinationError, CoordinationResult};

/// A site and destination ordered by straight-line distance.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    /// Site symbol.
    pub site: String,
    /// Destination symbol.
    pub destination: String,
    /// Straight-line distance between them.
    pub distance: f64,
}

/// How a pair fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// The round trip fits within fuel capacity.
    Feasible,
    /// The oracle's round trip needs more fuel than the tank holds.
    OverCapacity,
    /// Skipped before routing: even the cheapest direct round trip is too long.
    PreFiltered,
    /// The oracle found no path or failed.
    NoRoute,
}

/// An evaluated pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Site symbol.
    pub site: String,
    /// Destination symbol.
    pub destination: String,
    /// Straight-line distance.
    pub distance: f64,
    /// Evaluation outcome.
    pub status: CandidateStatus,
    /// Round-trip fuel, from the oracle or the pre-filter estimate.
    pub round_trip_fuel: Option<u32>,
    /// Round-trip seconds, when the oracle planned both legs.
    pub round_trip_time: Option<u32>,
}

impl Candidate {
    /// Whether the round trip fits within fuel capacity.
    #[must_use]
    pub fn is_feasible(&self) -> bool {
        self.status == CandidateStatus::Feasible
    }
}

/// Search counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Pairs built.
    pub pairs: u64,
    /// Pairs priced through the oracle.
    pub evaluated: u64,
    /// Pairs rejected by the pre-filter estimate.
    pub prefiltered: u64,
    /// Feasible pairs found.
    pub feasible: u64,
    /// Oracle calls that returned an error.
    pub oracle_failures: u64,
    /// Pairs never evaluated because a closer feasible pair was known or the
    /// search was cancelled.
    pub skipped: u64,
}

/// The winning pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSelection {
    /// Chosen site symbol.
    pub site: String,
    /// Chosen destination symbol.
    pub destination: String,
    /// False when the pair was picked as the least-infeasible fallback.
    pub feasible: bool,
    /// Full evaluation of the chosen pair.
    pub candidate: Candidate,
    /// Counters for the search that produced it.
    pub stats: SearchStats,
}

#[derive(Default)]
pub(crate) struct SearchCounters {
    pub evaluated: AtomicU64,
    pub prefiltered: AtomicU64,
    pub feasible: AtomicU64,
    pub oracle_failures: AtomicU64,
}

impl SearchCounters {
    fn snapshot(&self, pairs: u64, received: u64) -> SearchStats {
        let evaluated = self.evaluated.load(Ordering::Relaxed);
        let prefiltered = self.prefiltered.load(Ordering::Relaxed);
        SearchStats {
            pairs,
            evaluated,
            prefiltered,
            feasible: self.feasible.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            skipped: pairs.saturating_sub(received),
        }
    }
}

/// Shortest feasible distance seen so far, shared by the evaluators.
pub(crate) struct BestDistance(AtomicU64);

impl BestDistance {
    fn new() -> Self {
        Self(AtomicU64::new(f64::INFINITY.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn offer(&self, distance: f64) {
        let mut current = self.0.load(Ordering::Acquire);
        while distance < f64::from_bits(current) {
            match self.0.compare_exchange_weak(
                current,
                distance.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Evaluator pool choosing the best site/destination pair.
pub struct CandidateSearchPool {
    config: SearchConfig,
    oracle: Arc<dyn RoutingOracle>,
}

impl std::fmt::Debug for CandidateSearchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateSearchPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CandidateSearchPool {
    /// Create a pool around a routing oracle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the settings fail validation.
    pub fn new(config: SearchConfig, oracle: Arc<dyn RoutingOracle>) -> CoordinationResult<Self> {
        config.validate().map_err(CoordinationError::InvalidConfig)?;
        Ok(Self { config, oracle })
    }

    /// Pool settings.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Pair each site carrying `target_trait` with its closest markets,
    /// ordered by ascending distance.
    #[must_use]
    pub fn candidate_pairs(&self, target_trait: &str, locations: &[Location]) -> Vec<CandidatePair> {
        let markets: Vec<&Location> = locations.iter().filter(|l| l.is_market).collect();
        let mut pairs = Vec::new();
        for site in locations.iter().filter(|l| l.has_trait(target_trait)) {
            let mut nearest: Vec<CandidatePair> = markets
                .iter()
                .map(|market| CandidatePair {
                    site: site.symbol.clone(),
                    destination: market.symbol.clone(),
                    distance: site.distance_to(market),
                })
                .collect();
            nearest.sort_by(compare_pairs);
            nearest.truncate(self.config.destinations_per_site);
            pairs.extend(nearest);
        }
        pairs.sort_by(compare_pairs);
        pairs
    }

    /// Select the closest feasible site/destination pair.
    ///
    /// Blocks the calling thread while evaluators run; async callers should
    /// use `spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns `NoFeasibleCandidate` when no pair exists, or none is feasible
    /// and the least-infeasible fallback is disabled.
    pub fn select_best_candidate(
        &self,
        target_trait: &str,
        ship: &ShipProfile,
        locations: &[Location],
        cancel: &CancelSignal,
    ) -> CoordinationResult<CandidateSelection> {
        let pairs = self.candidate_pairs(target_trait, locations);
        if pairs.is_empty() {
            return Err(CoordinationError::NoFeasibleCandidate(format!(
                "no site with trait {target_trait} has a reachable market"
            )));
        }

        let pair_count = pairs.len() as u64;
        let counters = SearchCounters::default();
        let best = BestDistance::new();
        let context = evaluator::EvalContext {
            oracle: self.oracle.as_ref(),
            ship,
            locations,
            cancel,
            best: &best,
            counters: &counters,
        };
        let candidates = evaluator::run(&self.config, pairs, &context);
        let stats = counters.snapshot(pair_count, candidates.len() as u64);

        info!(
            target_trait = target_trait,
            pairs = stats.pairs,
            evaluated = stats.evaluated,
            prefiltered = stats.prefiltered,
            feasible = stats.feasible,
            skipped = stats.skipped,
            "candidate search finished"
        );

        if let Some(best) = candidates
            .iter()
            .filter(|c| c.is_feasible())
            .min_by(|a, b| compare_candidates(a, b))
        {
            return Ok(selection(best.clone(), true, stats));
        }

        if cancel.is_cancelled() {
            return Err(CoordinationError::NoFeasibleCandidate(
                "search cancelled before a feasible pair was found".into(),
            ));
        }

        if self.config.allow_infeasible {
            if let Some(fallback) = least_infeasible(&candidates, ship.fuel_capacity) {
                warn!(
                    site = %fallback.site,
                    destination = %fallback.destination,
                    round_trip_fuel = ?fallback.round_trip_fuel,
                    fuel_capacity = ship.fuel_capacity,
                    "no feasible pair; using least-infeasible candidate"
                );
                return Ok(selection(fallback.clone(), false, stats));
            }
        }

        let count = |status: CandidateStatus| candidates.iter().filter(|c| c.status == status).count();
        Err(CoordinationError::NoFeasibleCandidate(format!(
            "no pair for trait {target_trait} fits fuel capacity {}: {} over capacity, {} pre-filtered, \
             {} without route ({} oracle failures), {} not evaluated",
            ship.fuel_capacity,
            count(CandidateStatus::OverCapacity),
            count(CandidateStatus::PreFiltered),
            count(CandidateStatus::NoRoute),
            stats.oracle_failures,
            stats.skipped,
        )))
    }
}

fn selection(candidate: Candidate, feasible: bool, stats: SearchStats) -> CandidateSelection {
    CandidateSelection {
        site: candidate.site.clone(),
        destination: candidate.destination.clone(),
        feasible,
        candidate,
        stats,
    }
}

/// Smallest fuel overshoot, then closest; pairs with no fuel figure at all
/// only win when nothing else was priced.
fn least_infeasible(candidates: &[Candidate], capacity: u32) -> Option<&Candidate> {
    let priced = candidates
        .iter()
        .filter_map(|c| c.round_trip_fuel.map(|fuel| (fuel.saturating_sub(capacity), c)))
        .min_by(|(a_over, a), (b_over, b)| a_over.cmp(b_over).then_with(|| compare_candidates(a, b)))
        .map(|(_, c)| c);
    priced.or_else(|| candidates.iter().min_by(|a, b| compare_candidates(a, b)))
}

fn compare_pairs(a: &CandidatePair, b: &CandidatePair) -> CmpOrdering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.site.cmp(&b.site))
        .then_with(|| a.destination.cmp(&b.destination))
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> CmpOrdering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.site.cmp(&b.site))
        .then_with(|| a.destination.cmp(&b.destination))
}
