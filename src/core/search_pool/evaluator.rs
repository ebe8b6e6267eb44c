//! Evaluator threads for the candidate search.
//!
//! Pairs are queued closest first on a crossbeam channel. Evaluators block on
//! `recv` and exit when the queue drains, the search is cancelled, or the next
//! pair is farther than a feasible pair already found.

use std::sync::atomic::Ordering;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::config::SearchConfig;
use crate::core::routing::{Location, RoutePlan, RouteRequest, RoutingOracle, ShipProfile};
use crate::core::CancelSignal;

use super::{BestDistance, Candidate, CandidatePair, CandidateStatus, SearchCounters};

/// Shared, read-only state borrowed by every evaluator.
pub(super) struct EvalContext<'a> {
    pub oracle: &'a dyn RoutingOracle,
    pub ship: &'a ShipProfile,
    pub locations: &'a [Location],
    pub cancel: &'a CancelSignal,
    pub best: &'a BestDistance,
    pub counters: &'a SearchCounters,
}

/// Evaluate `pairs` across `config.worker_count` threads and collect every
/// candidate produced.
pub(super) fn run(config: &SearchConfig, pairs: Vec<CandidatePair>, ctx: &EvalContext<'_>) -> Vec<Candidate> {
    let (job_tx, job_rx) = bounded::<CandidatePair>(pairs.len());
    for pair in pairs {
        if job_tx.send(pair).is_err() {
            break;
        }
    }
    drop(job_tx);

    let worker_count = config.worker_count.min(job_rx.len()).max(1);
    let (result_tx, result_rx) = unbounded::<Candidate>();

    thread::scope(|scope| {
        let mut spawned = 0usize;
        for worker_id in 0..worker_count {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let spawn = thread::Builder::new()
                .name(format!("candidate-eval-{worker_id}"))
                .stack_size(config.thread_stack_size)
                .spawn_scoped(scope, move || worker_loop(worker_id, &jobs, &results, ctx));
            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => error!(worker_id = worker_id, error = %e, "failed to spawn evaluator thread"),
            }
        }

        if spawned == 0 {
            warn!("no evaluator threads available; evaluating on the calling thread");
            worker_loop(0, &job_rx, &result_tx, ctx);
        }
        drop(result_tx);

        result_rx.iter().collect()
    })
}

fn worker_loop(worker_id: usize, jobs: &Receiver<CandidatePair>, results: &Sender<Candidate>, ctx: &EvalContext<'_>) {
    debug!(worker_id = worker_id, "evaluator started");
    while let Ok(pair) = jobs.recv() {
        if ctx.cancel.is_cancelled() {
            debug!(worker_id = worker_id, "search cancelled, evaluator exiting");
            break;
        }
        // The queue is ordered by distance, so nothing left can beat it.
        if pair.distance > ctx.best.get() {
            debug!(worker_id = worker_id, distance = pair.distance, "closer feasible pair known, evaluator exiting");
            break;
        }

        let candidate = evaluate(&pair, ctx);
        if candidate.is_feasible() {
            ctx.best.offer(candidate.distance);
        }
        if results.send(candidate).is_err() {
            break;
        }
    }
    debug!(worker_id = worker_id, "evaluator stopped");
}

/// Price one pair. Both legs are planned from a full tank: the ship leaves
/// the destination market fuelled and must get back to it.
fn evaluate(pair: &CandidatePair, ctx: &EvalContext<'_>) -> Candidate {
    let ship = ctx.ship;
    let estimate = ctx.oracle.cheapest_mode().fuel_cost(pair.distance).saturating_mul(2);
    if estimate > ship.fuel_capacity {
        ctx.counters.prefiltered.fetch_add(1, Ordering::Relaxed);
        return candidate(pair, CandidateStatus::PreFiltered, Some(estimate), None);
    }
    ctx.counters.evaluated.fetch_add(1, Ordering::Relaxed);

    let leg = |start: &str, goal: &str| {
        let request = RouteRequest {
            start,
            goal,
            current_fuel: ship.fuel_capacity,
            fuel_capacity: ship.fuel_capacity,
            speed: ship.speed,
            locations: ctx.locations,
        };
        plan(ctx, &request)
    };

    let Some(outbound) = leg(pair.destination.as_str(), pair.site.as_str()) else {
        return candidate(pair, CandidateStatus::NoRoute, None, None);
    };
    let Some(inbound) = leg(pair.site.as_str(), pair.destination.as_str()) else {
        return candidate(pair, CandidateStatus::NoRoute, None, None);
    };

    let fuel = outbound.total_fuel().saturating_add(inbound.total_fuel());
    let time = outbound.total_time().saturating_add(inbound.total_time());
    let status = if fuel <= ship.fuel_capacity {
        ctx.counters.feasible.fetch_add(1, Ordering::Relaxed);
        CandidateStatus::Feasible
    } else {
        CandidateStatus::OverCapacity
    };
    candidate(pair, status, Some(fuel), Some(time))
}

fn plan(ctx: &EvalContext<'_>, request: &RouteRequest<'_>) -> Option<RoutePlan> {
    match ctx.oracle.plan_route(request) {
        Ok(plan) => plan,
        Err(e) => {
            ctx.counters.oracle_failures.fetch_add(1, Ordering::Relaxed);
            debug!(start = request.start, goal = request.goal, error = %e, "routing oracle failed");
            None
        }
    }
}

fn candidate(pair: &CandidatePair, status: CandidateStatus, fuel: Option<u32>, time: Option<u32>) -> Candidate {
    Candidate {
        site: pair.site.clone(),
        destination: pair.destination.clone(),
        distance: pair.distance,
        status,
        round_trip_fuel: fuel,
        round_trip_time: time,
    }
}
