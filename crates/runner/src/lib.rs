//! Optimization driver: sequences algorithms per partition and coordinates
//! partitions against the shared allocation ledger.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use solver_anneal::{SaSolver, TabuSolver};
use solver_ga::GaSolver;
use timetable_core::{
    Catalog, Chromosome, ConflictEntry, EngineConfig, GlobalAllocationLedger, OptimizeReport,
    PartitionId, PartitionScope, SolveParams, SolveRequest, Solver,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ga,
    Anneal,
    Tabu,
}

/// Problem-size profile for one partition: the product of subjects, usable
/// slots, and rooms approximates the search-space breadth.
pub fn problem_profile(scope: &PartitionScope, catalog: &Catalog, config: &EngineConfig) -> usize {
    let index = timetable_core::CatalogIndex::new(catalog, config);
    let subjects = index.subjects_in(&scope.divisions).len();
    subjects * index.teachable_slots().len() * catalog.rooms.len().max(1)
}

/// Small problems get the genetic stage alone; larger ones chain annealing
/// and tabu refinement behind it, each warm-started from the previous best.
pub fn plan_stages(profile: usize) -> Vec<Stage> {
    const LARGE_PROBLEM: usize = 4_000;
    if profile > LARGE_PROBLEM {
        vec![Stage::Ga, Stage::Anneal, Stage::Tabu]
    } else {
        vec![Stage::Ga]
    }
}

/// Optimizes one partition against a ledger snapshot and returns the best
/// chromosome with its fitness and violation breakdown.
pub fn optimize(
    scope: &PartitionScope,
    catalog: &Catalog,
    config: &EngineConfig,
    ledger: &GlobalAllocationLedger,
    params: &SolveParams,
) -> anyhow::Result<OptimizeReport> {
    let profile = problem_profile(scope, catalog, config);
    let stages = plan_stages(profile);
    info!(partition = %scope.id, profile, ?stages, "optimizing partition");

    let mut stage_stats: Vec<serde_json::Value> = Vec::new();
    let mut report: Option<OptimizeReport> = None;

    for stage in stages {
        let warm_start = report.as_ref().map(|r| r.chromosome.clone());
        let req = SolveRequest {
            scope,
            catalog,
            config,
            ledger,
            params,
            warm_start,
        };
        let next = match stage {
            Stage::Ga => GaSolver::new().solve(&req)?,
            Stage::Anneal => SaSolver::new().solve(&req)?,
            Stage::Tabu => TabuSolver::new().solve(&req)?,
        };
        stage_stats.push(serde_json::json!({
            "stage": format!("{stage:?}").to_lowercase(),
            "fitness": next.fitness,
            "status": next.status,
            "generations": next.generations,
        }));
        let done = next.fitness == 0;
        report = Some(next);
        if done {
            break;
        }
    }

    let mut report = report.expect("at least one stage always runs");
    report.stats = serde_json::json!({
        "profile": profile,
        "stages": stage_stats,
    });
    Ok(report)
}

/// Commits a partition's winning chromosome to the ledger. The caller holds
/// whatever lock guards the ledger; this is the only mutation point.
pub fn commit(
    partition: &PartitionId,
    chromosome: &Chromosome,
    ledger: &mut GlobalAllocationLedger,
) {
    ledger.commit(partition, chromosome.genes());
}

pub fn conflicts_report(ledger: &GlobalAllocationLedger) -> Vec<ConflictEntry> {
    ledger.conflicts_report()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionOutcome {
    pub partition: PartitionId,
    pub report: OptimizeReport,
}

/// Runs every partition on its own worker thread. Each worker evaluates
/// against the ledger snapshot taken at its start and takes the write lock
/// only for the commit append, so evaluation never blocks other partitions.
/// Conflicts introduced by concurrent commits surface in `conflicts_report`.
pub fn solve_all(
    scopes: &[PartitionScope],
    catalog: &Catalog,
    config: &EngineConfig,
    params: &SolveParams,
    ledger: &RwLock<GlobalAllocationLedger>,
) -> anyhow::Result<Vec<PartitionOutcome>> {
    std::thread::scope(|s| {
        let handles: Vec<_> = scopes
            .iter()
            .enumerate()
            .map(|(i, scope)| {
                s.spawn(move || -> anyhow::Result<PartitionOutcome> {
                    let mut params = params.clone();
                    params.seed ^= (i as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                    let snapshot = ledger.read().clone();
                    let report = optimize(scope, catalog, config, &snapshot, &params)?;
                    commit(&scope.id, &report.chromosome, &mut ledger.write());
                    Ok(PartitionOutcome {
                        partition: scope.id.clone(),
                        report,
                    })
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("partition worker panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_profiles_run_ga_alone() {
        assert_eq!(plan_stages(100), vec![Stage::Ga]);
    }

    #[test]
    fn large_profiles_chain_refiners() {
        assert_eq!(
            plan_stages(50_000),
            vec![Stage::Ga, Stage::Anneal, Stage::Tabu]
        );
    }
}
