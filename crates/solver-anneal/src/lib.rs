//! Warm-start local-search refiners: simulated annealing and tabu search.
//!
//! Both take the best-known chromosome from a previous stage and walk the
//! same legality-filtered single-gene neighborhood the genetic operators use.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Context;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use types::SolveStatus;

use timetable_core::placement::{apply_random_move, Move};
use timetable_core::{
    validate, CatalogIndex, Chromosome, EvalContext, Evaluator, OptimizeReport, SolveRequest,
    Solver,
};

#[derive(Clone, Copy, Debug)]
pub struct AnnealParams {
    pub initial_temp: f64,
    pub cooling: f64,
    pub iterations: u32,
}

impl Default for AnnealParams {
    fn default() -> Self {
        Self {
            initial_temp: 60.0,
            cooling: 0.995,
            iterations: 2_000,
        }
    }
}

pub struct SaSolver {
    pub params: AnnealParams,
}

impl SaSolver {
    pub fn new() -> Self {
        Self {
            params: AnnealParams::default(),
        }
    }
}

impl Default for SaSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for SaSolver {
    fn solve(&self, req: &SolveRequest<'_>) -> anyhow::Result<OptimizeReport> {
        validate(req.scope, req.catalog, req.config)?;
        let warm = req
            .warm_start
            .clone()
            .context("simulated annealing requires a warm start")?;

        let index = CatalogIndex::new(req.catalog, req.config);
        let ctx = EvalContext::new(&index, req.ledger, req.scope);
        let evaluator = Evaluator::from_config(req.config);
        let mut rng = ChaCha8Rng::seed_from_u64(req.params.seed ^ 0x5EED_5A5A);

        let mut current = warm;
        let mut current_score = current.fitness(&evaluator, &ctx);
        let mut best = current.clone();
        let mut best_score = current_score;

        let deadline = req
            .params
            .time_limit_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut temp = self.params.initial_temp;
        let mut iterations = 0u32;
        let mut status = SolveStatus::BudgetExhausted;

        for iter in 0..self.params.iterations {
            iterations = iter;
            if best_score >= req.params.acceptance_threshold {
                status = SolveStatus::Converged;
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }

            let mut candidate = current.clone();
            if apply_random_move(&mut candidate, &index, &mut rng).is_none() {
                continue;
            }
            let candidate_score = candidate.fitness(&evaluator, &ctx);
            let delta = candidate_score - current_score;
            let accept = delta >= 0 || {
                let p = (delta as f64 / temp.max(f64::MIN_POSITIVE)).exp();
                rng.gen_bool(p.clamp(0.0, 1.0))
            };
            if accept {
                current = candidate;
                current_score = candidate_score;
                if current_score > best_score {
                    best = current.clone();
                    best_score = current_score;
                    debug!(iter, best = best_score, "annealing improved best");
                }
            }
            temp *= self.params.cooling;
        }

        if best_score >= req.params.acceptance_threshold {
            status = SolveStatus::Converged;
        }
        let evaluation = best.evaluate(&evaluator, &ctx);
        info!(
            partition = %req.scope.id,
            fitness = evaluation.score,
            iterations,
            ?status,
            "annealing finished"
        );
        Ok(OptimizeReport {
            fitness: evaluation.score,
            breakdown: evaluation.breakdown,
            status,
            generations: iterations,
            stats: serde_json::json!({
                "method": "sa",
                "initial_temp": self.params.initial_temp,
                "cooling": self.params.cooling,
            }),
            chromosome: best,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TabuParams {
    pub tenure: usize,
    pub iterations: u32,
    pub neighbors: usize,
}

impl Default for TabuParams {
    fn default() -> Self {
        Self {
            tenure: 24,
            iterations: 400,
            neighbors: 12,
        }
    }
}

pub struct TabuSolver {
    pub params: TabuParams,
}

impl TabuSolver {
    pub fn new() -> Self {
        Self {
            params: TabuParams::default(),
        }
    }
}

impl Default for TabuSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for TabuSolver {
    fn solve(&self, req: &SolveRequest<'_>) -> anyhow::Result<OptimizeReport> {
        validate(req.scope, req.catalog, req.config)?;
        let warm = req
            .warm_start
            .clone()
            .context("tabu search requires a warm start")?;

        let index = CatalogIndex::new(req.catalog, req.config);
        let ctx = EvalContext::new(&index, req.ledger, req.scope);
        let evaluator = Evaluator::from_config(req.config);
        let mut rng = ChaCha8Rng::seed_from_u64(req.params.seed ^ 0x7AB0_7AB0);

        let mut current = warm;
        let mut current_score = current.fitness(&evaluator, &ctx);
        let mut best = current.clone();
        let mut best_score = current_score;
        let mut tabu: VecDeque<Move> = VecDeque::with_capacity(self.params.tenure + 1);

        let deadline = req
            .params
            .time_limit_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut iterations = 0u32;
        let mut status = SolveStatus::BudgetExhausted;

        for iter in 0..self.params.iterations {
            iterations = iter;
            if best_score >= req.params.acceptance_threshold {
                status = SolveStatus::Converged;
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }

            // sample the neighborhood, keep the best admissible neighbor
            let mut chosen: Option<(Chromosome, i64, Move)> = None;
            for _ in 0..self.params.neighbors {
                let mut candidate = current.clone();
                let Some(mv) = apply_random_move(&mut candidate, &index, &mut rng) else {
                    continue;
                };
                let score = candidate.fitness(&evaluator, &ctx);
                let aspiration = score > best_score;
                if tabu.contains(&mv) && !aspiration {
                    continue;
                }
                if chosen.as_ref().map(|(_, s, _)| score > *s).unwrap_or(true) {
                    chosen = Some((candidate, score, mv));
                }
            }
            let Some((next, next_score, mv)) = chosen else {
                continue;
            };

            current = next;
            current_score = next_score;
            tabu.push_back(mv);
            if tabu.len() > self.params.tenure {
                tabu.pop_front();
            }
            if current_score > best_score {
                best = current.clone();
                best_score = current_score;
                debug!(iter, best = best_score, "tabu improved best");
            }
        }

        if best_score >= req.params.acceptance_threshold {
            status = SolveStatus::Converged;
        }
        let evaluation = best.evaluate(&evaluator, &ctx);
        info!(
            partition = %req.scope.id,
            fitness = evaluation.score,
            iterations,
            ?status,
            "tabu search finished"
        );
        Ok(OptimizeReport {
            fitness: evaluation.score,
            breakdown: evaluation.breakdown,
            status,
            generations: iterations,
            stats: serde_json::json!({
                "method": "tabu",
                "tenure": self.params.tenure,
                "neighbors": self.params.neighbors,
            }),
            chromosome: best,
        })
    }
}
