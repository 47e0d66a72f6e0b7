pub mod init;
pub mod ops;

use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use types::SolveStatus;

use timetable_core::{
    validate, CatalogIndex, Chromosome, EvalContext, Evaluator, OptimizeReport, SolveRequest,
    Solver,
};

use crate::ops::score_of;

/// The canonical evolutionary engine: one parameterized loop instead of a
/// fork per constraint variant.
pub struct GaSolver;

impl GaSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GaSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for GaSolver {
    fn solve(&self, req: &SolveRequest<'_>) -> anyhow::Result<OptimizeReport> {
        req.params
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid solve params: {e}"))?;
        validate(req.scope, req.catalog, req.config)?;

        let index = CatalogIndex::new(req.catalog, req.config);
        let ctx = EvalContext::new(&index, req.ledger, req.scope);
        let evaluator = Evaluator::from_config(req.config);
        let mut rng = ChaCha8Rng::seed_from_u64(req.params.seed);
        let params = req.params;

        let mut population: Vec<Chromosome> = Vec::with_capacity(params.population_size);
        if let Some(warm) = req.warm_start.clone() {
            population.push(warm);
        }
        while population.len() < params.population_size {
            population.push(init::construct_chromosome(
                req.scope, &index, params, &mut rng,
            ));
        }
        for chromosome in &mut population {
            chromosome.evaluate(&evaluator, &ctx);
        }
        population.sort_by_key(|c| std::cmp::Reverse(score_of(c)));

        let deadline = params
            .time_limit_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut best_history: Vec<i64> = Vec::new();
        let mut generation: u32 = 0;

        let status = loop {
            let best = score_of(&population[0]);
            best_history.push(best);

            if best >= params.acceptance_threshold {
                break SolveStatus::Converged;
            }
            if generation >= params.max_generations {
                break SolveStatus::BudgetExhausted;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break SolveStatus::BudgetExhausted;
                }
            }

            let mut next: Vec<Chromosome> = population
                .iter()
                .take(params.elite_count)
                .cloned()
                .collect();
            while next.len() < params.population_size {
                let p1 = ops::tournament(&population, params.tournament_size, &mut rng).clone();
                let p2 = ops::tournament(&population, params.tournament_size, &mut rng).clone();
                let (mut c1, mut c2) = ops::crossover(&p1, &p2, &mut rng);
                if rng.gen_bool(params.mutation_rate) {
                    ops::mutate(&mut c1, &index, &mut rng);
                }
                if rng.gen_bool(params.mutation_rate) {
                    ops::mutate(&mut c2, &index, &mut rng);
                }
                c1.evaluate(&evaluator, &ctx);
                next.push(c1);
                if next.len() < params.population_size {
                    c2.evaluate(&evaluator, &ctx);
                    next.push(c2);
                }
            }
            population = next;
            population.sort_by_key(|c| std::cmp::Reverse(score_of(c)));

            generation += 1;
            if generation % 10 == 0 {
                debug!(
                    generation,
                    best = score_of(&population[0]),
                    "generation checkpoint"
                );
            }
        };

        let mut winner = population.swap_remove(0);
        let evaluation = winner.evaluate(&evaluator, &ctx);
        info!(
            partition = %req.scope.id,
            fitness = evaluation.score,
            generation,
            ?status,
            "genetic search finished"
        );

        Ok(OptimizeReport {
            fitness: evaluation.score,
            breakdown: evaluation.breakdown,
            status,
            generations: generation,
            stats: serde_json::json!({
                "method": "ga",
                "population": params.population_size,
                "elites": params.elite_count,
                "best_history": best_history,
            }),
            chromosome: winner,
        })
    }
}
