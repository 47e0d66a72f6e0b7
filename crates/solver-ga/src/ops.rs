use rand::Rng;

use timetable_core::placement::apply_random_move;
use timetable_core::{CatalogIndex, Chromosome};

/// Cached score, treating never-evaluated chromosomes as worst.
pub fn score_of(chromosome: &Chromosome) -> i64 {
    chromosome.cached().map(|e| e.score).unwrap_or(i64::MIN)
}

/// Tournament selection: best cached fitness among `k` random picks.
pub fn tournament<'a, R: Rng>(
    population: &'a [Chromosome],
    k: usize,
    rng: &mut R,
) -> &'a Chromosome {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..k {
        let candidate = &population[rng.gen_range(0..population.len())];
        if score_of(candidate) > score_of(best) {
            best = candidate;
        }
    }
    best
}

/// Subject-grouped crossover is preferred because it keeps lab pairs and
/// project blocks intact; a single-point cut adds occasional disruption.
pub fn crossover<R: Rng>(
    a: &Chromosome,
    b: &Chromosome,
    rng: &mut R,
) -> (Chromosome, Chromosome) {
    if rng.gen_bool(0.8) {
        a.subject_grouped_crossover(b, rng)
    } else {
        a.single_point_crossover(b, rng)
    }
}

pub fn mutate<R: Rng>(chromosome: &mut Chromosome, index: &CatalogIndex<'_>, rng: &mut R) {
    apply_random_move(chromosome, index, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use types::{Gene, PartitionId, RoomId, SlotId, SubjectId, TeacherId};

    fn chromosome_with_score(_score_hint: u64) -> Chromosome {
        Chromosome::new(
            PartitionId("p1".into()),
            vec![Gene {
                subject: SubjectId("s1".into()),
                teacher: Some(TeacherId("t1".into())),
                room: RoomId("r1".into()),
                slot: SlotId("mon.0".into()),
                batch: None,
            }],
        )
    }

    #[test]
    fn tournament_never_picks_outside_the_population() {
        let population: Vec<Chromosome> =
            (0..5u64).map(chromosome_with_score).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..50 {
            let picked = tournament(&population, 3, &mut rng);
            assert!(population
                .iter()
                .any(|c| std::ptr::eq(c, picked)));
        }
    }

    #[test]
    fn crossover_children_have_no_cached_fitness() {
        let a = chromosome_with_score(0);
        let b = chromosome_with_score(1);
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let (c1, c2) = crossover(&a, &b, &mut rng);
        assert!(c1.cached().is_none());
        assert!(c2.cached().is_none());
    }
}
