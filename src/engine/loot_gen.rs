use crate::rng::Rng;

/// Decides how many loot items appear on a session during a tick. The
/// output is bounded by the looter/loot shortage and grows with the time
/// accumulated since the last spawn, so short ticks and one long tick
/// produce comparable totals.
#[derive(Clone, Debug)]
pub struct LootGenerator {
    period_ms: u64,
    probability: f64,
    time_without_loot_ms: u64,
}

impl LootGenerator {
    pub fn new(period_ms: u64, probability: f64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            probability: probability.clamp(0.0, 1.0),
            time_without_loot_ms: 0,
        }
    }

    pub fn generate(
        &mut self,
        delta_ms: u64,
        loot_count: u32,
        looter_count: u32,
        rng: &mut Rng,
    ) -> u32 {
        self.time_without_loot_ms = self.time_without_loot_ms.saturating_add(delta_ms);

        let shortage = looter_count.saturating_sub(loot_count);
        if shortage == 0 {
            return 0;
        }

        let ratio = self.time_without_loot_ms as f64 / self.period_ms as f64;
        let probability = (1.0 - (1.0 - self.probability).powf(ratio)).clamp(0.0, 1.0);
        let generated = ((shortage as f64) * probability * rng.next_f64()).round() as u32;
        let generated = generated.min(shortage);

        if generated > 0 {
            self.time_without_loot_ms = 0;
        }
        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_never_exceeds_shortage() {
        let mut generator = LootGenerator::new(1_000, 1.0);
        let mut rng = Rng::new(1);
        for _ in 0..500 {
            let n = generator.generate(5_000, 2, 5, &mut rng);
            assert!(n <= 3);
        }
    }

    #[test]
    fn no_shortage_means_no_loot() {
        let mut generator = LootGenerator::new(1_000, 1.0);
        let mut rng = Rng::new(2);
        assert_eq!(generator.generate(10_000, 5, 5, &mut rng), 0);
        assert_eq!(generator.generate(10_000, 7, 5, &mut rng), 0);
        assert_eq!(generator.generate(10_000, 1, 0, &mut rng), 0);
    }

    #[test]
    fn zero_probability_never_spawns() {
        let mut generator = LootGenerator::new(1_000, 0.0);
        let mut rng = Rng::new(3);
        for _ in 0..100 {
            assert_eq!(generator.generate(60_000, 0, 10, &mut rng), 0);
        }
    }

    #[test]
    fn deterministic_for_a_fixed_seed() {
        let run = |seed: u64| {
            let mut generator = LootGenerator::new(5_000, 0.5);
            let mut rng = Rng::new(seed);
            (0..50)
                .map(|_| generator.generate(1_000, 0, 4, &mut rng))
                .collect::<Vec<u32>>()
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn accumulated_time_raises_the_spawn_chance() {
        // With probability 1 the spawn probability saturates once any time
        // has accumulated, so a long starving stretch must produce loot.
        let mut generator = LootGenerator::new(1_000, 1.0);
        let mut rng = Rng::new(7);
        let mut total = 0;
        for _ in 0..200 {
            total += generator.generate(1_000, 0, 4, &mut rng);
        }
        assert!(total > 0);
    }

    #[test]
    fn accumulator_resets_after_a_spawn() {
        let mut generator = LootGenerator::new(1_000, 1.0);
        let mut rng = Rng::new(9);
        let mut spawned = false;
        for _ in 0..100 {
            if generator.generate(10_000, 0, 10, &mut rng) > 0 {
                spawned = true;
                break;
            }
        }
        assert!(spawned);
        assert_eq!(generator.time_without_loot_ms, 0);
    }
}
