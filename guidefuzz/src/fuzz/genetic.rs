//! Genetic operators over seeds and typed values.

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};

use super::Seed;
use crate::abi::TypeHandler;
use crate::config::SelectionConfig;

/// Rank-biased pick from an ordered pool (best first). `None` when the pool
/// is empty.
///
/// Range bounds round outwards (`ceil` for ends, `floor` for starts), so
/// neighbouring ranges may share their boundary element.
pub fn selection<'a, T>(
    pool: &'a [T],
    config: &SelectionConfig,
    rng: &mut dyn RngCore,
) -> Option<&'a T> {
    let n = pool.len();
    if n == 0 {
        return None;
    }
    let start = |factor: f64| ((n as f64 * factor).floor() as usize).min(n);
    let end = |factor: f64| ((n as f64 * factor).ceil() as usize).min(n);

    let draw: f64 = rng.random();
    let range = if draw < config.first_limit {
        0..end(config.first_range)
    } else if draw < config.second_limit {
        start(config.first_range)..end(config.second_range)
    } else {
        start(config.second_range)..n
    };

    let slice = pool.get(range).filter(|slice| !slice.is_empty()).unwrap_or(pool);
    slice.choose(rng)
}

/// Recombines two seeds field by field. Seeds of different arity cannot be
/// recombined and yield `None`.
///
/// Within a field, characters are interleaved up to the shorter length: at
/// even positions the first child takes the second parent's character, at odd
/// positions its own. A field where either parent is empty is passed through.
pub fn crossover(first: &[String], second: &[String]) -> Option<(Seed, Seed)> {
    if first.len() != second.len() {
        return None;
    }
    let (children_a, children_b) = first
        .iter()
        .zip(second)
        .map(|(a, b)| {
            let a_chars: Vec<char> = a.chars().collect();
            let b_chars: Vec<char> = b.chars().collect();
            let shortest = a_chars.len().min(b_chars.len());
            if shortest == 0 {
                return (a.clone(), b.clone());
            }
            let mut child_a = String::with_capacity(shortest);
            let mut child_b = String::with_capacity(shortest);
            for j in 0..shortest {
                if j % 2 == 0 {
                    child_a.push(b_chars[j]);
                    child_b.push(a_chars[j]);
                } else {
                    child_a.push(a_chars[j]);
                    child_b.push(b_chars[j]);
                }
            }
            (child_a, child_b)
        })
        .unzip();
    Some((children_a, children_b))
}

/// Applies one random mutator of `handler` with probability `chance`.
/// Returns whether a mutation happened.
pub fn mutation(handler: &mut dyn TypeHandler, chance: f64, rng: &mut dyn RngCore) -> bool {
    if rng.random::<f64>() >= chance {
        return false;
    }
    mutate(handler, rng)
}

/// Applies one random mutator of `handler`.
pub fn mutate(handler: &mut dyn TypeHandler, rng: &mut dyn RngCore) -> bool {
    let mutators = handler.mutators();
    let Some(mutator) = mutators.choose(rng) else {
        return false;
    };
    let mutated = mutator(&handler.value(), rng);
    handler.set_value(mutated);
    true
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::abi::{BasicTypeRegistry, TypeRegistry};
    use crate::constants::MUTATION_CHANCE;

    fn seed(fields: &[&str]) -> Seed {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn selection_of_nothing_is_none() {
        let mut rng = StdRng::seed_from_u64(0);
        let empty: [u32; 0] = [];
        assert_eq!(selection(&empty, &SelectionConfig::default(), &mut rng), None);
    }

    #[test]
    fn selection_favours_the_head_of_the_pool() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool: Vec<usize> = (0..10).collect();
        let config = SelectionConfig::default();
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            let picked = *selection(&pool, &config, &mut rng).unwrap();
            counts[match picked {
                0..=3 => 0,
                4..=6 => 1,
                _ => 2,
            }] += 1;
        }
        // 50% / 30% / 20% with exact cut points for a pool of ten.
        assert!((4_500..5_500).contains(&counts[0]), "{counts:?}");
        assert!((2_500..3_500).contains(&counts[1]), "{counts:?}");
        assert!((1_500..2_500).contains(&counts[2]), "{counts:?}");
    }

    #[test]
    fn selection_of_a_single_seed_always_returns_it() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            assert_eq!(selection(&["only"], &SelectionConfig::default(), &mut rng), Some(&"only"));
        }
    }

    #[test]
    fn crossover_interleaves_characters() {
        let (a, b) = crossover(&seed(&["abcd", "x", ""]), &seed(&["WXYZ", "7", "keep"])).unwrap();
        assert_eq!(a, seed(&["WbYd", "7", ""]));
        assert_eq!(b, seed(&["aXcZ", "x", "keep"]));
    }

    #[test]
    fn crossover_requires_equal_arity() {
        assert_eq!(crossover(&seed(&["1"]), &seed(&["1", "2"])), None);
    }

    #[test]
    fn mutation_fires_about_one_time_in_ten() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut handler = BasicTypeRegistry.handler_for("uint256").unwrap();
        let fired = (0..10_000)
            .filter(|_| mutation(handler.as_mut(), MUTATION_CHANCE, &mut rng))
            .count();
        assert!((800..1_200).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn mutate_always_changes_a_bool() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut handler = BasicTypeRegistry.handler_for("bool").unwrap();
        handler.deserialize("false").unwrap();
        assert!(mutate(handler.as_mut(), &mut rng));
        assert_eq!(handler.serialize(), "true");
    }

    proptest! {
        #[test]
        fn crossover_preserves_arity_and_characters(
            pairs in prop::collection::vec((".{0,12}", ".{0,12}"), 0..6)
        ) {
            let first: Seed = pairs.iter().map(|(a, _)| a.clone()).collect();
            let second: Seed = pairs.iter().map(|(_, b)| b.clone()).collect();
            let (child_a, child_b) = crossover(&first, &second).unwrap();
            prop_assert_eq!(child_a.len(), first.len());
            prop_assert_eq!(child_b.len(), first.len());

            for (i, (a, b)) in first.iter().zip(&second).enumerate() {
                let a: Vec<char> = a.chars().collect();
                let b: Vec<char> = b.chars().collect();
                let shortest = a.len().min(b.len());
                if shortest == 0 {
                    continue;
                }
                for (j, (ca, cb)) in child_a[i].chars().zip(child_b[i].chars()).enumerate() {
                    prop_assert!(ca == a[j] || ca == b[j]);
                    prop_assert!(cb == a[j] || cb == b[j]);
                }
                prop_assert_eq!(child_a[i].chars().count(), shortest);
            }
        }
    }
}
