//! Load-balance strategies
//!
//! Both strategies are reorderings of the pool sequence: round-robin rotates
//! it left by one, weighted replaces it with a weighted random permutation.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

use crate::instance::Instance;

/// Weight assumed for instances with no explicit (or zero) weight
pub const DEFAULT_WEIGHT: u32 = 1;

/// Rotate a sequence left by `count` positions, returning a new sequence.
///
/// The input is never mutated.
pub fn rotate<T: Clone>(sequence: &[T], count: usize) -> Vec<T> {
    if sequence.is_empty() {
        return Vec::new();
    }
    let split = count % sequence.len();
    let mut rotated = Vec::with_capacity(sequence.len());
    rotated.extend_from_slice(&sequence[split..]);
    rotated.extend_from_slice(&sequence[..split]);
    rotated
}

/// Selection weight of an instance under the weighted strategy
pub fn effective_weight(instance: &Instance) -> u32 {
    match instance.definition.weight {
        Some(weight) if weight > 0 => weight,
        _ => DEFAULT_WEIGHT,
    }
}

/// Cached weighted-selection index for one pool membership.
///
/// The entries are valid only for the member set they were built from; the
/// pool drops the cache on every add/remove and rebuilds it lazily on the
/// next weighted selection.
pub struct WeightedSelection {
    entries: Vec<(Arc<Instance>, u32)>,
}

impl WeightedSelection {
    /// Build the index for the current membership
    pub fn build(instances: &[Arc<Instance>]) -> Self {
        let entries = instances
            .iter()
            .map(|instance| (instance.clone(), effective_weight(instance)))
            .collect();
        Self { entries }
    }

    /// Draw a full permutation by weighted random sampling without
    /// replacement
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Vec<Arc<Instance>> {
        let mut remaining = self.entries.clone();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let weights: Vec<u32> = remaining.iter().map(|(_, weight)| *weight).collect();
            let index = WeightedIndex::new(&weights)
                .expect("weights are clamped to at least 1")
                .sample(rng);
            order.push(remaining.remove(index).0);
        }

        debug!(
            instances = order.len(),
            first = %order.first().map(|i| i.sort_key()).unwrap_or_default(),
            "Weighted permutation drawn"
        );
        order
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use torlet_core::{InstanceDefinition, TorrcMap};
    use torlet_runtime::{InstanceLauncher, MockLauncher};
    use uuid::Uuid;

    async fn make_instance(name: &str, weight: Option<u32>) -> Arc<Instance> {
        let launcher = MockLauncher::new();
        let mut definition = InstanceDefinition::named(name);
        definition.weight = weight;
        let handle = launcher
            .launch(Uuid::new_v4(), &definition, &TorrcMap::new())
            .await
            .unwrap();
        Arc::new(Instance::new(Uuid::new_v4(), definition, TorrcMap::new(), handle))
    }

    #[test]
    fn test_rotate_by_one() {
        let sequence = vec!["a", "b", "c"];
        assert_eq!(rotate(&sequence, 1), vec!["b", "c", "a"]);
        assert_eq!(sequence, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rotate_wraps_and_handles_empty() {
        let sequence = vec![1, 2, 3];
        assert_eq!(rotate(&sequence, 3), vec![1, 2, 3]);
        assert_eq!(rotate(&sequence, 4), vec![2, 3, 1]);
        assert!(rotate(&Vec::<i32>::new(), 7).is_empty());
    }

    #[tokio::test]
    async fn test_effective_weight_defaults() {
        let unweighted = make_instance("a", None).await;
        let zero = make_instance("b", Some(0)).await;
        let heavy = make_instance("c", Some(42)).await;

        assert_eq!(effective_weight(&unweighted), DEFAULT_WEIGHT);
        assert_eq!(effective_weight(&zero), DEFAULT_WEIGHT);
        assert_eq!(effective_weight(&heavy), 42);
    }

    #[tokio::test]
    async fn test_draw_is_a_permutation() {
        let instances = vec![
            make_instance("a", Some(3)).await,
            make_instance("b", None).await,
            make_instance("c", Some(7)).await,
        ];
        let selection = WeightedSelection::build(&instances);
        let mut rng = StdRng::seed_from_u64(7);

        let order = selection.draw(&mut rng);
        assert_eq!(order.len(), 3);
        let mut names: Vec<String> = order.iter().map(|i| i.sort_key()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_draw_favors_heavy_weights() {
        let heavy = make_instance("heavy", Some(100)).await;
        let light = make_instance("light", Some(1)).await;
        let selection = WeightedSelection::build(&[heavy, light]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut heavy_first = 0;
        for _ in 0..300 {
            if selection.draw(&mut rng)[0].sort_key() == "heavy" {
                heavy_first += 1;
            }
        }
        // Expected ratio is 100:1; anything above parity proves the bias
        assert!(heavy_first > 250, "heavy drawn first only {heavy_first}/300 times");
    }
}
