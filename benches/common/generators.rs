//! Test data generators for benchmarks.

/// Generate `count` distinct, stable provider identities.
pub fn provider_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("provider-{i:04}")).collect()
}
