//! Property tests for cache-key stability.

use proptest::prelude::*;

use quarry_embeddings::cache::CacheKey;

proptest! {
    /// The key is a pure function of its components.
    #[test]
    fn deterministic(
        text_hash in "[a-f0-9]{8,64}",
        provider in "[a-z-]{1,20}",
        model in "[a-z0-9-]{1,30}",
        dims in prop_oneof![Just(256usize), Just(384), Just(1536)],
        fp in "[a-f0-9]{8,64}",
    ) {
        let a = CacheKey::compute(&text_hash, &provider, &model, dims, &fp, None);
        let b = CacheKey::compute(&text_hash, &provider, &model, dims, &fp, None);
        prop_assert_eq!(a.as_str(), b.as_str());
    }

    /// Different identity tuples never collide on the components we vary.
    #[test]
    fn distinct_components_distinct_keys(
        text_hash in "[a-f0-9]{16}",
        provider in "[a-z]{4,12}",
        model in "[a-z]{4,12}",
        fp in "[a-f0-9]{16}",
    ) {
        let base = CacheKey::compute(&text_hash, &provider, &model, 384, &fp, None);
        let other_dims = CacheKey::compute(&text_hash, &provider, &model, 768, &fp, None);
        prop_assert_ne!(base.as_str(), other_dims.as_str());

        let salted = CacheKey::compute(&text_hash, &provider, &model, 384, &fp, Some("deploy-2"));
        prop_assert_ne!(base.as_str(), salted.as_str());
    }

    /// Swapping the values of two fields changes the key: the canonical
    /// form keeps fields in named positions, not construction order.
    #[test]
    fn field_values_are_not_interchangeable(
        a in "[a-z]{6}",
        b in "[a-z]{6}",
    ) {
        prop_assume!(a != b);
        let forward = CacheKey::compute("h", &a, &b, 384, "fp", None);
        let swapped = CacheKey::compute("h", &b, &a, 384, "fp", None);
        prop_assert_ne!(forward.as_str(), swapped.as_str());
    }
}
