//! Stable ordering heuristic applied before chaining in composition mode
//! (spec §4.4.2).

use flowforge_core::NodeDescriptor;

const TIER_SOURCE: &[&str] = &["Document", "file", "retriever-source"];
const TIER_MODEL: &[&str] = &["BaseLanguageModel", "BaseChatModel", "Embeddings"];
const TIER_MEMORY: &[&str] = &["BaseMemory"];
const TIER_UTILITY: &[&str] = &["Tool", "Retriever", "VectorStore"];
const TIER_CONSUMER: &[&str] = &["BaseChain", "AgentExecutor", "LLMChain"];

/// Lower sorts first. Tier 1 checks `base_classes[0]` specifically (spec
/// text); the remaining tiers check anywhere in the chain since a node
/// "providing" an interface may expose it as a supertype rather than its
/// concrete class.
fn tier_rank(descriptor: &NodeDescriptor) -> usize {
    if descriptor
        .concrete_type()
        .map(|t| TIER_SOURCE.contains(&t))
        .unwrap_or(false)
    {
        return 0;
    }
    if descriptor.base_classes.iter().any(|c| TIER_MODEL.contains(&c.as_str())) {
        return 1;
    }
    if descriptor.base_classes.iter().any(|c| TIER_MEMORY.contains(&c.as_str())) {
        return 2;
    }
    if descriptor.base_classes.iter().any(|c| TIER_UTILITY.contains(&c.as_str())) {
        return 3;
    }
    if descriptor.base_classes.iter().any(|c| TIER_CONSUMER.contains(&c.as_str())) {
        return 4;
    }
    // Unclassified descriptors fall in after known consumers rather than
    // panicking or being silently dropped from the ordering.
    5
}

/// Orders `items` by `tier_rank(descriptor_fn(item))`, preserving caller
/// order within a tier (spec: "within a tier, preserve caller order").
pub fn stable_order<T>(items: Vec<T>, descriptor_fn: impl Fn(&T) -> &NodeDescriptor) -> Vec<T> {
    let mut indexed: Vec<(usize, T)> = items.into_iter().enumerate().collect();
    indexed.sort_by_key(|(idx, item)| (tier_rank(descriptor_fn(item)), *idx));
    indexed.into_iter().map(|(_, item)| item).collect()
}
