//! Pluggable naming strategies for generated resource and operation ids.
//!
//! Components that mint ids take a `NameGenerator` instead of reaching for
//! ambient randomness, so tests can swap in deterministic names.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces unique ids with a caller-supplied prefix.
pub trait NameGenerator: Send + Sync {
    fn next_name(&self, prefix: &str) -> String;
}

/// Random suffixes: `{prefix}{16 hex chars}`.
#[derive(Debug, Default)]
pub struct RandomNames {
    fallback: AtomicU64,
}

impl RandomNames {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for RandomNames {
    fn next_name(&self, prefix: &str) -> String {
        let mut buf = [0u8; 8];
        if getrandom::getrandom(&mut buf).is_err() {
            // Entropy source unavailable; a counter still keeps names unique.
            let n = self.fallback.fetch_add(1, Ordering::Relaxed);
            buf = n.to_be_bytes();
        }
        format!("{prefix}{}", hex::encode(buf))
    }
}

/// Monotonic suffixes: `{prefix}1`, `{prefix}2`, ...
#[derive(Debug, Default)]
pub struct SequentialNames {
    next: AtomicU64,
}

impl SequentialNames {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for SequentialNames {
    fn next_name(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_names_count_up() {
        let names = SequentialNames::new();
        assert_eq!(names.next_name("op-"), "op-1");
        assert_eq!(names.next_name("op-"), "op-2");
    }

    #[test]
    fn random_names_keep_prefix_and_differ() {
        let names = RandomNames::new();
        let a = names.next_name("test-instance-");
        let b = names.next_name("test-instance-");
        assert!(a.starts_with("test-instance-"));
        assert_eq!(a.len(), "test-instance-".len() + 16);
        assert_ne!(a, b);
    }
}
