//! Space-delimited scope sets

use std::collections::BTreeSet;

/// Splits a scope string on whitespace. Order and duplicates are irrelevant.
pub fn tokens(scopes: &str) -> BTreeSet<&str> {
    scopes.split_whitespace().collect()
}

/// Scopes in `requested` that are not part of `allowed`, in the order they were requested
pub fn missing(requested: &str, allowed: &str) -> Vec<String> {
    let allowed = tokens(allowed);
    let mut seen = BTreeSet::new();
    requested
        .split_whitespace()
        .filter(|scope| !allowed.contains(scope) && seen.insert(*scope))
        .map(str::to_string)
        .collect()
}
