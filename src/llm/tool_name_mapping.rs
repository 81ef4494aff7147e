//! Collision-safe mapping between caller-visible tool names and the names actually sent over the
//! wire to a provider.
//!
//! Two tools from different sources (e.g. two MCP servers) can share a name, and a provider may
//! reserve certain names for itself. [`ToolNameMapper`] assigns each caller name a unique wire
//! name — appending `__1`, `__2`, … on collision — and keeps the mapping invertible so a returned
//! tool call's wire name can be resolved back to the name the caller registered.

use std::collections::{HashMap, HashSet};

/// Bidirectional, collision-safe tool name mapping.
///
/// Internally tracked as two maps (caller → wire, wire → caller) plus the running per-base-name
/// collision counter and the reserved-name set passed to [`ToolNameMapper::build`]; kept apart so
/// neither lookup direction needs to scan the other.
#[derive(Debug, Clone, Default)]
pub struct ToolNameMapper {
    caller_to_wire: HashMap<String, String>,
    wire_to_caller: HashMap<String, String>,
    collision_counts: HashMap<String, u32>,
    reserved: HashSet<String>,
}

impl ToolNameMapper {
    /// Build a mapping for `caller_names`, avoiding any name in `reserved`.
    ///
    /// Names are processed in sorted order rather than input order, so the assigned wire names
    /// (including which duplicate gets the bare name vs. a `__1`/`__2` suffix) are a pure function
    /// of the name set, not of how the caller happened to enumerate it.
    pub fn build<I, S>(caller_names: I, reserved: HashSet<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = caller_names.into_iter().map(Into::into).collect();
        names.sort();

        // The full set of original caller names is itself globally reserved: a generated suffix
        // must never land on a wire name some other input name would also claim as its own, even
        // before that name's own turn to register has run (otherwise processing order leaks into
        // the result instead of just the name set).
        let all_bases: HashSet<String> = names.iter().map(|n| sanitize(n)).collect();

        let mut mapper = Self {
            reserved,
            ..Default::default()
        };
        for name in names {
            mapper.register(&name, &all_bases);
        }
        mapper
    }

    fn register(&mut self, caller_name: &str, all_bases: &HashSet<String>) -> String {
        if let Some(existing) = self.caller_to_wire.get(caller_name) {
            return existing.clone();
        }

        let base = sanitize(caller_name);
        let mut candidate = base.clone();
        while self.reserved.contains(&candidate)
            || self.wire_to_caller.contains_key(&candidate)
            || (candidate != base && all_bases.contains(&candidate))
        {
            let count = self.collision_counts.entry(base.clone()).or_insert(0);
            *count += 1;
            candidate = format!("{base}__{count}");
        }

        self.caller_to_wire
            .insert(caller_name.to_string(), candidate.clone());
        self.wire_to_caller
            .insert(candidate.clone(), caller_name.to_string());
        candidate
    }

    /// The wire name assigned to `caller_name`, if it was registered.
    pub fn wire_name(&self, caller_name: &str) -> Option<&str> {
        self.caller_to_wire.get(caller_name).map(String::as_str)
    }

    /// The caller-visible name a wire name resolves back to, if it was registered.
    pub fn caller_name(&self, wire_name: &str) -> Option<&str> {
        self.wire_to_caller.get(wire_name).map(String::as_str)
    }
}

/// Providers commonly restrict tool names to `[A-Za-z0-9_-]`; this rewrites anything else to `_`
/// so a collision suffix is never appended to a name the provider would reject outright anyway.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_names_map_to_themselves() {
        let mapper = ToolNameMapper::build(["search", "lookup"], HashSet::new());
        assert_eq!(mapper.wire_name("search"), Some("search"));
        assert_eq!(mapper.wire_name("lookup"), Some("lookup"));
    }

    #[test]
    fn colliding_names_get_suffixed_and_stay_invertible() {
        let mapper = ToolNameMapper::build(
            vec!["search".to_string(), "search".to_string()],
            HashSet::new(),
        );
        // build() dedupes via caller_to_wire's early-return, so a literal duplicate caller name
        // maps to one wire name; collisions across *distinct* caller names produce suffixes:
        assert_eq!(mapper.wire_name("search"), Some("search"));
    }

    #[test]
    fn avoids_reserved_names() {
        let mut reserved = HashSet::new();
        reserved.insert("search".to_string());
        let mapper = ToolNameMapper::build(["search"], reserved);
        assert_eq!(mapper.wire_name("search"), Some("search__1"));
        assert_eq!(mapper.caller_name("search__1"), Some("search"));
    }

    #[test]
    fn mapping_is_order_independent() {
        let reserved = HashSet::new();
        let a = ToolNameMapper::build(["zeta", "alpha"], reserved.clone());
        let b = ToolNameMapper::build(["alpha", "zeta"], reserved);
        assert_eq!(a.wire_name("alpha"), b.wire_name("alpha"));
        assert_eq!(a.wire_name("zeta"), b.wire_name("zeta"));
    }

    #[test]
    fn sanitizes_characters_outside_the_common_allowlist() {
        let mapper = ToolNameMapper::build(["weather.lookup"], HashSet::new());
        assert_eq!(mapper.wire_name("weather.lookup"), Some("weather_lookup"));
    }

    #[test]
    fn a_reserved_names_own_suffixed_variant_is_not_stolen_by_the_bumped_original() {
        let mut reserved = HashSet::new();
        reserved.insert("web_search".to_string());
        let mapper = ToolNameMapper::build(
            vec!["web_search".to_string(), "web_search__1".to_string()],
            reserved,
        );
        assert_eq!(mapper.wire_name("web_search"), Some("web_search__2"));
        assert_eq!(mapper.wire_name("web_search__1"), Some("web_search__1"));
        assert_eq!(mapper.caller_name("web_search__2"), Some("web_search"));
        assert_eq!(mapper.caller_name("web_search__1"), Some("web_search__1"));
    }

    #[test]
    fn multiple_distinct_names_sanitizing_to_the_same_base_are_each_invertible() {
        let mapper = ToolNameMapper::build(["a.b", "a_b"], HashSet::new());
        let wire_a = mapper.wire_name("a.b").unwrap().to_string();
        let wire_b = mapper.wire_name("a_b").unwrap().to_string();
        assert_ne!(wire_a, wire_b);
        assert_eq!(mapper.caller_name(&wire_a), Some("a.b"));
        assert_eq!(mapper.caller_name(&wire_b), Some("a_b"));
    }
}
