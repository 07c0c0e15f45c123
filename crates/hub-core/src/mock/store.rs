//! Rule Store: persisted, indexed collection of mock rules (§4.4).

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::engine::{match_path, match_query_params, MatchOutcome};
use super::rule::{Collection, MockRule};
use crate::error::{Error, Result};

const DEFAULT_CACHE_SIZE: usize = 100;

/// Index key: `(uppercase method, lowercase host)`.
type IndexKey = (String, String);

struct CacheEntry {
    key: CacheKey,
    outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method: String,
    host: String,
    path: String,
    query_hash: u64,
}

struct StoreState {
    collections: IndexMap<String, Collection>,
    rules: IndexMap<String, MockRule>,
    /// Rule ids sharing an (method, host) index key, in insertion order.
    index: HashMap<IndexKey, Vec<String>>,
    /// Rules that failed to load cleanly: kept in storage, excluded
    /// from the index (§4.4 "Failure semantics").
    excluded: Vec<String>,
    cache: Vec<CacheEntry>,
    cache_capacity: usize,
}

impl StoreState {
    fn invalidate_cache(&mut self) {
        self.cache.clear();
    }

    fn index_key_for(rule: &MockRule) -> IndexKey {
        (rule.matcher.method.to_uppercase(), rule.matcher.host.to_lowercase())
    }
}

/// Persisted, indexed collection of [`MockRule`]s and [`Collection`]s,
/// and the sole client of whatever out-of-core persistence mechanism
/// backs it (§6 "Persisted rule storage").
pub struct RuleStore {
    state: RwLock<StoreState>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl RuleStore {
    /// Construct an empty rule store with the given lookup-cache capacity.
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            state: RwLock::new(StoreState {
                collections: IndexMap::new(),
                rules: IndexMap::new(),
                index: HashMap::new(),
                excluded: Vec::new(),
                cache: Vec::new(),
                cache_capacity,
            }),
        }
    }

    /// Add (or replace, by id) a collection.
    pub fn add_collection(&self, collection: Collection) {
        let mut state = self.state.write();
        state.collections.insert(collection.id.clone(), collection);
        state.invalidate_cache();
    }

    /// Remove a collection. Rules referencing it are left in storage
    /// but will no longer match (their collection lookup fails
    /// "enabled" checks, per §4.4).
    pub fn remove_collection(&self, collection_id: &str) {
        let mut state = self.state.write();
        state.collections.shift_remove(collection_id);
        state.invalidate_cache();
    }

    /// Add (or replace, by id) a rule. A rule whose collection does
    /// not exist is rejected (§7 "Store inconsistency").
    pub fn add_rule(&self, rule: MockRule) -> Result<()> {
        let mut state = self.state.write();
        if !state.collections.contains_key(&rule.collection_id) {
            return Err(Error::rule_store(format!(
                "rule {} references unknown collection {}",
                rule.id, rule.collection_id
            )));
        }

        // Drop any stale index entry for a replaced rule before
        // re-indexing under its (possibly changed) method/host.
        if let Some(previous) = state.rules.get(&rule.id) {
            let key = StoreState::index_key_for(previous);
            if let Some(ids) = state.index.get_mut(&key) {
                ids.retain(|id| id != &rule.id);
            }
        }
        state.excluded.retain(|id| id != &rule.id);

        let key = StoreState::index_key_for(&rule);
        let rule_id = rule.id.clone();
        state.rules.insert(rule_id.clone(), rule);
        state.index.entry(key).or_default().push(rule_id);
        state.invalidate_cache();
        Ok(())
    }

    /// Load a rule at startup without failing the whole store when it
    /// is malformed: malformed rules are preserved but excluded from
    /// the index (§4.4).
    pub fn load_rule(&self, rule: MockRule, well_formed: bool) {
        let mut state = self.state.write();
        let rule_id = rule.id.clone();
        if well_formed && state.collections.contains_key(&rule.collection_id) {
            let key = StoreState::index_key_for(&rule);
            state.rules.insert(rule_id.clone(), rule);
            state.index.entry(key).or_default().push(rule_id);
        } else {
            tracing::warn!(rule_id = %rule_id, "excluding malformed rule from index at load");
            state.rules.insert(rule_id.clone(), rule);
            state.excluded.push(rule_id);
        }
        state.invalidate_cache();
    }

    /// Remove a rule.
    pub fn remove_rule(&self, rule_id: &str) {
        let mut state = self.state.write();
        if let Some(rule) = state.rules.shift_remove(rule_id) {
            let key = StoreState::index_key_for(&rule);
            if let Some(ids) = state.index.get_mut(&key) {
                ids.retain(|id| id != rule_id);
            }
        }
        state.excluded.retain(|id| id != rule_id);
        state.invalidate_cache();
    }

    /// All collections, in insertion order.
    pub fn all_collections(&self) -> Vec<Collection> {
        self.state.read().collections.values().cloned().collect()
    }

    /// All rules, in insertion order (includes excluded/malformed ones).
    pub fn all_rules(&self) -> Vec<MockRule> {
        self.state.read().rules.values().cloned().collect()
    }

    /// Run the §4.4 match procedure for a request, consulting (and
    /// maintaining) the lookup cache.
    pub fn match_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_pairs: &[(String, String)],
    ) -> MatchOutcome {
        let key = CacheKey {
            method: method.to_uppercase(),
            host: host.to_lowercase(),
            path: path.to_string(),
            query_hash: hash_query(query_pairs),
        };

        {
            let state = self.state.read();
            if let Some(entry) = state.cache.iter().find(|e| e.key == key) {
                return entry.outcome.clone();
            }
        }

        let outcome = self.match_uncached(&key.method, &key.host, path, query_pairs);

        let mut state = self.state.write();
        if state.cache.len() >= state.cache_capacity {
            state.cache.remove(0);
        }
        state.cache.push(CacheEntry {
            key,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn match_uncached(
        &self,
        method_upper: &str,
        host_lower: &str,
        path: &str,
        query_pairs: &[(String, String)],
    ) -> MatchOutcome {
        let state = self.state.read();
        let key = (method_upper.to_string(), host_lower.to_string());
        let Some(candidate_ids) = state.index.get(&key) else {
            return MatchOutcome::Miss;
        };

        for rule_id in candidate_ids {
            let Some(rule) = state.rules.get(rule_id) else {
                continue;
            };
            if !rule.enabled {
                continue;
            }
            let Some(collection) = state.collections.get(&rule.collection_id) else {
                continue;
            };
            if !collection.enabled {
                continue;
            }
            if !match_path(&rule.matcher.path, path) {
                continue;
            }
            if !match_query_params(&rule.matcher.query_params, query_pairs) {
                continue;
            }
            return MatchOutcome::Hit(rule.clone());
        }
        MatchOutcome::Miss
    }
}

fn hash_query(pairs: &[(String, String)]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    pairs.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::rule::{MatchType, MockMatch, MockResponseSpec, QueryParam};

    fn collection(id: &str, enabled: bool) -> Collection {
        Collection {
            id: id.to_string(),
            name: id.to_string(),
            package_name: None,
            enabled,
        }
    }

    fn rule(id: &str, collection_id: &str, path: &str) -> MockRule {
        MockRule {
            id: id.to_string(),
            name: format!("rule-{id}"),
            enabled: true,
            collection_id: collection_id.to_string(),
            matcher: MockMatch {
                method: "GET".into(),
                scheme: "https".into(),
                host: "api.x".into(),
                port: None,
                path: path.to_string(),
                query_params: Vec::new(),
            },
            response: MockResponseSpec {
                status_code: 200,
                headers: Default::default(),
                body: "{}".into(),
            },
        }
    }

    #[test]
    fn first_matching_rule_wins_in_insertion_order() {
        let store = RuleStore::default();
        store.add_collection(collection("c1", true));
        store.add_rule(rule("r1", "c1", "/v1/u")).unwrap();
        store.add_rule(rule("r2", "c1", "/v1/u")).unwrap();

        let outcome = store.match_request("GET", "api.x", "/v1/u", &[]);
        match outcome {
            MatchOutcome::Hit(r) => assert_eq!(r.id, "r1"),
            MatchOutcome::Miss => panic!("expected a match"),
        }
    }

    #[test]
    fn disabled_collection_disqualifies_its_rules() {
        let store = RuleStore::default();
        store.add_collection(collection("c1", false));
        store.add_rule(rule("r1", "c1", "/v1/u")).unwrap();
        assert!(matches!(
            store.match_request("GET", "api.x", "/v1/u", &[]),
            MatchOutcome::Miss
        ));
    }

    #[test]
    fn required_query_param_must_match() {
        let store = RuleStore::default();
        store.add_collection(collection("c1", true));
        let mut r = rule("r1", "c1", "/v1/u");
        r.matcher.query_params.push(QueryParam {
            key: "id".into(),
            value: r"\d+".into(),
            required: true,
            match_type: MatchType::Regex,
        });
        store.add_rule(r).unwrap();

        assert!(matches!(
            store.match_request("GET", "api.x", "/v1/u", &[("id".into(), "42".into())]),
            MatchOutcome::Hit(_)
        ));
        assert!(matches!(
            store.match_request("GET", "api.x", "/v1/u", &[]),
            MatchOutcome::Miss
        ));
    }

    #[test]
    fn mutation_invalidates_cache() {
        let store = RuleStore::default();
        store.add_collection(collection("c1", true));
        assert!(matches!(
            store.match_request("GET", "api.x", "/v1/u", &[]),
            MatchOutcome::Miss
        ));
        store.add_rule(rule("r1", "c1", "/v1/u")).unwrap();
        assert!(matches!(
            store.match_request("GET", "api.x", "/v1/u", &[]),
            MatchOutcome::Hit(_)
        ));
    }

    #[test]
    fn rule_with_unknown_collection_is_rejected() {
        let store = RuleStore::default();
        assert!(store.add_rule(rule("r1", "missing", "/v1/u")).is_err());
    }
}
