// Which cache entries belong to which resource. Adding a resource is a new
// table row, not a new branch in the reconciler.

use std::collections::HashMap;

use crate::store::QueryKey;

/// Cache layout of one resource family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRule {
    /// Prefixes of cached list queries (patched by id, invalidated on
    /// create/delete).
    pub collections: Vec<QueryKey>,
    /// Prefix of per-record detail queries; the record id is the next segment.
    pub detail: QueryKey,
    /// Derived results (counts, charts) that cannot be patched, only
    /// invalidated.
    pub aggregates: Vec<QueryKey>,
}

impl ResourceRule {
    /// The usual layout: `[res, "list"]`, `[res, "detail"]`, plus
    /// `["analytics", res]` and `["dashboard", "summary"]` as aggregates.
    pub fn standard(resource: &str) -> Self {
        Self {
            collections: vec![QueryKey::from([resource, "list"])],
            detail: QueryKey::from([resource, "detail"]),
            aggregates: vec![
                QueryKey::from(["analytics", resource]),
                QueryKey::from(["dashboard", "summary"]),
            ],
        }
    }

    pub fn detail_key(&self, id: i64) -> QueryKey {
        self.detail.child(id.to_string())
    }
}

/// Resource name to [`ResourceRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: HashMap<String, ResourceRule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::empty()
            .with_rule("arrivals", ResourceRule::standard("arrivals"))
            .with_rule("containers", ResourceRule::standard("containers"))
    }
}

impl RuleTable {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or replace the rule for `resource`.
    #[must_use]
    pub fn with_rule(mut self, resource: impl Into<String>, rule: ResourceRule) -> Self {
        self.rules.insert(resource.into(), rule);
        self
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceRule> {
        self.rules.get(resource)
    }

    /// Covered resource names, sorted.
    pub fn resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
