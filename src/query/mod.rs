//! Query model for partitioned searches
//!
//! A [`Query`] is a keyword plus the facet constraints accumulated while the
//! crawl descends the facet ladder. Queries are immutable values: narrowing a
//! query produces a new one that keeps every constraint of its parent.

mod facet;

pub use facet::{FacetLadder, FacetLevel, FacetValue};

use std::collections::BTreeMap;
use std::fmt;

/// One applied facet value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    /// Name of the facet level that produced this constraint
    pub facet: String,

    /// Human-readable value label
    pub label: String,

    /// Request parameters the constraint sets
    pub params: BTreeMap<String, String>,
}

/// Immutable description of one (sub-)search
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    keyword: String,
    base_params: BTreeMap<String, String>,
    constraints: Vec<Constraint>,
}

impl Query {
    /// Creates a root query with no facet constraints
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            base_params: BTreeMap::new(),
            constraints: Vec::new(),
        }
    }

    /// Adds caller-supplied parameters applied beneath every constraint
    pub fn with_base_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.base_params.extend(params);
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the constraint applied by the named facet level, if any
    pub fn constraint(&self, facet: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.facet == facet)
    }

    /// Returns a narrower query carrying one more constraint
    pub fn narrowed(&self, constraint: Constraint) -> Self {
        let mut constraints = self.constraints.clone();
        constraints.push(constraint);
        Self {
            keyword: self.keyword.clone(),
            base_params: self.base_params.clone(),
            constraints,
        }
    }

    /// Request parameters for this query, excluding keyword and page
    ///
    /// Later constraints override earlier ones that set the same parameter,
    /// so a district constraint replaces its region's `area` on the wire.
    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = self.base_params.clone();
        for constraint in &self.constraints {
            for (key, value) in &constraint.params {
                params.insert(key.clone(), value.clone());
            }
        }
        params
    }

    /// Provenance label, e.g. `python/region=taipei/district=datong`
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword)?;
        for constraint in &self.constraints {
            write!(f, "/{}={}", constraint.facet, constraint.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(facet: &str, label: &str, key: &str, value: &str) -> Constraint {
        Constraint {
            facet: facet.to_string(),
            label: label.to_string(),
            params: BTreeMap::from([(key.to_string(), value.to_string())]),
        }
    }

    #[test]
    fn test_root_query() {
        let query = Query::new("rust");
        assert_eq!(query.keyword(), "rust");
        assert!(query.constraints().is_empty());
        assert!(query.params().is_empty());
        assert_eq!(query.label(), "rust");
    }

    #[test]
    fn test_narrowing_keeps_parent_constraints() {
        let root = Query::new("rust");
        let region = root.narrowed(constraint("region", "taipei", "area", "6001001000"));
        let bracket = region.narrowed(constraint("salary", "40k", "scmin", "40000"));

        assert!(root.constraints().is_empty());
        assert_eq!(region.constraints().len(), 1);
        assert_eq!(bracket.constraints().len(), 2);
        assert_eq!(bracket.label(), "rust/region=taipei/salary=40k");
        assert!(bracket.constraint("region").is_some());
        assert!(bracket.constraint("district").is_none());
    }

    #[test]
    fn test_later_constraint_overrides_param() {
        let query = Query::new("rust")
            .narrowed(constraint("region", "taipei", "area", "6001001000"))
            .narrowed(constraint("district", "datong", "area", "6001001002"));

        let params = query.params();
        assert_eq!(params.get("area").map(String::as_str), Some("6001001002"));
        assert_eq!(query.constraints().len(), 2);
    }

    #[test]
    fn test_base_params_sit_under_constraints() {
        let base = BTreeMap::from([
            ("area".to_string(), "0".to_string()),
            ("ro".to_string(), "1".to_string()),
        ]);
        let query = Query::new("rust")
            .with_base_params(base)
            .narrowed(constraint("region", "taipei", "area", "6001001000"));

        let params = query.params();
        assert_eq!(params.get("area").map(String::as_str), Some("6001001000"));
        assert_eq!(params.get("ro").map(String::as_str), Some("1"));
    }
}
