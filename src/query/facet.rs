//! Declarative facet ladder
//!
//! Each level is a pure function from a query to its narrower children.
//! Adding or removing a partitioning dimension is a configuration change.

use crate::config::{FacetConfig, FacetValueConfig};
use crate::query::{Constraint, Query};
use std::collections::BTreeMap;

/// A single enumerated facet value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetValue {
    pub label: String,
    pub params: BTreeMap<String, String>,
    pub high_density: bool,
    pub children: Vec<FacetValue>,
}

impl From<&FacetValueConfig> for FacetValue {
    fn from(config: &FacetValueConfig) -> Self {
        Self {
            label: config.label.clone(),
            params: config.params.clone(),
            high_density: config.high_density,
            children: config.children.iter().map(FacetValue::from).collect(),
        }
    }
}

/// One rung of the ladder
#[derive(Debug, Clone)]
pub enum FacetLevel {
    /// Splits any query into one child per value
    Enumerate { name: String, values: Vec<FacetValue> },

    /// Splits a query only when the parent level applied a high-density value
    Refine {
        name: String,
        parent: String,
        parent_values: Vec<FacetValue>,
    },
}

impl FacetLevel {
    pub fn name(&self) -> &str {
        match self {
            Self::Enumerate { name, .. } | Self::Refine { name, .. } => name,
        }
    }

    /// Produces the child queries this level would split `query` into
    ///
    /// An empty result means the level does not apply to this query.
    pub fn expand(&self, query: &Query) -> Vec<Query> {
        match self {
            Self::Enumerate { name, values } => narrow_all(query, name, values),
            Self::Refine {
                name,
                parent,
                parent_values,
            } => {
                let Some(applied) = query.constraint(parent) else {
                    return Vec::new();
                };

                parent_values
                    .iter()
                    .find(|v| v.label == applied.label)
                    .filter(|v| v.high_density)
                    .map(|v| narrow_all(query, name, &v.children))
                    .unwrap_or_default()
            }
        }
    }
}

fn narrow_all(query: &Query, facet: &str, values: &[FacetValue]) -> Vec<Query> {
    values
        .iter()
        .map(|value| {
            query.narrowed(Constraint {
                facet: facet.to_string(),
                label: value.label.clone(),
                params: value.params.clone(),
            })
        })
        .collect()
}

/// Ordered facet levels, coarsest first
#[derive(Debug, Clone, Default)]
pub struct FacetLadder {
    levels: Vec<FacetLevel>,
}

impl FacetLadder {
    pub fn new(levels: Vec<FacetLevel>) -> Self {
        Self { levels }
    }

    /// Builds the ladder from validated configuration
    pub fn from_config(facets: &[FacetConfig]) -> Self {
        let levels = facets
            .iter()
            .map(|facet| match &facet.refines {
                Some(parent) => {
                    let parent_values = facets
                        .iter()
                        .find(|f| &f.name == parent)
                        .map(|f| f.values.iter().map(FacetValue::from).collect())
                        .unwrap_or_default();
                    FacetLevel::Refine {
                        name: facet.name.clone(),
                        parent: parent.clone(),
                        parent_values,
                    }
                }
                None => FacetLevel::Enumerate {
                    name: facet.name.clone(),
                    values: facet.values.iter().map(FacetValue::from).collect(),
                },
            })
            .collect();

        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[FacetLevel] {
        &self.levels
    }

    /// Finds the first level at or after `from` that splits `query`
    ///
    /// Returns the level index and the children it produced. Levels that do
    /// not apply to the query are passed over in order; none are reordered.
    pub fn next_split(&self, query: &Query, from: usize) -> Option<(usize, Vec<Query>)> {
        self.levels
            .iter()
            .enumerate()
            .skip(from)
            .map(|(index, level)| (index, level.expand(query)))
            .find(|(_, children)| !children.is_empty())
    }
}
