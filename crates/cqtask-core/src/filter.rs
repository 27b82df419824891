use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DataLayerError, Result};

/// A single `attribute = value` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCondition {
    pub attribute: String,
    pub value: String,
}

/// Describes which tokens a continuous query should match.
///
/// The task layer never evaluates a filter; it only carries it to the
/// [`StorageAdapter`](crate::StorageAdapter) and uses its display form to
/// label the task in logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    conditions: Vec<FilterCondition>,
    return_attributes: Vec<String>,
}

impl QueryFilter {
    pub fn builder() -> QueryFilterBuilder {
        QueryFilterBuilder::default()
    }

    /// A filter with no conditions, matching every token.
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// Attributes the caller wants back. Empty means all of them.
    pub fn return_attributes(&self) -> &[String] {
        &self.return_attributes
    }

    pub fn is_match_all(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.conditions.as_slice() {
            [] => write!(f, "(objectClass=*)"),
            [single] => write!(f, "({}={})", single.attribute, single.value),
            many => {
                write!(f, "(&")?;
                for condition in many {
                    write!(f, "({}={})", condition.attribute, condition.value)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryFilterBuilder {
    conditions: Vec<FilterCondition>,
    return_attributes: Vec<String>,
}

impl QueryFilterBuilder {
    pub fn equals(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FilterCondition {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    pub fn returning(mut self, attribute: impl Into<String>) -> Self {
        self.return_attributes.push(attribute.into());
        self
    }

    pub fn build(self) -> Result<QueryFilter> {
        if let Some(bad) = self
            .conditions
            .iter()
            .find(|c| c.attribute.trim().is_empty())
        {
            return Err(DataLayerError::InvalidFilter(format!(
                "empty attribute name for value '{}'",
                bad.value
            )));
        }

        if self.return_attributes.iter().any(|a| a.trim().is_empty()) {
            return Err(DataLayerError::InvalidFilter(
                "empty return attribute".to_string(),
            ));
        }

        Ok(QueryFilter {
            conditions: self.conditions,
            return_attributes: self.return_attributes,
        })
    }
}
