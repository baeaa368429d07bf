//! Query parameters and binding

use std::collections::HashMap;

use serde_json::Value;

use super::types::{Operand, Param, SelectQuery};
use crate::error::QueryError;
use crate::query::types::Condition;

/// Values for `?` and `:name` placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    positional: Vec<Value>,
    named: HashMap<String, Value>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next positional value
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named value
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    fn resolve(&self, param: &Param) -> Result<Value, QueryError> {
        match param {
            Param::Positional(index) => self
                .positional
                .get(*index)
                .cloned()
                .ok_or_else(|| QueryError::MissingParameter(format!("?{}", index + 1))),
            Param::Named(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::MissingParameter(format!(":{}", name))),
        }
    }
}

impl From<()> for QueryParams {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for QueryParams {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: HashMap::new(),
        }
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for QueryParams {
    fn from(values: [V; N]) -> Self {
        values.into_iter().map(Into::into).collect::<Vec<Value>>().into()
    }
}

impl From<HashMap<String, Value>> for QueryParams {
    fn from(named: HashMap<String, Value>) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }
}

/// A query with every placeholder replaced and paging resolved
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub class_name: String,
    pub condition: Option<Condition>,
    pub order_by: Vec<(String, super::types::OrderDirection)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Substitute parameters. Every positional value must be consumed.
    pub fn bind(self, params: &QueryParams) -> Result<BoundQuery, QueryError> {
        let mut highest_positional: Option<usize> = None;
        let mut substitute = |operand: Operand| -> Result<Operand, QueryError> {
            match operand {
                Operand::Param(param) => {
                    if let Param::Positional(index) = param {
                        highest_positional = Some(highest_positional.map_or(index, |h| h.max(index)));
                    }
                    params.resolve(&param).map(Operand::Literal)
                }
                other => Ok(other),
            }
        };

        let condition = self
            .condition
            .map(|condition| condition.try_map_operands(&mut substitute))
            .transpose()?;
        let skip = self.skip.map(&mut substitute).transpose()?;
        let limit = self.limit.map(&mut substitute).transpose()?;

        let used = highest_positional.map_or(0, |h| h + 1);
        if params.positional.len() > used {
            return Err(QueryError::UnusedParameters {
                supplied: params.positional.len(),
                used,
            });
        }

        let skip = match skip {
            Some(operand) => match count_value(&operand, "SKIP")? {
                Some(n) => n,
                None => 0,
            },
            None => 0,
        };
        let limit = match limit {
            Some(operand) => count_value(&operand, "LIMIT")?,
            None => None,
        };

        Ok(BoundQuery {
            class_name: self.class_name,
            condition,
            order_by: self.order_by,
            skip,
            limit,
        })
    }
}

/// Non-negative integer, or `None` for `-1` (no limit)
fn count_value(operand: &Operand, clause: &'static str) -> Result<Option<usize>, QueryError> {
    let invalid = || QueryError::InvalidClauseValue {
        clause,
        value: operand.to_string(),
    };

    match operand {
        Operand::Literal(Value::Number(n)) => match n.as_i64() {
            Some(-1) => Ok(None),
            Some(v) if v >= 0 => usize::try_from(v).map(Some).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}
