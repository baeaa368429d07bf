//! Query execution over documents
//!
//! Filtering, ordering and paging run in the process against whatever the
//! handle returns for the class, including state staged in a transaction.

use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::params::BoundQuery;
use super::types::{Condition, Operand, OrderDirection, QueryOperator};
use crate::document::Document;

const LIKE_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

static LIKE_CACHE: Lazy<Mutex<LruCache<String, Arc<Regex>>>> =
    Lazy::new(|| Mutex::new(LruCache::new(LIKE_CACHE_SIZE)));

impl BoundQuery {
    /// Filter, order and page the candidate documents
    pub fn execute(&self, candidates: Vec<Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = match &self.condition {
            Some(condition) => candidates
                .into_iter()
                .filter(|doc| evaluate(condition, doc))
                .collect(),
            None => candidates,
        };

        if !self.order_by.is_empty() {
            matched.sort_by(|a, b| {
                for (field, direction) in &self.order_by {
                    let ordering = order_values(&a.resolve(field), &b.resolve(field));
                    let ordering = match direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let paged = matched.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        }
    }
}

fn value_of(operand: &Operand, doc: &Document) -> Value {
    match operand {
        Operand::Field(path) => doc.resolve(path),
        Operand::Literal(value) => value.clone(),
        // Binding replaces every parameter before execution
        Operand::Param(_) => Value::Null,
    }
}

fn evaluate(condition: &Condition, doc: &Document) -> bool {
    match condition {
        Condition::Compare { left, operator, right } => {
            let left = value_of(left, doc);
            let right = value_of(right, doc);
            match operator {
                QueryOperator::Equal => values_equal(&left, &right),
                QueryOperator::NotEqual => !values_equal(&left, &right),
                QueryOperator::GreaterThan => compare(&left, &right) == Some(Ordering::Greater),
                QueryOperator::GreaterThanOrEqual => matches!(
                    compare(&left, &right),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                QueryOperator::LessThan => compare(&left, &right) == Some(Ordering::Less),
                QueryOperator::LessThanOrEqual => {
                    matches!(compare(&left, &right), Some(Ordering::Less | Ordering::Equal))
                }
                QueryOperator::Like => like(&left, &right),
                QueryOperator::NotLike => match (&left, &right) {
                    (Value::String(_), Value::String(_)) => !like(&left, &right),
                    _ => false,
                },
            }
        }
        Condition::Null { operand, negated } => value_of(operand, doc).is_null() != *negated,
        Condition::In { operand, list, negated } => {
            let value = value_of(operand, doc);
            let found = list.iter().any(|item| match value_of(item, doc) {
                Value::Array(items) => items.iter().any(|candidate| values_equal(&value, candidate)),
                candidate => values_equal(&value, &candidate),
            });
            found != *negated
        }
        Condition::Between { operand, low, high } => {
            let value = value_of(operand, doc);
            let above = matches!(
                compare(&value, &value_of(low, doc)),
                Some(Ordering::Greater | Ordering::Equal)
            );
            let below = matches!(
                compare(&value, &value_of(high, doc)),
                Some(Ordering::Less | Ordering::Equal)
            );
            above && below
        }
        Condition::And(a, b) => evaluate(a, doc) && evaluate(b, doc),
        Condition::Or(a, b) => evaluate(a, doc) || evaluate(b, doc),
        Condition::Not(inner) => !evaluate(inner, doc),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

/// Ordering between two values of the same kind; `None` when incomparable
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order for ORDER BY: nulls first, then by kind, then by value
fn order_values(left: &Value, right: &Value) -> Ordering {
    compare(left, right).unwrap_or_else(|| type_rank(left).cmp(&type_rank(right)))
}

fn like(value: &Value, pattern: &Value) -> bool {
    match (value, pattern) {
        (Value::String(value), Value::String(pattern)) => like_match(value, pattern),
        _ => false,
    }
}

/// Plain prefix, suffix, substring or exact patterns skip the regex
fn fast_path_like(text: &str, pattern: &str) -> Option<bool> {
    if pattern.contains('_') {
        return None;
    }
    let inner = pattern.trim_start_matches('%').trim_end_matches('%');
    if inner.contains('%') {
        return None;
    }
    let leading = pattern.starts_with('%');
    let trailing = pattern.len() > inner.len() + usize::from(leading);
    Some(match (leading, trailing) {
        (false, false) => text == inner,
        (false, true) => text.starts_with(inner),
        (true, false) => text.ends_with(inner),
        (true, true) => text.contains(inner),
    })
}

/// Anchored regex for a LIKE pattern; everything but `%` and `_` is literal
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    regex.push('$');
    regex
}

fn compiled_like(pattern: &str) -> Result<Arc<Regex>, regex::Error> {
    let mut cache = LIKE_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(regex) = cache.get(pattern) {
        return Ok(Arc::clone(regex));
    }
    let regex = Arc::new(Regex::new(&like_to_regex(pattern))?);
    cache.put(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

/// `%` matches any run of characters, `_` exactly one
fn like_match(value: &str, pattern: &str) -> bool {
    if let Some(matched) = fast_path_like(value, pattern) {
        return matched;
    }
    match compiled_like(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(err) => {
            warn!("Invalid LIKE pattern '{}': {}", pattern, err);
            false
        }
    }
}
