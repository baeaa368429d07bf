//! Query Builder - typed construction of SELECT statements
//!
//! Builds the same AST the OSQL parser produces. Queries over scalar
//! literals render to OSQL text that parses back to that AST; array and
//! object literals are only reachable through the builder, and `to_osql`
//! renders them for display.

use std::marker::PhantomData;

use serde_json::Value;

use super::types::*;
use super::QueryParams;
use crate::database::DatabaseHandle;
use crate::error::ModelResult;
use crate::model::Model;

/// Query builder scoped to one class
#[derive(Debug)]
pub struct QueryBuilder<M = ()> {
    pub(crate) class_name: String,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) skip_count: Option<i64>,
    _phantom: PhantomData<M>,
}

impl<M> Clone for QueryBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            class_name: self.class_name.clone(),
            conditions: self.conditions.clone(),
            order_by: self.order_by.clone(),
            limit_count: self.limit_count,
            skip_count: self.skip_count,
            _phantom: PhantomData,
        }
    }
}

impl<M> QueryBuilder<M> {
    /// Create a new query builder for a class
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit_count: None,
            skip_count: None,
            _phantom: PhantomData,
        }
    }

    fn push(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::Equal, value))
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::NotEqual, value))
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::GreaterThan, value))
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::GreaterThanOrEqual, value))
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::LessThan, value))
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<Value>>(self, field: &str, value: T) -> Self {
        self.push(Condition::compare(field, QueryOperator::LessThanOrEqual, value))
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.push(Condition::compare(field, QueryOperator::Like, pattern))
    }

    /// Add WHERE condition with NOT LIKE
    pub fn where_not_like(self, field: &str, pattern: &str) -> Self {
        self.push(Condition::compare(field, QueryOperator::NotLike, pattern))
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        self.push(Condition::In {
            operand: Operand::field(field),
            list: values.into_iter().map(Operand::literal).collect(),
            negated: false,
        })
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<T: Into<Value>>(self, field: &str, values: Vec<T>) -> Self {
        self.push(Condition::In {
            operand: Operand::field(field),
            list: values.into_iter().map(Operand::literal).collect(),
            negated: true,
        })
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, field: &str) -> Self {
        self.push(Condition::Null {
            operand: Operand::field(field),
            negated: false,
        })
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, field: &str) -> Self {
        self.push(Condition::Null {
            operand: Operand::field(field),
            negated: true,
        })
    }

    /// Add WHERE condition with BETWEEN
    pub fn where_between<T: Into<Value>>(self, field: &str, low: T, high: T) -> Self {
        self.push(Condition::Between {
            operand: Operand::field(field),
            low: Operand::literal(low),
            high: Operand::literal(high),
        })
    }

    /// Add an arbitrary condition, ANDed with the others
    pub fn where_condition(self, condition: Condition) -> Self {
        self.push(condition)
    }

    /// OR the conditions collected so far with another condition
    pub fn or_where(mut self, condition: Condition) -> Self {
        let current = self.combined_condition();
        self.conditions = match current {
            Some(current) => vec![current.or(condition)],
            None => vec![condition],
        };
        self
    }

    /// Add ORDER BY clause
    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by.push((field.to_string(), OrderDirection::Asc));
        self
    }

    /// Add ORDER BY clause with DESC direction
    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by.push((field.to_string(), OrderDirection::Desc));
        self
    }

    /// Add LIMIT clause
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add SKIP clause
    pub fn skip(mut self, count: i64) -> Self {
        self.skip_count = Some(count);
        self
    }

    /// Alias for `skip`
    pub fn offset(self, count: i64) -> Self {
        self.skip(count)
    }

    /// Paginate (page numbers start at 1)
    pub fn paginate(self, per_page: i64, page: i64) -> Self {
        let page = page.max(1);
        self.limit(per_page).skip((page - 1).saturating_mul(per_page))
    }

    fn combined_condition(&self) -> Option<Condition> {
        self.conditions
            .iter()
            .cloned()
            .reduce(|acc, condition| acc.and(condition))
    }

    /// The statement this builder describes
    pub fn build(&self) -> SelectQuery {
        SelectQuery {
            class_name: self.class_name.clone(),
            condition: self.combined_condition(),
            order_by: self.order_by.clone(),
            skip: self.skip_count.map(Operand::literal),
            limit: self.limit_count.map(Operand::literal),
        }
    }

    /// Render as OSQL text
    pub fn to_osql(&self) -> String {
        self.build().to_string()
    }
}

impl<M: Model> QueryBuilder<M> {
    /// Run the query and map every result to `M`
    pub async fn get(&self, db: &DatabaseHandle) -> ModelResult<Vec<M>> {
        let documents = db.select(self.build(), &QueryParams::new()).await?;
        documents.into_iter().map(M::from_document).collect()
    }

    /// Run the query and return the first result
    pub async fn first(&self, db: &DatabaseHandle) -> ModelResult<Option<M>> {
        let documents = db.select(self.clone().limit(1).build(), &QueryParams::new()).await?;
        documents.into_iter().next().map(M::from_document).transpose()
    }

    /// Count matching records, ignoring paging
    pub async fn count(&self, db: &DatabaseHandle) -> ModelResult<usize> {
        let mut query = self.build();
        query.skip = None;
        query.limit = None;
        Ok(db.select(query, &QueryParams::new()).await?.len())
    }
}
