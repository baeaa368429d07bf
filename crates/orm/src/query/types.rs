//! Query AST - the shape both the OSQL parser and the builder produce

use std::fmt;

use serde_json::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

/// Query parameter reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `?`, numbered from zero in order of appearance
    Positional(usize),
    /// `:name`
    Named(String),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Positional(_) => write!(f, "?"),
            Param::Named(name) => write!(f, ":{}", name),
        }
    }
}

/// Anything that evaluates to a value against a document
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(Value),
    Param(Param),
}

impl Operand {
    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(name) => write!(f, "{}", name),
            Operand::Literal(value) => write_literal(f, value),
            Operand::Param(param) => write!(f, "{}", param),
        }
    }
}

/// Scalars render as OSQL literals. Arrays and objects have no OSQL literal
/// syntax, so their rendering does not parse back.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => write!(f, "NULL"),
        Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        Value::Number(n) => write!(f, "{}", n),
        Value::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_literal(f, item)?;
            }
            write!(f, "]")
        }
        Value::Object(_) => write!(f, "{}", value),
    }
}

/// WHERE clause tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Operand,
        operator: QueryOperator,
        right: Operand,
    },
    Null {
        operand: Operand,
        negated: bool,
    },
    In {
        operand: Operand,
        list: Vec<Operand>,
        negated: bool,
    },
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(field: &str, operator: QueryOperator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            left: Operand::field(field),
            operator,
            right: Operand::literal(value),
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Apply `f` to every operand in the tree
    pub(crate) fn try_map_operands<E>(
        self,
        f: &mut impl FnMut(Operand) -> Result<Operand, E>,
    ) -> Result<Condition, E> {
        Ok(match self {
            Condition::Compare { left, operator, right } => Condition::Compare {
                left: f(left)?,
                operator,
                right: f(right)?,
            },
            Condition::Null { operand, negated } => Condition::Null {
                operand: f(operand)?,
                negated,
            },
            Condition::In { operand, list, negated } => Condition::In {
                operand: f(operand)?,
                list: list.into_iter().map(&mut *f).collect::<Result<_, _>>()?,
                negated,
            },
            Condition::Between { operand, low, high } => Condition::Between {
                operand: f(operand)?,
                low: f(low)?,
                high: f(high)?,
            },
            Condition::And(a, b) => {
                Condition::And(Box::new(a.try_map_operands(f)?), Box::new(b.try_map_operands(f)?))
            }
            Condition::Or(a, b) => {
                Condition::Or(Box::new(a.try_map_operands(f)?), Box::new(b.try_map_operands(f)?))
            }
            Condition::Not(inner) => Condition::Not(Box::new(inner.try_map_operands(f)?)),
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { left, operator, right } => {
                write!(f, "{} {} {}", left, operator, right)
            }
            Condition::Null { operand, negated } => {
                write!(f, "{} IS {}NULL", operand, if *negated { "NOT " } else { "" })
            }
            Condition::In { operand, list, negated } => {
                write!(f, "{} {}IN (", operand, if *negated { "NOT " } else { "" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Condition::Between { operand, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", operand, low, high)
            }
            Condition::And(a, b) => write!(f, "({} AND {})", a, b),
            Condition::Or(a, b) => write!(f, "({} OR {})", a, b),
            Condition::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// A `SELECT FROM <class>` statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub class_name: String,
    pub condition: Option<Condition>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub skip: Option<Operand>,
    pub limit: Option<Operand>,
}

impl SelectQuery {
    pub fn from_class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            condition: None,
            order_by: Vec::new(),
            skip: None,
            limit: None,
        }
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT FROM {}", self.class_name)?;
        if let Some(condition) = &self.condition {
            write!(f, " WHERE {}", condition)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, (field, direction)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", field, direction)?;
            }
        }
        if let Some(skip) = &self.skip {
            write!(f, " SKIP {}", skip)?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}
