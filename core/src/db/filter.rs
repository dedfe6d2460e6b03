// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Typed query conditions.
//!
//! A `Filter` is a conjunction of conditions on named columns.  Column names are static strings
//! chosen by the code, never by the user, and all values are sent to the database as bound
//! parameters.

use sqlx::{Any, QueryBuilder};

/// A value that can be bound to a query parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The SQL `NULL`.
    Null,

    /// A boolean, stored as an integer by both supported engines.
    Bool(bool),

    /// A signed integer.
    Int(i64),

    /// A string.
    Text(String),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl Value {
    /// Appends this value to `qb` as a bound parameter.
    pub(crate) fn push_bind(&self, qb: &mut QueryBuilder<'_, Any>) {
        match self {
            Value::Null => {
                qb.push("NULL");
            }
            Value::Bool(b) => {
                qb.push_bind(*b);
            }
            Value::Int(i) => {
                qb.push_bind(*i);
            }
            Value::Text(s) => {
                qb.push_bind(s.clone());
            }
        }
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq)]
enum CompareOp {
    /// `=`
    Eq,

    /// `<>`
    Ne,

    /// `<`
    Lt,

    /// `<=`
    Le,

    /// `>`
    Gt,

    /// `>=`
    Ge,

    /// `LIKE`
    Like,
}

impl CompareOp {
    /// Returns the SQL spelling of the operator.
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => " = ",
            CompareOp::Ne => " <> ",
            CompareOp::Lt => " < ",
            CompareOp::Le => " <= ",
            CompareOp::Gt => " > ",
            CompareOp::Ge => " >= ",
            CompareOp::Like => " LIKE ",
        }
    }
}

/// A single condition within a filter.
#[derive(Clone, Debug, PartialEq)]
enum Condition {
    /// Compares a column against a value.
    Compare(&'static str, CompareOp, Value),

    /// Matches rows where any of the columns is `LIKE` the pattern.
    AnyLike(Vec<&'static str>, String),

    /// Matches rows where the column is in a set of values.
    In(&'static str, Vec<Value>),

    /// Matches rows where the column is `NULL`.
    IsNull(&'static str),
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Order {
    /// Smallest first.
    Asc,

    /// Largest first.
    Desc,
}

/// Conjunction of conditions plus an optional ordering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    /// Conditions that all must hold.
    conditions: Vec<Condition>,

    /// Sort keys, most significant first.
    order: Vec<(&'static str, Order)>,
}

impl Filter {
    /// Creates a filter that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Appends a comparison condition.
    fn compare<V: Into<Value>>(mut self, column: &'static str, op: CompareOp, value: V) -> Self {
        self.conditions.push(Condition::Compare(column, op, value.into()));
        self
    }

    /// Requires `column` to be equal to `value`.  Comparing against `Value::Null` checks for
    /// `IS NULL`.
    pub fn eq<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Eq, value)
    }

    /// Requires `column` to differ from `value`.
    pub fn ne<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Ne, value)
    }

    /// Requires `column` to be smaller than `value`.
    pub fn lt<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Lt, value)
    }

    /// Requires `column` to be smaller than or equal to `value`.
    pub fn le<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Le, value)
    }

    /// Requires `column` to be larger than `value`.
    pub fn gt<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Gt, value)
    }

    /// Requires `column` to be larger than or equal to `value`.
    pub fn ge<V: Into<Value>>(self, column: &'static str, value: V) -> Self {
        self.compare(column, CompareOp::Ge, value)
    }

    /// Requires `column` to match the SQL `LIKE` `pattern`.
    pub fn like<S: Into<String>>(self, column: &'static str, pattern: S) -> Self {
        self.compare(column, CompareOp::Like, Value::Text(pattern.into()))
    }

    /// Requires at least one of `columns` to match the SQL `LIKE` `pattern`.
    pub fn any_like<S: Into<String>>(mut self, columns: &[&'static str], pattern: S) -> Self {
        assert!(!columns.is_empty(), "any_like needs at least one column");
        self.conditions.push(Condition::AnyLike(columns.to_vec(), pattern.into()));
        self
    }

    /// Requires `column` to be one of `values`.  An empty set matches nothing.
    pub fn is_in<V: Into<Value>, I: IntoIterator<Item = V>>(
        mut self,
        column: &'static str,
        values: I,
    ) -> Self {
        self.conditions.push(Condition::In(column, values.into_iter().map(Into::into).collect()));
        self
    }

    /// Requires `column` to be `NULL`.
    pub fn is_null(mut self, column: &'static str) -> Self {
        self.conditions.push(Condition::IsNull(column));
        self
    }

    /// Sorts results by `column` in `order` after any previously-given sort keys.
    pub fn order_by(mut self, column: &'static str, order: Order) -> Self {
        self.order.push((column, order));
        self
    }

    /// Returns true if the filter specifies an ordering.
    pub(crate) fn is_ordered(&self) -> bool {
        !self.order.is_empty()
    }

    /// Appends the `WHERE` clause, if any, to `qb`.
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Any>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Compare(column, CompareOp::Eq, Value::Null) => {
                    qb.push(*column).push(" IS NULL");
                }
                Condition::Compare(column, CompareOp::Ne, Value::Null) => {
                    qb.push(*column).push(" IS NOT NULL");
                }
                Condition::Compare(column, op, value) => {
                    qb.push(*column).push(op.as_sql());
                    value.push_bind(qb);
                }
                Condition::AnyLike(columns, pattern) => {
                    qb.push("(");
                    for (j, column) in columns.iter().enumerate() {
                        if j > 0 {
                            qb.push(" OR ");
                        }
                        qb.push(*column).push(" LIKE ").push_bind(pattern.clone());
                    }
                    qb.push(")");
                }
                Condition::In(_, values) if values.is_empty() => {
                    qb.push("1 = 0");
                }
                Condition::In(column, values) => {
                    qb.push(*column).push(" IN (");
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            qb.push(", ");
                        }
                        value.push_bind(qb);
                    }
                    qb.push(")");
                }
                Condition::IsNull(column) => {
                    qb.push(*column).push(" IS NULL");
                }
            }
        }
    }

    /// Appends the `ORDER BY` clause, if any, to `qb`.
    pub(crate) fn push_order(&self, qb: &mut QueryBuilder<'_, Any>) {
        for (i, (column, order)) in self.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(*column);
            qb.push(match order {
                Order::Asc => " ASC",
                Order::Desc => " DESC",
            });
        }
    }
}
