//! Expression node model for polysql.
//!
//! Predicates and projections are described as trees of [`Node`] values built
//! through the fluent constructors in `builder.rs`. A tree is plain data: it
//! never holds a connection or session, so it can be compiled on any thread
//! and dropped once the statement is rendered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::statement::Statement;

/// The static type a node evaluates to.
///
/// Drives the boolean-predicate policy and the conversion tables; it is also
/// part of a tree's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaredType {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    List,
    Record,
    Unknown,
}

impl DeclaredType {
    pub fn name(&self) -> &'static str {
        match self {
            DeclaredType::Bool => "Bool",
            DeclaredType::Int => "Int",
            DeclaredType::Float => "Float",
            DeclaredType::Text => "Text",
            DeclaredType::DateTime => "DateTime",
            DeclaredType::List => "List",
            DeclaredType::Record => "Record",
            DeclaredType::Unknown => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => DeclaredType::Bool,
            "int" | "integer" | "long" => DeclaredType::Int,
            "float" | "double" | "decimal" => DeclaredType::Float,
            "text" | "string" => DeclaredType::Text,
            "datetime" | "timestamp" => DeclaredType::DateTime,
            "list" => DeclaredType::List,
            "record" => DeclaredType::Record,
            "unknown" => DeclaredType::Unknown,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime value, either baked into a tree as a constant or reached through
/// a captured environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    /// A captured environment: named fields reachable by member access.
    Record(BTreeMap<String, Value>),
    /// An already rendered statement spliced in as a sub-query.
    SubQuery(Arc<Statement>),
}

impl Value {
    pub fn declared_type(&self) -> DeclaredType {
        match self {
            Value::Null => DeclaredType::Unknown,
            Value::Bool(_) => DeclaredType::Bool,
            Value::Int(_) => DeclaredType::Int,
            Value::Float(_) => DeclaredType::Float,
            Value::Text(_) => DeclaredType::Text,
            Value::DateTime(_) => DeclaredType::DateTime,
            Value::List(_) | Value::SubQuery(_) => DeclaredType::List,
            Value::Record(_) => DeclaredType::Record,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Field lookup on a record value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Element lookup on a list value.
    pub fn element(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Text used when a format template is applied to the value.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.display_text()).collect();
                items.join(",")
            }
            Value::Record(_) => "{record}".to_string(),
            Value::SubQuery(stmt) => stmt.sql.clone(),
        }
    }

    /// Builds a record from `(name, value)` pairs.
    pub fn record<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Statement> for Value {
    fn from(v: Statement) -> Self {
        Value::SubQuery(Arc::new(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Binary operators with a fixed SQL token each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    As,
    And,
    Or,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl BinaryOperator {
    pub fn token(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::As => "AS",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lt => "<",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::LtEq => "<=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOperator::Eq | BinaryOperator::NotEq)
    }

    /// Whether the operator yields a boolean.
    pub fn is_predicate(&self) -> bool {
        !matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::As
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    Negate,
}

/// A function or method invocation, resolved against the dialect's function table.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub function: String,
    /// Receiver for method-style calls (`name.StartsWith(..)`).
    pub target: Option<Box<Node>>,
    pub args: Vec<Node>,
}

impl Call {
    /// The receiver if present, else the first argument.
    pub fn subject(&self) -> Option<&Node> {
        self.target.as_deref().or_else(|| self.args.first())
    }

    /// Arguments after the subject.
    pub fn operands(&self) -> &[Node] {
        if self.target.is_some() || self.args.is_empty() {
            &self.args
        } else {
            &self.args[1..]
        }
    }
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The row variable a statement's columns hang off.
    Row { alias: String },
    Member {
        name: String,
        owner: Option<Box<Node>>,
        declared_type: DeclaredType,
    },
    Constant {
        value: Value,
        declared_type: DeclaredType,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Node>,
    },
    Call(Call),
    Conditional {
        test: Box<Node>,
        when_true: Box<Node>,
        when_false: Box<Node>,
    },
    Projection { fields: Vec<(String, Node)> },
    ArrayIndex { array: Box<Node>, index: usize },
    /// Bare word read by a function renderer (a date unit, a type name).
    /// Never bound as a parameter, so its text is part of the tree's shape.
    Keyword(String),
}

impl Node {
    pub fn declared_type(&self) -> DeclaredType {
        match self {
            Node::Row { .. } => DeclaredType::Record,
            Node::Member { declared_type, .. } | Node::Constant { declared_type, .. } => {
                *declared_type
            }
            Node::Binary { op, left, .. } => {
                if op.is_predicate() {
                    DeclaredType::Bool
                } else {
                    left.declared_type()
                }
            }
            Node::Unary { op, operand } => match op {
                UnaryOperator::Not => DeclaredType::Bool,
                UnaryOperator::Negate => operand.declared_type(),
            },
            Node::Call(_) => DeclaredType::Unknown,
            Node::Conditional { when_true, .. } => when_true.declared_type(),
            Node::Projection { .. } => DeclaredType::Record,
            Node::ArrayIndex { .. } => DeclaredType::Unknown,
            Node::Keyword(_) => DeclaredType::Text,
        }
    }

    pub fn is_bool(&self) -> bool {
        self.declared_type() == DeclaredType::Bool
    }

    /// Column name when this node is `row.column`.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Node::Member {
                name,
                owner: Some(owner),
                ..
            } if matches!(owner.as_ref(), Node::Row { .. }) => Some(name),
            _ => None,
        }
    }

    /// Whether the node's value comes from a constant or a captured
    /// environment rather than from the row.
    pub fn is_value_site(&self) -> bool {
        match self {
            Node::Constant { .. } => true,
            Node::Member {
                owner: Some(owner), ..
            } => owner.is_value_site(),
            Node::ArrayIndex { array, .. } => array.is_value_site(),
            _ => false,
        }
    }

    /// Every constant in the tree, in pre-order.
    ///
    /// Constant ordinals in this list are the stable addresses the plan cache
    /// uses to find values again in a structurally identical tree.
    pub fn value_sites(&self) -> Vec<&Node> {
        let mut sites = Vec::new();
        self.walk(&mut |node| {
            if matches!(node, Node::Constant { .. }) {
                sites.push(node);
            }
        });
        sites
    }

    /// Aliases of the row variables the tree reads, in first-use order.
    pub fn row_aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = Vec::new();
        self.walk(&mut |node| {
            if let Node::Row { alias } = node {
                if !aliases.contains(&alias.as_str()) {
                    aliases.push(alias.as_str());
                }
            }
        });
        aliases
    }

    /// Pre-order traversal.
    fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Node),
    {
        visit(self);
        match self {
            Node::Row { .. } | Node::Keyword(_) | Node::Constant { .. } => {}
            Node::Member { owner, .. } => {
                if let Some(owner) = owner {
                    owner.walk(visit);
                }
            }
            Node::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Node::Unary { operand, .. } => operand.walk(visit),
            Node::Call(call) => {
                if let Some(target) = &call.target {
                    target.walk(visit);
                }
                for arg in &call.args {
                    arg.walk(visit);
                }
            }
            Node::Conditional {
                test,
                when_true,
                when_false,
            } => {
                test.walk(visit);
                when_true.walk(visit);
                when_false.walk(visit);
            }
            Node::Projection { fields } => {
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            Node::ArrayIndex { array, .. } => array.walk(visit),
        }
    }
}
