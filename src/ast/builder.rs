//! Fluent constructors for expression trees.
//!
//! ```ignore
//! let adults = Node::column("p", "Age").ge(18).and(Node::column("p", "Name").contains("an"));
//! let by_id = Node::column("p", "Id").eq(Node::var("id", 42));
//! ```

use chrono::NaiveDateTime;

use super::types::{BinaryOperator, Call, DeclaredType, Node, UnaryOperator, Value};

impl Node {
    // ==================== Constructors ====================

    /// The statement's row variable.
    pub fn row(alias: impl Into<String>) -> Self {
        Node::Row {
            alias: alias.into(),
        }
    }

    /// `alias.name` column reference.
    pub fn column(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Node::Member {
            name: name.into(),
            owner: Some(Box::new(Node::row(alias))),
            declared_type: DeclaredType::Unknown,
        }
    }

    /// Boolean column; rendered with an explicit comparison in WHERE clauses.
    pub fn bool_column(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Node::column(alias, name).typed(DeclaredType::Bool)
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        let value = value.into();
        Node::Constant {
            declared_type: value.declared_type(),
            value,
        }
    }

    /// A bare word for renderers that read it, e.g. the unit of `DateDiff`.
    pub fn keyword(word: impl Into<String>) -> Self {
        Node::Keyword(word.into())
    }

    pub fn null() -> Self {
        Node::lit(Value::Null)
    }

    /// A captured environment. Members of it are rebound on every compile.
    pub fn env(record: Value) -> Self {
        Node::Constant {
            value: record,
            declared_type: DeclaredType::Record,
        }
    }

    /// A single captured variable.
    pub fn var(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        Node::env(Value::record([(name.clone(), value.into())])).member(name)
    }

    /// The current instant, evaluated each time a statement is rendered.
    pub fn now() -> Self {
        Node::Member {
            name: "Now".to_string(),
            owner: None,
            declared_type: DeclaredType::DateTime,
        }
    }

    pub fn utc_now() -> Self {
        Node::Member {
            name: "UtcNow".to_string(),
            owner: None,
            declared_type: DeclaredType::DateTime,
        }
    }

    /// Member access. The declared type is taken from the captured value when
    /// the owner is a value site.
    pub fn member(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let declared_type = self
            .static_value()
            .and_then(|v| v.field(&name))
            .map(Value::declared_type)
            .unwrap_or(DeclaredType::Unknown);
        Node::Member {
            name,
            owner: Some(Box::new(self)),
            declared_type,
        }
    }

    pub fn index(self, index: usize) -> Self {
        Node::ArrayIndex {
            array: Box::new(self),
            index,
        }
    }

    /// Overrides the declared type of a member or constant.
    pub fn typed(self, ty: DeclaredType) -> Self {
        match self {
            Node::Member { name, owner, .. } => Node::Member {
                name,
                owner,
                declared_type: ty,
            },
            Node::Constant { value, .. } => Node::Constant {
                value,
                declared_type: ty,
            },
            other => other,
        }
    }

    /// Value reachable at build time through constants and captured members.
    pub fn static_value(&self) -> Option<&Value> {
        match self {
            Node::Constant { value, .. } => Some(value),
            Node::Member {
                name,
                owner: Some(owner),
                ..
            } => owner.static_value()?.field(name),
            Node::ArrayIndex { array, index } => array.static_value()?.element(*index),
            _ => None,
        }
    }

    // ==================== Operators ====================

    fn binary(self, op: BinaryOperator, other: impl Into<Node>) -> Self {
        Node::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Eq, other)
    }

    pub fn ne(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::NotEq, other)
    }

    pub fn gt(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Gt, other)
    }

    pub fn lt(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Lt, other)
    }

    pub fn ge(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::GtEq, other)
    }

    pub fn le(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::LtEq, other)
    }

    pub fn and(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::And, other)
    }

    pub fn or(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Or, other)
    }

    pub fn add(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Add, other)
    }

    pub fn sub(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Subtract, other)
    }

    pub fn mul(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Multiply, other)
    }

    pub fn div(self, other: impl Into<Node>) -> Self {
        self.binary(BinaryOperator::Divide, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Node::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(self),
        }
    }

    pub fn neg(self) -> Self {
        Node::Unary {
            op: UnaryOperator::Negate,
            operand: Box::new(self),
        }
    }

    // ==================== Calls ====================

    /// Free function call resolved through the dialect's function table.
    pub fn call(function: impl Into<String>, args: Vec<Node>) -> Self {
        Node::Call(Call {
            function: function.into(),
            target: None,
            args,
        })
    }

    /// Method-style call with `self` as the receiver.
    pub fn method(self, function: impl Into<String>, args: Vec<Node>) -> Self {
        Node::Call(Call {
            function: function.into(),
            target: Some(Box::new(self)),
            args,
        })
    }

    pub fn contains(self, pattern: impl Into<Node>) -> Self {
        self.method("Contains", vec![pattern.into()])
    }

    pub fn starts_with(self, pattern: impl Into<Node>) -> Self {
        self.method("StartsWith", vec![pattern.into()])
    }

    pub fn ends_with(self, pattern: impl Into<Node>) -> Self {
        self.method("EndsWith", vec![pattern.into()])
    }

    pub fn in_list(self, values: impl Into<Node>) -> Self {
        Node::call("In", vec![self, values.into()])
    }

    pub fn not_in(self, values: impl Into<Node>) -> Self {
        Node::call("NotIn", vec![self, values.into()])
    }

    pub fn count(self) -> Self {
        Node::call("Count", vec![self])
    }

    pub fn sum(self) -> Self {
        Node::call("Sum", vec![self])
    }

    pub fn avg(self) -> Self {
        Node::call("Avg", vec![self])
    }

    pub fn min(self) -> Self {
        Node::call("Min", vec![self])
    }

    pub fn max(self) -> Self {
        Node::call("Max", vec![self])
    }

    /// `CAST(self AS <dialect type for ty>)`.
    pub fn cast(self, ty: DeclaredType) -> Self {
        Node::call("Cast", vec![self, Node::keyword(ty.name())])
    }

    /// Wraps a captured statement so it renders as a parenthesized sub-query.
    pub fn sub_query(name: impl Into<String>, statement: crate::statement::Statement) -> Self {
        Node::call("SubQuery", vec![Node::var(name, statement)])
    }

    // ==================== Structure ====================

    pub fn case_when(test: Node, when_true: impl Into<Node>, when_false: impl Into<Node>) -> Self {
        Node::Conditional {
            test: Box::new(test),
            when_true: Box::new(when_true.into()),
            when_false: Box::new(when_false.into()),
        }
    }

    pub fn project<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Node)>,
        S: Into<String>,
    {
        Node::Projection {
            fields: fields.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        Node::lit(v)
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::lit(v)
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Self {
        Node::lit(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::lit(v)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::lit(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::lit(v)
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::lit(v)
    }
}

impl From<NaiveDateTime> for Node {
    fn from(v: NaiveDateTime) -> Self {
        Node::lit(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_infers_declared_type() {
        let flag = Node::var("active", true);
        assert_eq!(flag.declared_type(), DeclaredType::Bool);
        assert!(flag.is_value_site());
        assert_eq!(flag.static_value(), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_nested_env_member() {
        let env = Node::env(Value::record([(
            "filter",
            Value::record([("ids", Value::from(vec![4, 5]))]),
        )]));
        let second = env.member("filter").member("ids").index(1);
        assert_eq!(second.static_value(), Some(&Value::Int(5)));
    }

    #[test]
    fn test_column_is_not_value_site() {
        let col = Node::column("p", "Id");
        assert_eq!(col.column_name(), Some("Id"));
        assert!(!col.is_value_site());
    }

    #[test]
    fn test_value_sites_preorder() {
        let tree = Node::column("p", "A")
            .eq(1)
            .and(Node::column("p", "B").in_list(Node::var("ids", vec![1, 2])));
        let sites = tree.value_sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0], &Node::lit(1));
    }
}
