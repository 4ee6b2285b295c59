/// Canonical shape signature of an expression tree.
///
/// Two trees share a signature exactly when they compile to the same SQL
/// template: structure, names, declared types, keywords and inlined literals
/// (booleans, NULL) take part, parameter values do not.
use std::fmt::Write;

use super::types::{Node, UnaryOperator, Value};

pub fn of(node: &Node) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &Node) {
    // Writing to a String cannot fail.
    let _ = match node {
        Node::Row { alias } => write!(out, "R{:?}", alias),
        Node::Member {
            name,
            owner,
            declared_type,
        } => {
            let _ = write!(out, "M{:?}:{}", name, declared_type);
            if let Some(owner) = owner {
                out.push('<');
                write_node(out, owner);
                out.push('>');
            }
            Ok(())
        }
        Node::Constant {
            value,
            declared_type,
        } => match value {
            Value::Bool(b) => write!(out, "B{}", b),
            Value::Null => write!(out, "N"),
            Value::Record(_) => write!(out, "E"),
            _ => write!(out, "C:{}", declared_type),
        },
        Node::Binary { op, left, right } => {
            out.push('(');
            write_node(out, left);
            let _ = write!(out, " {} ", op.token());
            write_node(out, right);
            out.push(')');
            Ok(())
        }
        Node::Unary { op, operand } => {
            out.push_str(match op {
                UnaryOperator::Not => "!(",
                UnaryOperator::Negate => "-(",
            });
            write_node(out, operand);
            out.push(')');
            Ok(())
        }
        Node::Call(call) => {
            let _ = write!(out, "F{:?}", call.function);
            if let Some(target) = &call.target {
                out.push('<');
                write_node(out, target);
                out.push('>');
            }
            out.push('(');
            for (i, arg) in call.args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(out, arg);
            }
            out.push(')');
            Ok(())
        }
        Node::Conditional {
            test,
            when_true,
            when_false,
        } => {
            out.push_str("?(");
            write_node(out, test);
            out.push(',');
            write_node(out, when_true);
            out.push(',');
            write_node(out, when_false);
            out.push(')');
            Ok(())
        }
        Node::Projection { fields } => {
            out.push_str("P(");
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{:?}=", name);
                write_node(out, value);
            }
            out.push(')');
            Ok(())
        }
        Node::ArrayIndex { array, index } => {
            write_node(out, array);
            write!(out, "[{}]", index)
        }
        Node::Keyword(word) => write!(out, "K{:?}", word),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_do_not_affect_signature() {
        let a = Node::column("p", "Id").eq(Node::var("id", 1));
        let b = Node::column("p", "Id").eq(Node::var("id", 2));
        assert_eq!(of(&a), of(&b));

        let a = Node::column("p", "Id").eq(1);
        let b = Node::column("p", "Id").eq(99);
        assert_eq!(of(&a), of(&b));
    }

    #[test]
    fn test_structure_changes_signature() {
        let a = Node::column("p", "Id").eq(1);
        let b = Node::column("p", "Id").ne(1);
        let c = Node::column("p", "Code").eq(1);
        let d = Node::column("p", "Id").eq("1");
        assert_ne!(of(&a), of(&b));
        assert_ne!(of(&a), of(&c));
        assert_ne!(of(&a), of(&d));
    }

    #[test]
    fn test_inlined_literals_are_part_of_signature() {
        assert_ne!(of(&Node::lit(true)), of(&Node::lit(false)));
    }

    #[test]
    fn test_keyword_arguments_are_part_of_signature() {
        let diff = |unit: &str| {
            Node::call(
                "DateDiff",
                vec![Node::keyword(unit), Node::column("p", "A"), Node::column("p", "B")],
            )
        };
        assert_ne!(of(&diff("day")), of(&diff("hour")));
        assert_ne!(
            of(&Node::column("p", "A").cast(crate::ast::DeclaredType::Int)),
            of(&Node::column("p", "A").cast(crate::ast::DeclaredType::Text))
        );
    }

    #[test]
    fn test_text_arguments_do_not_affect_signature() {
        let prefix = |text: &str| Node::column("p", "Name").starts_with(text);
        assert_eq!(of(&prefix("ab")), of(&prefix("cd")));
        let nick = |text: &str| {
            Node::call("IfNull", vec![Node::column("p", "Nick"), Node::lit(text)])
        };
        assert_eq!(of(&nick("n/a")), of(&nick("-")));
    }

    #[test]
    fn test_names_are_quoted() {
        // A crafted column name must not collide with a structural marker.
        let a = Node::column("p", "A").eq(1);
        let b = Node::column("p", "A\"):Unknown<R\"p\">) = C:Int");
        assert_ne!(of(&a), of(&b));
    }
}
