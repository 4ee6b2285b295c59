/// Building blocks for function renderers.
///
/// Renderers receive the compiler and the raw call; the helpers here render
/// the call's arguments and hand the resulting SQL fragments to a formatter.
use std::sync::Arc;

use super::{DialectProfile, FunctionRenderer};
use crate::ast::{Call, DeclaredType, ExprCompiler, FormatTemplate, Node};
use crate::error::CompileError;

/// Wraps a closure as a renderer.
pub fn renderer<F>(f: F) -> FunctionRenderer
where
    F: Fn(&mut ExprCompiler<'_>, &Call) -> Result<(), CompileError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Argument `index` of a call, counting the receiver (or first argument) as 0.
pub fn argument(call: &Call, index: usize) -> Result<&Node, CompileError> {
    let node = if index == 0 {
        call.subject()
    } else {
        call.operands().get(index - 1)
    };
    node.ok_or_else(|| CompileError::MissingArgument {
        function: call.function.clone(),
        index,
    })
}

fn argument_count(call: &Call) -> usize {
    call.args.len() + usize::from(call.target.is_some())
}

/// Renders between `min` and `max` arguments and formats them.
pub fn ranged<F>(min: usize, max: usize, format: F) -> FunctionRenderer
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    renderer(move |c, call| {
        let count = argument_count(call);
        if count > max {
            return Err(CompileError::InvalidArgument {
                function: call.function.clone(),
                reason: format!("expected at most {} arguments, got {}", max, count),
            });
        }
        let mut args = Vec::with_capacity(count);
        for i in 0..count.max(min) {
            let node = argument(call, i)?;
            args.push(c.render(node)?);
        }
        c.push(format(&args));
        Ok(())
    })
}

/// Renders exactly `arity` arguments and formats them.
pub fn fixed<F>(arity: usize, format: F) -> FunctionRenderer
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    ranged(arity, arity, format)
}

/// `NAME(x)`
pub fn unary(sql_name: &'static str) -> FunctionRenderer {
    fixed(1, move |a| format!("{}({})", sql_name, a[0]))
}

/// `NAME(x, y)`
pub fn binary(sql_name: &'static str) -> FunctionRenderer {
    fixed(2, move |a| format!("{}({}, {})", sql_name, a[0], a[1]))
}

/// `COUNT(x)`, or `COUNT(1)` without an argument.
pub fn count() -> FunctionRenderer {
    ranged(0, 1, |a| match a.first() {
        Some(x) => format!("COUNT({})", x),
        None => "COUNT(1)".to_string(),
    })
}

/// `x LIKE <pattern>` with the pattern bound through `template`.
pub fn like(template: FormatTemplate) -> FunctionRenderer {
    renderer(move |c, call| {
        let subject = argument(call, 0)?;
        let pattern = argument(call, 1)?;
        if !pattern.is_value_site() {
            return Err(CompileError::InvalidArgument {
                function: call.function.clone(),
                reason: "pattern must be a literal or captured value".to_string(),
            });
        }
        let subject = c.render(subject)?;
        c.set_template(template.clone());
        let pattern = c.render(pattern)?;
        c.push(format!("{} LIKE {}", subject, pattern));
        Ok(())
    })
}

/// `Contains` on a string column is a `LIKE`; on a captured collection it is
/// set membership.
pub fn contains() -> FunctionRenderer {
    let pattern_match = like(FormatTemplate::contains());
    renderer(move |c, call| {
        let subject = argument(call, 0)?;
        if subject.is_value_site() {
            let value = c.render(argument(call, 1)?)?;
            let list = c.render(subject)?;
            c.push(format!("{} IN ({})", value, list));
            Ok(())
        } else {
            pattern_match(c, call)
        }
    })
}

/// `x [NOT] IN (list)`
pub fn membership(negated: bool) -> FunctionRenderer {
    let keyword = if negated { "NOT IN" } else { "IN" };
    fixed(2, move |a| format!("{} {} ({})", a[0], keyword, a[1]))
}

/// `ROUND(x[, digits])`; `require_digits` fills in 0 for dialects that need it.
pub fn round(require_digits: bool) -> FunctionRenderer {
    ranged(1, 2, move |a| match a.get(1) {
        Some(digits) => format!("ROUND({}, {})", a[0], digits),
        None if require_digits => format!("ROUND({}, 0)", a[0]),
        None => format!("ROUND({})", a[0]),
    })
}

/// `NAME(x, start[, length])`; `length_fn` supplies a length for dialects
/// where it is mandatory.
pub fn substring(sql_name: &'static str, length_fn: Option<&'static str>) -> FunctionRenderer {
    ranged(2, 3, move |a| match (a.get(2), length_fn) {
        (Some(len), _) => format!("{}({}, {}, {})", sql_name, a[0], a[1], len),
        (None, Some(length_fn)) => {
            format!("{}({}, {}, {}({}))", sql_name, a[0], a[1], length_fn, a[0])
        }
        (None, None) => format!("{}({}, {})", sql_name, a[0], a[1]),
    })
}

/// `REPLACE(x, from, to)`
pub fn replace() -> FunctionRenderer {
    fixed(3, |a| format!("REPLACE({}, {}, {})", a[0], a[1], a[2]))
}

/// `(x = y)`
pub fn equals() -> FunctionRenderer {
    fixed(2, |a| format!("({} = {})", a[0], a[1]))
}

/// `(sub-query)`
pub fn sub_query() -> FunctionRenderer {
    fixed(1, |a| format!("({})", a[0]))
}

fn cast_to(c: &mut ExprCompiler<'_>, node: &Node, ty: DeclaredType) -> Result<(), CompileError> {
    let sql_type = c
        .profile()
        .type_name(ty)
        .ok_or_else(|| CompileError::UnsupportedConversion(ty.name().to_string()))?;
    let value = c.render(node)?;
    c.push(format!("CAST({} AS {})", value, sql_type));
    Ok(())
}

/// Conversion to a fixed type through the dialect's type table.
pub fn conversion(ty: DeclaredType) -> FunctionRenderer {
    renderer(move |c, call| {
        let node = argument(call, 0)?;
        cast_to(c, node, ty)
    })
}

/// `Cast(x, TypeName)` with the type given as a keyword.
pub fn cast() -> FunctionRenderer {
    renderer(|c, call| {
        let node = argument(call, 0)?;
        let name = c.keyword_text(argument(call, 1)?, &call.function)?;
        let ty = DeclaredType::from_name(&name)
            .ok_or_else(|| CompileError::UnsupportedConversion(name.clone()))?;
        cast_to(c, node, ty)
    })
}

/// Units for date arithmetic and extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateUnit {
    pub const ALL: [DateUnit; 6] = [
        DateUnit::Year,
        DateUnit::Month,
        DateUnit::Day,
        DateUnit::Hour,
        DateUnit::Minute,
        DateUnit::Second,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            DateUnit::Year => "YEAR",
            DateUnit::Month => "MONTH",
            DateUnit::Day => "DAY",
            DateUnit::Hour => "HOUR",
            DateUnit::Minute => "MINUTE",
            DateUnit::Second => "SECOND",
        }
    }

    /// Name of the date-add function for this unit (`AddYears`, ...).
    pub fn add_function(&self) -> &'static str {
        match self {
            DateUnit::Year => "AddYears",
            DateUnit::Month => "AddMonths",
            DateUnit::Day => "AddDays",
            DateUnit::Hour => "AddHours",
            DateUnit::Minute => "AddMinutes",
            DateUnit::Second => "AddSeconds",
        }
    }

    pub fn seconds(&self) -> Option<u32> {
        match self {
            DateUnit::Day => Some(86_400),
            DateUnit::Hour => Some(3_600),
            DateUnit::Minute => Some(60),
            DateUnit::Second => Some(1),
            DateUnit::Year | DateUnit::Month => None,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let unit = text.trim().trim_end_matches(['s', 'S']);
        DateUnit::ALL
            .into_iter()
            .find(|u| u.keyword().eq_ignore_ascii_case(unit))
    }
}

/// Registers `AddYears`..`AddSeconds`; `format(unit, date, amount)`.
pub fn register_date_add(profile: &DialectProfile, format: fn(DateUnit, &str, &str) -> String) {
    for unit in DateUnit::ALL {
        profile.register_function(
            unit.add_function(),
            fixed(2, move |a| format(unit, &a[0], &a[1])),
        );
    }
}

/// Registers `Year`, `Month` and `Day` extraction; `format(unit, date)`.
pub fn register_date_parts(profile: &DialectProfile, format: fn(DateUnit, &str) -> String) {
    for (name, unit) in [
        ("Year", DateUnit::Year),
        ("Month", DateUnit::Month),
        ("Day", DateUnit::Day),
    ] {
        profile.register_function(name, fixed(1, move |a| format(unit, &a[0])));
    }
}

/// `DateDiff(unit, start, end)` with the unit given as a keyword;
/// `format(unit, start, end)`.
pub fn date_diff(format: fn(DateUnit, &str, &str) -> String) -> FunctionRenderer {
    renderer(move |c, call| {
        let text = c.keyword_text(argument(call, 0)?, &call.function)?;
        let unit = DateUnit::parse(&text).ok_or_else(|| CompileError::InvalidArgument {
            function: call.function.clone(),
            reason: format!("unknown date unit '{}'", text),
        })?;
        let start = c.render(argument(call, 1)?)?;
        let end = c.render(argument(call, 2)?)?;
        c.push(format(unit, &start, &end));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_unit_parse() {
        assert_eq!(DateUnit::parse("day"), Some(DateUnit::Day));
        assert_eq!(DateUnit::parse("Months"), Some(DateUnit::Month));
        assert_eq!(DateUnit::parse("fortnight"), None);
    }

    #[test]
    fn test_argument_indexing() {
        let call = Call {
            function: "Replace".into(),
            target: Some(Box::new(Node::column("p", "Name"))),
            args: vec![Node::lit("a"), Node::lit("b")],
        };
        assert_eq!(argument(&call, 0).unwrap(), &Node::column("p", "Name"));
        assert_eq!(argument(&call, 2).unwrap(), &Node::lit("b"));
        assert_eq!(
            argument(&call, 3).unwrap_err(),
            CompileError::MissingArgument {
                function: "Replace".into(),
                index: 3
            }
        );
    }
}
