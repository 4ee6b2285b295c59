/// Expression compiler.
///
/// Renders a [`Node`] tree into dialect-specific SQL. Every value that is not
/// a boolean or NULL literal becomes a placeholder token (`{{n}}`) plus a
/// [`PlanEntry`] recording where the value lives, so a cached template can be
/// rebound against a structurally identical tree without compiling again.
///
/// Output is built on an explicit text stack: each visit pushes fragments and
/// renderers may pop a sub-rendering with [`ExprCompiler::render`].
use std::fmt;

use chrono::{Local, Utc};

use super::signature;
use super::types::{BinaryOperator, Call, DeclaredType, Node, UnaryOperator, Value};
use crate::dialect::{Dialect, DialectProfile};
use crate::error::{CacheConsistencyError, CompileError};
use crate::scan;

/// Clause a tree is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveMode {
    Where,
    Select,
    GroupBy,
    OrderBy,
    ColumnList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolveOptions {
    pub mode: ResolveMode,
    /// Render `column` instead of `alias.column`.
    pub ignore_alias: bool,
    /// Render column names without identifier quotes.
    pub ignore_identifier: bool,
}

impl ResolveOptions {
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            ignore_alias: false,
            ignore_identifier: false,
        }
    }

    pub fn where_clause() -> Self {
        Self::new(ResolveMode::Where)
    }

    pub fn select() -> Self {
        Self::new(ResolveMode::Select)
    }

    pub fn without_alias(mut self) -> Self {
        self.ignore_alias = true;
        self
    }

    pub fn without_identifier_quotes(mut self) -> Self {
        self.ignore_identifier = true;
        self
    }

    pub(crate) fn cache_key(&self) -> String {
        format!(
            "{:?}:{}{}",
            self.mode, self.ignore_alias as u8, self.ignore_identifier as u8
        )
    }
}

/// One step from a captured root towards a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Member(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Member(name) => write!(f, ".{}", name),
            PathStep::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Where a parameter value is found in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapturedValueRef {
    /// Constant number `site` of the tree's pre-order value sites, followed
    /// through `path`. An empty path is a plain literal.
    Site { site: usize, path: Vec<PathStep> },
    /// The current instant, evaluated on every bind.
    Now { utc: bool },
}

impl CapturedValueRef {
    fn last_member(&self) -> Option<&str> {
        match self {
            CapturedValueRef::Site { path, .. } => path.iter().rev().find_map(|step| match step {
                PathStep::Member(name) => Some(name.as_str()),
                PathStep::Index(_) => None,
            }),
            CapturedValueRef::Now { .. } => Some("Now"),
        }
    }

    /// Pulls the value this reference points at out of `sites`.
    pub fn resolve(&self, sites: &[&Node]) -> Result<Value, CacheConsistencyError> {
        let (site, path) = match self {
            CapturedValueRef::Now { utc: false } => {
                return Ok(Value::DateTime(Local::now().naive_local()))
            }
            CapturedValueRef::Now { utc: true } => return Ok(Value::DateTime(Utc::now().naive_utc())),
            CapturedValueRef::Site { site, path } => (*site, path),
        };
        let mut value = match sites.get(site) {
            Some(Node::Constant { value, .. }) => value,
            _ => return Err(CacheConsistencyError::MissingSite { site }),
        };
        for step in path {
            let next = match step {
                PathStep::Member(name) => value.field(name),
                PathStep::Index(i) => value.element(*i),
            };
            value = next.ok_or_else(|| CacheConsistencyError::BrokenPath {
                site,
                step: step.to_string(),
            })?;
        }
        Ok(value.clone())
    }
}

/// One-shot pattern applied to the next bound value (`LIKE` support).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTemplate(String);

impl FormatTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn contains() -> Self {
        Self::new("%{0}%")
    }

    pub fn starts_with() -> Self {
        Self::new("{0}%")
    }

    pub fn ends_with() -> Self {
        Self::new("%{0}")
    }

    pub fn apply(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        Value::Text(self.0.replace("{0}", &value.display_text()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub token: String,
    pub source: CapturedValueRef,
    pub template: Option<FormatTemplate>,
    /// Base for the generated parameter name.
    pub hint: String,
}

/// Cached output of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFragment {
    pub dialect: Dialect,
    pub sql_template: String,
    pub parameter_plan: Vec<PlanEntry>,
    pub signature: String,
}

/// A fresh fragment together with the values seen while compiling it.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub fragment: CompiledFragment,
    pub values: Vec<Value>,
}

pub struct ExprCompiler<'a> {
    profile: &'a DialectProfile,
    options: ResolveOptions,
    sites: Vec<&'a Node>,
    out: Vec<String>,
    plan: Vec<PlanEntry>,
    values: Vec<Value>,
    template: Option<FormatTemplate>,
    hints: Vec<String>,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(profile: &'a DialectProfile, options: ResolveOptions) -> Self {
        Self {
            profile,
            options,
            sites: Vec::new(),
            out: Vec::new(),
            plan: Vec::new(),
            values: Vec::new(),
            template: None,
            hints: Vec::new(),
        }
    }

    pub fn compile(mut self, root: &'a Node) -> Result<Compilation, CompileError> {
        self.sites = root.value_sites();
        self.visit_root(root)?;
        Ok(Compilation {
            fragment: CompiledFragment {
                dialect: self.profile.dialect(),
                sql_template: self.out.concat(),
                parameter_plan: self.plan,
                signature: signature::of(root),
            },
            values: self.values,
        })
    }

    // ==================== Renderer API ====================

    pub fn profile(&self) -> &DialectProfile {
        self.profile
    }

    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    pub fn push(&mut self, text: impl Into<String>) {
        self.out.push(text.into());
    }

    /// Renders `node` and pops the result off the stack.
    pub fn render(&mut self, node: &Node) -> Result<String, CompileError> {
        let mark = self.out.len();
        self.visit(node)?;
        Ok(self.out.split_off(mark).concat())
    }

    /// Like [`render`](Self::render) but turns a bare boolean into a comparison.
    pub fn render_predicate(&mut self, node: &Node) -> Result<String, CompileError> {
        let mark = self.out.len();
        self.visit_predicate(node)?;
        Ok(self.out.split_off(mark).concat())
    }

    /// Sets the template for the next bound value.
    pub fn set_template(&mut self, template: FormatTemplate) {
        self.template = Some(template);
    }

    /// Text of a [`Node::Keyword`] argument, such as a date unit.
    pub fn keyword_text(&self, node: &Node, function: &str) -> Result<String, CompileError> {
        match node {
            Node::Keyword(word) => Ok(word.clone()),
            _ => Err(CompileError::InvalidArgument {
                function: function.to_string(),
                reason: "expected a keyword".to_string(),
            }),
        }
    }

    // ==================== Traversal ====================

    fn visit_root(&mut self, root: &Node) -> Result<(), CompileError> {
        // A lone `true` becomes `<true> = <true>`, i.e. `1 = 1` or `TRUE = TRUE`.
        if self.options.mode == ResolveMode::Where {
            return self.visit_predicate(root);
        }
        self.visit(root)
    }

    fn visit_predicate(&mut self, node: &Node) -> Result<(), CompileError> {
        self.visit(node)?;
        if is_bare_bool(node) {
            let suffix = format!(" = {}", self.profile.true_literal());
            self.push(suffix);
        }
        Ok(())
    }

    fn visit(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Row { alias } => Err(CompileError::UnsupportedNode(format!(
                "row variable '{}' used as a value",
                alias
            ))),
            Node::Member {
                name,
                owner,
                declared_type,
            } => match owner.as_deref() {
                None if *declared_type == DeclaredType::DateTime && name == "Now" => {
                    self.emit_value(CapturedValueRef::Now { utc: false })
                }
                None if *declared_type == DeclaredType::DateTime && name == "UtcNow" => {
                    self.emit_value(CapturedValueRef::Now { utc: true })
                }
                None => Err(CompileError::UnsupportedMember(name.clone())),
                Some(Node::Row { alias }) => {
                    self.push_column(alias, name);
                    Ok(())
                }
                Some(owner) if owner.is_value_site() => self.emit_site(node),
                Some(_) => Err(CompileError::UnsupportedMember(format!(
                    "member '{}' of a computed expression",
                    name
                ))),
            },
            Node::Constant { value, .. } => match value {
                Value::Bool(b) => {
                    let literal = if *b {
                        self.profile.true_literal()
                    } else {
                        self.profile.false_literal()
                    };
                    self.push(literal);
                    Ok(())
                }
                Value::Null => {
                    self.push("NULL");
                    Ok(())
                }
                Value::Record(_) => Err(CompileError::UnsupportedNode(
                    "captured environment used as a value".to_string(),
                )),
                _ => self.emit_site(node),
            },
            Node::ArrayIndex { array, .. } => {
                if array.is_value_site() {
                    self.emit_site(node)
                } else {
                    Err(CompileError::UnsupportedNode(
                        "index into a row column".to_string(),
                    ))
                }
            }
            Node::Keyword(word) => Err(CompileError::UnsupportedNode(format!(
                "keyword '{}' outside a function argument",
                word
            ))),
            Node::Binary { op, left, right } => self.visit_binary(*op, left, right),
            Node::Unary { op, operand } => self.visit_unary(*op, operand),
            Node::Call(call) => self.visit_call(call),
            Node::Conditional {
                test,
                when_true,
                when_false,
            } => {
                self.push("CASE WHEN ");
                self.visit_predicate(test)?;
                self.push(" THEN ");
                self.visit(when_true)?;
                self.push(" ELSE ");
                self.visit(when_false)?;
                self.push(" END");
                Ok(())
            }
            Node::Projection { fields } => {
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.visit(value)?;
                    if self.options.mode == ResolveMode::Select {
                        let alias = format!(" AS {}", self.profile.quote(name));
                        self.push(alias);
                    }
                }
                Ok(())
            }
        }
    }

    fn visit_binary(
        &mut self,
        op: BinaryOperator,
        left: &Node,
        right: &Node,
    ) -> Result<(), CompileError> {
        let hint = left.column_name().or_else(|| right.column_name()).map(String::from);
        self.with_hint(hint, |c| {
            // `x = NULL` never matches; emit the null test instead.
            if op.is_equality() {
                let null_side = match (left, right) {
                    (other, Node::Constant { value: Value::Null, .. })
                    | (Node::Constant { value: Value::Null, .. }, other) => Some(other),
                    _ => None,
                };
                if let Some(other) = null_side {
                    c.push("(");
                    c.visit(other)?;
                    c.push(if op == BinaryOperator::Eq {
                        " IS NULL)"
                    } else {
                        " IS NOT NULL)"
                    });
                    return Ok(());
                }
            }

            let logical = matches!(op, BinaryOperator::And | BinaryOperator::Or)
                && c.options.mode == ResolveMode::Where;
            c.push("(");
            if logical {
                c.visit_predicate(left)?;
            } else {
                c.visit(left)?;
            }
            c.push(format!(" {} ", op.token()));
            if logical {
                c.visit_predicate(right)?;
            } else {
                c.visit(right)?;
            }
            c.push(")");
            Ok(())
        })
    }

    fn visit_unary(&mut self, op: UnaryOperator, operand: &Node) -> Result<(), CompileError> {
        match op {
            UnaryOperator::Not => {
                if self.options.mode == ResolveMode::Where && is_bare_bool(operand) {
                    self.visit(operand)?;
                    let suffix = format!(" = {}", self.profile.false_literal());
                    self.push(suffix);
                } else {
                    self.push("NOT (");
                    if self.options.mode == ResolveMode::Where {
                        self.visit_predicate(operand)?;
                    } else {
                        self.visit(operand)?;
                    }
                    self.push(")");
                }
            }
            UnaryOperator::Negate => {
                self.push("-(");
                self.visit(operand)?;
                self.push(")");
            }
        }
        Ok(())
    }

    fn visit_call(&mut self, call: &Call) -> Result<(), CompileError> {
        let renderer = self
            .profile
            .function(&call.function)
            .ok_or_else(|| CompileError::UnknownFunction(call.function.clone()))?;
        let hint = call
            .subject()
            .into_iter()
            .chain(call.operands())
            .find_map(|n| n.column_name())
            .map(String::from);
        let result = self.with_hint(hint, |c| renderer(c, call));
        self.template = None;
        result
    }

    fn with_hint<T>(
        &mut self,
        hint: Option<String>,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let pushed = hint.is_some();
        if let Some(hint) = hint {
            self.hints.push(hint);
        }
        let result = f(self);
        if pushed {
            self.hints.pop();
        }
        result
    }

    fn push_column(&mut self, alias: &str, name: &str) {
        let mut column = String::new();
        if !self.options.ignore_alias {
            column.push_str(alias);
            column.push('.');
        }
        if self.options.ignore_identifier {
            column.push_str(name);
        } else {
            column.push_str(&self.profile.quote(name));
        }
        self.push(column);
    }

    // ==================== Values ====================

    fn emit_site(&mut self, node: &Node) -> Result<(), CompileError> {
        match self.site_ref(node) {
            Some(source) => self.emit_value(source),
            // Constants built by a renderer rather than taken from the tree.
            None => match node.static_value().and_then(inline_literal) {
                Some(literal) => {
                    self.push(literal);
                    Ok(())
                }
                None => Err(CompileError::UnresolvedCapture(
                    "value outside the compiled tree".to_string(),
                )),
            },
        }
    }

    fn site_ref(&self, node: &Node) -> Option<CapturedValueRef> {
        let mut path = Vec::new();
        let mut current = node;
        loop {
            match current {
                Node::Constant { .. } => {
                    let site = self.sites.iter().position(|s| std::ptr::eq(*s, current))?;
                    path.reverse();
                    return Some(CapturedValueRef::Site { site, path });
                }
                Node::Member {
                    name,
                    owner: Some(owner),
                    ..
                } => {
                    path.push(PathStep::Member(name.clone()));
                    current = owner;
                }
                Node::ArrayIndex { array, index } => {
                    path.push(PathStep::Index(*index));
                    current = array;
                }
                _ => return None,
            }
        }
    }

    fn emit_value(&mut self, source: CapturedValueRef) -> Result<(), CompileError> {
        let value = source
            .resolve(&self.sites)
            .map_err(|e| CompileError::UnresolvedCapture(e.to_string()))?;
        let template = self.template.take();

        if let Some(existing) = self
            .plan
            .iter()
            .find(|e| e.source == source && e.template == template)
        {
            let token = existing.token.clone();
            self.push(token);
            return Ok(());
        }

        let hint = self
            .hints
            .last()
            .map(String::as_str)
            .or_else(|| source.last_member())
            .unwrap_or("p")
            .to_string();
        let token = scan::token(self.plan.len());
        self.plan.push(PlanEntry {
            token: token.clone(),
            source,
            template,
            hint,
        });
        self.values.push(value);
        self.push(token);
        Ok(())
    }
}

/// Boolean operand that is not already a predicate.
fn is_bare_bool(node: &Node) -> bool {
    node.is_bool()
        && !matches!(
            node,
            Node::Binary { .. }
                | Node::Call(_)
                | Node::Unary {
                    op: UnaryOperator::Not,
                    ..
                }
        )
}

fn inline_literal(value: &Value) -> Option<String> {
    match value {
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::DateTime(dt) => Some(format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f"))),
        _ => None,
    }
}
