use std::collections::HashMap;

use crate::ast::Value;
use crate::error::ConfigurationError;

/// Insertion-ordered parameter set with unique names.
///
/// Names are stored without the dialect prefix; the prefix is added when the
/// name is written into SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBindings {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl ParameterBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn as_slice(&self) -> &[(String, Value)] {
        &self.entries
    }

    /// Binds `name`. A name that is already bound is an error, never an overwrite.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ConfigurationError::DuplicateParameter(name));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    /// Binds `value` under the first free `{hint}_{n}` name and returns it.
    pub fn bind_fresh(&mut self, hint: &str, value: Value) -> String {
        let hint = sanitize_hint(hint);
        let mut n = 1;
        loop {
            let name = format!("{}_{}", hint, n);
            if !self.index.contains_key(&name) {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name.clone(), value));
                return name;
            }
            n += 1;
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.index.remove(name)?;
        let (_, value) = self.entries.remove(pos);
        for idx in self.index.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        Some(value)
    }

    /// Appends every binding of `other`, failing on the first name clash.
    pub fn extend(&mut self, other: ParameterBindings) -> Result<(), ConfigurationError> {
        for (name, value) in other.entries {
            self.insert(name, value)?;
        }
        Ok(())
    }

    pub fn into_vec(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// Reduces a hint to identifier characters so it is safe after any prefix.
fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match cleaned.chars().next() {
        None => "p".to_string(),
        Some(c) if c.is_ascii_digit() => format!("p{}", cleaned),
        Some(_) => cleaned,
    }
}

/// Strips a trailing `_<n>` counter, recovering the hint a name was made from.
pub fn hint_of(name: &str) -> &str {
    match name.rsplit_once('_') {
        Some((hint, n)) if !hint.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            hint
        }
        _ => name,
    }
}
