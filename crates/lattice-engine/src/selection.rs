//! Field-selection input.
//!
//! The query-language parser lives outside this crate; it hands the engine
//! a tree of [`Selection`] nodes (field name, arguments, child selections).
//! Argument values of the form `"$name"` are indirections into the
//! execution's variable map; `"$$x"` escapes a literal leading dollar.

use crate::error::ResolveError;
use lattice_core::Value;
use std::collections::BTreeMap;

/// Variable bindings for one execution.
pub type Variables = BTreeMap<String, Value>;

/// One node of an externally-parsed field-selection tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub name: String,
    pub arguments: BTreeMap<String, Value>,
    pub children: Vec<Selection>,
}

impl Selection {
    /// A selection of `name` with no arguments or children.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Add a child selection.
    pub fn child(mut self, child: Selection) -> Self {
        self.children.push(child);
        self
    }
}

/// Resolve every `$variable` indirection in an argument map.
pub(crate) fn resolve_arguments(
    arguments: &BTreeMap<String, Value>,
    variables: &Variables,
) -> Result<BTreeMap<String, Value>, ResolveError> {
    arguments
        .iter()
        .map(|(name, raw)| Ok((name.clone(), resolve_argument(raw, variables)?)))
        .collect()
}

fn resolve_argument(raw: &Value, variables: &Variables) -> Result<Value, ResolveError> {
    if let Value::String(s) = raw {
        if let Some(reference) = s.strip_prefix('$') {
            if let Some(literal) = reference.strip_prefix('$') {
                return Ok(Value::String(format!("${literal}")));
            }
            return variables
                .get(reference)
                .cloned()
                .ok_or_else(|| ResolveError::UnknownVariable(reference.to_string()));
        }
    }
    Ok(raw.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_substitution() {
        let mut variables = Variables::new();
        variables.insert("id".to_string(), json!("w1"));

        let args = Selection::field("x").arg("name", "$id").arguments;
        let resolved = resolve_arguments(&args, &variables).unwrap();
        assert_eq!(resolved.get("name"), Some(&json!("w1")));
    }

    #[test]
    fn test_missing_variable_errors() {
        let args = Selection::field("x").arg("name", "$nope").arguments;
        let err = resolve_arguments(&args, &Variables::new()).unwrap_err();
        assert_eq!(err, ResolveError::UnknownVariable("nope".to_string()));
    }

    #[test]
    fn test_double_dollar_escapes_literal() {
        let args = Selection::field("x").arg("name", "$$literal").arguments;
        let resolved = resolve_arguments(&args, &Variables::new()).unwrap();
        assert_eq!(resolved.get("name"), Some(&json!("$literal")));
    }

    #[test]
    fn test_plain_values_pass_through() {
        let args = Selection::field("x").arg("limit", 5).arguments;
        let resolved = resolve_arguments(&args, &Variables::new()).unwrap();
        assert_eq!(resolved.get("limit"), Some(&json!(5)));
    }
}
