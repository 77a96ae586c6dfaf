//! Query paths.
//!
//! Every structured error points at the field it occurred on with a path of
//! field names and list indices, so callers can tell "this one relationship
//! failed" apart from "the whole query failed".

use serde::Serialize;
use std::fmt;

/// One step of a query path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Path from the response root to one field or list element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryPath {
    segments: Vec<PathSegment>,
}

impl QueryPath {
    /// Path to a root field.
    pub fn root(field: &str) -> Self {
        Self {
            segments: vec![PathSegment::Field(field.to_string())],
        }
    }

    /// Extend with a field step.
    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.to_string()));
        Self { segments }
    }

    /// Extend with a list-index step.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mixes_fields_and_indices() {
        let path = QueryPath::root("a_listWidgets").index(1).field("gadget");
        assert_eq!(path.to_string(), "a_listWidgets[1].gadget");
    }

    #[test]
    fn test_serializes_as_flat_array() {
        let path = QueryPath::root("a_getWidget").field("gadget").index(0);
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json, serde_json::json!(["a_getWidget", "gadget", 0]));
    }
}
