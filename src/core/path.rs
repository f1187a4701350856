use std::fmt;

use serde::{Deserialize, Serialize};

/// Dotted path addressing a feature or attribute from the root of a
/// feature diagram. Segments are feature names, or the sibling index for
/// anonymous features (`"0"`, `"1"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Extend the path with one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }
        Self {
            segments: s.split('.').map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_and_display() {
        let p = Path::root().child("Root").child("a");
        assert_eq!(p.to_string(), "Root.a");
        assert_eq!(p.last(), Some("a"));
    }

    #[test]
    fn test_from_str() {
        let p = Path::from("Root.0.size");
        assert_eq!(p.segments().len(), 3);
        assert_eq!(p.to_string(), "Root.0.size");
    }
}
