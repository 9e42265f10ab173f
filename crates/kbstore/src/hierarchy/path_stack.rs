//! Per-knowledge-base stack of path segments.
//!
//! The stack always starts with the knowledge-base name. Header nodes push
//! a `(link, name)` pair and must be left with the identical pair.

use crate::error::KbError;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStack {
    root: String,
    segments: Vec<String>,
}

impl PathStack {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            segments: vec![root.clone()],
            root,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when only the root segment remains.
    pub fn is_closed(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == self.root
    }

    /// The materialized path of the current stack.
    pub fn path(&self) -> String {
        let mut sep = [0; 4];
        self.segments.join(&*SEPARATOR.encode_utf8(&mut sep))
    }

    /// The path a `(link, name)` pair would produce if entered now.
    pub fn child_path(&self, link: &str, name: &str) -> String {
        format!("{}{SEPARATOR}{link}{SEPARATOR}{name}", self.path())
    }

    pub fn enter(&mut self, link: &str, name: &str) {
        self.segments.push(link.to_string());
        self.segments.push(name.to_string());
    }

    /// Pops `(link, name)`, checking it matches the top of the stack.
    ///
    /// On mismatch the popped segments are restored and a structural error
    /// naming both pairs is returned. The root segment is never popped.
    pub fn leave(&mut self, link: &str, name: &str) -> Result<(), KbError> {
        if self.segments.len() < 3 {
            return Err(KbError::Structural {
                expected_link: link.to_string(),
                expected_name: name.to_string(),
                actual_link: None,
                actual_name: None,
            });
        }

        let actual_name = self.segments.pop().unwrap_or_default();
        let actual_link = self.segments.pop().unwrap_or_default();

        if actual_link == link && actual_name == name {
            return Ok(());
        }

        self.segments.push(actual_link.clone());
        self.segments.push(actual_name.clone());
        Err(KbError::Structural {
            expected_link: link.to_string(),
            expected_name: name.to_string(),
            actual_link: Some(actual_link),
            actual_name: Some(actual_name),
        })
    }
}

impl std::fmt::Display for PathStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.segments.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stack_is_closed() {
        let stack = PathStack::new("kb1");
        assert!(stack.is_closed());
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.path(), "kb1");
    }

    #[test]
    fn test_enter_and_leave() {
        let mut stack = PathStack::new("kb1");
        stack.enter("site", "s1");
        stack.enter("node", "n1");
        assert_eq!(stack.path(), "kb1.site.s1.node.n1");
        assert_eq!(stack.depth(), 5);
        assert_eq!(stack.path().split(SEPARATOR).count(), stack.depth());

        stack.leave("node", "n1").unwrap();
        stack.leave("site", "s1").unwrap();
        assert!(stack.is_closed());
    }

    #[test]
    fn test_child_path() {
        let mut stack = PathStack::new("kb1");
        stack.enter("site", "s1");
        assert_eq!(stack.child_path("node", "n1"), "kb1.site.s1.node.n1");
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn test_mismatch_restores_stack() {
        let mut stack = PathStack::new("kb1");
        stack.enter("site", "s1");

        let err = stack.leave("site", "s2").unwrap_err();
        match err {
            KbError::Structural {
                expected_name,
                actual_name,
                ..
            } => {
                assert_eq!(expected_name, "s2");
                assert_eq!(actual_name.as_deref(), Some("s1"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stack.path(), "kb1.site.s1");

        stack.leave("site", "s1").unwrap();
        assert!(stack.is_closed());
    }

    #[test]
    fn test_swapped_pair_is_a_mismatch() {
        let mut stack = PathStack::new("kb1");
        stack.enter("site", "s1");
        assert!(stack.leave("s1", "site").is_err());
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn test_leave_on_shallow_stack_keeps_root() {
        let mut stack = PathStack::new("kb1");
        let err = stack.leave("site", "s1").unwrap_err();
        assert!(matches!(
            err,
            KbError::Structural {
                actual_link: None,
                actual_name: None,
                ..
            }
        ));
        assert!(stack.is_closed());
    }

    #[test]
    fn test_display_lists_segments() {
        let mut stack = PathStack::new("kb1");
        stack.enter("site", "s1");
        assert_eq!(stack.to_string(), "[kb1, site, s1]");
    }
}
