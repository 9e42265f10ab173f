//! Hierarchical path patterns.
//!
//! A pattern is a dot-separated list of items:
//!
//! - `site` matches that literal segment, `a|b|c` matches any of them
//! - `*` matches any number of segments, including none
//! - `*{n}` exactly `n` segments, `*{n,}` at least `n`, `*{,m}` at most
//!   `m`, `*{n,m}` between `n` and `m`
//!
//! So `kb1.*{1}.s1` matches `kb1.site.s1` and `kb1.*.KB_JOB_QUEUE.*{1}`
//! matches every job field anywhere under `kb1`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KbError;
use crate::hierarchy::SEPARATOR;

/// How `search_path` compares node paths to its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathOperator {
    /// The node path equals the argument.
    Exact,
    /// The node is the argument or one of its ancestors.
    Ancestor,
    /// The node is the argument or one of its descendants.
    Descendant,
    /// The node path matches the argument as a `PathPattern`.
    Match,
}

impl FromStr for PathOperator {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(PathOperator::Exact),
            "ancestor" => Ok(PathOperator::Ancestor),
            "descendant" => Ok(PathOperator::Descendant),
            "match" => Ok(PathOperator::Match),
            other => Err(KbError::Validation(format!("unknown path operator '{}'", other))),
        }
    }
}

/// True if `ancestor` is `path` or a proper prefix of it on segment
/// boundaries.
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// One segment equal to any of the alternatives.
    Literal(Vec<String>),
    /// Between `min` and `max` (unbounded when `None`) arbitrary segments.
    Gap { min: usize, max: Option<usize> },
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Literal(alts) => f.write_str(&alts.join("|")),
            Item::Gap { min: 0, max: None } => f.write_str("*"),
            Item::Gap { min, max: Some(max) } if min == max => write!(f, "*{{{}}}", min),
            Item::Gap { min, max: None } => write!(f, "*{{{},}}", min),
            Item::Gap { min, max: Some(max) } => write!(f, "*{{{},{}}}", min, max),
        }
    }
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    items: Vec<Item>,
}

impl PathPattern {
    pub fn parse(input: &str) -> Result<Self, KbError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(KbError::Validation("empty path pattern".to_string()));
        }

        let items = input
            .split(SEPARATOR)
            .map(|part| parse_item(part, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }

    /// True if `path` matches the whole pattern.
    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split(SEPARATOR).collect();
        match_items(&self.items, &segments)
    }
}

impl FromStr for PathPattern {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.items.iter().map(Item::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

fn parse_item(part: &str, input: &str) -> Result<Item, KbError> {
    let invalid =
        |why: &str| KbError::Validation(format!("invalid path pattern '{}': {}", input, why));

    if part.is_empty() {
        return Err(invalid("empty segment"));
    }
    if part == "*" {
        return Ok(Item::Gap { min: 0, max: None });
    }
    if let Some(bounds) = part.strip_prefix("*{").and_then(|b| b.strip_suffix('}')) {
        let parse_bound = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| invalid("bad repetition bound"))
        };
        let (min, max) = match bounds.split_once(',') {
            None => {
                let n = parse_bound(bounds)?;
                (n, Some(n))
            }
            Some((lo, hi)) => {
                let min = if lo.trim().is_empty() { 0 } else { parse_bound(lo)? };
                let max = if hi.trim().is_empty() { None } else { Some(parse_bound(hi)?) };
                (min, max)
            }
        };
        if max.is_some_and(|max| max < min) {
            return Err(invalid("upper bound below lower bound"));
        }
        return Ok(Item::Gap { min, max });
    }
    if part.contains('*') || part.contains('{') || part.contains('}') {
        return Err(invalid("wildcards must stand alone in a segment"));
    }

    let alts: Vec<String> = part.split('|').map(str::to_string).collect();
    if alts.iter().any(String::is_empty) {
        return Err(invalid("empty alternative"));
    }
    Ok(Item::Literal(alts))
}

/// Bottom-up over items x segments: `reach[j]` holds whether the items
/// from the current one onward match `segments[j..]`.
fn match_items(items: &[Item], segments: &[&str]) -> bool {
    let len = segments.len();
    let mut reach = vec![false; len + 1];
    reach[len] = true;

    for item in items.iter().rev() {
        let mut next = vec![false; len + 1];
        for (j, slot) in next.iter_mut().enumerate() {
            *slot = match item {
                Item::Literal(alts) => {
                    j < len && reach[j + 1] && alts.iter().any(|a| a == segments[j])
                }
                Item::Gap { min, max } => {
                    let rest = len - j;
                    let upper = max.unwrap_or(rest).min(rest);
                    *min <= upper && (*min..=upper).any(|n| reach[j + n])
                }
            };
        }
        reach = next;
    }

    reach[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, path: &str) -> bool {
        PathPattern::parse(pattern).unwrap().matches(path)
    }

    #[test]
    fn test_literal_patterns() {
        assert!(m("kb1.site.s1", "kb1.site.s1"));
        assert!(!m("kb1.site.s1", "kb1.site.s2"));
        assert!(!m("kb1.site", "kb1.site.s1"));
        assert!(m("kb1.site.s1|s2", "kb1.site.s2"));
    }

    #[test]
    fn test_wildcards() {
        let cases = [
            ("kb1.*", "kb1", true),
            ("kb1.*", "kb1.site.s1.node.n1", true),
            ("kb1.*{1}.s1", "kb1.site.s1", true),
            ("kb1.*{1}.s1", "kb1.s1", false),
            ("kb1.*{2}", "kb1.site.s1", true),
            ("kb1.*{2}", "kb1.site.s1.node", false),
            ("kb1.*{1,}.n1", "kb1.site.s1.node.n1", true),
            ("kb1.*{1,}.n1", "kb1.n1", false),
            ("kb1.*{,2}", "kb1.site.s1", true),
            ("kb1.*{,2}", "kb1.site.s1.node", false),
            ("kb1.*{2,4}.n1", "kb1.site.s1.node.n1", true),
            ("*.KB_JOB_QUEUE.*{1}", "kb1.site.s1.KB_JOB_QUEUE.work", true),
            ("*.KB_JOB_QUEUE.*{1}", "kb1.KB_STREAM_FIELD.work", false),
        ];
        for (pattern, path, expected) in cases {
            assert_eq!(m(pattern, path), expected, "{} against {}", pattern, path);
        }
    }

    #[test]
    fn test_many_gaps_on_long_path() {
        let path = (0..30).map(|i| format!("s{}", i)).collect::<Vec<_>>().join(".");
        let pattern = PathPattern::parse("*.*.*.*.*.*.*.*.*.*.zz").unwrap();

        let started = std::time::Instant::now();
        assert!(!pattern.matches(&path));
        assert!(PathPattern::parse("*.*.*.*.*.*.*.*.*.*.s29").unwrap().matches(&path));
        assert!(PathPattern::parse("*{3,}.*.*{2}.*.s29").unwrap().matches(&path));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "kb1..site", "kb1.*{x}", "kb1.*{3,1}", "kb1.s*", "kb1.a||b"] {
            assert!(
                matches!(PathPattern::parse(bad), Err(KbError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display_normalizes() {
        let p = PathPattern::parse("kb1.*{0,}.*{2,2}.a|b.*{1,3}").unwrap();
        assert_eq!(p.to_string(), "kb1.*.*{2}.a|b.*{1,3}");
    }

    #[test]
    fn test_ancestor_or_self() {
        assert!(is_ancestor_or_self("kb1.site", "kb1.site.s1"));
        assert!(is_ancestor_or_self("kb1.site", "kb1.site"));
        assert!(!is_ancestor_or_self("kb1.si", "kb1.site"));
        assert!(!is_ancestor_or_self("kb1.site.s1", "kb1.site"));
    }

    #[test]
    fn test_operator_from_str() {
        assert_eq!("match".parse::<PathOperator>().unwrap(), PathOperator::Match);
        assert!("nope".parse::<PathOperator>().is_err());
    }
}
