// SPDX-License-Identifier: Apache-2.0

//! Predicate canonicalization and join-condition syntax.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]+)\)").expect("parenthesized pattern"));
static RELATIONAL_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=<>]+").expect("relational delimiter pattern"));
static ARRAY_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,=]").expect("array delimiter pattern"));
static COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[<>=]+\s*").expect("comparison pattern"));

/// How an island spells predicates and conjunctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateSyntax {
    /// `a = b AND c > d`
    Relational,
    /// Dimension pairs: `a.i, b.i`
    Array,
}

impl PredicateSyntax {
    fn delimiter(self) -> &'static Regex {
        match self {
            PredicateSyntax::Relational => &RELATIONAL_DELIMITER,
            PredicateSyntax::Array => &ARRAY_DELIMITER,
        }
    }

    /// Canonical, order-independent form of a compound predicate string.
    ///
    /// Each parenthesized group is stripped of whitespace, split on the
    /// island's delimiter, and its operands sorted before being rejoined with
    /// the delimiter found in the group. Text without parentheses is treated
    /// as a single group, so a bare join condition such as
    /// `nation.n_regionkey = region.r_regionkey` still yields one predicate
    /// instead of an empty set.
    pub fn split(self, text: &str) -> BTreeSet<String> {
        let groups: Vec<&str> = PARENTHESIZED
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect();

        let groups = if groups.is_empty() { vec![text] } else { groups };
        groups
            .into_iter()
            .filter_map(|group| self.canonical(group))
            .collect()
    }

    fn canonical(self, group: &str) -> Option<String> {
        let compact: String = group.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return None;
        }
        let delimiter = self.delimiter();
        let joiner = delimiter
            .find(&compact)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let mut operands: Vec<&str> = delimiter
            .split(&compact)
            .filter(|operand| !operand.is_empty())
            .collect();
        operands.sort_unstable();
        Some(operands.join(&joiner))
    }

    /// Combines join predicates; `None` for an unconditional join.
    pub fn conjunction(self, predicates: &[String]) -> Option<String> {
        let predicates: Vec<&str> = predicates
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if predicates.is_empty() {
            return None;
        }
        match self {
            PredicateSyntax::Relational => Some(predicates.join(" AND ")),
            PredicateSyntax::Array => {
                let pairs: BTreeSet<String> = predicates
                    .iter()
                    .map(|p| COMPARISON.replace_all(p, ", ").into_owned())
                    .collect();
                Some(pairs.into_iter().collect::<Vec<_>>().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_relational_split() {
        let syntax = PredicateSyntax::Relational;
        assert_eq!(syntax.split("(a=b)(c>d)"), set(&["a=b", "c>d"]));
        assert_eq!(syntax.split("(b=a)"), syntax.split("(a=b)"));
        assert_eq!(syntax.split("( t2.x >= t1.y )"), set(&["t1.y>=t2.x"]));
        assert_eq!(syntax.split("x = y"), set(&["x=y"]));
        assert!(syntax.split("()").is_empty());
    }

    #[test]
    fn test_array_split() {
        let syntax = PredicateSyntax::Array;
        assert_eq!(syntax.split("(b.i, a.i)"), set(&["a.i,b.i"]));
        assert_eq!(syntax.split("(b.j = a.j)"), set(&["a.j=b.j"]));
        assert_eq!(syntax.split("b.i, a.i"), set(&["a.i,b.i"]));
        assert!(syntax.split("  ").is_empty());
    }

    #[test]
    fn test_conjunctions() {
        let predicates = vec!["a.x = b.x".to_string(), "a.y < b.y".to_string()];
        assert_eq!(
            PredicateSyntax::Relational.conjunction(&predicates).as_deref(),
            Some("a.x = b.x AND a.y < b.y")
        );
        assert_eq!(
            PredicateSyntax::Array.conjunction(&predicates).as_deref(),
            Some("a.x, b.x, a.y, b.y")
        );
        assert_eq!(PredicateSyntax::Relational.conjunction(&[]), None);
        assert_eq!(PredicateSyntax::Array.conjunction(&[" ".to_string()]), None);
    }
}
