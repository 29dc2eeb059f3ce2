//! XPath-lite parsing and matching (§3.6, §4.11, C12): steps separated by
//! `/`, an optional leading anchor, `*` wildcards, and a trailing range
//! predicate `[a..b,c,d..]` (1-based, inclusive) normalized to half-open
//! integer ranges.

use ber_core::tag::Class;

use crate::error::{XmlError, XmlResult};
use crate::translator::NameTranslator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Named(String),
    Tag(u32),
    Wildcard,
}

/// A set of half-open `[start, end)` 0-based ranges built from a 1-based
/// inclusive range-list like `1..2,4,6..`.
#[derive(Debug, Clone, Default)]
pub struct RangeList(Vec<(usize, Option<usize>)>);

impl RangeList {
    pub fn parse(s: &str) -> XmlResult<Self> {
        let mut segments = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(XmlError::Path(format!("empty range segment in '{s}'")));
            }
            if let Some((a, b)) = part.split_once("..") {
                let start: usize = a
                    .parse()
                    .map_err(|_| XmlError::Path(format!("bad range start in '{part}'")))?;
                if start == 0 {
                    return Err(XmlError::Path("range positions are 1-based".to_string()));
                }
                let end = if b.is_empty() {
                    None
                } else {
                    let e: usize = b
                        .parse()
                        .map_err(|_| XmlError::Path(format!("bad range end in '{part}'")))?;
                    Some(e)
                };
                segments.push((start - 1, end));
            } else {
                let n: usize = part
                    .parse()
                    .map_err(|_| XmlError::Path(format!("bad range index '{part}'")))?;
                if n == 0 {
                    return Err(XmlError::Path("range positions are 1-based".to_string()));
                }
                segments.push((n - 1, Some(n)));
            }
        }
        Ok(RangeList(segments))
    }

    /// `rank` is 1-based.
    pub fn contains(&self, rank: usize) -> bool {
        let idx = rank - 1;
        self.0.iter().any(|(start, end)| idx >= *start && end.is_none_or(|e| idx < e))
    }
}

#[derive(Debug, Clone)]
pub struct Path {
    pub anchored: bool,
    pub steps: Vec<Step>,
    pub range: Option<RangeList>,
}

impl Path {
    pub fn parse(input: &str) -> XmlResult<Path> {
        let anchored = input.starts_with('/');
        let body = if anchored { &input[1..] } else { input };

        let (steps_part, range) = match (body.rfind('['), body.ends_with(']')) {
            (Some(idx), true) => {
                let range_str = &body[idx + 1..body.len() - 1];
                (&body[..idx], Some(RangeList::parse(range_str)?))
            }
            _ => (body, None),
        };

        let steps = steps_part
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Step::Wildcard
                } else if let Ok(n) = s.parse::<u32>() {
                    Step::Tag(n)
                } else {
                    Step::Named(s.to_string())
                }
            })
            .collect::<Vec<_>>();

        if steps.is_empty() {
            return Err(XmlError::Path(format!("path has no steps: '{input}'")));
        }

        Ok(Path { anchored, steps, range })
    }
}

fn step_matches(step: &Step, class: Class, tag: u32, translator: &NameTranslator) -> bool {
    match step {
        Step::Wildcard => true,
        Step::Tag(n) => *n == tag,
        Step::Named(name) => translator.name_for(class, tag) == Some(name.as_str()),
    }
}

/// Stateful matcher for a single [`Path`] against a stream of visited
/// nodes: tracks the 1-based match rank for the range predicate.
pub struct Matcher<'a> {
    path: &'a Path,
    rank: usize,
}

impl Path {
    /// Whether `ancestry` (root-to-node tag path) satisfies this path's
    /// steps, ignoring the range predicate. Shared by the streaming
    /// [`Matcher`] and the tree-walking edit operations, which track rank
    /// independently.
    pub fn structural_match(&self, ancestry: &[(Class, u32)], translator: &NameTranslator) -> bool {
        let steps = &self.steps;
        if self.anchored {
            if ancestry.len() != steps.len() {
                return false;
            }
            ancestry.iter().zip(steps).all(|((c, t), s)| step_matches(s, *c, *t, translator))
        } else {
            if ancestry.len() < steps.len() {
                return false;
            }
            let start = ancestry.len() - steps.len();
            ancestry[start..].iter().zip(steps).all(|((c, t), s)| step_matches(s, *c, *t, translator))
        }
    }
}

impl<'a> Matcher<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path, rank: 0 }
    }

    /// `ancestry` is the full tag path from the document root down to and
    /// including the node being tested. Returns whether this node should
    /// be emitted, updating the rank counter on every structural match
    /// (the range predicate filters *after* counting, per §9's "1-based
    /// counting over all siblings regardless of filtering").
    pub fn check(&mut self, ancestry: &[(Class, u32)], translator: &NameTranslator) -> bool {
        if !self.path.structural_match(ancestry, translator) {
            return false;
        }
        self.rank += 1;
        match &self.path.range {
            Some(range) => range.contains(self.rank),
            None => true,
        }
    }

    /// Whether a subtree one level below the current `ancestry_len` could
    /// still contain a structural match. Anchored paths can be pruned once
    /// the current depth has passed the number of steps; free-form paths
    /// may match starting at any depth, so they are never pruned.
    pub fn could_match_below(&self, ancestry_len: usize) -> bool {
        if !self.path.anchored {
            return true;
        }
        ancestry_len < self.path.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_core::tag::Shape;

    fn translator_with_names() -> NameTranslator {
        let mut t = NameTranslator::new();
        t.insert(Class::Application, Shape::Constructed, 1, "TransferBatch");
        t.insert(Class::Application, Shape::Constructed, 2, "CallEventDetailList");
        t.insert(Class::Application, Shape::Constructed, 3, "CallEventDetail");
        t
    }

    #[test]
    fn scenario_third_cdr_via_range_predicate() {
        let translator = translator_with_names();
        let path = Path::parse("/TransferBatch/CallEventDetailList/*[3]").unwrap();
        let mut matcher = Matcher::new(&path);

        let base = [(Class::Application, 1u32), (Class::Application, 2)];
        let mut matched = vec![];
        for (i, cdr) in (1..=4u32).enumerate() {
            let mut ancestry = base.to_vec();
            ancestry.push((Class::Application, cdr));
            if matcher.check(&ancestry, &translator) {
                matched.push(i + 1);
            }
        }
        assert_eq!(matched, vec![3]);
    }

    #[test]
    fn open_range_predicate_matches_tail() {
        let translator = translator_with_names();
        let path = Path::parse("/TransferBatch/CallEventDetailList/*[3..]").unwrap();
        let mut matcher = Matcher::new(&path);
        let base = [(Class::Application, 1u32), (Class::Application, 2)];
        let mut matched = vec![];
        for (i, cdr) in (1..=4u32).enumerate() {
            let mut ancestry = base.to_vec();
            ancestry.push((Class::Application, cdr));
            if matcher.check(&ancestry, &translator) {
                matched.push(i + 1);
            }
        }
        assert_eq!(matched, vec![3, 4]);
    }

    #[test]
    fn anchored_path_requires_exact_depth() {
        let translator = NameTranslator::new();
        let path = Path::parse("/1/2").unwrap();
        let mut matcher = Matcher::new(&path);
        assert!(!matcher.check(&[(Class::Universal, 1), (Class::Universal, 2), (Class::Universal, 3)], &translator));
        assert!(Matcher::new(&path).check(&[(Class::Universal, 1), (Class::Universal, 2)], &translator));
    }

    #[test]
    fn free_form_path_matches_anywhere() {
        let translator = NameTranslator::new();
        let path = Path::parse("9/10").unwrap();
        let mut matcher = Matcher::new(&path);
        assert!(matcher.check(&[(Class::Universal, 1), (Class::Universal, 9), (Class::Universal, 10)], &translator));
    }
}
