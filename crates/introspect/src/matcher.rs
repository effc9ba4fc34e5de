use crate::loader::TypeDescriptor;

/// Which equivalence rule accepted a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    ShortName,
    FullName,
    GenericShortName,
    GenericFullName,
}

/// Decides whether a candidate type is the one a query names.
///
/// Queries are compared verbatim and case-sensitively. Arity suffixes are
/// stripped from the candidate only, so `IMaze`, ``IMaze`1`` and
/// ``Demo.IMaze`1`` all find ``Demo.IMaze`1``, while `Maze` finds nothing.
#[derive(Debug, Clone, Copy)]
pub struct TypeMatcher<'q> {
    query: &'q str,
}

impl<'q> TypeMatcher<'q> {
    pub fn new(query: &'q str) -> Self {
        Self { query }
    }

    pub fn matches(&self, candidate: &TypeDescriptor) -> bool {
        self.match_rule(candidate).is_some()
    }

    pub fn match_rule(&self, candidate: &TypeDescriptor) -> Option<MatchRule> {
        let query = self.query;
        if candidate.name == query {
            return Some(MatchRule::ShortName);
        }
        let has_full_name = !candidate.full_name.is_empty();
        if has_full_name && candidate.full_name == query {
            return Some(MatchRule::FullName);
        }
        if !candidate.is_generic() {
            return None;
        }
        if strip_arity(&candidate.name) == query {
            return Some(MatchRule::GenericShortName);
        }
        if has_full_name && strip_arity(&candidate.full_name) == query {
            return Some(MatchRule::GenericFullName);
        }
        None
    }
}

/// Cut a metadata name at its first backtick: ``IMaze`1`` becomes `IMaze`.
pub(crate) fn strip_arity(name: &str) -> &str {
    match name.find('`') {
        Some(index) => &name[..index],
        None => name,
    }
}
