//! Preferred node affinity scoring.
//!
//! A node's score is the sum of the weights of every preferred term it
//! matches. Terms are independent, so evaluation order never changes the
//! result. Zero-weight terms are dropped at compile time.

use betternode_model::{Node, PreferredSchedulingTerm};

use crate::error::ConstraintResult;
use crate::selector::TermMatcher;

/// A pod's preferred scheduling terms, compiled for repeated scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferredTerms {
    terms: Vec<(i64, TermMatcher)>,
}

impl PreferredTerms {
    pub fn compile(terms: &[PreferredSchedulingTerm]) -> ConstraintResult<Self> {
        let terms = terms
            .iter()
            .filter(|t| t.weight != 0)
            .map(|t| Ok((i64::from(t.weight), TermMatcher::compile(&t.preference)?)))
            .collect::<ConstraintResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// Number of terms that can contribute to a score.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn score(&self, node: &Node) -> i64 {
        self.terms
            .iter()
            .filter(|(_, term)| term.matches(node))
            .map(|(weight, _)| weight)
            .sum()
    }
}

/// Score `node` against `terms` in one shot.
pub fn score(node: &Node, terms: &[PreferredSchedulingTerm]) -> ConstraintResult<i64> {
    Ok(PreferredTerms::compile(terms)?.score(node))
}
