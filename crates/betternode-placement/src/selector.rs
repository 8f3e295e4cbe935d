//! Label and field requirement matching.
//!
//! Node selector terms are compiled once per pod and then matched against
//! many nodes. Compilation validates keys, values and operator arity with
//! the same rules the API server applies to label selectors:
//!
//! - `In` / `NotIn` need at least one value
//! - `Exists` / `DoesNotExist` take no values
//! - `Gt` / `Lt` take exactly one integer value
//!
//! Field requirements only support `metadata.name` with `In` / `NotIn`.
//!
//! A pod's plain `nodeSelector` is taken as a literal label set and is not
//! validated: a pair whose key could never be a label simply matches no
//! node.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use betternode_model::{Node, NodeExt, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm};

use crate::error::{ConstraintError, ConstraintResult};

const NODE_NAME_FIELD: &str = "metadata.name";

/// Selector operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            "Gt" => Ok(Operator::Gt),
            "Lt" => Ok(Operator::Lt),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    In(Vec<String>),
    NotIn(Vec<String>),
    Exists,
    DoesNotExist,
    Gt(i64),
    Lt(i64),
}

/// A compiled `key <op> values` requirement over node labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRequirement {
    key: String,
    predicate: Predicate,
}

impl LabelRequirement {
    pub fn compile(req: &NodeSelectorRequirement) -> ConstraintResult<Self> {
        validate_label_key(&req.key)?;
        let op = parse_operator(req)?;
        let values = values(req);

        let predicate = match op {
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(ConstraintError::MissingValues {
                        key: req.key.clone(),
                        operator: op.to_string(),
                    });
                }
                for value in values {
                    if !is_valid_label_value(value) {
                        return Err(ConstraintError::InvalidLabelValue {
                            key: req.key.clone(),
                            value: value.clone(),
                        });
                    }
                }
                if op == Operator::In {
                    Predicate::In(values.to_vec())
                } else {
                    Predicate::NotIn(values.to_vec())
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(ConstraintError::UnexpectedValues {
                        key: req.key.clone(),
                        operator: op.to_string(),
                    });
                }
                if op == Operator::Exists {
                    Predicate::Exists
                } else {
                    Predicate::DoesNotExist
                }
            }
            Operator::Gt | Operator::Lt => {
                let value = single_value(req, op)?;
                let bound: i64 = value.parse().map_err(|_| ConstraintError::InvalidInteger {
                    key: req.key.clone(),
                    value: value.to_string(),
                })?;
                if op == Operator::Gt {
                    Predicate::Gt(bound)
                } else {
                    Predicate::Lt(bound)
                }
            }
        };

        Ok(Self {
            key: req.key.clone(),
            predicate,
        })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match &self.predicate {
            Predicate::In(values) => value.is_some_and(|v| values.contains(v)),
            Predicate::NotIn(values) => value.is_none_or(|v| !values.contains(v)),
            Predicate::Exists => value.is_some(),
            Predicate::DoesNotExist => value.is_none(),
            // A label that is not an integer never satisfies a numeric bound.
            Predicate::Gt(bound) => value
                .and_then(|v| v.parse::<i64>().ok())
                .is_some_and(|v| v > *bound),
            Predicate::Lt(bound) => value
                .and_then(|v| v.parse::<i64>().ok())
                .is_some_and(|v| v < *bound),
        }
    }
}

/// A compiled `metadata.name In|NotIn [name]` requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRequirement {
    negated: bool,
    node_name: String,
}

impl FieldRequirement {
    pub fn compile(req: &NodeSelectorRequirement) -> ConstraintResult<Self> {
        if req.key != NODE_NAME_FIELD {
            return Err(ConstraintError::UnsupportedField(req.key.clone()));
        }
        let op = parse_operator(req)?;
        let negated = match op {
            Operator::In => false,
            Operator::NotIn => true,
            other => {
                return Err(ConstraintError::UnknownOperator {
                    key: req.key.clone(),
                    operator: other.to_string(),
                });
            }
        };
        let node_name = single_value(req, op)?.to_string();
        Ok(Self { negated, node_name })
    }

    pub fn matches(&self, node: &Node) -> bool {
        (node.name() == self.node_name) != self.negated
    }
}

/// A compiled [`NodeSelectorTerm`]: every requirement must hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TermMatcher {
    labels: Vec<LabelRequirement>,
    fields: Vec<FieldRequirement>,
}

impl TermMatcher {
    pub fn compile(term: &NodeSelectorTerm) -> ConstraintResult<Self> {
        let labels = term
            .match_expressions
            .iter()
            .flatten()
            .map(LabelRequirement::compile)
            .collect::<ConstraintResult<Vec<_>>>()?;
        let fields = term
            .match_fields
            .iter()
            .flatten()
            .map(FieldRequirement::compile)
            .collect::<ConstraintResult<Vec<_>>>()?;
        Ok(Self { labels, fields })
    }

    /// An empty term selects no nodes.
    pub fn matches(&self, node: &Node) -> bool {
        if self.labels.is_empty() && self.fields.is_empty() {
            return false;
        }
        self.labels.iter().all(|r| r.matches(node.labels()))
            && self.fields.iter().all(|r| r.matches(node))
    }
}

/// A compiled required node affinity: any term may match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeSelectorMatcher {
    terms: Vec<TermMatcher>,
}

impl NodeSelectorMatcher {
    pub fn compile(selector: &NodeSelector) -> ConstraintResult<Self> {
        let terms = selector
            .node_selector_terms
            .iter()
            .map(TermMatcher::compile)
            .collect::<ConstraintResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.terms.iter().any(|t| t.matches(node))
    }
}

/// A plain `key=value` selector (the pod's `nodeSelector`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlainSelector {
    pairs: Vec<(String, String)>,
}

impl PlainSelector {
    pub fn from_labels(selector: &BTreeMap<String, String>) -> Self {
        Self {
            pairs: selector
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// An empty selector matches every node.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|nv| nv == v))
    }
}

fn parse_operator(req: &NodeSelectorRequirement) -> ConstraintResult<Operator> {
    req.operator
        .parse()
        .map_err(|_| ConstraintError::UnknownOperator {
            key: req.key.clone(),
            operator: req.operator.clone(),
        })
}

fn values(req: &NodeSelectorRequirement) -> &[String] {
    req.values.as_deref().unwrap_or_default()
}

fn single_value(req: &NodeSelectorRequirement, op: Operator) -> ConstraintResult<&str> {
    match values(req) {
        [value] => Ok(value.as_str()),
        values => Err(ConstraintError::ExpectedSingleValue {
            key: req.key.clone(),
            operator: op.to_string(),
            count: values.len(),
        }),
    }
}

/// Qualified name: `[dns-subdomain/]name`, name up to 63 characters.
fn validate_label_key(key: &str) -> ConstraintResult<()> {
    let invalid = |reason: &str| ConstraintError::InvalidLabelKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > 253 || !is_dns_subdomain(prefix) {
                return Err(invalid("prefix must be a DNS subdomain"));
            }
            name
        }
        None => key,
    };

    if name.is_empty() {
        return Err(invalid("name part must not be empty"));
    }
    if name.len() > 63 {
        return Err(invalid("name part must be at most 63 characters"));
    }
    if !is_label_token(name) {
        return Err(invalid(
            "name part must consist of alphanumerics, '-', '_' or '.', and start and end with an alphanumeric",
        ));
    }
    Ok(())
}

fn is_valid_label_value(value: &str) -> bool {
    value.is_empty() || (value.len() <= 63 && is_label_token(value))
}

fn is_label_token(s: &str) -> bool {
    let bytes = s.as_bytes();
    let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_alphanumeric());
    edge_ok(bytes.first())
        && edge_ok(bytes.last())
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    s.split('.').all(|label| {
        let bytes = label.as_bytes();
        let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        label.len() <= 63
            && edge_ok(bytes.first())
            && edge_ok(bytes.last())
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(key: &str, op: &str, values: &[&str]) -> NodeSelectorRequirement {
        NodeSelectorRequirement {
            key: key.to_string(),
            operator: op.to_string(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(name: &str, pairs: &[(&str, &str)]) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.metadata.labels = Some(labels(pairs));
        node
    }

    #[test]
    fn in_and_not_in() {
        let is_gpu = LabelRequirement::compile(&req("gpu", "In", &["true"])).unwrap();
        let not_spot = LabelRequirement::compile(&req("lifecycle", "NotIn", &["spot"])).unwrap();

        assert!(is_gpu.matches(&labels(&[("gpu", "true")])));
        assert!(!is_gpu.matches(&labels(&[("gpu", "false")])));
        assert!(!is_gpu.matches(&labels(&[])));

        assert!(not_spot.matches(&labels(&[])));
        assert!(not_spot.matches(&labels(&[("lifecycle", "on-demand")])));
        assert!(!not_spot.matches(&labels(&[("lifecycle", "spot")])));
    }

    #[test]
    fn exists_and_does_not_exist() {
        let exists = LabelRequirement::compile(&req("gpu", "Exists", &[])).unwrap();
        let absent = LabelRequirement::compile(&req("gpu", "DoesNotExist", &[])).unwrap();

        assert!(exists.matches(&labels(&[("gpu", "")])));
        assert!(!exists.matches(&labels(&[])));
        assert!(absent.matches(&labels(&[])));
        assert!(!absent.matches(&labels(&[("gpu", "true")])));
    }

    #[test]
    fn numeric_bounds() {
        let gt = LabelRequirement::compile(&req("cores", "Gt", &["8"])).unwrap();
        let lt = LabelRequirement::compile(&req("cores", "Lt", &["8"])).unwrap();

        assert!(gt.matches(&labels(&[("cores", "16")])));
        assert!(!gt.matches(&labels(&[("cores", "8")])));
        assert!(lt.matches(&labels(&[("cores", "4")])));
        assert!(!lt.matches(&labels(&[("cores", "many")])));
        assert!(!lt.matches(&labels(&[])));
    }

    #[test]
    fn rejects_malformed_requirements() {
        assert!(matches!(
            LabelRequirement::compile(&req("gpu", "Near", &["true"])),
            Err(ConstraintError::UnknownOperator { .. })
        ));
        assert!(matches!(
            LabelRequirement::compile(&req("gpu", "In", &[])),
            Err(ConstraintError::MissingValues { .. })
        ));
        assert!(matches!(
            LabelRequirement::compile(&req("gpu", "Exists", &["true"])),
            Err(ConstraintError::UnexpectedValues { .. })
        ));
        assert!(matches!(
            LabelRequirement::compile(&req("cores", "Gt", &["1", "2"])),
            Err(ConstraintError::ExpectedSingleValue { count: 2, .. })
        ));
        assert!(matches!(
            LabelRequirement::compile(&req("cores", "Lt", &["eight"])),
            Err(ConstraintError::InvalidInteger { .. })
        ));
        assert!(matches!(
            LabelRequirement::compile(&req("gpu", "In", &["not valid!"])),
            Err(ConstraintError::InvalidLabelValue { .. })
        ));
    }

    #[test]
    fn validates_label_keys() {
        assert!(validate_label_key("node.kubernetes.io/instance-type").is_ok());
        assert!(validate_label_key("gpu").is_ok());
        assert!(validate_label_key("").is_err());
        assert!(validate_label_key("/gpu").is_err());
        assert!(validate_label_key("Example.COM/gpu").is_err());
        assert!(validate_label_key("a/b/c").is_err());
        assert!(validate_label_key("-gpu").is_err());
        assert!(validate_label_key(&"x".repeat(64)).is_err());
    }

    #[test]
    fn field_requirement_matches_node_name() {
        let only_a = FieldRequirement::compile(&req("metadata.name", "In", &["node-a"])).unwrap();
        let not_a = FieldRequirement::compile(&req("metadata.name", "NotIn", &["node-a"])).unwrap();

        assert!(only_a.matches(&node("node-a", &[])));
        assert!(!only_a.matches(&node("node-b", &[])));
        assert!(not_a.matches(&node("node-b", &[])));

        assert!(matches!(
            FieldRequirement::compile(&req("spec.podCIDR", "In", &["x"])),
            Err(ConstraintError::UnsupportedField(_))
        ));
        assert!(FieldRequirement::compile(&req("metadata.name", "Exists", &[])).is_err());
        assert!(FieldRequirement::compile(&req("metadata.name", "In", &["a", "b"])).is_err());
    }

    #[test]
    fn terms_are_anded_and_selectors_ored() {
        let term_linux_gpu = NodeSelectorTerm {
            match_expressions: Some(vec![
                req("kubernetes.io/os", "In", &["linux"]),
                req("gpu", "Exists", &[]),
            ]),
            match_fields: None,
        };
        let term_named = NodeSelectorTerm {
            match_expressions: Some(vec![]),
            match_fields: Some(vec![req("metadata.name", "In", &["special"])]),
        };
        let selector = NodeSelector {
            node_selector_terms: vec![term_linux_gpu, term_named],
        };
        let matcher = NodeSelectorMatcher::compile(&selector).unwrap();

        assert!(matcher.matches(&node("n1", &[("kubernetes.io/os", "linux"), ("gpu", "true")])));
        assert!(!matcher.matches(&node("n2", &[("kubernetes.io/os", "linux")])));
        assert!(matcher.matches(&node("special", &[])));
    }

    #[test]
    fn empty_terms_match_nothing() {
        let empty_term = TermMatcher::compile(&NodeSelectorTerm::default()).unwrap();
        assert!(!empty_term.matches(&node("n1", &[("a", "b")])));

        let no_terms = NodeSelectorMatcher::compile(&NodeSelector::default()).unwrap();
        assert!(!no_terms.matches(&node("n1", &[])));
    }

    #[test]
    fn exists_accepts_absent_or_empty_values() {
        let mut absent = req("gpu", "Exists", &[]);
        absent.values = None;

        assert!(LabelRequirement::compile(&absent).is_ok());
        assert!(LabelRequirement::compile(&req("gpu", "Exists", &[])).is_ok());
    }

    #[test]
    fn plain_selector_requires_all_pairs() {
        let selector = PlainSelector::from_labels(&labels(&[
            ("kubernetes.io/os", "linux"),
            ("zone", "a"),
        ]));

        assert!(selector.matches(&labels(&[("kubernetes.io/os", "linux"), ("zone", "a"), ("x", "y")])));
        assert!(!selector.matches(&labels(&[("kubernetes.io/os", "linux")])));
        assert!(PlainSelector::default().matches(&labels(&[])));
    }

    #[test]
    fn plain_selector_takes_keys_literally() {
        let selector = PlainSelector::from_labels(&labels(&[("bad key!", "not valid!")]));

        assert!(!selector.is_empty());
        assert!(!selector.matches(&labels(&[("kubernetes.io/os", "linux")])));
        assert!(selector.matches(&labels(&[("bad key!", "not valid!")])));
    }
}
