use crate::duration::{self, PromDuration};
use prometheus_rules_admission_k8s_api::{IntOrString, PrometheusRuleSpec, Rule, RuleGroup};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

const LABEL_NAME_REGEX: &str = r"^[a-zA-Z_][a-zA-Z0-9_]*$";
const METRIC_NAME_REGEX: &str = r"^[a-zA-Z_:][a-zA-Z0-9_:]*$";
const METRIC_NAME_LABEL: &str = "__name__";

/// Strategies accepted by the Thanos ruler.
const PARTIAL_RESPONSE_STRATEGIES: [&str; 2] = ["warn", "abort"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("group {index}: groupname must not be empty")]
    EmptyGroupName { index: usize },

    #[error("groupname: {name:?} is repeated in the same file")]
    RepeatedGroupName { name: String },

    #[error("group {group:?}: {error}")]
    Group { group: String, error: GroupError },

    #[error("group {group:?}, rule {index}, {name:?}: {error}")]
    Rule {
        group: String,
        index: usize,
        name: String,
        error: Violation,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("invalid field '{field}': {source}")]
    Duration {
        field: &'static str,
        source: duration::ParseError,
    },

    #[error("invalid field 'limit': must not be negative, got {0}")]
    NegativeLimit(i32),

    #[error("invalid partial_response_strategy {0:?}: must be one of \"warn\" or \"abort\"")]
    PartialResponseStrategy(String),

    #[error("invalid label name: {0}")]
    LabelName(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("only one of 'record' and 'alert' must be set")]
    RecordAndAlert,

    #[error("one of 'record' or 'alert' must be set")]
    NoRecordOrAlert,

    #[error("field 'expr' must be set in rule")]
    MissingExpr,

    #[error("could not parse expression: {0}")]
    Expr(#[from] ExprError),

    #[error("invalid field '{field}': {source}")]
    Duration {
        field: &'static str,
        source: duration::ParseError,
    },

    #[error("invalid field 'annotations' in recording rule")]
    RecordingAnnotations,

    #[error("invalid field 'for' in recording rule")]
    RecordingFor,

    #[error("invalid field 'keep_firing_for' in recording rule")]
    RecordingKeepFiringFor,

    #[error("invalid recording rule name: {0}")]
    RecordName(String),

    #[error("invalid label name: {0}")]
    LabelName(String),

    #[error("invalid annotation name: {0}")]
    AnnotationName(String),

    #[error("{kind} {key:?}: template: unclosed action")]
    Template { kind: &'static str, key: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unclosed left {0}")]
    UnclosedLeft(&'static str),

    #[error("unexpected right {0}")]
    UnexpectedRight(&'static str),

    #[error("unterminated quoted string")]
    UnterminatedString,
}

struct Grammar {
    label_name: Regex,
    metric_name: Regex,
}

/// Checks a rule spec the way Prometheus checks a rule file before loading
/// it, returning every problem found in group and rule order.
pub fn validate_rule(spec: &PrometheusRuleSpec) -> Vec<RuleError> {
    let grammar = Grammar::new();
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for (i, group) in spec.groups.iter().enumerate() {
        if group.name.is_empty() {
            errors.push(RuleError::EmptyGroupName { index: i + 1 });
        }
        if !names.insert(group.name.as_str()) {
            errors.push(RuleError::RepeatedGroupName {
                name: group.name.clone(),
            });
        }

        errors.extend(
            validate_group(group, &grammar)
                .into_iter()
                .map(|error| RuleError::Group {
                    group: group.name.clone(),
                    error,
                }),
        );

        for (j, rule) in group.rules.iter().enumerate() {
            errors.extend(
                validate_rule_entry(rule, &grammar)
                    .into_iter()
                    .map(|error| RuleError::Rule {
                        group: group.name.clone(),
                        index: j + 1,
                        name: rule.name().to_string(),
                        error,
                    }),
            );
        }
    }

    errors
}

// === impl Grammar ===

impl Grammar {
    fn new() -> Self {
        Self {
            label_name: Regex::new(LABEL_NAME_REGEX).expect("should_compile"),
            metric_name: Regex::new(METRIC_NAME_REGEX).expect("should_compile"),
        }
    }

    fn is_label_name(&self, name: &str) -> bool {
        self.label_name.is_match(name)
    }

    fn is_metric_name(&self, name: &str) -> bool {
        self.metric_name.is_match(name)
    }
}

fn validate_group(group: &RuleGroup, grammar: &Grammar) -> Vec<GroupError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("interval", &group.interval),
        ("query_offset", &group.query_offset),
    ] {
        if let Some(Err(source)) = value.as_deref().map(str::parse::<PromDuration>) {
            errors.push(GroupError::Duration { field, source });
        }
    }

    if let Some(limit) = group.limit.filter(|l| *l < 0) {
        errors.push(GroupError::NegativeLimit(limit));
    }

    if let Some(strategy) = group.partial_response_strategy.as_deref() {
        let known = PARTIAL_RESPONSE_STRATEGIES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(strategy));
        if !strategy.is_empty() && !known {
            errors.push(GroupError::PartialResponseStrategy(strategy.to_string()));
        }
    }

    for name in keys(&group.labels) {
        if !grammar.is_label_name(name) || name == METRIC_NAME_LABEL {
            errors.push(GroupError::LabelName(name.to_string()));
        }
    }

    errors
}

fn validate_rule_entry(rule: &Rule, grammar: &Grammar) -> Vec<Violation> {
    let mut errors = Vec::new();

    let record = rule.record.as_deref().filter(|r| !r.is_empty());
    let alert = rule.alert.as_deref().filter(|a| !a.is_empty());
    match (record, alert) {
        (Some(_), Some(_)) => errors.push(Violation::RecordAndAlert),
        (None, None) => errors.push(Violation::NoRecordOrAlert),
        _ => {}
    }

    match &rule.expr {
        None => errors.push(Violation::MissingExpr),
        Some(IntOrString::String(expr)) if expr.trim().is_empty() => {
            errors.push(Violation::MissingExpr)
        }
        Some(IntOrString::String(expr)) => {
            if let Err(error) = check_expr(expr) {
                errors.push(error.into());
            }
        }
        Some(IntOrString::Int(_)) => {}
    }

    let for_ = parse_duration("for", rule.for_.as_deref(), &mut errors);
    let keep_firing_for =
        parse_duration("keep_firing_for", rule.keep_firing_for.as_deref(), &mut errors);

    if let Some(record) = record {
        if rule.annotations.as_ref().is_some_and(|a| !a.is_empty()) {
            errors.push(Violation::RecordingAnnotations);
        }
        if for_.is_some_and(|d| d != PromDuration::default()) {
            errors.push(Violation::RecordingFor);
        }
        if keep_firing_for.is_some_and(|d| d != PromDuration::default()) {
            errors.push(Violation::RecordingKeepFiringFor);
        }
        if !grammar.is_metric_name(record) {
            errors.push(Violation::RecordName(record.to_string()));
        }
    }

    for name in keys(&rule.labels) {
        if !grammar.is_label_name(name) || name == METRIC_NAME_LABEL {
            errors.push(Violation::LabelName(name.to_string()));
        }
    }

    for name in keys(&rule.annotations) {
        if !grammar.is_label_name(name) {
            errors.push(Violation::AnnotationName(name.to_string()));
        }
    }

    // Alert labels and annotations are expanded as templates when the alert
    // fires.
    if alert.is_some() {
        for (kind, map) in [("label", &rule.labels), ("annotation", &rule.annotations)] {
            for (key, value) in map.iter().flatten() {
                if has_unclosed_action(value) {
                    errors.push(Violation::Template {
                        kind,
                        key: key.clone(),
                    });
                }
            }
        }
    }

    errors
}

fn keys(map: &Option<BTreeMap<String, String>>) -> impl Iterator<Item = &str> {
    map.iter().flat_map(|m| m.keys().map(String::as_str))
}

fn parse_duration(
    field: &'static str,
    value: Option<&str>,
    errors: &mut Vec<Violation>,
) -> Option<PromDuration> {
    match value?.parse::<PromDuration>() {
        Ok(d) => Some(d),
        Err(source) => {
            errors.push(Violation::Duration { field, source });
            None
        }
    }
}

/// A structural check of a PromQL expression: brackets must balance and
/// string literals must be terminated.
fn check_expr(expr: &str) -> Result<(), ExprError> {
    let mut open = Vec::new();
    let mut chars = expr.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                let mut terminated = false;
                while let Some(n) = chars.next() {
                    if n == '\\' && c != '`' {
                        chars.next();
                    } else if n == c {
                        terminated = true;
                        break;
                    }
                }
                if !terminated {
                    return Err(ExprError::UnterminatedString);
                }
            }
            '#' => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => open.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.pop() != Some(expected) {
                    return Err(ExprError::UnexpectedRight(bracket_name(c)));
                }
            }
            _ => {}
        }
    }

    match open.pop() {
        Some(c) => Err(ExprError::UnclosedLeft(bracket_name(c))),
        None => Ok(()),
    }
}

fn bracket_name(c: char) -> &'static str {
    match c {
        '(' | ')' => "parenthesis",
        '[' | ']' => "bracket",
        _ => "brace",
    }
}

fn has_unclosed_action(text: &str) -> bool {
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => rest = &after[end + 2..],
            None => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn alert(name: &str, expr: &str) -> Rule {
        Rule {
            alert: Some(name.to_string()),
            expr: Some(IntOrString::String(expr.to_string())),
            ..Rule::default()
        }
    }

    fn record(name: &str, expr: &str) -> Rule {
        Rule {
            record: Some(name.to_string()),
            expr: Some(IntOrString::String(expr.to_string())),
            ..Rule::default()
        }
    }

    fn spec(groups: Vec<RuleGroup>) -> PrometheusRuleSpec {
        PrometheusRuleSpec { groups }
    }

    fn group(name: &str, rules: Vec<Rule>) -> RuleGroup {
        RuleGroup {
            name: name.to_string(),
            rules,
            ..RuleGroup::default()
        }
    }

    #[test]
    fn accepts_valid_rules() {
        let spec = spec(vec![
            RuleGroup {
                interval: Some("1m".to_string()),
                partial_response_strategy: Some("Abort".to_string()),
                labels: Some(btreemap! { "team".to_string() => "sre".to_string() }),
                ..group(
                    "node",
                    vec![
                        Rule {
                            for_: Some("5m".to_string()),
                            keep_firing_for: Some("1m".to_string()),
                            labels: Some(btreemap! {
                                "severity".to_string() => "critical".to_string(),
                            }),
                            annotations: Some(btreemap! {
                                "summary".to_string() => "{{ $labels.instance }} is down".to_string(),
                            }),
                            ..alert("NodeDown", r#"up{job="node"} == 0"#)
                        },
                        record(
                            "job:http_requests:rate5m",
                            "sum by (job) (rate(http_requests_total[5m]))",
                        ),
                        Rule {
                            for_: Some("0s".to_string()),
                            ..record("job:up:count", "count(up) # comment with (")
                        },
                    ],
                )
            },
            group(
                "empty",
                vec![Rule {
                    expr: Some(IntOrString::Int(1)),
                    ..record("one", "")
                }],
            ),
        ]);
        assert_eq!(validate_rule(&spec), vec![]);
        assert_eq!(validate_rule(&PrometheusRuleSpec::default()), vec![]);
    }

    #[test]
    fn reports_group_problems() {
        let spec = spec(vec![
            group("", vec![]),
            group("dup", vec![]),
            RuleGroup {
                interval: Some("1x".to_string()),
                limit: Some(-1),
                partial_response_strategy: Some("ignore".to_string()),
                labels: Some(btreemap! { "bad-label".to_string() => "x".to_string() }),
                ..group("dup", vec![])
            },
        ]);
        assert_eq!(
            validate_rule(&spec),
            vec![
                RuleError::EmptyGroupName { index: 1 },
                RuleError::RepeatedGroupName {
                    name: "dup".to_string()
                },
                RuleError::Group {
                    group: "dup".to_string(),
                    error: GroupError::Duration {
                        field: "interval",
                        source: duration::ParseError::InvalidUnit,
                    },
                },
                RuleError::Group {
                    group: "dup".to_string(),
                    error: GroupError::NegativeLimit(-1),
                },
                RuleError::Group {
                    group: "dup".to_string(),
                    error: GroupError::PartialResponseStrategy("ignore".to_string()),
                },
                RuleError::Group {
                    group: "dup".to_string(),
                    error: GroupError::LabelName("bad-label".to_string()),
                },
            ]
        );
    }

    #[test]
    fn reports_rule_problems_in_order() {
        let spec = spec(vec![group(
            "g",
            vec![
                Rule {
                    record: Some("r".to_string()),
                    ..alert("a", "up")
                },
                Rule {
                    expr: None,
                    ..Rule::default()
                },
                Rule {
                    for_: Some("5m".to_string()),
                    annotations: Some(btreemap! { "a".to_string() => "b".to_string() }),
                    ..record("not a metric", "up")
                },
                Rule {
                    labels: Some(btreemap! {
                        "__name__".to_string() => "x".to_string(),
                        "0abc".to_string() => "y".to_string(),
                    }),
                    annotations: Some(btreemap! {
                        "summary".to_string() => "{{ $value".to_string(),
                    }),
                    for_: Some("soon".to_string()),
                    ..alert("Broken", "sum(rate(x[5m])")
                },
            ],
        )]);

        let errors = validate_rule(&spec);
        let rendered = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                r#"group "g", rule 1, "a": only one of 'record' and 'alert' must be set"#,
                r#"group "g", rule 2, "": one of 'record' or 'alert' must be set"#,
                r#"group "g", rule 2, "": field 'expr' must be set in rule"#,
                r#"group "g", rule 3, "not a metric": invalid field 'annotations' in recording rule"#,
                r#"group "g", rule 3, "not a metric": invalid field 'for' in recording rule"#,
                r#"group "g", rule 3, "not a metric": invalid recording rule name: not a metric"#,
                r#"group "g", rule 4, "Broken": could not parse expression: unclosed left parenthesis"#,
                r#"group "g", rule 4, "Broken": invalid field 'for': invalid number: cannot parse integer from empty string"#,
                r#"group "g", rule 4, "Broken": invalid label name: 0abc"#,
                r#"group "g", rule 4, "Broken": invalid label name: __name__"#,
                r#"group "g", rule 4, "Broken": annotation "summary": template: unclosed action"#,
            ]
        );
    }

    #[test]
    fn checks_expression_structure() {
        assert_eq!(check_expr("up"), Ok(()));
        assert_eq!(check_expr(r#"up{job="a)b"}"#), Ok(()));
        assert_eq!(check_expr(r#"label_replace(up, "x", "\"", "", "")"#), Ok(()));
        assert_eq!(check_expr("rate(x[5m]"), Err(ExprError::UnclosedLeft("parenthesis")));
        assert_eq!(check_expr("x[5m)"), Err(ExprError::UnexpectedRight("parenthesis")));
        assert_eq!(check_expr("up}"), Err(ExprError::UnexpectedRight("brace")));
        assert_eq!(check_expr("up{a=\"b}"), Err(ExprError::UnterminatedString));
        assert_eq!(check_expr("x[`5m]"), Err(ExprError::UnterminatedString));
    }

    #[test]
    fn detects_unclosed_template_actions() {
        assert!(!has_unclosed_action("plain"));
        assert!(!has_unclosed_action("{{ $labels.job }} and {{ $value }}"));
        assert!(has_unclosed_action("{{ $labels.job }} and {{ $value"));
        assert!(has_unclosed_action("{{"));
    }
}
