#[path = "../helpers/mod.rs"]
mod helpers;

use audit_relay::rules::{Operator, RuleSet, RulesEngine};
use helpers::counting_rule::{CountingRule, PanickingRule};
use helpers::test_metrics::TestMetrics;
use helpers::{event, rule};
use serde_json::json;
use std::sync::Arc;

fn engine_with(counting: &CountingRule) -> RulesEngine {
    let mut engine = RulesEngine::with_core_rule_types();
    assert!(engine.register_rule_type(Arc::new(counting.clone())));
    assert!(engine.register_rule_type(Arc::new(PanickingRule)));
    engine
}

#[test]
fn or_stops_at_first_match() {
    let counting = CountingRule::new();
    let engine = engine_with(&counting);
    let rules = vec![
        rule(json!({"type": "counting", "result": true})),
        rule(json!({"type": "counting", "result": false})),
        rule(json!({"type": "counting", "result": false})),
    ];

    assert!(engine.evaluate_rules(&rules, &event("L", "info", "m"), Operator::Or));
    assert_eq!(counting.count(), 1);
}

#[test]
fn and_stops_at_first_miss() {
    let counting = CountingRule::new();
    let engine = engine_with(&counting);
    let rules = vec![
        rule(json!({"type": "counting", "result": true})),
        rule(json!({"type": "counting", "result": false})),
        rule(json!({"type": "counting", "result": true})),
    ];

    assert!(!engine.evaluate_rules(&rules, &event("L", "info", "m"), Operator::And));
    assert_eq!(counting.count(), 2);
}

#[test]
fn combination_matches_boolean_algebra() {
    let counting = CountingRule::new();
    let engine = engine_with(&counting);
    let e = event("L", "info", "m");

    for outcomes in [
        vec![],
        vec![true],
        vec![false],
        vec![true, true],
        vec![true, false],
        vec![false, false],
        vec![false, true, false],
    ] {
        let rules: Vec<_> = outcomes
            .iter()
            .map(|r| rule(json!({"type": "counting", "result": r})))
            .collect();
        let all = outcomes.iter().all(|r| *r);
        let any = outcomes.is_empty() || outcomes.iter().any(|r| *r);

        assert_eq!(engine.evaluate_rules(&rules, &e, Operator::And), all, "AND {:?}", outcomes);
        assert_eq!(engine.evaluate_rules(&rules, &e, Operator::Or), any, "OR {:?}", outcomes);
    }
}

#[test]
fn panicking_rule_fails_closed_without_blocking_others() {
    let counting = CountingRule::new();
    let engine = engine_with(&counting);
    let e = event("L", "info", "m");

    let panicking = rule(json!({"type": "panicking"}));
    assert!(!engine.evaluate_single_rule(&panicking, &e));

    let rules = vec![panicking, rule(json!({"type": "counting", "result": true}))];
    assert!(engine.evaluate_rules(&rules, &e, Operator::Or));
    assert!(!engine.evaluate_rules(&rules, &e, Operator::And));
}

#[test]
fn unknown_type_never_matches() {
    let engine = RulesEngine::with_core_rule_types();
    let rules = vec![rule(json!({"type": "geo", "countries": ["SE"]}))];
    assert!(!engine.evaluate_rules(&rules, &event("L", "info", "m"), Operator::Or));
    assert!(!engine.evaluate_rules(&rules, &event("L", "info", "m"), Operator::And));
}

#[test]
fn duplicate_rule_type_keeps_original() {
    let first = CountingRule::new();
    let mut engine = RulesEngine::new();
    assert!(engine.register_rule_type(Arc::new(first.clone())));
    assert!(!engine.register_rule_type(Arc::new(CountingRule::new())));

    engine.evaluate_single_rule(&rule(json!({"type": "counting", "result": true})), &event("L", "info", "m"));
    assert_eq!(first.count(), 1);
}

#[test]
fn core_rules_filter_by_level_and_logger() {
    let engine = RulesEngine::with_core_rule_types();
    let rule_set = RuleSet::new(
        vec![
            rule(json!({"type": "level", "levels": ["error", "critical"]})),
            rule(json!({"type": "logger", "loggers": ["SimpleUserLogger"]})),
        ],
        Operator::And,
    );

    assert!(engine.evaluate_rule_set(&rule_set, &event("SimpleUserLogger", "error", "m")));
    assert!(!engine.evaluate_rule_set(&rule_set, &event("SimpleUserLogger", "info", "m")));
    assert!(!engine.evaluate_rule_set(&rule_set, &event("SimplePostLogger", "error", "m")));

    assert_eq!(
        engine.get_rules_description(&rule_set.rules, rule_set.operator),
        "Level is one of: error, critical AND Logger is one of: SimpleUserLogger"
    );
}

#[test]
fn validation_reports_every_rule() {
    let engine = RulesEngine::with_core_rule_types();
    let rules = vec![
        rule(json!({"type": "level", "levels": ["error"]})),
        rule(json!({"levels": ["error"]})),
        rule(json!({"type": "nope"})),
        rule(json!({"type": "logger", "loggers": []})),
    ];

    let result = engine.validate_rules(&rules);
    assert!(!result.valid);
    assert_eq!(
        result.errors,
        vec![
            "Rule 2: Rule type is required",
            "Rule 3: Unknown rule type: nope",
            "Rule 4: At least one value is required for 'loggers'",
        ]
    );
}

#[test]
fn evaluation_failures_are_counted() {
    let metrics = TestMetrics::new();
    let counting = CountingRule::new();
    let engine = engine_with(&counting);

    metrics::with_local_recorder(&metrics, || {
        let e = event("L", "info", "m");
        engine.evaluate_single_rule(&rule(json!({"type": "panicking"})), &e);
        engine.evaluate_single_rule(&rule(json!({"type": "counting"})), &e);
    });

    assert_eq!(metrics.get_counter("rule_evaluation_failures_total"), 2);
    assert_eq!(
        metrics.get_counter("rule_evaluation_failures_total{rule_type=panicking}"),
        1
    );
}
