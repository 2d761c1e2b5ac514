use crate::diagnostic::{codes, Diagnostic};
use crate::rules::Rule;
use crate::transaction::Transaction;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A host-registered custom check: payload in, diagnostics out. An `Err`
/// becomes a single `CUSTOM_VALIDATION_ERROR` diagnostic.
pub type CustomCheck = Arc<dyn Fn(&Value) -> Result<Vec<Diagnostic>, String> + Send + Sync>;

/// Evaluates registered rules against transaction payloads.
///
/// Rules execute in name order and their diagnostics in validator order,
/// which makes the output reproducible run over run. A secondary index
/// from field path to validators answers [RuleEngine::validate_field]
/// without scanning every rule.
#[derive(Default)]
pub struct RuleEngine {
    rules: BTreeMap<String, Rule>,
    field_index: HashMap<String, Vec<(String, usize)>>,
    custom_checks: HashMap<String, CustomCheck>,
}

impl RuleEngine {
    pub fn new() -> RuleEngine {
        RuleEngine::default()
    }

    /// Register a rule, replacing any previous rule of the same name.
    pub fn register_rule(&mut self, rule: Rule) {
        let name = rule.name.clone();
        self.field_index
            .values_mut()
            .for_each(|entries| entries.retain(|(rule_name, _)| rule_name != &name));
        for (index, validator) in rule.field_validators.iter().enumerate() {
            self.field_index
                .entry(validator.field_path.clone())
                .or_default()
                .push((name.clone(), index));
        }
        self.rules.insert(name, rule);
    }

    /// Register a named custom check for rules to reference.
    pub fn register_custom_check(&mut self, name: &str, check: CustomCheck) {
        self.custom_checks.insert(name.to_string(), check);
    }

    /// Flip a rule on. Returns false when no rule has that name.
    pub fn enable_rule(&mut self, name: &str) -> bool {
        match self.rules.get_mut(name) {
            Some(rule) => {
                rule.enabled = true;
                true
            }
            None => false,
        }
    }

    /// Flip a rule off without forgetting it.
    pub fn disable_rule(&mut self, name: &str) -> bool {
        match self.rules.get_mut(name) {
            Some(rule) => {
                rule.enabled = false;
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Run every enabled rule against a payload projection.
    pub fn validate(&self, payload: &Value) -> Vec<Diagnostic> {
        self.run(payload, None)
    }

    /// Run only the named rules (still skipping disabled ones).
    pub fn validate_rules(&self, payload: &Value, rule_names: &[&str]) -> Vec<Diagnostic> {
        self.run(payload, Some(rule_names))
    }

    /// Convenience entry: validate a parsed transaction through its
    /// canonical projection.
    pub fn validate_transaction(&self, transaction: &Transaction) -> Vec<Diagnostic> {
        self.validate(&transaction.to_value())
    }

    /// Run just the validators registered for one field path, via the
    /// secondary index.
    pub fn validate_field(&self, payload: &Value, field_path: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if let Some(entries) = self.field_index.get(field_path) {
            for (rule_name, index) in entries {
                let rule = match self.rules.get(rule_name) {
                    Some(rule) => rule,
                    None => continue,
                };
                if let Some(validator) = rule.field_validators.get(*index) {
                    let mut found = validator.validate(payload);
                    stamp(&mut found, rule);
                    diagnostics.append(&mut found);
                }
            }
        }
        diagnostics
    }

    fn run(&self, payload: &Value, rule_names: Option<&[&str]>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for (name, rule) in &self.rules {
            if let Some(names) = rule_names {
                if !names.contains(&name.as_str()) {
                    continue;
                }
            }
            if !rule.enabled {
                continue;
            }
            diagnostics.extend(self.run_rule(rule, payload));
        }
        diagnostics
    }

    fn run_rule(&self, rule: &Rule, payload: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for validator in &rule.field_validators {
            diagnostics.extend(validator.validate(payload));
        }
        for check in &rule.cross_field_checks {
            diagnostics.extend(check.execute(payload, rule.severity));
        }
        if let Some(check_name) = &rule.custom_check {
            match self.custom_checks.get(check_name) {
                Some(check) => match check(payload) {
                    Ok(found) => diagnostics.extend(found),
                    Err(reason) => diagnostics.push(Diagnostic::error(
                        codes::CUSTOM_VALIDATION_ERROR,
                        format!("custom validation error in rule {}: {}", rule.name, reason),
                    )),
                },
                None => diagnostics.push(Diagnostic::error(
                    codes::CUSTOM_VALIDATION_ERROR,
                    format!(
                        "rule {} references unregistered custom check {}",
                        rule.name, check_name
                    ),
                )),
            }
        }
        stamp(&mut diagnostics, rule);
        diagnostics
    }
}

fn stamp(diagnostics: &mut [Diagnostic], rule: &Rule) {
    for diagnostic in diagnostics {
        diagnostic.rule_name = Some(rule.name.clone());
        diagnostic.rule_category = Some(rule.category.clone());
    }
}

#[cfg(test)]
use crate::diagnostic::Severity;

#[cfg(test)]
fn rule_named(name: &str, path: &str) -> Rule {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "category": "test",
        "severity": "error",
        "field_validators": [
            { "field_path": path, "validator": "required" }
        ]
    }))
    .unwrap()
}

#[test]
fn diagnostics_are_stamped_and_ordered_by_rule_name() {
    let mut engine = RuleEngine::new();
    engine.register_rule(rule_named("b_rule", "beta"));
    engine.register_rule(rule_named("a_rule", "alpha"));

    let diagnostics = engine.validate(&serde_json::json!({}));
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].rule_name.as_deref(), Some("a_rule"));
    assert_eq!(diagnostics[0].rule_category.as_deref(), Some("test"));
    assert_eq!(diagnostics[1].rule_name.as_deref(), Some("b_rule"));
}

#[test]
fn disabling_a_rule_removes_exactly_its_diagnostics() {
    let mut engine = RuleEngine::new();
    engine.register_rule(rule_named("a_rule", "alpha"));
    engine.register_rule(rule_named("b_rule", "beta"));
    let payload = serde_json::json!({});

    let before = engine.validate(&payload);
    assert!(engine.disable_rule("a_rule"));
    let during = engine.validate(&payload);
    assert_eq!(during.len(), before.len() - 1);
    assert!(during.iter().all(|d| d.rule_name.as_deref() != Some("a_rule")));

    assert!(engine.enable_rule("a_rule"));
    assert_eq!(engine.validate(&payload), before);
    assert!(!engine.disable_rule("missing_rule"));
}

#[test]
fn validate_field_answers_from_the_index() {
    let mut engine = RuleEngine::new();
    engine.register_rule(rule_named("a_rule", "alpha"));
    engine.register_rule(rule_named("b_rule", "beta"));

    let diagnostics = engine.validate_field(&serde_json::json!({ "beta": "x" }), "alpha");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].rule_name.as_deref(), Some("a_rule"));
    assert!(engine
        .validate_field(&serde_json::json!({ "beta": "x" }), "beta")
        .is_empty());
    assert!(engine
        .validate_field(&serde_json::json!({}), "unindexed")
        .is_empty());
}

#[test]
fn custom_check_errors_become_diagnostics() {
    let mut engine = RuleEngine::new();
    engine.register_custom_check(
        "explodes",
        Arc::new(|_| Err("numeric overflow".to_string())),
    );
    let mut rule = rule_named("c_rule", "gamma");
    rule.field_validators.clear();
    rule.custom_check = Some("explodes".to_string());
    engine.register_rule(rule);

    let diagnostics = engine.validate(&serde_json::json!({ "gamma": 1 }));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, codes::CUSTOM_VALIDATION_ERROR);
    assert_eq!(diagnostics[0].severity, Severity::Error);

    let mut unregistered = rule_named("d_rule", "delta");
    unregistered.field_validators.clear();
    unregistered.custom_check = Some("never_registered".to_string());
    let mut engine = RuleEngine::new();
    engine.register_rule(unregistered);
    let diagnostics = engine.validate(&serde_json::json!({}));
    assert_eq!(diagnostics[0].code, codes::CUSTOM_VALIDATION_ERROR);
}

#[test]
fn validating_twice_yields_identical_sequences() {
    let mut engine = RuleEngine::new();
    engine.register_rule(rule_named("a_rule", "alpha"));
    engine.register_rule(rule_named("b_rule", "beta"));
    let payload = serde_json::json!({ "beta": "x" });
    assert_eq!(engine.validate(&payload), engine.validate(&payload));
}
