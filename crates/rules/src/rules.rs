use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::fields::{CheckField, Facts, TargetColumn};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Rule '{0}' has no actions")]
    NoActions(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    #[default]
    Contains,
    #[serde(alias = "is")]
    Equals,
    StartsWith,
}

impl MatchOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOperator::Contains => "contains",
            MatchOperator::Equals => "equals",
            MatchOperator::StartsWith => "starts_with",
        }
    }

    /// Case-sensitive, like the statement text it is written against.
    pub fn test(self, value: &str, pattern: &str) -> bool {
        match self {
            MatchOperator::Contains => value.contains(pattern),
            MatchOperator::Equals => value == pattern,
            MatchOperator::StartsWith => value.starts_with(pattern),
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(MatchOperator::Contains),
            "equals" | "is" => Ok(MatchOperator::Equals),
            "starts_with" => Ok(MatchOperator::StartsWith),
            other => Err(format!("Unknown operator: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicConnector {
    #[default]
    And,
    Or,
}

impl LogicConnector {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicConnector::And => "AND",
            LogicConnector::Or => "OR",
        }
    }

    fn join(self, left: bool, right: bool) -> bool {
        match self {
            LogicConnector::And => left && right,
            LogicConnector::Or => left || right,
        }
    }
}

impl fmt::Display for LogicConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogicConnector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AND" => Ok(LogicConnector::And),
            "OR" => Ok(LogicConnector::Or),
            other => Err(format!("Unknown logic connector: '{other}'")),
        }
    }
}

/// Rule categories, in the order rules are applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RuleCategory {
    #[serde(rename = "Options Lifecycle")]
    OptionsLifecycle,
    #[serde(rename = "Transaction Types")]
    TransactionTypes,
    #[serde(rename = "Security Identification")]
    SecurityIdentification,
    #[serde(rename = "Section Fallbacks")]
    SectionFallbacks,
    #[serde(rename = "General Securities")]
    GeneralSecurities,
    #[default]
    #[serde(rename = "Custom Rules")]
    CustomRules,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        RuleCategory::OptionsLifecycle,
        RuleCategory::TransactionTypes,
        RuleCategory::SecurityIdentification,
        RuleCategory::SectionFallbacks,
        RuleCategory::GeneralSecurities,
        RuleCategory::CustomRules,
    ];

    /// Categorise a rule from keywords in its name.
    pub fn from_rule_name(name: &str) -> Self {
        let name = name.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| name.contains(w));
        if has_any(&["opening", "closing", "assignment"]) {
            RuleCategory::OptionsLifecycle
        } else if has_any(&["dividend", "interest", "muni"]) {
            RuleCategory::TransactionTypes
        } else if has_any(&["identifier", "call", "put"]) {
            RuleCategory::SecurityIdentification
        } else if name.contains("section") {
            RuleCategory::SectionFallbacks
        } else if name.contains("security type") {
            RuleCategory::GeneralSecurities
        } else {
            RuleCategory::CustomRules
        }
    }

    pub fn application_order(self) -> i32 {
        match self {
            RuleCategory::OptionsLifecycle => 1,
            RuleCategory::TransactionTypes => 2,
            RuleCategory::SecurityIdentification => 3,
            RuleCategory::SectionFallbacks => 4,
            RuleCategory::GeneralSecurities => 5,
            RuleCategory::CustomRules => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::OptionsLifecycle => "Options Lifecycle",
            RuleCategory::TransactionTypes => "Transaction Types",
            RuleCategory::SecurityIdentification => "Security Identification",
            RuleCategory::SectionFallbacks => "Section Fallbacks",
            RuleCategory::GeneralSecurities => "General Securities",
            RuleCategory::CustomRules => "Custom Rules",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown rule category: '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: CheckField,
    #[serde(default)]
    pub operator: MatchOperator,
    pub value: String,
    /// Joins this condition to the next one.
    #[serde(default)]
    pub connector: LogicConnector,
}

impl Condition {
    /// A field with no value never matches.
    pub fn matches(&self, facts: &Facts) -> bool {
        facts
            .get(self.field)
            .is_some_and(|v| self.operator.test(v, &self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub target: TargetColumn,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub category: RuleCategory,
    /// Defaults to the category's order when omitted.
    #[serde(default)]
    pub application_order: Option<i32>,
    #[serde(default)]
    pub problem_solved: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn order(&self) -> i32 {
        self.application_order
            .unwrap_or_else(|| self.category.application_order())
    }

    /// Conditions fold left to right with no precedence. A rule without
    /// conditions always matches.
    pub fn matches(&self, facts: &Facts) -> bool {
        let mut conditions = self.conditions.iter();
        let Some(first) = conditions.next() else {
            return true;
        };
        let mut result = first.matches(facts);
        let mut connector = first.connector;
        for condition in conditions {
            result = connector.join(result, condition.matches(facts));
            connector = condition.connector;
        }
        result
    }
}

/// Column writes produced by classifying one record.
pub type FieldUpdates = BTreeMap<TargetColumn, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub updates: FieldUpdates,
    pub applied: Vec<String>,
}

impl Classification {
    pub fn get(&self, column: TargetColumn) -> Option<&str> {
        self.updates.get(&column).map(String::as_str)
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| {
            a.order()
                .cmp(&b.order())
                .then(a.id.cmp(&b.id))
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { rules }
    }

    /// Reads a `[[rules]]` array of tables.
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        if let Some(rule) = file.rules.iter().find(|r| r.actions.is_empty()) {
            return Err(RuleError::NoActions(rule.name.clone()));
        }
        Ok(Self::new(file.rules))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every matching rule writes its actions in order, so a later rule
    /// overrides an earlier one on the same column.
    pub fn classify(&self, facts: &Facts) -> Classification {
        let mut classification = Classification::default();
        for rule in self.rules.iter().filter(|r| r.matches(facts)) {
            tracing::debug!(rule = %rule.name, order = rule.order(), "Applied mapping rule");
            for action in &rule.actions {
                classification
                    .updates
                    .insert(action.target, action.value.clone());
            }
            classification.applied.push(rule.name.clone());
        }
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(field: CheckField, operator: MatchOperator, value: &str, connector: LogicConnector) -> Condition {
        Condition {
            field,
            operator,
            value: value.to_string(),
            connector,
        }
    }

    fn make_rule(name: &str, order: i32, conditions: Vec<Condition>, actions: &[(TargetColumn, &str)]) -> Rule {
        Rule {
            id: None,
            name: name.to_string(),
            category: RuleCategory::CustomRules,
            application_order: Some(order),
            problem_solved: None,
            conditions,
            actions: actions
                .iter()
                .map(|(target, value)| Action {
                    target: *target,
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    fn facts(description: &str, section: &str) -> Facts {
        Facts {
            description: Some(description.to_string()),
            section: Some(section.to_string()),
            source: Some(section.to_string()),
            ..Facts::default()
        }
    }

    #[test]
    fn contains_is_case_sensitive() {
        let c = cond(CheckField::Description, MatchOperator::Contains, "DIVIDEND", LogicConnector::And);
        assert!(c.matches(&facts("ORDINARY DIVIDEND", "dividends_interest_income")));
        assert!(!c.matches(&facts("ordinary dividend", "dividends_interest_income")));
    }

    #[test]
    fn equals_and_starts_with() {
        let f = facts("YOU BOUGHT", "securities_bought_sold");
        assert!(cond(CheckField::Section, MatchOperator::Equals, "securities_bought_sold", LogicConnector::And)
            .matches(&f));
        assert!(!cond(CheckField::Section, MatchOperator::Equals, "securities", LogicConnector::And).matches(&f));
        assert!(cond(CheckField::Description, MatchOperator::StartsWith, "YOU", LogicConnector::And).matches(&f));
    }

    #[test]
    fn missing_value_never_matches() {
        let c = cond(CheckField::Transaction, MatchOperator::Contains, "", LogicConnector::And);
        assert!(!c.matches(&Facts::default()));
    }

    #[test]
    fn rule_without_conditions_always_matches() {
        let rule = make_rule("catch all", 6, vec![], &[(TargetColumn::SecClass, "other")]);
        assert!(rule.matches(&Facts::default()));
    }

    #[test]
    fn connectors_trail_their_condition() {
        // A OR B AND C  ==  (A OR B) AND C
        let rule = make_rule(
            "chain",
            1,
            vec![
                cond(CheckField::Description, MatchOperator::Contains, "CALL (", LogicConnector::Or),
                cond(CheckField::Description, MatchOperator::Contains, "PUT (", LogicConnector::And),
                cond(CheckField::Section, MatchOperator::Equals, "securities_bought_sold", LogicConnector::And),
            ],
            &[(TargetColumn::SecClass, "option")],
        );
        assert!(rule.matches(&facts("PUT (TSLA) TESLA", "securities_bought_sold")));
        assert!(!rule.matches(&facts("PUT (TSLA) TESLA", "deposits")));
        assert!(!rule.matches(&facts("APPLE INC", "securities_bought_sold")));
    }

    #[test]
    fn left_fold_has_no_precedence() {
        // A AND B OR C  ==  (A AND B) OR C, so C alone is enough
        let rule = make_rule(
            "fold",
            1,
            vec![
                cond(CheckField::Description, MatchOperator::Contains, "X", LogicConnector::And),
                cond(CheckField::Description, MatchOperator::Contains, "Y", LogicConnector::Or),
                cond(CheckField::Section, MatchOperator::Equals, "billpay", LogicConnector::And),
            ],
            &[(TargetColumn::TransactionType, "payment")],
        );
        assert!(rule.matches(&facts("nothing", "billpay")));
        assert!(rule.matches(&facts("X Y", "deposits")));
        assert!(!rule.matches(&facts("X", "deposits")));
    }

    #[test]
    fn later_rules_override_earlier_ones() {
        let engine = RuleEngine::new(vec![
            make_rule(
                "specific",
                2,
                vec![cond(CheckField::Description, MatchOperator::Contains, "Muni Exempt Int", LogicConnector::And)],
                &[(TargetColumn::TransactionSubtype, "muni_exempt")],
            ),
            make_rule(
                "general",
                1,
                vec![cond(CheckField::Section, MatchOperator::Equals, "dividends_interest_income", LogicConnector::And)],
                &[(TargetColumn::TransactionType, "dividend"), (TargetColumn::TransactionSubtype, "ordinary")],
            ),
        ]);
        let result = engine.classify(&facts("Muni Exempt Int", "dividends_interest_income"));
        assert_eq!(result.applied, vec!["general".to_string(), "specific".to_string()]);
        assert_eq!(result.get(TargetColumn::TransactionType), Some("dividend"));
        assert_eq!(result.get(TargetColumn::TransactionSubtype), Some("muni_exempt"));
        assert_eq!(result.get(TargetColumn::SecClass), None);
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = vec![
            make_rule("b", 3, vec![], &[(TargetColumn::SecClass, "b")]),
            make_rule("a", 3, vec![], &[(TargetColumn::SecClass, "a")]),
            make_rule("c", 1, vec![], &[(TargetColumn::SecClass, "c")]),
        ];
        let mut reversed = rules.clone();
        reversed.reverse();
        let f = facts("anything", "deposits");
        let first = RuleEngine::new(rules).classify(&f);
        let second = RuleEngine::new(reversed).classify(&f);
        assert_eq!(first, second);
        assert_eq!(first.applied, vec!["c", "a", "b"]);
        assert_eq!(first.get(TargetColumn::SecClass), Some("b"));
    }

    #[test]
    fn stored_ids_break_ties_before_names() {
        let mut z = make_rule("z", 2, vec![], &[(TargetColumn::SecType, "z")]);
        z.id = Some(1);
        let mut a = make_rule("a", 2, vec![], &[(TargetColumn::SecType, "a")]);
        a.id = Some(2);
        let engine = RuleEngine::new(vec![a, z]);
        let names: Vec<_> = engine.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn category_from_name() {
        assert_eq!(RuleCategory::from_rule_name("Opening Transaction Options"), RuleCategory::OptionsLifecycle);
        assert_eq!(RuleCategory::from_rule_name("Muni Interest"), RuleCategory::TransactionTypes);
        assert_eq!(RuleCategory::from_rule_name("Put Identifier"), RuleCategory::SecurityIdentification);
        assert_eq!(RuleCategory::from_rule_name("Deposits Section Default"), RuleCategory::SectionFallbacks);
        assert_eq!(RuleCategory::from_rule_name("Bond Security Type"), RuleCategory::GeneralSecurities);
        assert_eq!(RuleCategory::from_rule_name("Wire Transfers"), RuleCategory::CustomRules);
        assert_eq!(RuleCategory::CustomRules.application_order(), 6);
    }

    #[test]
    fn operator_synonyms() {
        assert_eq!("is".parse::<MatchOperator>(), Ok(MatchOperator::Equals));
        assert!("matches".parse::<MatchOperator>().is_err());
        assert_eq!("or".parse::<LogicConnector>(), Ok(LogicConnector::Or));
    }

    #[test]
    fn from_toml_rules() {
        let toml = r#"
            [[rules]]
            name = "Treasury bills"
            category = "General Securities"

            [[rules.conditions]]
            field = "positions.sec_name"
            operator = "contains"
            value = "TREASURY"

            [[rules.actions]]
            target = "positions.sec_type"
            value = "Bonds"

            [[rules]]
            name = "Everything else"
            actions = [{ target = "sec_class", value = "other" }]
        "#;
        let engine = RuleEngine::from_toml(toml).unwrap();
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.rules()[0].name, "Treasury bills");
        assert_eq!(engine.rules()[0].order(), 5);
        assert_eq!(engine.rules()[0].conditions[0].connector, LogicConnector::And);

        let position = Facts {
            sec_name: Some("US TREASURY BILL".to_string()),
            ..Facts::default()
        };
        let result = engine.classify(&position);
        assert_eq!(result.get(TargetColumn::SecType), Some("Bonds"));
        assert_eq!(result.get(TargetColumn::SecClass), Some("other"));
    }

    #[test]
    fn from_toml_rejects_unknown_fields_and_empty_actions() {
        let bad_field = r#"
            [[rules]]
            name = "bad"
            conditions = [{ field = "activities.memo", value = "x" }]
            actions = [{ target = "sec_class", value = "x" }]
        "#;
        assert!(matches!(RuleEngine::from_toml(bad_field), Err(RuleError::Toml(_))));

        let no_actions = r#"
            [[rules]]
            name = "empty"
            actions = []
        "#;
        assert!(matches!(RuleEngine::from_toml(no_actions), Err(RuleError::NoActions(n)) if n == "empty"));
    }
}
