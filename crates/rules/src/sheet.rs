//! The mapping rules sheet: a CSV export with one rule per row.
//!
//! ```text
//! Rule Name,Triggers,Actions,Problem Solved
//! Muni Interest,"activities.description contains ""Muni Exempt Int"" AND activities.section equals ""dividends_interest_income""","SET activities.type = ""interest""; SET activities.subtype = ""muni_exempt""",Tax-exempt interest
//! ```

use regex::Regex;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::fields::{CheckField, TargetColumn};
use crate::rules::{Action, Condition, LogicConnector, MatchOperator, Rule, RuleCategory};

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(rename = "Rule Name", default)]
    name: String,
    #[serde(rename = "Triggers", default)]
    triggers: String,
    #[serde(rename = "Actions", default)]
    actions: String,
    #[serde(rename = "Problem Solved", default)]
    problem_solved: String,
}

fn clause_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*(\w+\.\w+)\s+(\w+)\s+"([^"]+)"\s*"#).expect("static clause pattern"))
}

fn connector_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(AND|OR)\s+").expect("static connector pattern"))
}

fn action_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*SET\s+(\w+\.\w+)\s*=\s*"([^"]+)"\s*(;|$)"#).expect("static action pattern")
    })
}

/// Parse `field operator "value"` clauses joined by `AND` / `OR`. Each
/// connector is stored on the condition before it. Quoted values may
/// themselves contain the words AND or OR.
pub fn parse_triggers(triggers: &str) -> Result<Vec<Condition>, String> {
    let mut conditions: Vec<Condition> = Vec::new();
    let mut rest = triggers.trim();

    loop {
        let caps = clause_pattern()
            .captures(rest)
            .ok_or_else(|| format!("Cannot parse condition: {rest}"))?;
        let field: CheckField = caps[1].parse()?;
        let operator: MatchOperator = caps[2].parse()?;
        conditions.push(Condition {
            field,
            operator,
            value: caps[3].to_string(),
            connector: LogicConnector::And,
        });
        rest = &rest[caps[0].len()..];
        if rest.is_empty() {
            break;
        }

        let joiner = connector_pattern()
            .captures(rest)
            .ok_or_else(|| format!("Expected AND or OR before: {rest}"))?;
        let connector: LogicConnector = joiner[1].parse()?;
        if let Some(last) = conditions.last_mut() {
            last.connector = connector;
        }
        rest = &rest[joiner[0].len()..];
    }

    Ok(conditions)
}

/// Parse `SET field = "value"` statements separated by `;`.
pub fn parse_actions(actions: &str) -> Result<Vec<Action>, String> {
    let mut parsed = Vec::new();
    let mut rest = actions.trim();

    while !rest.is_empty() {
        let caps = action_pattern()
            .captures(rest)
            .ok_or_else(|| format!("Cannot parse action: {rest}"))?;
        let target: TargetColumn = caps[1].parse()?;
        parsed.push(Action {
            target,
            value: caps[2].to_string(),
        });
        rest = rest[caps[0].len()..].trim_start();
    }

    if parsed.is_empty() {
        return Err("No actions".to_string());
    }
    Ok(parsed)
}

/// Rows without a name, triggers or actions are skipped. Any other problem
/// rejects the whole sheet. The result is sorted by application order, then
/// name.
pub fn read_rules_sheet<R: Read>(data: R) -> Result<Vec<Rule>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rules = Vec::new();
    for (idx, result) in reader.deserialize::<SheetRow>().enumerate() {
        // Header is row 1.
        let row_number = idx + 2;
        let row = result?;

        if row.name.is_empty() || row.triggers.is_empty() || row.actions.is_empty() {
            tracing::warn!(row = row_number, "Skipping rule row with missing fields");
            continue;
        }

        let invalid = |message: String| SheetError::InvalidRow {
            row: row_number,
            message: format!("{}: {message}", row.name),
        };
        let conditions = parse_triggers(&row.triggers).map_err(invalid)?;
        let actions = parse_actions(&row.actions).map_err(invalid)?;
        let category = RuleCategory::from_rule_name(&row.name);

        rules.push(Rule {
            id: None,
            name: row.name.clone(),
            category,
            application_order: Some(category.application_order()),
            problem_solved: Some(row.problem_solved).filter(|p| !p.is_empty()),
            conditions,
            actions,
        });
    }

    rules.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.name.cmp(&b.name)));
    Ok(rules)
}

pub fn load_rules_sheet(path: &Path) -> Result<Vec<Rule>, SheetError> {
    let file = std::fs::File::open(path)?;
    read_rules_sheet(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_trigger() {
        let conditions = parse_triggers(r#"activities.description contains "OPENING TRANSACTION""#).unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, CheckField::Description);
        assert_eq!(conditions[0].operator, MatchOperator::Contains);
        assert_eq!(conditions[0].value, "OPENING TRANSACTION");
    }

    #[test]
    fn compound_triggers_keep_trailing_connectors() {
        let conditions = parse_triggers(
            r#"activities.description contains "CALL (" OR activities.security contains "CALL (" AND activities.section equals "securities_bought_sold""#,
        )
        .unwrap();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0].connector, LogicConnector::Or);
        assert_eq!(conditions[1].connector, LogicConnector::And);
        assert_eq!(conditions[1].field, CheckField::Security);
        assert_eq!(conditions[2].operator, MatchOperator::Equals);
    }

    #[test]
    fn connector_words_inside_quotes() {
        let conditions =
            parse_triggers(r#"activities.description contains "PRINCIPAL AND INTEREST" OR activities.transaction is "Interest""#)
                .unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].value, "PRINCIPAL AND INTEREST");
        assert_eq!(conditions[0].connector, LogicConnector::Or);
        assert_eq!(conditions[1].operator, MatchOperator::Equals);
    }

    #[test]
    fn bad_triggers() {
        assert!(parse_triggers("description has stuff").is_err());
        assert!(parse_triggers(r#"activities.description matches "X""#)
            .unwrap_err()
            .contains("Unknown operator"));
        assert!(parse_triggers(r#"activities.memo contains "X""#)
            .unwrap_err()
            .contains("Unknown check field"));
        assert!(parse_triggers(r#"activities.description contains "X" XOR activities.section equals "Y""#).is_err());
    }

    #[test]
    fn multiple_actions() {
        let actions =
            parse_actions(r#"SET activities.type = "interest"; SET activities.subtype = "muni_exempt";"#).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].target, TargetColumn::TransactionType);
        assert_eq!(actions[1].target, TargetColumn::TransactionSubtype);
        assert_eq!(actions[1].value, "muni_exempt");
    }

    #[test]
    fn bad_actions() {
        assert!(parse_actions(r#"activities.type = "interest""#).is_err());
        assert!(parse_actions(r#"SET activities.amount = "1""#).is_err());
        assert!(parse_actions("").is_err());
    }

    #[test]
    fn read_sheet_sorts_and_categorises() {
        let data = "Rule Name,Triggers,Actions,Problem Solved\n\
            Wire Transfers,\"activities.description contains \"\"WIRE\"\"\",\"SET activities.type = \"\"transfer\"\"\",\n\
            Muni Interest,\"activities.description contains \"\"Muni Exempt Int\"\"\",\"SET activities.type = \"\"interest\"\"\",Tax-exempt interest\n\
            Opening Transaction,\"activities.description contains \"\"OPENING TRANSACTION\"\"\",\"SET activities.subtype = \"\"open\"\"\",\n";
        let rules = read_rules_sheet(data.as_bytes()).unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Opening Transaction", "Muni Interest", "Wire Transfers"]);
        assert_eq!(rules[1].category, RuleCategory::TransactionTypes);
        assert_eq!(rules[1].order(), 2);
        assert_eq!(rules[1].problem_solved.as_deref(), Some("Tax-exempt interest"));
        assert_eq!(rules[2].problem_solved, None);
    }

    #[test]
    fn incomplete_rows_are_skipped() {
        let data = "Rule Name,Triggers,Actions,Problem Solved\n\
            Draft,,\"SET activities.type = \"\"x\"\"\",\n\
            ,,,\n\
            Fees Section,\"activities.section equals \"\"fees_charges\"\"\",\"SET activities.type = \"\"fee\"\"\",\n";
        let rules = read_rules_sheet(data.as_bytes()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].category, RuleCategory::SectionFallbacks);
    }

    #[test]
    fn unparseable_row_reports_row_number() {
        let data = "Rule Name,Triggers,Actions,Problem Solved\n\
            Good,\"activities.section equals \"\"deposits\"\"\",\"SET activities.type = \"\"deposit\"\"\",\n\
            Broken,activities.section equals deposits,\"SET activities.type = \"\"x\"\"\",\n";
        let err = read_rules_sheet(data.as_bytes()).unwrap_err();
        match err {
            SheetError::InvalidRow { row, message } => {
                assert_eq!(row, 3);
                assert!(message.starts_with("Broken: Cannot parse condition"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
