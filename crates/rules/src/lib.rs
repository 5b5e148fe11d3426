pub mod fields;
pub mod rules;
pub mod sheet;

pub use fields::{CheckField, Facts, TargetColumn};
pub use rules::{
    Action, Classification, Condition, FieldUpdates, LogicConnector, MatchOperator, Rule, RuleCategory, RuleEngine,
    RuleError,
};
pub use sheet::{load_rules_sheet, parse_actions, parse_triggers, read_rules_sheet, SheetError};
