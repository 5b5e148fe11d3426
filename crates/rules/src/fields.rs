use serde::{Deserialize, Serialize};
use std::fmt;

/// A record field that a rule condition can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckField {
    #[serde(rename = "activities.description")]
    Description,
    #[serde(rename = "activities.transaction")]
    Transaction,
    #[serde(rename = "activities.section")]
    Section,
    #[serde(rename = "activities.source")]
    Source,
    #[serde(rename = "activities.security")]
    Security,
    #[serde(rename = "activities.amount")]
    Amount,
    #[serde(rename = "activities.quantity")]
    Quantity,
    #[serde(rename = "positions.sec_name")]
    SecName,
    #[serde(rename = "positions.sec_type")]
    SecType,
    #[serde(rename = "positions.market_value")]
    MarketValue,
}

impl CheckField {
    pub const ALL: [CheckField; 10] = [
        CheckField::Description,
        CheckField::Transaction,
        CheckField::Section,
        CheckField::Source,
        CheckField::Security,
        CheckField::Amount,
        CheckField::Quantity,
        CheckField::SecName,
        CheckField::SecType,
        CheckField::MarketValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckField::Description => "activities.description",
            CheckField::Transaction => "activities.transaction",
            CheckField::Section => "activities.section",
            CheckField::Source => "activities.source",
            CheckField::Security => "activities.security",
            CheckField::Amount => "activities.amount",
            CheckField::Quantity => "activities.quantity",
            CheckField::SecName => "positions.sec_name",
            CheckField::SecType => "positions.sec_type",
            CheckField::MarketValue => "positions.market_value",
        }
    }
}

impl fmt::Display for CheckField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown check field: '{s}'"))
    }
}

/// A database column that a rule action writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetColumn {
    #[serde(alias = "activities.transactiontype", alias = "activities.type")]
    TransactionType,
    #[serde(alias = "activities.transactionsubtype", alias = "activities.subtype")]
    TransactionSubtype,
    #[serde(alias = "activities.sec_class", alias = "positions.sec_class")]
    SecClass,
    #[serde(alias = "positions.sec_type", alias = "positions.security_type")]
    SecType,
    #[serde(alias = "positions.sec_subtype")]
    SecSubtype,
}

impl TargetColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetColumn::TransactionType => "transaction_type",
            TargetColumn::TransactionSubtype => "transaction_subtype",
            TargetColumn::SecClass => "sec_class",
            TargetColumn::SecType => "sec_type",
            TargetColumn::SecSubtype => "sec_subtype",
        }
    }
}

impl fmt::Display for TargetColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts both the action field names used in rule sheets and the bare
/// column names stored in `map_actions`.
impl std::str::FromStr for TargetColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activities.transactiontype" | "activities.type" | "transaction_type" => {
                Ok(TargetColumn::TransactionType)
            }
            "activities.transactionsubtype" | "activities.subtype" | "transaction_subtype" => {
                Ok(TargetColumn::TransactionSubtype)
            }
            "activities.sec_class" | "positions.sec_class" | "sec_class" => Ok(TargetColumn::SecClass),
            "positions.sec_type" | "positions.security_type" | "sec_type" => Ok(TargetColumn::SecType),
            "positions.sec_subtype" | "sec_subtype" => Ok(TargetColumn::SecSubtype),
            other => Err(format!("Unknown action field: '{other}'")),
        }
    }
}

/// The values a rule sees for one transaction or position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facts {
    pub description: Option<String>,
    pub transaction: Option<String>,
    pub section: Option<String>,
    pub source: Option<String>,
    pub security: Option<String>,
    pub amount: Option<String>,
    pub quantity: Option<String>,
    pub sec_name: Option<String>,
    pub sec_type: Option<String>,
    pub market_value: Option<String>,
}

impl Facts {
    pub fn get(&self, field: CheckField) -> Option<&str> {
        let value = match field {
            CheckField::Description => &self.description,
            CheckField::Transaction => &self.transaction,
            CheckField::Section => &self.section,
            CheckField::Source => &self.source,
            CheckField::Security => &self.security,
            CheckField::Amount => &self.amount,
            CheckField::Quantity => &self.quantity,
            CheckField::SecName => &self.sec_name,
            CheckField::SecType => &self.sec_type,
            CheckField::MarketValue => &self.market_value,
        };
        value.as_deref()
    }
}
