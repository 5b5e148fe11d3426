use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(EntityId);
row_id!(InstitutionId);
row_id!(AccountId);
row_id!(DocumentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Brokerage,
    Ira,
    RothIra,
    #[serde(rename = "401k")]
    FourOhOneK,
    CashManagement,
    Checking,
    Savings,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Brokerage => "brokerage",
            AccountType::Ira => "ira",
            AccountType::RothIra => "roth_ira",
            AccountType::FourOhOneK => "401k",
            AccountType::CashManagement => "cash_management",
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
        }
    }

    /// Guess the account type from a statement's account title. Keywords
    /// match whole words only, so "Spiral Fund" is not an IRA.
    pub fn infer(account_name: &str) -> Self {
        let lower = account_name.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |word: &str| words.iter().any(|w| *w == word);
        let has_pair = |first: &str, second: &str| words.windows(2).any(|w| w == [first, second]);

        if has("roth") {
            AccountType::RothIra
        } else if has("ira") {
            AccountType::Ira
        } else if has("401k") || has_pair("401", "k") {
            AccountType::FourOhOneK
        } else if has("cma") || has_pair("cash", "management") {
            AccountType::CashManagement
        } else if has("checking") {
            AccountType::Checking
        } else if has("savings") {
            AccountType::Savings
        } else {
            AccountType::Brokerage
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "brokerage" => Ok(AccountType::Brokerage),
            "ira" => Ok(AccountType::Ira),
            "roth_ira" => Ok(AccountType::RothIra),
            "401k" => Ok(AccountType::FourOhOneK),
            "cash_management" => Ok(AccountType::CashManagement),
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            other => Err(format!("Unknown account type: '{other}'")),
        }
    }
}

/// Canonical institution name for the short names statements and extractors use.
pub fn normalize_institution_name(name: &str) -> String {
    match name.trim().to_lowercase().as_str() {
        "fidelity" => "Fidelity Investments".to_string(),
        "bofa" | "boa" => "Bank of America".to_string(),
        "suntrust" => "SunTrust Bank".to_string(),
        _ => name.trim().to_string(),
    }
}

/// Masked form used for display: `****1234`.
pub fn display_account_number(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    if chars.len() >= 4 {
        format!("****{}", chars[chars.len() - 4..].iter().collect::<String>())
    } else {
        "****".to_string()
    }
}
