//! Serde model of the JSON files produced by the statement extractors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::money::Scalar;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub extraction_metadata: ExtractionMetadata,
    #[serde(default)]
    pub document_data: DocumentData,
    #[serde(default)]
    pub accounts: Vec<AccountExtraction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Content hash of the source PDF/CSV, computed when the document was registered.
    #[serde(default, alias = "doc_md5_hash")]
    pub doc_hash: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub extraction_type: Option<String>,
    #[serde(default, alias = "source_csv_filepath")]
    pub source_pdf_filepath: Option<String>,
    #[serde(default)]
    pub extractor_version: Option<String>,
    #[serde(default)]
    pub extraction_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentData {
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub statement_date: Option<String>,
    #[serde(default)]
    pub period_start: Option<String>,
    #[serde(default)]
    pub period_end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountExtraction {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_holder_name: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,

    #[serde(default)]
    pub holdings: Option<Vec<Holding>>,

    #[serde(default)]
    pub dividends_interest_income: Option<Vec<Activity>>,
    #[serde(default)]
    pub deposits: Option<Vec<Activity>>,
    #[serde(default)]
    pub withdrawals: Option<Vec<Activity>>,
    #[serde(default)]
    pub core_fund_activity: Option<Vec<Activity>>,
    #[serde(default)]
    pub securities_bought_sold: Option<Vec<Activity>>,
    #[serde(default)]
    pub short_activity: Option<Vec<Activity>>,
    #[serde(default)]
    pub other_activity_in: Option<Vec<Activity>>,
    #[serde(default)]
    pub other_activity_out: Option<Vec<Activity>>,
    #[serde(default)]
    pub exchanges_in: Option<Vec<Activity>>,
    #[serde(default)]
    pub exchanges_out: Option<Vec<Activity>>,
    #[serde(default)]
    pub fees_charges: Option<Vec<Activity>>,
    #[serde(default)]
    pub billpay: Option<Vec<Activity>>,
    #[serde(default)]
    pub trades_pending_settlement: Option<Vec<Activity>>,

    #[serde(default)]
    pub portfolio_summary: Option<BTreeMap<String, Option<Scalar>>>,
    #[serde(default)]
    pub income_summary: Option<BTreeMap<String, Option<Scalar>>>,
    #[serde(default)]
    pub realized_gains: Option<BTreeMap<String, Option<Scalar>>>,
}

impl AccountExtraction {
    pub fn section(&self, section: ActivitySection) -> &[Activity] {
        let items = match section {
            ActivitySection::DividendsInterestIncome => &self.dividends_interest_income,
            ActivitySection::Deposits => &self.deposits,
            ActivitySection::Withdrawals => &self.withdrawals,
            ActivitySection::CoreFundActivity => &self.core_fund_activity,
            ActivitySection::SecuritiesBoughtSold => &self.securities_bought_sold,
            ActivitySection::ShortActivity => &self.short_activity,
            ActivitySection::OtherActivityIn => &self.other_activity_in,
            ActivitySection::OtherActivityOut => &self.other_activity_out,
            ActivitySection::ExchangesIn => &self.exchanges_in,
            ActivitySection::ExchangesOut => &self.exchanges_out,
            ActivitySection::FeesCharges => &self.fees_charges,
            ActivitySection::Billpay => &self.billpay,
            ActivitySection::TradesPendingSettlement => &self.trades_pending_settlement,
        };
        items.as_deref().unwrap_or(&[])
    }

    pub fn has_holdings(&self) -> bool {
        self.holdings.is_some()
    }

    /// Whether any activity section key is present, even if empty.
    pub fn has_activity_sections(&self) -> bool {
        ActivitySection::ALL.iter().any(|s| self.section_present(*s))
    }

    fn section_present(&self, section: ActivitySection) -> bool {
        match section {
            ActivitySection::DividendsInterestIncome => self.dividends_interest_income.is_some(),
            ActivitySection::Deposits => self.deposits.is_some(),
            ActivitySection::Withdrawals => self.withdrawals.is_some(),
            ActivitySection::CoreFundActivity => self.core_fund_activity.is_some(),
            ActivitySection::SecuritiesBoughtSold => self.securities_bought_sold.is_some(),
            ActivitySection::ShortActivity => self.short_activity.is_some(),
            ActivitySection::OtherActivityIn => self.other_activity_in.is_some(),
            ActivitySection::OtherActivityOut => self.other_activity_out.is_some(),
            ActivitySection::ExchangesIn => self.exchanges_in.is_some(),
            ActivitySection::ExchangesOut => self.exchanges_out.is_some(),
            ActivitySection::FeesCharges => self.fees_charges.is_some(),
            ActivitySection::Billpay => self.billpay.is_some(),
            ActivitySection::TradesPendingSettlement => self.trades_pending_settlement.is_some(),
        }
    }

    pub fn has_summaries(&self) -> bool {
        [&self.portfolio_summary, &self.income_summary, &self.realized_gains]
            .iter()
            .any(|s| s.as_ref().is_some_and(|m| !m.is_empty()))
    }
}

/// One line item from an activity section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub settlement_date: Option<String>,
    #[serde(default)]
    pub trade_date: Option<String>,
    #[serde(default)]
    pub post_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub sec_description: Option<String>,
    #[serde(default)]
    pub sec_symbol: Option<String>,
    #[serde(default)]
    pub cusip: Option<String>,
    #[serde(default)]
    pub quantity: Option<Scalar>,
    #[serde(default)]
    pub price_per_unit: Option<Scalar>,
    #[serde(default)]
    pub cost_basis: Option<Scalar>,
    #[serde(default, alias = "fees")]
    pub transaction_cost: Option<Scalar>,
    #[serde(default)]
    pub amount: Option<Scalar>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub ytd_payments: Option<Scalar>,
}

/// One position from a holdings section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Holding {
    #[serde(default)]
    pub sec_description: Option<String>,
    #[serde(default)]
    pub sec_symbol: Option<String>,
    #[serde(default)]
    pub cusip: Option<String>,
    #[serde(default)]
    pub sec_type: Option<String>,
    #[serde(default)]
    pub sec_subtype: Option<String>,
    #[serde(default)]
    pub quantity: Option<Scalar>,
    #[serde(default, alias = "price")]
    pub price_per_unit: Option<Scalar>,
    #[serde(default)]
    pub beg_market_value: Option<Scalar>,
    #[serde(default)]
    pub end_market_value: Option<Scalar>,
    #[serde(default)]
    pub cost_basis: Option<Scalar>,
    #[serde(default)]
    pub unrealized_gain_loss: Option<Scalar>,
    #[serde(default)]
    pub estimated_ann_inc: Option<Scalar>,
    #[serde(default)]
    pub est_yield: Option<Scalar>,
    #[serde(default)]
    pub underlying_symbol: Option<String>,
    #[serde(default)]
    pub strike_price: Option<Scalar>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub maturity_date: Option<String>,
    #[serde(default)]
    pub coupon_rate: Option<Scalar>,
    #[serde(default)]
    pub accrued_int: Option<Scalar>,
    #[serde(default)]
    pub agency_ratings: Option<String>,
    #[serde(default)]
    pub next_call_date: Option<String>,
    #[serde(default)]
    pub call_price: Option<Scalar>,
    #[serde(default)]
    pub payment_freq: Option<String>,
    #[serde(default)]
    pub bond_features: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySection {
    DividendsInterestIncome,
    Deposits,
    Withdrawals,
    CoreFundActivity,
    SecuritiesBoughtSold,
    ShortActivity,
    OtherActivityIn,
    OtherActivityOut,
    ExchangesIn,
    ExchangesOut,
    FeesCharges,
    Billpay,
    TradesPendingSettlement,
}

impl ActivitySection {
    pub const ALL: [ActivitySection; 13] = [
        ActivitySection::DividendsInterestIncome,
        ActivitySection::Deposits,
        ActivitySection::Withdrawals,
        ActivitySection::CoreFundActivity,
        ActivitySection::SecuritiesBoughtSold,
        ActivitySection::ShortActivity,
        ActivitySection::OtherActivityIn,
        ActivitySection::OtherActivityOut,
        ActivitySection::ExchangesIn,
        ActivitySection::ExchangesOut,
        ActivitySection::FeesCharges,
        ActivitySection::Billpay,
        ActivitySection::TradesPendingSettlement,
    ];

    /// JSON key of the section; also stored as the transaction's `source`.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivitySection::DividendsInterestIncome => "dividends_interest_income",
            ActivitySection::Deposits => "deposits",
            ActivitySection::Withdrawals => "withdrawals",
            ActivitySection::CoreFundActivity => "core_fund_activity",
            ActivitySection::SecuritiesBoughtSold => "securities_bought_sold",
            ActivitySection::ShortActivity => "short_activity",
            ActivitySection::OtherActivityIn => "other_activity_in",
            ActivitySection::OtherActivityOut => "other_activity_out",
            ActivitySection::ExchangesIn => "exchanges_in",
            ActivitySection::ExchangesOut => "exchanges_out",
            ActivitySection::FeesCharges => "fees_charges",
            ActivitySection::Billpay => "billpay",
            ActivitySection::TradesPendingSettlement => "trades_pending_settlement",
        }
    }

    /// Raw (transaction date, settlement date) text for an activity of this section.
    pub fn raw_dates<'a>(self, activity: &'a Activity) -> (Option<&'a str>, Option<&'a str>) {
        let date = activity.date.as_deref();
        let settlement = activity.settlement_date.as_deref();
        match self {
            ActivitySection::Billpay => {
                let post = activity.post_date.as_deref();
                (post, post)
            }
            ActivitySection::TradesPendingSettlement => (activity.trade_date.as_deref(), settlement),
            _ => (date.or(settlement), settlement.or(date)),
        }
    }
}

impl fmt::Display for ActivitySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivitySection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivitySection::ALL
            .iter()
            .copied()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| format!("Unknown activity section: '{s}'"))
    }
}

/// Which half of a statement an extraction file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    Activities,
    Holdings,
    /// Both holdings and activity sections in one file.
    Combined,
}

impl ExtractionKind {
    pub fn includes_activities(self) -> bool {
        matches!(self, ExtractionKind::Activities | ExtractionKind::Combined)
    }

    pub fn includes_holdings(self) -> bool {
        matches!(self, ExtractionKind::Holdings | ExtractionKind::Combined)
    }
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionKind::Activities => write!(f, "activities"),
            ExtractionKind::Holdings => write!(f, "holdings"),
            ExtractionKind::Combined => write!(f, "activities+holdings"),
        }
    }
}

impl Extraction {
    /// Institution from the metadata block, falling back to the document block.
    pub fn institution(&self) -> Option<&str> {
        self.extraction_metadata
            .institution
            .as_deref()
            .or(self.document_data.institution.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Derive the extraction kind from content; the metadata's declared type
    /// is only consulted when no account carries either kind of data.
    pub fn kind(&self) -> Result<ExtractionKind, String> {
        let holdings = self.accounts.iter().any(AccountExtraction::has_holdings);
        let activities = self.accounts.iter().any(AccountExtraction::has_activity_sections);
        match (holdings, activities) {
            (true, true) => Ok(ExtractionKind::Combined),
            (true, false) => Ok(ExtractionKind::Holdings),
            (false, true) => Ok(ExtractionKind::Activities),
            (false, false) => match self.extraction_metadata.extraction_type.as_deref() {
                Some("activities") => Ok(ExtractionKind::Activities),
                Some("holdings") | Some("positions") => Ok(ExtractionKind::Holdings),
                Some(other) => Err(format!("Unknown extraction type: '{other}'")),
                None => Err("Cannot determine extraction type: no holdings or activity sections".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Extraction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn kind_from_content() {
        let holdings = parse(r#"{"accounts":[{"account_number":"X1","holdings":[]}]}"#);
        assert_eq!(holdings.kind().unwrap(), ExtractionKind::Holdings);

        let activities = parse(r#"{"accounts":[{"account_number":"X1","deposits":[]}]}"#);
        assert_eq!(activities.kind().unwrap(), ExtractionKind::Activities);

        let both = parse(r#"{"accounts":[{"account_number":"X1","holdings":[]},{"account_number":"X2","billpay":[]}]}"#);
        assert_eq!(both.kind().unwrap(), ExtractionKind::Combined);
    }

    #[test]
    fn kind_falls_back_to_metadata() {
        let e = parse(r#"{"extraction_metadata":{"extraction_type":"positions"},"accounts":[{"account_number":"X1"}]}"#);
        assert_eq!(e.kind().unwrap(), ExtractionKind::Holdings);

        let unknown = parse(r#"{"extraction_metadata":{"extraction_type":"tax_forms"},"accounts":[]}"#);
        assert!(unknown.kind().is_err());
        assert!(parse(r#"{"accounts":[]}"#).kind().is_err());
    }

    #[test]
    fn null_sections_read_as_empty() {
        let e = parse(r#"{"accounts":[{"account_number":"X1","deposits":null}]}"#);
        assert!(e.accounts[0].section(ActivitySection::Deposits).is_empty());
        assert!(e.accounts[0].section(ActivitySection::Billpay).is_empty());
    }

    #[test]
    fn legacy_hash_field_name() {
        let e = parse(r#"{"extraction_metadata":{"doc_md5_hash":"abc","institution":"Fidelity"}}"#);
        assert_eq!(e.extraction_metadata.doc_hash.as_deref(), Some("abc"));
        assert_eq!(e.institution(), Some("Fidelity"));
    }

    #[test]
    fn institution_falls_back_to_document_data() {
        let e = parse(r#"{"document_data":{"institution":"Schwab"}}"#);
        assert_eq!(e.institution(), Some("Schwab"));
        assert_eq!(parse("{}").institution(), None);
    }

    #[test]
    fn section_date_rules() {
        let a = Activity {
            date: Some("01/02/2024".into()),
            settlement_date: Some("01/04/2024".into()),
            trade_date: Some("01/01/2024".into()),
            post_date: Some("01/03/2024".into()),
            ..Default::default()
        };
        assert_eq!(
            ActivitySection::Billpay.raw_dates(&a),
            (Some("01/03/2024"), Some("01/03/2024"))
        );
        assert_eq!(
            ActivitySection::TradesPendingSettlement.raw_dates(&a),
            (Some("01/01/2024"), Some("01/04/2024"))
        );
        assert_eq!(
            ActivitySection::Deposits.raw_dates(&a),
            (Some("01/02/2024"), Some("01/04/2024"))
        );

        let only_settle = Activity { settlement_date: Some("02/01/2024".into()), ..Default::default() };
        assert_eq!(
            ActivitySection::SecuritiesBoughtSold.raw_dates(&only_settle),
            (Some("02/01/2024"), Some("02/01/2024"))
        );
    }

    #[test]
    fn section_names_roundtrip() {
        use std::str::FromStr;
        for s in ActivitySection::ALL {
            assert_eq!(ActivitySection::from_str(s.as_str()).unwrap(), s);
        }
        assert!(ActivitySection::from_str("unknown_section").is_err());
    }

    #[test]
    fn numeric_and_text_amounts() {
        let e = parse(r#"{"accounts":[{"account_number":"X1","deposits":[{"amount":1500.25},{"amount":"$10.00"}]}]}"#);
        let deposits = e.accounts[0].section(ActivitySection::Deposits);
        assert_eq!(deposits[0].amount.as_ref().unwrap().as_text(), "1500.25");
        assert_eq!(deposits[1].amount.as_ref().unwrap().as_text(), "$10.00");
    }
}
