use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use stmtload_core::{AccountId, DocumentId, EntityId};
use stmtload_rules::Facts;

use crate::db::decimal_text;

#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub entity_id: EntityId,
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub transaction_date: Option<NaiveDate>,
    pub settlement_date: Option<NaiveDate>,
    pub transaction_type: Option<String>,
    pub transaction_subtype: Option<String>,
    pub transaction_code: Option<String>,
    pub description: String,
    pub amount: Decimal,
    pub security_name: Option<String>,
    pub security_identifier: Option<String>,
    pub sec_cusip: Option<String>,
    pub quantity: Option<Decimal>,
    pub price_per_unit: Option<Decimal>,
    pub cost_basis: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub reference_number: Option<String>,
    pub source: String,
    pub payee: Option<String>,
    pub sec_class: Option<String>,
}

impl NewTransaction {
    pub fn facts(&self) -> Facts {
        transaction_facts(
            &self.description,
            self.transaction_code.as_deref(),
            &self.source,
            self.security_name.as_deref(),
            self.amount,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPosition {
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub entity_id: EntityId,
    pub position_date: Option<NaiveDate>,
    pub account_number: String,
    pub sec_ticker: Option<String>,
    pub cusip: Option<String>,
    pub sec_name: Option<String>,
    pub sec_type: Option<String>,
    pub sec_subtype: Option<String>,
    pub raw_sec_subtype: Option<String>,
    pub sec_class: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Decimal,
    pub beg_market_value: Option<Decimal>,
    pub end_market_value: Decimal,
    pub cost_basis: Option<Decimal>,
    pub unrealized_gain_loss: Option<Decimal>,
    pub estimated_ann_inc: Option<Decimal>,
    pub est_yield: Option<Decimal>,
    pub underlying_symbol: Option<String>,
    pub strike_price: Option<Decimal>,
    pub exp_date: Option<NaiveDate>,
    pub option_type: Option<String>,
    pub maturity_date: Option<NaiveDate>,
    pub coupon_rate: Option<Decimal>,
    pub accrued_int: Option<Decimal>,
    pub agency_ratings: Option<String>,
    pub next_call_date: Option<NaiveDate>,
    pub call_price: Option<Decimal>,
    pub payment_freq: Option<String>,
    pub bond_features: Option<String>,
    /// The extracted security type.
    pub source: Option<String>,
}

impl NewPosition {
    pub fn facts(&self) -> Facts {
        position_facts(
            self.sec_name.as_deref(),
            self.source.as_deref(),
            self.quantity,
            self.end_market_value,
        )
    }
}

/// Money as it reads on a statement and in `NUMERIC(15,2)`: two decimals.
fn money_text(value: Decimal) -> String {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value.to_string()
}

/// Rule inputs for a transaction, built from the values as stored so that
/// load-time and re-applied classification see the same text. Amounts read
/// with two decimals (`12.50`), quantities as written (`10`, `0.125`).
pub fn transaction_facts(
    description: &str,
    transaction_code: Option<&str>,
    source: &str,
    security_name: Option<&str>,
    amount: Decimal,
    quantity: Option<Decimal>,
) -> Facts {
    Facts {
        description: Some(description.to_string()),
        transaction: transaction_code.map(str::to_string),
        section: Some(source.to_string()),
        source: Some(source.to_string()),
        security: security_name.map(str::to_string),
        amount: Some(money_text(amount)),
        quantity: decimal_text(quantity),
        ..Facts::default()
    }
}

/// Positions use their extracted security type as both type and source.
pub fn position_facts(
    sec_name: Option<&str>,
    extracted_sec_type: Option<&str>,
    quantity: Option<Decimal>,
    end_market_value: Decimal,
) -> Facts {
    Facts {
        source: extracted_sec_type.map(str::to_string),
        quantity: decimal_text(quantity),
        sec_name: sec_name.map(str::to_string),
        sec_type: extracted_sec_type.map(str::to_string),
        market_value: Some(money_text(end_market_value)),
        ..Facts::default()
    }
}

/// Summary keys per statement section and the `doc_level_data` column each
/// one lands in.
pub const SUMMARY_FIELDS: [(&str, &str, &str); 27] = [
    ("portfolio_summary", "net_account_value", "net_acct_value"),
    ("portfolio_summary", "beginning_value", "beg_value"),
    ("portfolio_summary", "ending_value", "end_value"),
    ("income_summary", "taxable_total_period", "taxable_total_period"),
    ("income_summary", "taxable_total_ytd", "taxable_total_ytd"),
    ("income_summary", "divs_taxable_period", "divs_taxable_period"),
    ("income_summary", "divs_taxable_ytd", "divs_taxable_ytd"),
    ("income_summary", "stcg_taxable_period", "stcg_taxable_period"),
    ("income_summary", "stcg_taxable_ytd", "stcg_taxable_ytd"),
    ("income_summary", "int_taxable_period", "int_taxable_period"),
    ("income_summary", "int_taxable_ytd", "int_taxable_ytd"),
    ("income_summary", "ltcg_taxable_period", "ltcg_taxable_period"),
    ("income_summary", "ltcg_taxable_ytd", "ltcg_taxable_ytd"),
    ("income_summary", "tax_exempt_total_period", "tax_exempt_total_period"),
    ("income_summary", "tax_exempt_total_ytd", "tax_exempt_total_ytd"),
    ("income_summary", "divs_tax_exempt_period", "divs_tax_exempt_period"),
    ("income_summary", "divs_tax_exempt_ytd", "divs_tax_exempt_ytd"),
    ("income_summary", "int_tax_exempt_period", "int_tax_exempt_period"),
    ("income_summary", "int_tax_exempt_ytd", "int_tax_exempt_ytd"),
    ("income_summary", "roc_period", "roc_period"),
    ("income_summary", "roc_ytd", "roc_ytd"),
    ("income_summary", "grand_total_period", "grand_total_period"),
    ("income_summary", "grand_total_ytd", "grand_total_ytd"),
    ("realized_gains", "st_gain_period", "st_gain_period"),
    ("realized_gains", "st_loss_period", "st_loss_period"),
    ("realized_gains", "lt_gain_ytd", "lt_gain_ytd"),
    ("realized_gains", "lt_loss_ytd", "lt_loss_ytd"),
];

/// One account's summary figures for a document, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct DocLevelData {
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub account_number: String,
    pub as_of_date: Option<NaiveDate>,
    pub values: BTreeMap<&'static str, Decimal>,
}

pub async fn insert_transaction(conn: &mut SqliteConnection, tx: &NewTransaction) -> Result<i64, sqlx::Error> {
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO transactions (
            entity_id, document_id, account_id, transaction_date, settlement_date,
            transaction_type, transaction_subtype, transaction_code, description, amount,
            security_name, security_identifier, sec_cusip, quantity, price_per_unit,
            cost_basis, fees, reference_number, source, payee, sec_class
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(tx.entity_id.0)
    .bind(tx.document_id.0)
    .bind(tx.account_id.0)
    .bind(tx.transaction_date)
    .bind(tx.settlement_date)
    .bind(&tx.transaction_type)
    .bind(&tx.transaction_subtype)
    .bind(&tx.transaction_code)
    .bind(&tx.description)
    .bind(decimal_text(Some(tx.amount)))
    .bind(&tx.security_name)
    .bind(&tx.security_identifier)
    .bind(&tx.sec_cusip)
    .bind(decimal_text(tx.quantity))
    .bind(decimal_text(tx.price_per_unit))
    .bind(decimal_text(tx.cost_basis))
    .bind(decimal_text(tx.fees))
    .bind(&tx.reference_number)
    .bind(&tx.source)
    .bind(&tx.payee)
    .bind(&tx.sec_class)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn insert_position(conn: &mut SqliteConnection, pos: &NewPosition) -> Result<i64, sqlx::Error> {
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO positions (
            document_id, account_id, entity_id, position_date, account_number,
            sec_ticker, cusip, sec_name, sec_type, sec_subtype, raw_sec_subtype, sec_class,
            quantity, price, beg_market_value, end_market_value, cost_basis, unrealized_gain_loss,
            estimated_ann_inc, est_yield, underlying_symbol, strike_price, exp_date, option_type,
            maturity_date, coupon_rate, accrued_int, agency_ratings, next_call_date,
            call_price, payment_freq, bond_features, source
         ) VALUES (
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
         )
         RETURNING id",
    )
    .bind(pos.document_id.0)
    .bind(pos.account_id.0)
    .bind(pos.entity_id.0)
    .bind(pos.position_date)
    .bind(&pos.account_number)
    .bind(&pos.sec_ticker)
    .bind(&pos.cusip)
    .bind(&pos.sec_name)
    .bind(&pos.sec_type)
    .bind(&pos.sec_subtype)
    .bind(&pos.raw_sec_subtype)
    .bind(&pos.sec_class)
    .bind(decimal_text(pos.quantity))
    .bind(decimal_text(Some(pos.price)))
    .bind(decimal_text(pos.beg_market_value))
    .bind(decimal_text(Some(pos.end_market_value)))
    .bind(decimal_text(pos.cost_basis))
    .bind(decimal_text(pos.unrealized_gain_loss))
    .bind(decimal_text(pos.estimated_ann_inc))
    .bind(decimal_text(pos.est_yield))
    .bind(&pos.underlying_symbol)
    .bind(decimal_text(pos.strike_price))
    .bind(pos.exp_date)
    .bind(&pos.option_type)
    .bind(pos.maturity_date)
    .bind(decimal_text(pos.coupon_rate))
    .bind(decimal_text(pos.accrued_int))
    .bind(&pos.agency_ratings)
    .bind(pos.next_call_date)
    .bind(decimal_text(pos.call_price))
    .bind(&pos.payment_freq)
    .bind(&pos.bond_features)
    .bind(&pos.source)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// One row per document and account. Returns false when the row already
/// existed and nothing was written.
pub async fn insert_doc_level_data(conn: &mut SqliteConnection, data: &DocLevelData) -> Result<bool, sqlx::Error> {
    let columns: Vec<&str> = SUMMARY_FIELDS.iter().map(|(_, _, column)| *column).collect();
    let placeholders = vec!["?"; columns.len() + 4].join(", ");
    let sql = format!(
        "INSERT OR IGNORE INTO doc_level_data (document_id, account_id, account_number, as_of_date, {}) VALUES ({})",
        columns.join(", "),
        placeholders
    );

    let mut query = sqlx::query(&sql)
        .bind(data.document_id.0)
        .bind(data.account_id.0)
        .bind(&data.account_number)
        .bind(data.as_of_date);
    for column in &columns {
        query = query.bind(decimal_text(data.values.get(column).copied()));
    }
    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}
