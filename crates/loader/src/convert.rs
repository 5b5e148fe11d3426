//! Turn extracted line items into rows, classifying each with the rule set.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stmtload_core::{
    extract_option_symbol, merge_symbol_cusip, parse_amount, parse_date, parse_date_in_year, AccountExtraction,
    AccountId, Activity, ActivitySection, DocumentId, EntityId, Holding, ParseError,
};
use stmtload_rules::{RuleEngine, TargetColumn};
use stmtload_storage::{DocLevelData, NewPosition, NewTransaction, SUMMARY_FIELDS};

/// Where the rows of one account in one document belong.
#[derive(Debug, Clone, Copy)]
pub struct AccountContext<'a> {
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub entity_id: EntityId,
    pub account_number: &'a str,
    pub statement_date: Option<NaiveDate>,
    /// Completes year-less dates.
    pub year: Option<i32>,
}

impl AccountContext<'_> {
    fn date(&self, value: Option<&str>) -> Result<Option<NaiveDate>, ParseError> {
        match (value, self.year) {
            (None, _) => Ok(None),
            (Some(v), Some(year)) => parse_date_in_year(v, year),
            (Some(v), None) => parse_date(v),
        }
    }
}

pub fn activity_to_transaction(
    ctx: &AccountContext<'_>,
    section: ActivitySection,
    activity: &Activity,
    engine: &RuleEngine,
) -> Result<NewTransaction, ParseError> {
    let (raw_date, raw_settlement) = section.raw_dates(activity);
    let description = activity
        .description
        .clone()
        .or_else(|| activity.sec_description.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let symbol = extract_option_symbol(activity.sec_description.as_deref(), activity.sec_symbol.as_deref());

    let mut tx = NewTransaction {
        entity_id: ctx.entity_id,
        document_id: ctx.document_id,
        account_id: ctx.account_id,
        transaction_date: ctx.date(raw_date)?,
        settlement_date: ctx.date(raw_settlement)?,
        transaction_code: activity.transaction.clone(),
        description,
        amount: parse_amount(activity.amount.as_ref())?.unwrap_or(Decimal::ZERO),
        security_name: activity.sec_description.clone(),
        security_identifier: merge_symbol_cusip(symbol.as_deref(), activity.cusip.as_deref()),
        sec_cusip: activity.cusip.clone(),
        quantity: parse_amount(activity.quantity.as_ref())?,
        price_per_unit: parse_amount(activity.price_per_unit.as_ref())?,
        cost_basis: parse_amount(activity.cost_basis.as_ref())?,
        fees: parse_amount(activity.transaction_cost.as_ref())?,
        reference_number: activity.reference.clone(),
        source: section.as_str().to_string(),
        payee: activity.payee.clone(),
        ..NewTransaction::default()
    };

    let result = engine.classify(&tx.facts());
    tx.transaction_type = result.get(TargetColumn::TransactionType).map(str::to_string);
    tx.transaction_subtype = result
        .get(TargetColumn::TransactionSubtype)
        .map(str::to_string)
        .or_else(|| activity.transaction.clone());
    tx.sec_class = result.get(TargetColumn::SecClass).map(str::to_string);
    Ok(tx)
}

pub fn holding_to_position(
    ctx: &AccountContext<'_>,
    holding: &Holding,
    engine: &RuleEngine,
) -> Result<NewPosition, ParseError> {
    let is_option = holding.sec_type.as_deref() == Some("Options");

    let mut pos = NewPosition {
        document_id: ctx.document_id,
        account_id: ctx.account_id,
        entity_id: ctx.entity_id,
        position_date: ctx.statement_date,
        account_number: ctx.account_number.to_string(),
        sec_ticker: holding.sec_symbol.clone(),
        cusip: holding.cusip.clone(),
        sec_name: holding.sec_description.clone(),
        raw_sec_subtype: holding.sec_subtype.clone(),
        quantity: parse_amount(holding.quantity.as_ref())?,
        price: parse_amount(holding.price_per_unit.as_ref())?.unwrap_or(Decimal::ZERO),
        beg_market_value: parse_amount(holding.beg_market_value.as_ref())?,
        end_market_value: parse_amount(holding.end_market_value.as_ref())?.unwrap_or(Decimal::ZERO),
        cost_basis: parse_amount(holding.cost_basis.as_ref())?,
        unrealized_gain_loss: parse_amount(holding.unrealized_gain_loss.as_ref())?,
        estimated_ann_inc: parse_amount(holding.estimated_ann_inc.as_ref())?,
        est_yield: parse_amount(holding.est_yield.as_ref())?,
        underlying_symbol: holding.underlying_symbol.clone(),
        strike_price: parse_amount(holding.strike_price.as_ref())?,
        exp_date: ctx.date(holding.expiration_date.as_deref())?,
        option_type: holding.sec_subtype.clone().filter(|_| is_option),
        maturity_date: ctx.date(holding.maturity_date.as_deref())?,
        coupon_rate: parse_amount(holding.coupon_rate.as_ref())?,
        accrued_int: parse_amount(holding.accrued_int.as_ref())?,
        agency_ratings: holding.agency_ratings.clone(),
        next_call_date: ctx.date(holding.next_call_date.as_deref())?,
        call_price: parse_amount(holding.call_price.as_ref())?,
        payment_freq: holding.payment_freq.clone(),
        bond_features: holding.bond_features.clone(),
        source: holding.sec_type.clone(),
        ..NewPosition::default()
    };

    let result = engine.classify(&pos.facts());
    pos.sec_type = result
        .get(TargetColumn::SecType)
        .map(str::to_string)
        .or_else(|| holding.sec_type.clone());
    pos.sec_subtype = result
        .get(TargetColumn::SecSubtype)
        .map(str::to_string)
        .or_else(|| holding.sec_subtype.clone());
    pos.sec_class = result.get(TargetColumn::SecClass).map(str::to_string);
    Ok(pos)
}

/// The account's portfolio, income and realized-gain figures as one row, or
/// `None` when the account has no summary data.
pub fn account_summary(
    ctx: &AccountContext<'_>,
    account: &AccountExtraction,
) -> Result<Option<DocLevelData>, ParseError> {
    if !account.has_summaries() {
        return Ok(None);
    }

    let mut data = DocLevelData {
        document_id: ctx.document_id,
        account_id: ctx.account_id,
        account_number: ctx.account_number.to_string(),
        as_of_date: ctx.statement_date,
        ..DocLevelData::default()
    };
    for (section, key, column) in SUMMARY_FIELDS {
        let summary = match section {
            "portfolio_summary" => &account.portfolio_summary,
            "income_summary" => &account.income_summary,
            _ => &account.realized_gains,
        };
        let value = summary.as_ref().and_then(|s| s.get(key)).and_then(Option::as_ref);
        if let Some(amount) = parse_amount(value)? {
            data.values.insert(column, amount);
        }
    }
    Ok(Some(data))
}
