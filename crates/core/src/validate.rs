//! Pre-load checks over a whole extraction file. Every problem is collected
//! so one run reports everything that needs fixing in the JSON.

use thiserror::Error;

use crate::dates::parse_date_in_year;
use crate::extraction::{AccountExtraction, ActivitySection, Extraction, ExtractionKind};
use crate::money::{fits_numeric_15_2, Scalar};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation error(s): {}", .0.len(), .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

/// `year` completes year-less `MM/DD` dates (the statement year); without it
/// such dates are rejected.
pub fn validate_extraction(
    extraction: &Extraction,
    kind: ExtractionKind,
    year: Option<i32>,
) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if extraction.accounts.is_empty() {
        errors.push("No accounts found in JSON".to_string());
    }

    // Accounts without a number are skipped by the loader, so they are not checked here.
    for account in &extraction.accounts {
        let Some(number) = account.account_number.as_deref() else {
            continue;
        };

        if kind.includes_activities() {
            validate_activities(account, number, year, &mut errors);
        }
        if kind == ExtractionKind::Holdings && !account.has_holdings() {
            errors.push(format!("{number}: Missing required 'holdings' array"));
        }
        if kind.includes_holdings() {
            validate_holdings(account, number, year, &mut errors);
        }
        validate_summaries(account, number, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_activities(account: &AccountExtraction, number: &str, year: Option<i32>, errors: &mut Vec<String>) {
    for section in ActivitySection::ALL {
        for (j, activity) in account.section(section).iter().enumerate() {
            let at = format!("{number}.{section}[{j}]");
            check_amount(&at, "amount", activity.amount.as_ref(), errors);
            check_amount(&at, "quantity", activity.quantity.as_ref(), errors);
            check_amount(&at, "price_per_unit", activity.price_per_unit.as_ref(), errors);
            check_amount(&at, "cost_basis", activity.cost_basis.as_ref(), errors);
            check_amount(&at, "transaction_cost", activity.transaction_cost.as_ref(), errors);
            check_date(&at, "date", activity.date.as_deref(), year, errors);
            check_date(&at, "settlement_date", activity.settlement_date.as_deref(), year, errors);
            check_date(&at, "trade_date", activity.trade_date.as_deref(), year, errors);
            check_date(&at, "post_date", activity.post_date.as_deref(), year, errors);
        }
    }
}

fn validate_holdings(account: &AccountExtraction, number: &str, year: Option<i32>, errors: &mut Vec<String>) {
    for (k, h) in account.holdings.as_deref().unwrap_or(&[]).iter().enumerate() {
        let at = format!("{number}.holdings[{k}]");
        for (field, value) in [
            ("quantity", &h.quantity),
            ("price_per_unit", &h.price_per_unit),
            ("beg_market_value", &h.beg_market_value),
            ("end_market_value", &h.end_market_value),
            ("cost_basis", &h.cost_basis),
            ("unrealized_gain_loss", &h.unrealized_gain_loss),
            ("estimated_ann_inc", &h.estimated_ann_inc),
            ("est_yield", &h.est_yield),
            ("strike_price", &h.strike_price),
            ("coupon_rate", &h.coupon_rate),
            ("accrued_int", &h.accrued_int),
            ("call_price", &h.call_price),
        ] {
            check_amount(&at, field, value.as_ref(), errors);
        }
        for (field, value) in [
            ("expiration_date", &h.expiration_date),
            ("maturity_date", &h.maturity_date),
            ("next_call_date", &h.next_call_date),
        ] {
            check_date(&at, field, value.as_deref(), year, errors);
        }
    }
}

fn validate_summaries(account: &AccountExtraction, number: &str, errors: &mut Vec<String>) {
    for (name, summary) in [
        ("portfolio_summary", &account.portfolio_summary),
        ("income_summary", &account.income_summary),
        ("realized_gains", &account.realized_gains),
    ] {
        let Some(summary) = summary else { continue };
        let at = format!("{number}.{name}");
        for (field, value) in summary {
            check_amount(&at, field, value.as_ref(), errors);
        }
    }
}

fn check_amount(at: &str, field: &str, value: Option<&Scalar>, errors: &mut Vec<String>) {
    let Some(value) = value else { return };
    match value.to_decimal() {
        Ok(Some(v)) if !fits_numeric_15_2(v) => errors.push(format!(
            "{at}: {field} value too large: {v} (max: 9,999,999,999,999.99)"
        )),
        Ok(_) => {}
        Err(e) => errors.push(format!("{at}: Invalid {field}: {e}")),
    }
}

fn check_date(at: &str, field: &str, value: Option<&str>, year: Option<i32>, errors: &mut Vec<String>) {
    let Some(value) = value else { return };
    let parsed = match year {
        Some(y) => parse_date_in_year(value, y),
        None => crate::dates::parse_date(value),
    };
    if let Err(e) = parsed {
        errors.push(format!("{at}: Invalid {field}: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Extraction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn valid_activities_pass() {
        let e = parse(
            r#"{"accounts":[{"account_number":"Z12345678","securities_bought_sold":[
                {"settlement_date":"2025-04-30","amount":"$1,234.56"}]}]}"#,
        );
        assert!(validate_extraction(&e, ExtractionKind::Activities, None).is_ok());
    }

    #[test]
    fn missing_accounts_fail() {
        let e = parse(r#"{"some_other_field":"value"}"#);
        let err = validate_extraction(&e, ExtractionKind::Activities, None).unwrap_err();
        assert_eq!(err.0, vec!["No accounts found in JSON".to_string()]);
    }

    #[test]
    fn bad_currency_is_reported_with_path() {
        let e = parse(
            r#"{"accounts":[{"account_number":"Z12345678","securities_bought_sold":[
                {"amount":"not a number"}]}]}"#,
        );
        let err = validate_extraction(&e, ExtractionKind::Activities, None).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert!(err.0[0].starts_with("Z12345678.securities_bought_sold[0]: Invalid amount"));
    }

    #[test]
    fn all_problems_are_collected() {
        let e = parse(
            r#"{"accounts":[
                {"deposits":[]},
                {"account_number":"A1","deposits":[{"amount":"10000000000000.00","date":"13/45/2024"}]}
            ]}"#,
        );
        let err = validate_extraction(&e, ExtractionKind::Activities, None).unwrap_err();
        assert_eq!(err.0.len(), 2);
        assert!(err.0[0].contains("value too large"));
        assert!(err.0[1].contains("Invalid date"));
    }

    #[test]
    fn holdings_kind_requires_holdings_array() {
        let e = parse(r#"{"accounts":[{"account_number":"A1"}]}"#);
        let err = validate_extraction(&e, ExtractionKind::Holdings, None).unwrap_err();
        assert!(err.0[0].contains("Missing required 'holdings' array"));
    }

    #[test]
    fn sentinels_are_not_errors() {
        let e = parse(
            r#"{"accounts":[{"account_number":"A1","holdings":[
                {"end_market_value":"unavailable","maturity_date":"n/a","quantity":"-"}]}]}"#,
        );
        assert!(validate_extraction(&e, ExtractionKind::Holdings, None).is_ok());
        assert!(validate_extraction(&e, ExtractionKind::Holdings, Some(2024)).is_ok());
    }

    #[test]
    fn sentinel_dates_pass_with_statement_year() {
        let e = parse(
            r#"{"accounts":[{"account_number":"A1",
                "holdings":[{"maturity_date":"n/a","expiration_date":"-","next_call_date":"N/A"}],
                "deposits":[{"date":"n/a","settlement_date":"unavailable","amount":"1.00"}],
                "billpay":[{"post_date":"-","amount":"2.00"}]}]}"#,
        );
        assert!(validate_extraction(&e, ExtractionKind::Combined, Some(2024)).is_ok());
    }

    #[test]
    fn year_less_dates_need_a_statement_year() {
        let e = parse(r#"{"accounts":[{"account_number":"A1","billpay":[{"post_date":"09/23"}]}]}"#);
        assert!(validate_extraction(&e, ExtractionKind::Activities, None).is_err());
        assert!(validate_extraction(&e, ExtractionKind::Activities, Some(2024)).is_ok());
    }

    #[test]
    fn bad_summary_value() {
        let e = parse(
            r#"{"accounts":[{"account_number":"A1","deposits":[],
                "income_summary":{"divs_taxable_ytd":"lots","roc_ytd":null}}]}"#,
        );
        let err = validate_extraction(&e, ExtractionKind::Activities, None).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert!(err.0[0].starts_with("A1.income_summary: Invalid divs_taxable_ytd"));
    }
}
