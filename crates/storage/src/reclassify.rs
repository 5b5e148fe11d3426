//! Re-run the stored mapping rules over records that are already loaded,
//! after the rule set has changed.

use rust_decimal::Decimal;
use stmtload_core::DocumentId;
use stmtload_rules::{RuleEngine, TargetColumn};

use crate::db::{stored_decimal, DbPool, StorageError};
use crate::mapping::load_mapping_rules;
use crate::records::{position_facts, transaction_facts};

type TransactionRow = (
    i64,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

type PositionRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Classify every transaction (or those of one document) again. Each row
/// whose derived columns change is written with a single UPDATE; the count of
/// such rows is returned.
pub async fn reapply_rules_to_transactions(
    pool: &DbPool,
    document_id: Option<DocumentId>,
) -> Result<u64, StorageError> {
    let mut tx = pool.begin().await?;
    let engine = RuleEngine::new(load_mapping_rules(&mut tx).await?);

    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, description, transaction_code, source, security_name, amount, quantity,
                transaction_type, transaction_subtype, sec_class
         FROM transactions
         WHERE ?1 IS NULL OR document_id = ?1
         ORDER BY id",
    )
    .bind(document_id.map(|d| d.0))
    .fetch_all(&mut *tx)
    .await?;

    let mut updated = 0;
    for (id, description, code, source, security, amount, quantity, old_type, old_subtype, old_class) in rows {
        let amount = stored_decimal("transactions.amount", Some(amount))?.unwrap_or(Decimal::ZERO);
        let quantity = stored_decimal("transactions.quantity", quantity)?;
        let facts = transaction_facts(
            &description,
            code.as_deref(),
            &source,
            security.as_deref(),
            amount,
            quantity,
        );
        let result = engine.classify(&facts);

        let new_type = result.get(TargetColumn::TransactionType).map(str::to_string);
        let new_subtype = result
            .get(TargetColumn::TransactionSubtype)
            .map(str::to_string)
            .or(code);
        let new_class = result.get(TargetColumn::SecClass).map(str::to_string);

        if (&new_type, &new_subtype, &new_class) == (&old_type, &old_subtype, &old_class) {
            continue;
        }
        sqlx::query(
            "UPDATE transactions SET transaction_type = ?, transaction_subtype = ?, sec_class = ? WHERE id = ?",
        )
        .bind(&new_type)
        .bind(&new_subtype)
        .bind(&new_class)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        updated += 1;
    }

    tx.commit().await?;
    tracing::info!(updated, rules = engine.len(), "Reapplied mapping rules to transactions");
    Ok(updated)
}

/// As [`reapply_rules_to_transactions`], for positions. Columns no rule sets
/// fall back to the extracted security type and subtype.
pub async fn reapply_rules_to_positions(pool: &DbPool, document_id: Option<DocumentId>) -> Result<u64, StorageError> {
    let mut tx = pool.begin().await?;
    let engine = RuleEngine::new(load_mapping_rules(&mut tx).await?);

    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT id, sec_name, source, quantity, end_market_value, raw_sec_subtype,
                sec_type, sec_subtype, sec_class
         FROM positions
         WHERE ?1 IS NULL OR document_id = ?1
         ORDER BY id",
    )
    .bind(document_id.map(|d| d.0))
    .fetch_all(&mut *tx)
    .await?;

    let mut updated = 0;
    for (id, sec_name, source, quantity, market_value, raw_subtype, old_type, old_subtype, old_class) in rows {
        let quantity = stored_decimal("positions.quantity", quantity)?;
        let market_value = stored_decimal("positions.end_market_value", Some(market_value))?.unwrap_or(Decimal::ZERO);
        let facts = position_facts(sec_name.as_deref(), source.as_deref(), quantity, market_value);
        let result = engine.classify(&facts);

        let new_type = result.get(TargetColumn::SecType).map(str::to_string).or(source);
        let new_subtype = result
            .get(TargetColumn::SecSubtype)
            .map(str::to_string)
            .or(raw_subtype);
        let new_class = result.get(TargetColumn::SecClass).map(str::to_string);

        if (&new_type, &new_subtype, &new_class) == (&old_type, &old_subtype, &old_class) {
            continue;
        }
        sqlx::query("UPDATE positions SET sec_type = ?, sec_subtype = ?, sec_class = ? WHERE id = ?")
            .bind(&new_type)
            .bind(&new_subtype)
            .bind(&new_class)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        updated += 1;
    }

    tx.commit().await?;
    tracing::info!(updated, rules = engine.len(), "Reapplied mapping rules to positions");
    Ok(updated)
}
