//! The three mapping tables: `map_rules`, and per rule its ordered
//! `map_conditions` and `map_actions`.

use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use stmtload_rules::{Action, Condition, Rule, RuleCategory};

use crate::db::{DbPool, StorageError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleCounts {
    pub rules: i64,
    pub conditions: i64,
    pub actions: i64,
}

/// Replace the whole rule set in one transaction. Returns the number of
/// rules written.
pub async fn replace_mapping_rules(pool: &DbPool, rules: &[Rule]) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM map_actions").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM map_conditions").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM map_rules").execute(&mut *tx).await?;

    for rule in rules {
        let (rule_id,) = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO map_rules (rule_name, rule_category, application_order, problem_solved)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&rule.name)
        .bind(rule.category.as_str())
        .bind(rule.order())
        .bind(&rule.problem_solved)
        .fetch_one(&mut *tx)
        .await?;

        for (order, condition) in rule.conditions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO map_conditions (rule_id, condition_order, check_field, match_operator, match_value, logic_connector)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(rule_id)
            .bind(order as i64)
            .bind(condition.field.as_str())
            .bind(condition.operator.as_str())
            .bind(&condition.value)
            .bind(condition.connector.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for (order, action) in rule.actions.iter().enumerate() {
            sqlx::query("INSERT INTO map_actions (rule_id, action_order, set_field, set_value) VALUES (?, ?, ?, ?)")
                .bind(rule_id)
                .bind(order as i64)
                .bind(action.target.as_str())
                .bind(&action.value)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(rules = rules.len(), "Mapping rules replaced");
    Ok(rules.len())
}

/// All stored rules in application order.
pub async fn load_mapping_rules(conn: &mut SqliteConnection) -> Result<Vec<Rule>, StorageError> {
    let rule_rows = sqlx::query_as::<_, (i64, String, String, i64, Option<String>)>(
        "SELECT id, rule_name, rule_category, application_order, problem_solved
         FROM map_rules ORDER BY application_order, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let condition_rows = sqlx::query_as::<_, (i64, String, String, String, String)>(
        "SELECT rule_id, check_field, match_operator, match_value, logic_connector
         FROM map_conditions ORDER BY rule_id, condition_order, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let action_rows = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT rule_id, set_field, set_value FROM map_actions ORDER BY rule_id, action_order, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let invalid = |rule_id: i64| move |message: String| StorageError::InvalidRule { rule_id, message };

    let mut conditions: BTreeMap<i64, Vec<Condition>> = BTreeMap::new();
    for (rule_id, field, operator, value, connector) in condition_rows {
        conditions.entry(rule_id).or_default().push(Condition {
            field: field.parse().map_err(invalid(rule_id))?,
            operator: operator.parse().map_err(invalid(rule_id))?,
            value,
            connector: connector.parse().map_err(invalid(rule_id))?,
        });
    }

    let mut actions: BTreeMap<i64, Vec<Action>> = BTreeMap::new();
    for (rule_id, field, value) in action_rows {
        actions.entry(rule_id).or_default().push(Action {
            target: field.parse().map_err(invalid(rule_id))?,
            value,
        });
    }

    let mut rules = Vec::with_capacity(rule_rows.len());
    for (id, name, category, order, problem_solved) in rule_rows {
        let category: RuleCategory = category.parse().map_err(invalid(id))?;
        rules.push(Rule {
            id: Some(id),
            name,
            category,
            application_order: Some(order as i32),
            problem_solved,
            conditions: conditions.remove(&id).unwrap_or_default(),
            actions: actions.remove(&id).unwrap_or_default(),
        });
    }
    Ok(rules)
}

pub async fn mapping_rule_counts(pool: &DbPool) -> Result<RuleCounts, sqlx::Error> {
    let (rules, conditions, actions) = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT (SELECT COUNT(*) FROM map_rules),
                (SELECT COUNT(*) FROM map_conditions),
                (SELECT COUNT(*) FROM map_actions)",
    )
    .fetch_one(pool)
    .await?;
    Ok(RuleCounts {
        rules,
        conditions,
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use stmtload_rules::{read_rules_sheet, CheckField, LogicConnector, MatchOperator, TargetColumn};

    const SHEET: &str = "Rule Name,Triggers,Actions,Problem Solved\n\
        Call Identifier,\"activities.description contains \"\"CALL (\"\" OR activities.security contains \"\"CALL (\"\"\",\"SET activities.sec_class = \"\"call\"\"\",Options\n\
        Muni Interest,\"activities.description contains \"\"Muni Exempt Int\"\" AND activities.section is \"\"dividends_interest_income\"\"\",\"SET activities.type = \"\"interest\"\"; SET activities.subtype = \"\"muni_exempt\"\"\",\n";

    #[tokio::test]
    async fn rules_round_trip_through_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("finance.db")).await.unwrap();
        let rules = read_rules_sheet(SHEET.as_bytes()).unwrap();

        assert_eq!(replace_mapping_rules(&pool, &rules).await.unwrap(), 2);
        assert_eq!(
            mapping_rule_counts(&pool).await.unwrap(),
            RuleCounts {
                rules: 2,
                conditions: 4,
                actions: 3
            }
        );

        let mut conn = pool.acquire().await.unwrap();
        let stored = load_mapping_rules(&mut conn).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "Muni Interest");
        assert_eq!(stored[0].order(), 2);
        assert_eq!(stored[0].conditions[0].connector, LogicConnector::And);
        assert_eq!(stored[0].conditions[1].operator, MatchOperator::Equals);
        assert_eq!(stored[0].actions[1].target, TargetColumn::TransactionSubtype);
        assert_eq!(stored[1].name, "Call Identifier");
        assert_eq!(stored[1].conditions[0].connector, LogicConnector::Or);
        assert_eq!(stored[1].conditions[1].field, CheckField::Security);
        assert_eq!(stored[1].problem_solved.as_deref(), Some("Options"));
        assert!(stored.iter().all(|r| r.id.is_some()));
    }

    #[tokio::test]
    async fn replacing_discards_old_rules() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("finance.db")).await.unwrap();
        let rules = read_rules_sheet(SHEET.as_bytes()).unwrap();
        replace_mapping_rules(&pool, &rules).await.unwrap();
        replace_mapping_rules(&pool, &rules[..1]).await.unwrap();

        let counts = mapping_rule_counts(&pool).await.unwrap();
        assert_eq!(counts.rules, 1);
        assert_eq!(counts.actions, 2);
    }

    #[tokio::test]
    async fn unknown_stored_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("finance.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        sqlx::query("INSERT INTO map_rules (id, rule_name, rule_category, application_order) VALUES (7, 'x', 'Custom Rules', 6)")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO map_actions (rule_id, action_order, set_field, set_value) VALUES (7, 0, 'activities.memo', 'y')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let err = load_mapping_rules(&mut conn).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRule { rule_id: 7, .. }));
    }
}
