use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Mapping rule {rule_id} is invalid: {message}")]
    InvalidRule { rule_id: i64, message: String },
    #[error("Stored value in {column} is not a decimal: '{value}'")]
    InvalidDecimal { column: &'static str, value: String },
}

/// Open (creating if needed) the database at `path` and bring the schema up
/// to date. The pool holds a single connection, so callers holding an open
/// transaction must pass that transaction rather than the pool.
pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    tracing::debug!(path = %path.display(), "Database ready");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_name TEXT NOT NULL UNIQUE,
            entity_type TEXT NOT NULL DEFAULT 'individual',
            tax_id_display TEXT NOT NULL DEFAULT 'PENDING',
            entity_status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS institutions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution_name TEXT NOT NULL UNIQUE,
            institution_type TEXT NOT NULL DEFAULT 'brokerage',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            institution_id INTEGER NOT NULL,
            account_number TEXT NOT NULL,
            account_number_display TEXT NOT NULL,
            account_name TEXT,
            account_type TEXT NOT NULL,
            account_status TEXT NOT NULL DEFAULT 'active',
            is_tax_deferred INTEGER NOT NULL DEFAULT 0,
            is_tax_free INTEGER NOT NULL DEFAULT 0,
            requires_rmd INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (account_number, institution_id),
            FOREIGN KEY (entity_id) REFERENCES entities(id),
            FOREIGN KEY (institution_id) REFERENCES institutions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            institution_id INTEGER NOT NULL,
            doc_hash TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            file_path TEXT,
            statement_date TEXT,
            period_start TEXT,
            period_end TEXT,
            processed_at TEXT NOT NULL DEFAULT (datetime('now')),
            activities_loaded TEXT,
            activities_json_hash TEXT,
            positions_loaded TEXT,
            positions_json_hash TEXT,
            updated_at TEXT,
            FOREIGN KEY (institution_id) REFERENCES institutions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_accounts (
            document_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            PRIMARY KEY (document_id, account_id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // transaction_code keeps the statement's own transaction text so rules
    // can be re-evaluated after the derived columns have been overwritten.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            document_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            transaction_date TEXT,
            settlement_date TEXT,
            transaction_type TEXT,
            transaction_subtype TEXT,
            transaction_code TEXT,
            description TEXT NOT NULL,
            amount TEXT NOT NULL,
            security_name TEXT,
            security_identifier TEXT,
            sec_cusip TEXT,
            quantity TEXT,
            price_per_unit TEXT,
            cost_basis TEXT,
            fees TEXT,
            reference_number TEXT,
            source TEXT NOT NULL,
            payee TEXT,
            sec_class TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (entity_id) REFERENCES entities(id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // source is the extracted sec_type and raw_sec_subtype the extracted
    // subtype; both survive rule rewrites of sec_type/sec_subtype.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            entity_id INTEGER NOT NULL,
            position_date TEXT,
            account_number TEXT NOT NULL,
            sec_ticker TEXT,
            cusip TEXT,
            sec_name TEXT,
            sec_type TEXT,
            sec_subtype TEXT,
            raw_sec_subtype TEXT,
            sec_class TEXT,
            quantity TEXT,
            price TEXT NOT NULL,
            beg_market_value TEXT,
            end_market_value TEXT NOT NULL,
            cost_basis TEXT,
            unrealized_gain_loss TEXT,
            estimated_ann_inc TEXT,
            est_yield TEXT,
            underlying_symbol TEXT,
            strike_price TEXT,
            exp_date TEXT,
            option_type TEXT,
            maturity_date TEXT,
            coupon_rate TEXT,
            accrued_int TEXT,
            agency_ratings TEXT,
            next_call_date TEXT,
            call_price TEXT,
            payment_freq TEXT,
            bond_features TEXT,
            source TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (entity_id) REFERENCES entities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS doc_level_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            account_number TEXT NOT NULL,
            doc_section TEXT NOT NULL DEFAULT 'combined',
            as_of_date TEXT,
            net_acct_value TEXT,
            beg_value TEXT,
            end_value TEXT,
            taxable_total_period TEXT,
            taxable_total_ytd TEXT,
            divs_taxable_period TEXT,
            divs_taxable_ytd TEXT,
            stcg_taxable_period TEXT,
            stcg_taxable_ytd TEXT,
            int_taxable_period TEXT,
            int_taxable_ytd TEXT,
            ltcg_taxable_period TEXT,
            ltcg_taxable_ytd TEXT,
            tax_exempt_total_period TEXT,
            tax_exempt_total_ytd TEXT,
            divs_tax_exempt_period TEXT,
            divs_tax_exempt_ytd TEXT,
            int_tax_exempt_period TEXT,
            int_tax_exempt_ytd TEXT,
            roc_period TEXT,
            roc_ytd TEXT,
            grand_total_period TEXT,
            grand_total_ytd TEXT,
            st_gain_period TEXT,
            st_loss_period TEXT,
            lt_gain_ytd TEXT,
            lt_loss_ytd TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (document_id, account_id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS map_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_name TEXT NOT NULL,
            rule_category TEXT NOT NULL,
            application_order INTEGER NOT NULL,
            problem_solved TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS map_conditions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id INTEGER NOT NULL,
            condition_order INTEGER NOT NULL,
            check_field TEXT NOT NULL,
            match_operator TEXT NOT NULL,
            match_value TEXT NOT NULL,
            logic_connector TEXT NOT NULL DEFAULT 'AND',
            FOREIGN KEY (rule_id) REFERENCES map_rules(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS map_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id INTEGER NOT NULL,
            action_order INTEGER NOT NULL,
            set_field TEXT NOT NULL,
            set_value TEXT NOT NULL,
            FOREIGN KEY (rule_id) REFERENCES map_rules(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_transactions_document ON transactions(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_positions_document ON positions(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_map_conditions_rule ON map_conditions(rule_id)",
        "CREATE INDEX IF NOT EXISTS idx_map_actions_rule ON map_actions(rule_id)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

/// Decimals are stored as their canonical text.
pub(crate) fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.normalize().to_string())
}

pub(crate) fn stored_decimal(column: &'static str, value: Option<String>) -> Result<Option<Decimal>, StorageError> {
    value
        .map(|v| Decimal::from_str(&v).map_err(|_| StorageError::InvalidDecimal { column, value: v }))
        .transpose()
}
