//! Entities, institutions and accounts. These are loaded ahead of any
//! statement; the loader only ever looks them up.

use sqlx::SqliteConnection;
use stmtload_core::{
    display_account_number, normalize_institution_name, AccountId, AccountType, EntityId, InstitutionId,
};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub entity_id: EntityId,
    pub institution_id: InstitutionId,
    pub account_number: String,
    pub account_name: Option<String>,
    pub account_type: AccountType,
    pub is_tax_deferred: bool,
    pub is_tax_free: bool,
    pub requires_rmd: bool,
}

pub async fn upsert_entity(
    conn: &mut SqliteConnection,
    name: &str,
    entity_type: &str,
) -> Result<EntityId, sqlx::Error> {
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO entities (entity_name, entity_type) VALUES (?, ?)
         ON CONFLICT (entity_name) DO UPDATE SET entity_type = excluded.entity_type
         RETURNING id",
    )
    .bind(name.trim())
    .bind(entity_type)
    .fetch_one(&mut *conn)
    .await?;
    Ok(EntityId(id))
}

/// Short names such as `fidelity` are stored under their full name.
pub async fn upsert_institution(
    conn: &mut SqliteConnection,
    name: &str,
    institution_type: &str,
) -> Result<InstitutionId, sqlx::Error> {
    let name = normalize_institution_name(name);
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO institutions (institution_name, institution_type) VALUES (?, ?)
         ON CONFLICT (institution_name) DO UPDATE SET institution_type = excluded.institution_type
         RETURNING id",
    )
    .bind(&name)
    .bind(institution_type)
    .fetch_one(&mut *conn)
    .await?;
    Ok(InstitutionId(id))
}

pub async fn upsert_account(conn: &mut SqliteConnection, account: &NewAccount) -> Result<AccountId, sqlx::Error> {
    let (id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO accounts (
            entity_id, institution_id, account_number, account_number_display, account_name,
            account_type, is_tax_deferred, is_tax_free, requires_rmd
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (account_number, institution_id) DO UPDATE SET
            entity_id = excluded.entity_id,
            account_name = COALESCE(excluded.account_name, accounts.account_name),
            account_type = excluded.account_type,
            is_tax_deferred = excluded.is_tax_deferred,
            is_tax_free = excluded.is_tax_free,
            requires_rmd = excluded.requires_rmd
         RETURNING id",
    )
    .bind(account.entity_id.0)
    .bind(account.institution_id.0)
    .bind(&account.account_number)
    .bind(display_account_number(&account.account_number))
    .bind(&account.account_name)
    .bind(account.account_type.as_str())
    .bind(account.is_tax_deferred)
    .bind(account.is_tax_free)
    .bind(account.requires_rmd)
    .fetch_one(&mut *conn)
    .await?;
    Ok(AccountId(id))
}

pub async fn find_institution(conn: &mut SqliteConnection, name: &str) -> Result<Option<InstitutionId>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM institutions WHERE institution_name = ?")
        .bind(normalize_institution_name(name))
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| InstitutionId(r.0)))
}

/// The account and its owning entity.
pub async fn find_account(
    conn: &mut SqliteConnection,
    account_number: &str,
    institution_id: InstitutionId,
) -> Result<Option<(AccountId, EntityId)>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, entity_id FROM accounts WHERE account_number = ? AND institution_id = ?",
    )
    .bind(account_number)
    .bind(institution_id.0)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| (AccountId(r.0), EntityId(r.1))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    #[tokio::test]
    async fn upserts_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("finance.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let e1 = upsert_entity(&mut conn, "Jane Doe", "individual").await.unwrap();
        let e2 = upsert_entity(&mut conn, "Jane Doe", "individual").await.unwrap();
        assert_eq!(e1, e2);

        let i1 = upsert_institution(&mut conn, "fidelity", "brokerage").await.unwrap();
        let i2 = upsert_institution(&mut conn, "Fidelity Investments", "brokerage").await.unwrap();
        assert_eq!(i1, i2);
        assert_eq!(find_institution(&mut conn, "Fidelity").await.unwrap(), Some(i1));
        assert_eq!(find_institution(&mut conn, "Schwab").await.unwrap(), None);

        let account = NewAccount {
            entity_id: e1,
            institution_id: i1,
            account_number: "Z12345678".to_string(),
            account_name: Some("Individual TOD".to_string()),
            account_type: AccountType::Brokerage,
            is_tax_deferred: false,
            is_tax_free: false,
            requires_rmd: false,
        };
        let a1 = upsert_account(&mut conn, &account).await.unwrap();
        let a2 = upsert_account(&mut conn, &NewAccount { account_name: None, ..account }).await.unwrap();
        assert_eq!(a1, a2);

        assert_eq!(find_account(&mut conn, "Z12345678", i1).await.unwrap(), Some((a1, e1)));
        assert_eq!(find_account(&mut conn, "Z00000000", i1).await.unwrap(), None);

        let (display, name): (String, Option<String>) =
            sqlx::query_as("SELECT account_number_display, account_name FROM accounts WHERE id = ?")
                .bind(a1.0)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(display, "****5678");
        assert_eq!(name.as_deref(), Some("Individual TOD"));
    }
}
