use chrono::NaiveDate;
use sqlx::SqliteConnection;
use stmtload_core::{AccountId, DocumentId, ExtractionKind, InstitutionId};

/// A source statement, registered from its file's content hash before any
/// extraction of it is loaded.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub institution_id: InstitutionId,
    pub doc_hash: String,
    pub file_name: String,
    pub file_path: Option<String>,
    pub statement_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub file_name: String,
    pub processed_at: String,
    pub activities_loaded: Option<String>,
    pub activities_json_hash: Option<String>,
    pub positions_loaded: Option<String>,
    pub positions_json_hash: Option<String>,
}

/// The two independently loadable halves of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPart {
    Activities,
    Positions,
}

impl ExtractionPart {
    pub fn for_kind(kind: ExtractionKind) -> &'static [ExtractionPart] {
        match kind {
            ExtractionKind::Activities => &[ExtractionPart::Activities],
            ExtractionKind::Holdings => &[ExtractionPart::Positions],
            ExtractionKind::Combined => &[ExtractionPart::Activities, ExtractionPart::Positions],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionPart::Activities => "activities",
            ExtractionPart::Positions => "positions",
        }
    }
}

impl DocumentRecord {
    pub fn loaded_at(&self, part: ExtractionPart) -> Option<&str> {
        match part {
            ExtractionPart::Activities => self.activities_loaded.as_deref(),
            ExtractionPart::Positions => self.positions_loaded.as_deref(),
        }
    }

    pub fn json_hash(&self, part: ExtractionPart) -> Option<&str> {
        match part {
            ExtractionPart::Activities => self.activities_json_hash.as_deref(),
            ExtractionPart::Positions => self.positions_json_hash.as_deref(),
        }
    }
}

/// Registering the same file twice returns the existing document.
pub async fn register_document(conn: &mut SqliteConnection, doc: &NewDocument) -> Result<DocumentId, sqlx::Error> {
    sqlx::query(
        "INSERT INTO documents (
            institution_id, doc_hash, file_name, file_path, statement_date, period_start, period_end
         ) VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (doc_hash) DO NOTHING",
    )
    .bind(doc.institution_id.0)
    .bind(&doc.doc_hash)
    .bind(&doc.file_name)
    .bind(&doc.file_path)
    .bind(doc.statement_date)
    .bind(doc.period_start)
    .bind(doc.period_end)
    .execute(&mut *conn)
    .await?;

    let (id,) = sqlx::query_as::<_, (i64,)>("SELECT id FROM documents WHERE doc_hash = ?")
        .bind(&doc.doc_hash)
        .fetch_one(&mut *conn)
        .await?;
    Ok(DocumentId(id))
}

pub async fn find_document_by_hash(
    conn: &mut SqliteConnection,
    doc_hash: &str,
) -> Result<Option<DocumentRecord>, sqlx::Error> {
    let row = sqlx::query_as::<
        _,
        (i64, String, String, Option<String>, Option<String>, Option<String>, Option<String>),
    >(
        "SELECT id, file_name, processed_at, activities_loaded, activities_json_hash,
                positions_loaded, positions_json_hash
         FROM documents WHERE doc_hash = ?",
    )
    .bind(doc_hash)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| DocumentRecord {
        id: DocumentId(r.0),
        file_name: r.1,
        processed_at: r.2,
        activities_loaded: r.3,
        activities_json_hash: r.4,
        positions_loaded: r.5,
        positions_json_hash: r.6,
    }))
}

pub async fn mark_extraction_loaded(
    conn: &mut SqliteConnection,
    document_id: DocumentId,
    part: ExtractionPart,
    json_hash: &str,
) -> Result<(), sqlx::Error> {
    let sql = match part {
        ExtractionPart::Activities => {
            "UPDATE documents SET activities_loaded = datetime('now'), activities_json_hash = ?, updated_at = datetime('now') WHERE id = ?"
        }
        ExtractionPart::Positions => {
            "UPDATE documents SET positions_loaded = datetime('now'), positions_json_hash = ?, updated_at = datetime('now') WHERE id = ?"
        }
    };
    sqlx::query(sql)
        .bind(json_hash)
        .bind(document_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn link_document_account(
    conn: &mut SqliteConnection,
    document_id: DocumentId,
    account_id: AccountId,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO document_accounts (document_id, account_id) VALUES (?, ?)")
        .bind(document_id.0)
        .bind(account_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
