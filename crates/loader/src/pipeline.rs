use sqlx::SqliteConnection;
use std::path::Path;
use stmtload_core::{
    parse_date, reference_year, validate_extraction, ActivitySection, DocumentId, Extraction, ExtractionKind,
    InstitutionId, ParseError, ValidationErrors,
};
use stmtload_rules::RuleEngine;
use stmtload_storage::{
    find_account, find_document_by_hash, find_institution, insert_doc_level_data, insert_position,
    insert_transaction, link_document_account, load_mapping_rules, mark_extraction_loaded, DbPool, DocumentRecord,
    ExtractionPart, StorageError,
};
use thiserror::Error;

use crate::convert::{account_summary, activity_to_transaction, holding_to_position, AccountContext};
use crate::hash;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    UnknownKind(String),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("Missing institution in JSON")]
    MissingInstitution,
    #[error("Institution '{0}' not found; load reference data first")]
    UnknownInstitution(String),
    #[error("Missing doc_hash in extraction metadata")]
    MissingDocumentHash,
    #[error("No document registered for {file_name} (hash {doc_hash}); register the source statement before loading its extractions")]
    MissingDocument { doc_hash: String, file_name: String },
    #[error(
        "Duplicate data conflict: {part} of {file_name} were loaded at {loaded_at} from a different extraction \
         (existing hash {existing_hash}, new hash {new_hash}); delete the existing {part} before reloading"
    )]
    DuplicateConflict {
        file_name: String,
        part: &'static str,
        loaded_at: String,
        existing_hash: String,
        new_hash: String,
    },
    #[error("Account '{account_number}' not found at {institution}; load reference data first")]
    UnknownAccount { account_number: String, institution: String },
    #[error("{at}: {source}")]
    InvalidValue {
        at: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub document_id: DocumentId,
    pub kind: ExtractionKind,
    pub json_hash: String,
    pub accounts: usize,
    pub skipped_accounts: usize,
    pub positions: usize,
    pub transactions: usize,
    pub summaries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadReport),
    /// The same extraction was loaded before; nothing was written.
    Skipped {
        document_id: DocumentId,
        kind: ExtractionKind,
    },
}

enum Status {
    Skip,
    Proceed,
}

/// Loads extraction JSON files into the database, one document per
/// database transaction.
pub struct Loader {
    pool: DbPool,
}

impl Loader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load_file(&self, path: &Path) -> Result<LoadOutcome, LoadError> {
        tracing::info!(path = %path.display(), "Loading extraction");
        let bytes = tokio::fs::read(path).await?;
        self.load_bytes(&bytes).await
    }

    /// Parse → hash → validate → load. Either the whole document is written
    /// or nothing is.
    pub async fn load_bytes(&self, data: &[u8]) -> Result<LoadOutcome, LoadError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        let json_hash = hash::json_hash(&value);
        let extraction: Extraction = serde_json::from_value(value)?;

        let kind = extraction.kind().map_err(LoadError::UnknownKind)?;
        let statement_date = match extraction.document_data.statement_date.as_deref() {
            Some(s) => parse_date(s).map_err(|source| LoadError::InvalidValue {
                at: "document_data.statement_date".to_string(),
                source,
            })?,
            None => None,
        };
        validate_extraction(&extraction, kind, reference_year(statement_date))?;
        let institution = extraction.institution().ok_or(LoadError::MissingInstitution)?;

        let mut tx = self.pool.begin().await?;
        let result = load_document(&mut tx, &extraction, kind, institution, &json_hash, statement_date).await;
        match result {
            Ok(outcome) => {
                tx.commit().await?;
                if let LoadOutcome::Loaded(report) = &outcome {
                    tracing::info!(
                        document = %report.document_id,
                        kind = %report.kind,
                        positions = report.positions,
                        transactions = report.transactions,
                        summaries = report.summaries,
                        "Extraction loaded"
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn load_document(
    conn: &mut SqliteConnection,
    extraction: &Extraction,
    kind: ExtractionKind,
    institution: &str,
    json_hash: &str,
    statement_date: Option<chrono::NaiveDate>,
) -> Result<LoadOutcome, LoadError> {
    let institution_id = find_institution(conn, institution)
        .await?
        .ok_or_else(|| LoadError::UnknownInstitution(institution.to_string()))?;

    let doc_hash = extraction
        .extraction_metadata
        .doc_hash
        .as_deref()
        .ok_or(LoadError::MissingDocumentHash)?;
    let Some(document) = find_document_by_hash(conn, doc_hash).await? else {
        let file_name = extraction
            .extraction_metadata
            .source_pdf_filepath
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown.pdf".to_string());
        return Err(LoadError::MissingDocument {
            doc_hash: doc_hash.to_string(),
            file_name,
        });
    };

    let parts = ExtractionPart::for_kind(kind);
    if let Status::Skip = extraction_status(&document, parts, json_hash)? {
        tracing::info!(document = %document.id, %kind, "Skipping, extraction already loaded with identical content");
        return Ok(LoadOutcome::Skipped {
            document_id: document.id,
            kind,
        });
    }
    for part in parts {
        mark_extraction_loaded(conn, document.id, *part, json_hash).await?;
    }

    let engine = RuleEngine::new(load_mapping_rules(conn).await?);
    if engine.is_empty() {
        tracing::warn!("No mapping rules stored; records are loaded unclassified");
    }

    let mut report = LoadReport {
        document_id: document.id,
        kind,
        json_hash: json_hash.to_string(),
        accounts: 0,
        skipped_accounts: 0,
        positions: 0,
        transactions: 0,
        summaries: 0,
    };

    let year = reference_year(statement_date);
    for account in &extraction.accounts {
        let Some(number) = account.account_number.as_deref().filter(|n| !n.trim().is_empty()) else {
            tracing::warn!("Skipping account missing number");
            report.skipped_accounts += 1;
            continue;
        };
        let (account_id, entity_id) = lookup_account(conn, number, institution_id, institution).await?;
        link_document_account(conn, document.id, account_id).await?;

        let ctx = AccountContext {
            document_id: document.id,
            account_id,
            entity_id,
            account_number: number,
            statement_date,
            year,
        };

        let mut positions = 0;
        if kind.includes_holdings() {
            for (k, holding) in account.holdings.as_deref().unwrap_or(&[]).iter().enumerate() {
                let position = holding_to_position(&ctx, holding, &engine).map_err(|source| LoadError::InvalidValue {
                    at: format!("{number}.holdings[{k}]"),
                    source,
                })?;
                insert_position(conn, &position).await?;
                positions += 1;
            }
        }

        let mut transactions = 0;
        if kind.includes_activities() {
            for section in ActivitySection::ALL {
                for (j, activity) in account.section(section).iter().enumerate() {
                    let transaction = activity_to_transaction(&ctx, section, activity, &engine).map_err(|source| {
                        LoadError::InvalidValue {
                            at: format!("{number}.{section}[{j}]"),
                            source,
                        }
                    })?;
                    insert_transaction(conn, &transaction).await?;
                    transactions += 1;
                }
            }
        }

        let summary = account_summary(&ctx, account).map_err(|source| LoadError::InvalidValue {
            at: format!("{number}.summary"),
            source,
        })?;
        if let Some(summary) = summary {
            if insert_doc_level_data(conn, &summary).await? {
                report.summaries += 1;
            } else {
                tracing::debug!(account = number, "Summary data already present");
            }
        }

        tracing::info!(account = number, positions, transactions, "Account loaded");
        report.accounts += 1;
        report.positions += positions;
        report.transactions += transactions;
    }

    Ok(LoadOutcome::Loaded(report))
}

async fn lookup_account(
    conn: &mut SqliteConnection,
    number: &str,
    institution_id: InstitutionId,
    institution: &str,
) -> Result<(stmtload_core::AccountId, stmtload_core::EntityId), LoadError> {
    find_account(conn, number, institution_id)
        .await?
        .ok_or_else(|| LoadError::UnknownAccount {
            account_number: number.to_string(),
            institution: institution.to_string(),
        })
}

/// Identical content is skipped; any part already loaded from different
/// content is a conflict that must be resolved by hand.
fn extraction_status(document: &DocumentRecord, parts: &[ExtractionPart], json_hash: &str) -> Result<Status, LoadError> {
    if parts.iter().all(|p| document.json_hash(*p) == Some(json_hash)) {
        return Ok(Status::Skip);
    }
    for part in parts {
        if let Some(loaded_at) = document.loaded_at(*part) {
            return Err(LoadError::DuplicateConflict {
                file_name: document.file_name.clone(),
                part: part.as_str(),
                loaded_at: loaded_at.to_string(),
                existing_hash: document.json_hash(*part).unwrap_or_default().to_string(),
                new_hash: json_hash.to_string(),
            });
        }
    }
    Ok(Status::Proceed)
}
