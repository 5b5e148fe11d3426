use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use stmtload_core::{parse_date, AccountType, DocumentId, EntityId, InstitutionId};
use stmtload_loader::hash::document_hash;
use stmtload_loader::{LoadOutcome, Loader};
use stmtload_rules::{load_rules_sheet, Rule};
use stmtload_storage::{
    create_db, find_institution, load_mapping_rules, mapping_rule_counts, reapply_rules_to_positions,
    reapply_rules_to_transactions, register_document, replace_mapping_rules, upsert_account, upsert_entity,
    upsert_institution, DbPool, NewAccount, NewDocument,
};

use crate::config::Config;

/// Entities, institutions and accounts, as kept in a reference TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub entities: Vec<EntityEntry>,
    pub institutions: Vec<InstitutionEntry>,
    pub accounts: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EntityEntry {
    pub name: String,
    #[serde(rename = "type", default = "default_entity_type")]
    pub entity_type: String,
}

fn default_entity_type() -> String {
    "individual".to_string()
}

#[derive(Debug, Deserialize)]
pub struct InstitutionEntry {
    pub name: String,
    #[serde(rename = "type", default = "default_institution_type")]
    pub institution_type: String,
}

fn default_institution_type() -> String {
    "brokerage".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub entity: String,
    pub institution: String,
    pub number: String,
    pub name: Option<String>,
    /// Inferred from `name` when absent.
    #[serde(rename = "type")]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub tax_deferred: bool,
    #[serde(default)]
    pub tax_free: bool,
    #[serde(default)]
    pub requires_rmd: bool,
}

pub async fn open_db(config: &Config) -> anyhow::Result<DbPool> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    create_db(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

pub async fn init(config: &Config) -> anyhow::Result<()> {
    let pool = open_db(config).await?;
    let counts = mapping_rule_counts(&pool).await?;
    println!("Database ready: {}", config.database.path.display());
    println!("Mapping rules: {}", counts.rules);
    Ok(())
}

/// Upsert everything in one transaction; an unknown entity or institution
/// reference leaves the database untouched.
pub async fn load_reference(pool: &DbPool, data: &ReferenceData) -> anyhow::Result<(usize, usize, usize)> {
    let mut tx = pool.begin().await?;

    let mut entities: HashMap<&str, EntityId> = HashMap::new();
    for entity in &data.entities {
        let id = upsert_entity(&mut tx, &entity.name, &entity.entity_type).await?;
        entities.insert(entity.name.trim(), id);
    }

    let mut institutions: HashMap<&str, InstitutionId> = HashMap::new();
    for institution in &data.institutions {
        let id = upsert_institution(&mut tx, &institution.name, &institution.institution_type).await?;
        institutions.insert(institution.name.trim(), id);
    }

    for account in &data.accounts {
        let Some(&entity_id) = entities.get(account.entity.trim()) else {
            bail!("Account {}: unknown entity '{}'", account.number, account.entity);
        };
        let institution_id = match institutions.get(account.institution.trim()) {
            Some(&id) => id,
            None => find_institution(&mut tx, &account.institution).await?.with_context(|| {
                format!("Account {}: unknown institution '{}'", account.number, account.institution)
            })?,
        };
        let account_type = account
            .account_type
            .unwrap_or_else(|| AccountType::infer(account.name.as_deref().unwrap_or_default()));
        upsert_account(
            &mut tx,
            &NewAccount {
                entity_id,
                institution_id,
                account_number: account.number.trim().to_string(),
                account_name: account.name.clone(),
                account_type,
                is_tax_deferred: account.tax_deferred,
                is_tax_free: account.tax_free,
                requires_rmd: account.requires_rmd,
            },
        )
        .await?;
    }

    tx.commit().await?;
    Ok((data.entities.len(), data.institutions.len(), data.accounts.len()))
}

pub async fn reference(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let data: ReferenceData = toml::from_str(&content).with_context(|| format!("Invalid reference data in {}", file.display()))?;
    let pool = open_db(config).await?;
    let (entities, institutions, accounts) = load_reference(&pool, &data).await?;
    println!("Loaded {entities} entities, {institutions} institutions, {accounts} accounts");
    Ok(())
}

pub async fn register(
    config: &Config,
    file: &Path,
    institution: &str,
    statement_date: Option<&str>,
) -> anyhow::Result<DocumentId> {
    let doc_hash = document_hash(file).with_context(|| format!("Failed to hash {}", file.display()))?;
    let statement_date = match statement_date {
        Some(s) => parse_date(s).with_context(|| format!("Invalid statement date '{s}'"))?,
        None => None,
    };
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file: {}", file.display()))?;

    let pool = open_db(config).await?;
    let mut conn = pool.acquire().await?;
    let institution_id = find_institution(&mut conn, institution)
        .await?
        .with_context(|| format!("Institution '{institution}' not found; load reference data first"))?;
    let id = register_document(
        &mut conn,
        &NewDocument {
            institution_id,
            doc_hash: doc_hash.clone(),
            file_name,
            file_path: Some(file.display().to_string()),
            statement_date,
            period_start: None,
            period_end: None,
        },
    )
    .await?;
    println!("Document {id}: {doc_hash}");
    Ok(id)
}

/// Every file is attempted; the command fails if any of them did.
pub async fn load(config: &Config, files: &[std::path::PathBuf]) -> anyhow::Result<()> {
    let loader = Loader::new(open_db(config).await?);
    let mut failed = 0;
    for file in files {
        match loader.load_file(file).await {
            Ok(LoadOutcome::Loaded(report)) => println!(
                "{}: loaded {} into document {} ({} positions, {} transactions, {} summaries)",
                file.display(),
                report.kind,
                report.document_id,
                report.positions,
                report.transactions,
                report.summaries
            ),
            Ok(LoadOutcome::Skipped { document_id, kind }) => {
                println!("{}: {kind} of document {document_id} already loaded, skipped", file.display())
            }
            Err(e) => {
                tracing::error!(file = %file.display(), error = %e, "Load failed");
                eprintln!("{}: {e}", file.display());
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} file(s) failed to load", files.len());
    }
    Ok(())
}

pub async fn rules_update(config: &Config, sheet: Option<&Path>) -> anyhow::Result<()> {
    let Some(sheet) = sheet.or(config.rules.sheet.as_deref()) else {
        bail!("No rules sheet given and none configured under [rules] sheet");
    };
    let rules = load_rules_sheet(sheet).with_context(|| format!("Failed to read {}", sheet.display()))?;
    let pool = open_db(config).await?;
    replace_mapping_rules(&pool, &rules).await?;
    let counts = mapping_rule_counts(&pool).await?;
    println!(
        "Stored {} rules ({} conditions, {} actions)",
        counts.rules, counts.conditions, counts.actions
    );
    Ok(())
}

pub async fn rules_apply(config: &Config, document: Option<i64>) -> anyhow::Result<()> {
    let pool = open_db(config).await?;
    let document = document.map(DocumentId);
    let transactions = reapply_rules_to_transactions(&pool, document).await?;
    let positions = reapply_rules_to_positions(&pool, document).await?;
    println!("Updated {transactions} transactions and {positions} positions");
    Ok(())
}

pub async fn rules_show(config: &Config) -> anyhow::Result<()> {
    let pool = open_db(config).await?;
    let mut conn = pool.acquire().await?;
    let rules = load_mapping_rules(&mut conn).await?;
    if rules.is_empty() {
        println!("No mapping rules stored");
    }
    for rule in &rules {
        println!("{}", describe_rule(rule));
    }
    Ok(())
}

fn describe_rule(rule: &Rule) -> String {
    let mut triggers = String::new();
    for (i, c) in rule.conditions.iter().enumerate() {
        if i > 0 {
            triggers.push(' ');
        }
        triggers.push_str(&format!("{} {} \"{}\"", c.field.as_str(), c.operator.as_str(), c.value));
        if i + 1 < rule.conditions.len() {
            triggers.push(' ');
            triggers.push_str(c.connector.as_str());
        }
    }
    if triggers.is_empty() {
        triggers.push_str("(always)");
    }
    let actions: Vec<String> = rule
        .actions
        .iter()
        .map(|a| format!("{} = \"{}\"", a.target.as_str(), a.value))
        .collect();
    format!(
        "[{}] {} ({}): {} => {}",
        rule.order(),
        rule.name,
        rule.category.as_str(),
        triggers,
        actions.join("; ")
    )
}
