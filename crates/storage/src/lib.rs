pub mod db;
pub mod documents;
pub mod mapping;
pub mod reclassify;
pub mod records;
pub mod reference;

pub use db::{create_db, DbPool, StorageError};
pub use documents::{
    find_document_by_hash, link_document_account, mark_extraction_loaded, register_document, DocumentRecord,
    ExtractionPart, NewDocument,
};
pub use mapping::{load_mapping_rules, mapping_rule_counts, replace_mapping_rules, RuleCounts};
pub use reclassify::{reapply_rules_to_positions, reapply_rules_to_transactions};
pub use records::{
    insert_doc_level_data, insert_position, insert_transaction, position_facts, transaction_facts, DocLevelData,
    NewPosition, NewTransaction, SUMMARY_FIELDS,
};
pub use reference::{find_account, find_institution, upsert_account, upsert_entity, upsert_institution, NewAccount};
