pub mod account;
pub mod dates;
pub mod extraction;
pub mod money;
pub mod security;
pub mod validate;

pub use account::{
    display_account_number, normalize_institution_name, AccountId, AccountType, DocumentId, EntityId,
    InstitutionId,
};
pub use dates::{parse_date, parse_date_in_year, reference_year};
pub use extraction::{AccountExtraction, Activity, ActivitySection, Extraction, ExtractionKind, Holding};
pub use money::{fits_numeric_15_2, is_null_sentinel, parse_amount, parse_currency, ParseError, Scalar};
pub use security::{extract_option_symbol, merge_symbol_cusip};
pub use validate::{validate_extraction, ValidationErrors};
