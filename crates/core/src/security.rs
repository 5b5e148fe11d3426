use regex::Regex;
use std::sync::OnceLock;

fn option_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:PUT|CALL)\s*\(([A-Z]+)\)").expect("static option pattern"))
}

/// Symbol for an activity line. When the extractor gave none, option lines
/// like `PUT (TSLA) ...` yield their underlying.
pub fn extract_option_symbol(description: Option<&str>, symbol: Option<&str>) -> Option<String> {
    if let Some(s) = symbol.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(s.to_string());
    }
    let description = description?;
    option_pattern()
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Single identifier for a security: the symbol when present, else the CUSIP.
pub fn merge_symbol_cusip(symbol: Option<&str>, cusip: Option<&str>) -> Option<String> {
    [symbol, cusip]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_wins_over_description() {
        assert_eq!(
            extract_option_symbol(Some("PUT (TSLA) TESLA INC"), Some("AAPL")),
            Some("AAPL".to_string())
        );
    }

    #[test]
    fn underlying_from_option_description() {
        assert_eq!(
            extract_option_symbol(Some("PUT (TSLA) TESLA INC JAN 17 25 $200"), None),
            Some("TSLA".to_string())
        );
        assert_eq!(
            extract_option_symbol(Some("CALL(SPY) SPDR S&P500"), Some("  ")),
            Some("SPY".to_string())
        );
    }

    #[test]
    fn no_symbol_for_plain_description() {
        assert_eq!(extract_option_symbol(Some("ORDINARY DIVIDEND"), None), None);
        assert_eq!(extract_option_symbol(None, None), None);
    }

    #[test]
    fn merge_prefers_symbol() {
        assert_eq!(merge_symbol_cusip(Some("AAPL"), None), Some("AAPL".to_string()));
        assert_eq!(merge_symbol_cusip(None, Some("037833100")), Some("037833100".to_string()));
        assert_eq!(merge_symbol_cusip(Some("  SPY  "), Some("")), Some("SPY".to_string()));
        assert_eq!(merge_symbol_cusip(Some("TSLA"), Some("88160R101")), Some("TSLA".to_string()));
        assert_eq!(merge_symbol_cusip(None, None), None);
        assert_eq!(merge_symbol_cusip(Some(" "), Some(" ")), None);
    }
}
