use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const KEYWORD_ID: &[&str] = &["keyword_id", "keywordid"];
pub const DATE: &[&str] = &["date"];
pub const KEYWORD: &[&str] = &["keyword", "keyword text", "keyword_text"];
pub const MATCH_TYPE: &[&str] = &["match type", "match_type"];
pub const IMPRESSIONS: &[&str] = &["impressions"];
pub const CLICKS: &[&str] = &["clicks"];
pub const SPEND: &[&str] = &["spend", "cost", "spend(usd)"];
pub const SALES: &[&str] = &["sales", "sales(usd)"];
pub const ORDERS: &[&str] = &["orders", "conversions"];
pub const UNITS: &[&str] = &["units", "units ordered"];
pub const STATE: &[&str] = &["state"];
pub const BID: &[&str] = &["bid", "keyword bid"];
pub const CAMPAIGN_ID: &[&str] = &["campaign_id", "campaign id"];
pub const CAMPAIGN_NAME: &[&str] = &["campaign name", "campaign_name", "campaign"];
pub const AD_GROUP_ID: &[&str] = &["ad_group_id", "ad group id"];
pub const AD_GROUP_NAME: &[&str] = &["ad group name", "ad_group_name", "ad group"];

/// Columns an import needs, by display name and accepted aliases
const REQUIRED_METRICS: &[(&str, &[&str])] = &[
    ("impressions", IMPRESSIONS),
    ("clicks", CLICKS),
    ("spend", SPEND),
    ("sales", SALES),
    ("orders", ORDERS),
];

/// Row shape of an uploaded sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Explicit `keyword_id` and `date` columns
    Standard,
    /// Ads console export: keyword text and match type, no id or date
    ConsoleExport,
}

/// Normalized header row with alias lookup
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn new<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<String> = headers.into_iter().map(normalize_header).collect();
        let mut index = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            if !name.is_empty() {
                index.entry(name.clone()).or_insert(i);
            }
        }
        Self { names, index }
    }

    /// Every header cell in column order, blanks included
    pub fn header(&self) -> &[String] {
        &self.names
    }

    pub fn names(&self) -> Vec<String> {
        self.names.iter().filter(|n| !n.is_empty()).cloned().collect()
    }

    pub fn has(&self, aliases: &[&str]) -> bool {
        aliases.iter().any(|alias| self.index.contains_key(*alias))
    }

    /// Indices of every present alias, in alias priority order
    pub fn positions(&self, aliases: &[&str]) -> Vec<usize> {
        aliases
            .iter()
            .filter_map(|alias| self.index.get(*alias).copied())
            .collect()
    }

    pub fn detect_layout(&self) -> Option<Layout> {
        if self.has(KEYWORD_ID) && self.has(DATE) {
            Some(Layout::Standard)
        } else if self.has(KEYWORD) && self.has(MATCH_TYPE) && !self.has(KEYWORD_ID) {
            Some(Layout::ConsoleExport)
        } else {
            None
        }
    }

    /// Required columns absent from the header, by display name.
    ///
    /// Follows [`Columns::detect_layout`]: a `keyword_id` column commits the
    /// sheet to the standard layout, which then needs `date`; keyword text
    /// alone needs `match type`. An empty result implies a detected layout.
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.has(KEYWORD_ID) {
            if !self.has(DATE) {
                missing.push("date".to_string());
            }
        } else if self.has(KEYWORD) {
            if !self.has(MATCH_TYPE) {
                missing.push("match type".to_string());
            }
        } else {
            missing.push("keyword".to_string());
        }
        for (name, aliases) in REQUIRED_METRICS {
            if !self.has(aliases) {
                missing.push(name.to_string());
            }
        }
        missing
    }
}

/// Lowercased and trimmed, without a leading UTF-8 BOM
fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_standard_layout() {
        let columns = Columns::new(["Keyword_ID", " Date ", "Impressions"]);
        assert_eq!(columns.detect_layout(), Some(Layout::Standard));
    }

    #[test]
    fn detects_console_export_layout() {
        let columns = Columns::new(["\u{feff}Keyword", "Match Type", "State", "Cost"]);
        assert_eq!(columns.detect_layout(), Some(Layout::ConsoleExport));
        assert_eq!(columns.names()[0], "keyword");
    }

    #[test]
    fn unrecognized_header_has_no_layout() {
        assert_eq!(Columns::new(["foo", "bar"]).detect_layout(), None);
        // id without a date is not the standard layout
        assert_eq!(Columns::new(["keyword_id", "clicks"]).detect_layout(), None);
    }

    #[test]
    fn missing_columns_honour_aliases() {
        let columns = Columns::new(["keyword", "match type", "impressions", "clicks", "cost", "sales(usd)"]);
        assert_eq!(columns.missing_required(), vec!["orders"]);

        let bare = Columns::new(["date"]);
        assert_eq!(
            bare.missing_required(),
            vec!["keyword", "impressions", "clicks", "spend", "sales", "orders"]
        );
    }

    #[test]
    fn missing_columns_follow_layout_rule() {
        let id_without_date =
            Columns::new(["keyword_id", "impressions", "clicks", "spend", "sales", "orders"]);
        assert_eq!(id_without_date.missing_required(), vec!["date"]);
        assert_eq!(id_without_date.detect_layout(), None);

        let text_without_match = Columns::new(["keyword", "clicks"]);
        assert_eq!(
            text_without_match.missing_required(),
            vec!["match type", "impressions", "spend", "sales", "orders"]
        );

        // keyword_id wins over keyword text, so match type is not asked for
        let both = Columns::new(["keyword_id", "keyword", "date", "impressions", "clicks", "spend", "sales", "orders"]);
        assert!(both.missing_required().is_empty());
        assert_eq!(both.detect_layout(), Some(Layout::Standard));
    }

    #[test]
    fn alias_positions_follow_priority() {
        let columns = Columns::new(["cost", "spend"]);
        assert_eq!(columns.positions(SPEND), vec![1, 0]);
    }
}
