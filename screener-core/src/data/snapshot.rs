//! Latest market snapshot: one last traded price per symbol.

use super::normalize::parse_price;
use super::provider::{DataError, RawTable};
use serde::{Deserialize, Serialize};

/// Price column aliases for the snapshot, highest priority first.
pub const LTP_ALIASES: [&str; 2] = ["ltp", "close"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotQuote {
    pub symbol: String,
    pub ltp: f64,
}

/// Parsed snapshot in provider order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub quotes: Vec<SnapshotQuote>,
}

impl MarketSnapshot {
    /// Extract quotes from a snapshot table, dropping the index row and rows
    /// without a parseable positive price.
    pub fn from_table(table: &RawTable, index_name: &str) -> Result<Self, DataError> {
        let symbol_col = table.column("symbol").ok_or_else(|| {
            DataError::MalformedResponse(format!(
                "snapshot has no SYMBOL column: {:?}",
                table.headers
            ))
        })?;
        let price_col = LTP_ALIASES
            .iter()
            .find_map(|alias| table.column(alias))
            .ok_or_else(|| {
                DataError::MalformedResponse(format!(
                    "snapshot has no LTP/CLOSE column: {:?}",
                    table.headers
                ))
            })?;

        let quotes = table
            .rows
            .iter()
            .filter_map(|row| {
                let symbol = row.get(symbol_col)?.trim().trim_matches('"').trim();
                if symbol.is_empty() || symbol.eq_ignore_ascii_case(index_name) {
                    return None;
                }
                let ltp = parse_price(row.get(price_col)?).filter(|p| *p > 0.0)?;
                Some(SnapshotQuote {
                    symbol: symbol.to_string(),
                    ltp,
                })
            })
            .collect();

        Ok(Self { quotes })
    }

    /// Last traded price for a symbol (first quote wins if the provider repeats one).
    pub fn ltp(&self, symbol: &str) -> Option<f64> {
        self.quotes.iter().find(|q| q.symbol == symbol).map(|q| q.ltp)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::universe::DEFAULT_INDEX_NAME;

    fn table(text: &str) -> RawTable {
        RawTable::from_csv_text(text).unwrap()
    }

    #[test]
    fn parses_ltp_and_drops_index_row() {
        let t = table(
            "\"SYMBOL \",\"OPEN \",\"LTP \"\n\
             \"NIFTY TOTAL MARKET\",\"13,000\",\"13,100.50\"\n\
             \"RELIANCE\",\"1,380\",\"1,385.10\"\n\
             \"TCS\",\"3,050\",\"-\"\n",
        );
        let snap = MarketSnapshot::from_table(&t, DEFAULT_INDEX_NAME).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.ltp("RELIANCE"), Some(1385.10));
        assert_eq!(snap.ltp("TCS"), None);
        assert_eq!(snap.ltp("NIFTY TOTAL MARKET"), None);
    }

    #[test]
    fn falls_back_to_close_column() {
        let t = table("SYMBOL,CLOSE\nINFY,1500\n");
        let snap = MarketSnapshot::from_table(&t, DEFAULT_INDEX_NAME).unwrap();
        assert_eq!(snap.ltp("INFY"), Some(1500.0));
    }

    #[test]
    fn missing_columns_are_malformed() {
        let no_symbol = table("NAME,LTP\nX,1\n");
        assert!(matches!(
            MarketSnapshot::from_table(&no_symbol, DEFAULT_INDEX_NAME),
            Err(DataError::MalformedResponse(_))
        ));
        let no_price = table("SYMBOL,OPEN\nX,1\n");
        assert!(matches!(
            MarketSnapshot::from_table(&no_price, DEFAULT_INDEX_NAME),
            Err(DataError::MalformedResponse(_))
        ));
    }
}
