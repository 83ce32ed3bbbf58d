// Excel-style DDE link parsing: `[Topic]Item,Row,Column`.

use std::str::FromStr;
use thiserror::Error;

/// Components of an Excel DDE link such as `[ExcelLink]_200_GLB.DintData[2],L1,C1`.
///
/// Row and column are carried along for completeness; RSLinx ignores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdeLink {
    pub topic: String,
    pub item: String,
    pub row: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkParseError {
    #[error("Invalid DDE link format: expected '[Topic]Item,Row,Column', got '{0}'")]
    Format(String),
}

impl FromStr for DdeLink {
    type Err = LinkParseError;

    fn from_str(link: &str) -> Result<Self, Self::Err> {
        let invalid = || LinkParseError::Format(link.to_string());

        let rest = link.trim().strip_prefix('[').ok_or_else(invalid)?;
        let (topic, rest) = rest.split_once(']').ok_or_else(invalid)?;

        // The item may itself contain brackets (array tags), never commas.
        let mut fields = rest.split(',');
        let item = fields.next().ok_or_else(invalid)?;
        let row = fields.next().ok_or_else(invalid)?;
        let column = fields.next().ok_or_else(invalid)?;

        if fields.next().is_some() || [topic, item, row, column].iter().any(|f| f.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            topic: topic.to_string(),
            item: item.to_string(),
            row: row.to_string(),
            column: column.to_string(),
        })
    }
}
