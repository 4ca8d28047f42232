use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowType {
    Report,
    Header,
    Section,
    Row,
    SummaryRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCell {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl ReportCell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            account_id: None,
        }
    }
}

/// One node of a fetched report, already normalized away from the vendor payload.
///
/// A `Row`/`SummaryRow` label is its first cell; a `Section` label is its title
/// (often empty). The `Report` root carries the report title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReportNode {
    pub row_type: RowType,
    pub label: String,
    #[serde(default)]
    pub cells: Vec<ReportCell>,
    #[serde(default)]
    pub children: Vec<RawReportNode>,
}

impl RawReportNode {
    pub fn empty_report() -> Self {
        Self {
            row_type: RowType::Report,
            label: String::new(),
            cells: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// First header row found anywhere in the tree.
    pub fn header(&self) -> Option<&RawReportNode> {
        if self.row_type == RowType::Header {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.header())
    }

    /// Depth-first visit of every node, root included.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a RawReportNode)) {
        f(self);
        for c in &self.children {
            c.walk(f);
        }
    }
}
