//! Label/synonym matching for reports whose rows carry no account ids.
//!
//! Traversal and selection are separate steps: [`collect_candidates`] walks the
//! whole tree depth first and [`select`] applies the tie-break policy.

use crate::domain::financials::{BalanceSheetTotals, PnlTotals};
use crate::domain::report::{RawReportNode, RowType};
use crate::extract::value::parse_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concept {
    Revenue,
    CostOfSales,
    Expenses,
    GrossProfit,
    NetProfit,
    Cash,
    AccountsReceivable,
    AccountsPayable,
    CurrentAssets,
    CurrentLiabilities,
    TotalAssets,
    TotalLiabilities,
    Equity,
}

impl Concept {
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Revenue => &[
                "revenue",
                "income",
                "sales",
                "turnover",
                "trading income",
                "operating income",
                "sales revenue",
            ],
            Self::CostOfSales => &[
                "cost of sales",
                "less cost of sales",
                "cost of goods sold",
                "cost of goods",
                "cogs",
                "direct costs",
            ],
            Self::Expenses => &[
                "expenses",
                "operating expenses",
                "less operating expenses",
                "overheads",
            ],
            Self::GrossProfit => &["gross profit"],
            Self::NetProfit => &["net profit", "net income", "net profit (loss)", "net loss", "profit"],
            Self::Cash => &["cash", "bank", "cash at bank", "cash and cash equivalents"],
            Self::AccountsReceivable => &["accounts receivable", "trade debtors", "debtors", "receivables"],
            Self::AccountsPayable => &["accounts payable", "trade creditors", "creditors", "payables"],
            Self::CurrentAssets => &["current assets"],
            Self::CurrentLiabilities => &["current liabilities"],
            Self::TotalAssets => &["assets"],
            Self::TotalLiabilities => &["liabilities"],
            Self::Equity => &["equity", "net assets"],
        }
    }
}

/// Lower-case, trimmed, with a leading "total " removed.
pub fn normalize_label(label: &str) -> String {
    let l = label.trim().to_lowercase();
    match l.strip_prefix("total ") {
        Some(rest) => rest.trim().to_string(),
        None => l,
    }
}

/// Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchPriority {
    SummaryRow,
    TotalLabel,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub priority: MatchPriority,
    pub label: String,
}

/// Column holding the figure: first populated header cell after the label column.
pub fn value_column(tree: &RawReportNode) -> usize {
    tree.header()
        .and_then(|h| {
            h.cells
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, c)| !c.value.trim().is_empty())
                .map(|(i, _)| i)
        })
        .unwrap_or(1)
}

/// Every row matching the concept, at any depth, in document order.
pub fn collect_candidates(tree: &RawReportNode, concept: Concept, column: usize) -> Vec<Candidate> {
    let synonyms = concept.synonyms();
    let mut out = Vec::new();
    tree.walk(&mut |node| {
        if !matches!(node.row_type, RowType::Row | RowType::SummaryRow) {
            return;
        }
        let normalized = normalize_label(&node.label);
        if !synonyms.contains(&normalized.as_str()) {
            return;
        }
        let Some(value) = node.cells.get(column).and_then(|c| parse_amount(&c.value)) else {
            return;
        };
        let priority = if node.row_type == RowType::SummaryRow {
            MatchPriority::SummaryRow
        } else if node.label.to_lowercase().contains("total") {
            MatchPriority::TotalLabel
        } else {
            MatchPriority::Plain
        };
        out.push(Candidate {
            value,
            priority,
            label: node.label.clone(),
        });
    });
    out
}

/// Best-ranked candidate; ties go to the earliest in document order.
pub fn select(mut candidates: Vec<Candidate>) -> Option<f64> {
    candidates.sort_by_key(|c| c.priority);
    candidates.first().map(|c| c.value)
}

pub fn find(tree: &RawReportNode, concept: Concept) -> Option<f64> {
    select(collect_candidates(tree, concept, value_column(tree)))
}

pub fn pnl(tree: &RawReportNode) -> PnlTotals {
    let revenue = find(tree, Concept::Revenue);
    let cost_of_sales = find(tree, Concept::CostOfSales);
    let expenses = find(tree, Concept::Expenses);
    let mut totals = PnlTotals {
        revenue,
        cost_of_sales,
        expenses,
        gross_profit: None,
        net_profit: None,
    }
    .with_derived_profit();
    if totals.gross_profit.is_none() {
        totals.gross_profit = find(tree, Concept::GrossProfit);
    }
    if totals.net_profit.is_none() {
        totals.net_profit = find(tree, Concept::NetProfit);
    }
    totals
}

pub fn balance_sheet(tree: &RawReportNode) -> BalanceSheetTotals {
    BalanceSheetTotals {
        cash: find(tree, Concept::Cash),
        accounts_receivable: find(tree, Concept::AccountsReceivable),
        accounts_payable: find(tree, Concept::AccountsPayable),
        current_assets_total: find(tree, Concept::CurrentAssets),
        current_liabilities_total: find(tree, Concept::CurrentLiabilities),
        total_assets: find(tree, Concept::TotalAssets),
        total_liabilities: find(tree, Concept::TotalLiabilities),
        equity: find(tree, Concept::Equity),
        ..BalanceSheetTotals::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::ReportCell;

    fn row(kind: RowType, label: &str, values: &[&str]) -> RawReportNode {
        let mut cells = vec![ReportCell::text(label)];
        cells.extend(values.iter().map(|v| ReportCell::text(*v)));
        RawReportNode {
            row_type: kind,
            label: label.to_string(),
            cells,
            children: Vec::new(),
        }
    }

    fn section(title: &str, children: Vec<RawReportNode>) -> RawReportNode {
        RawReportNode {
            row_type: RowType::Section,
            label: title.to_string(),
            cells: Vec::new(),
            children,
        }
    }

    fn report(children: Vec<RawReportNode>) -> RawReportNode {
        RawReportNode {
            children,
            ..RawReportNode::empty_report()
        }
    }

    #[test]
    fn normalizes_labels() {
        assert_eq!(normalize_label("  Total Trading Income "), "trading income");
        assert_eq!(normalize_label("Revenue"), "revenue");
        assert_eq!(normalize_label("Totally"), "totally");
    }

    #[test]
    fn summary_row_outranks_total_label_outranks_plain() {
        let tree = report(vec![
            section("Income", vec![
                row(RowType::Row, "Sales", &["100"]),
                row(RowType::Row, "Total Income", &["150"]),
            ]),
            section("", vec![section("", vec![row(RowType::SummaryRow, "Revenue", &["175"])])]),
        ]);

        let cands = collect_candidates(&tree, Concept::Revenue, 1);
        assert_eq!(cands.len(), 3);
        assert_eq!(select(cands), Some(175.0));
    }

    #[test]
    fn recursion_continues_through_untitled_sections() {
        let tree = report(vec![section(
            "",
            vec![section("", vec![row(RowType::Row, "Turnover", &["9,000.00"])])],
        )]);
        assert_eq!(find(&tree, Concept::Revenue), Some(9000.0));
    }

    #[test]
    fn ties_keep_document_order() {
        let c = vec![
            Candidate { value: 1.0, priority: MatchPriority::Plain, label: "a".into() },
            Candidate { value: 2.0, priority: MatchPriority::TotalLabel, label: "b".into() },
            Candidate { value: 3.0, priority: MatchPriority::TotalLabel, label: "c".into() },
        ];
        assert_eq!(select(c), Some(2.0));
        assert_eq!(select(Vec::new()), None);
    }

    #[test]
    fn value_column_comes_from_header() {
        let tree = report(vec![
            row(RowType::Header, "", &["", "Mar 2026"]),
            row(RowType::Row, "Sales", &["", "42"]),
        ]);
        assert_eq!(value_column(&tree), 2);
        assert_eq!(find(&tree, Concept::Revenue), Some(42.0));

        let no_header = report(vec![row(RowType::Row, "Sales", &["7"])]);
        assert_eq!(value_column(&no_header), 1);
    }

    #[test]
    fn pnl_derives_profit_and_leaves_unknowns_unknown() {
        let tree = report(vec![
            section("Income", vec![row(RowType::SummaryRow, "Total Income", &["1,000"])]),
            section("Operating Expenses", vec![row(RowType::SummaryRow, "Total Operating Expenses", &["600"])]),
        ]);
        let p = pnl(&tree);
        assert_eq!(p.revenue, Some(1000.0));
        assert_eq!(p.expenses, Some(600.0));
        assert_eq!(p.cost_of_sales, None);
        assert_eq!(p.net_profit, Some(400.0));

        let empty = pnl(&RawReportNode::empty_report());
        assert_eq!(empty, PnlTotals::default());
    }
}
