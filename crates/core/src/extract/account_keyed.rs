//! Extraction keyed on the account classification of each leaf row.

use crate::domain::financials::{
    AccountInfo, AccountType, AccountTypeMap, BalanceSheetTotals, PnlTotals,
};
use crate::domain::report::{RawReportNode, RowType};
use crate::extract::labels::value_column;
use crate::extract::value::parse_amount;

const DEBTORS: &str = "DEBTORS";
const CREDITORS: &str = "CREDITORS";

fn add(slot: &mut Option<f64>, v: f64) {
    *slot = Some(slot.unwrap_or(0.0) + v);
}

/// Sum of the parts that are known; `None` when none are.
fn sum_known(parts: &[Option<f64>]) -> Option<f64> {
    parts
        .iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Visits each leaf row that carries a known account id with its parsed value.
fn for_each_account_row(
    tree: &RawReportNode,
    accounts: &AccountTypeMap,
    mut f: impl FnMut(AccountType, &AccountInfo, f64),
) -> usize {
    let column = value_column(tree);
    let mut matched = 0usize;
    tree.walk(&mut |node| {
        if node.row_type != RowType::Row {
            return;
        }
        let Some(info) = node
            .cells
            .first()
            .and_then(|c| c.account_id.as_deref())
            .and_then(|id| accounts.get(id))
        else {
            return;
        };
        let Some(value) = node.cells.get(column).and_then(|c| parse_amount(&c.value)) else {
            return;
        };
        matched += 1;
        f(info.account_type, info, value);
    });
    matched
}

pub fn balance_sheet(tree: &RawReportNode, accounts: &AccountTypeMap) -> BalanceSheetTotals {
    let mut t = BalanceSheetTotals::default();
    let matched = for_each_account_row(tree, accounts, |kind, info, v| match kind {
        AccountType::Bank => add(&mut t.cash, v),
        AccountType::Current if info.is_system(DEBTORS) => add(&mut t.accounts_receivable, v),
        AccountType::Current => add(&mut t.other_current_assets, v),
        AccountType::Inventory => add(&mut t.inventory, v),
        AccountType::Prepayment => add(&mut t.prepayments, v),
        AccountType::Fixed => add(&mut t.fixed_assets, v),
        AccountType::Noncurrent => add(&mut t.non_current_assets, v),
        AccountType::Depreciatn => add(&mut t.accumulated_depreciation, v),
        AccountType::Currliab if info.is_system(CREDITORS) => add(&mut t.accounts_payable, v),
        AccountType::Currliab => add(&mut t.other_current_liabilities, v),
        AccountType::Liability | AccountType::Termliab => add(&mut t.long_term_liabilities, v),
        AccountType::Equity => add(&mut t.equity, v),
        // P&L classifications do not appear on a balance sheet.
        _ => {}
    });

    if matched == 0 {
        return BalanceSheetTotals::default();
    }

    t.current_assets_total = sum_known(&[
        t.cash,
        t.accounts_receivable,
        t.other_current_assets,
        t.inventory,
        t.prepayments,
    ]);
    t.total_assets = sum_known(&[
        t.current_assets_total,
        t.fixed_assets,
        t.non_current_assets,
        t.accumulated_depreciation,
    ]);
    t.current_liabilities_total = sum_known(&[t.accounts_payable, t.other_current_liabilities]);
    t.total_liabilities = sum_known(&[t.current_liabilities_total, t.long_term_liabilities]);

    tracing::debug!(
        matched,
        cash = ?t.cash,
        accounts_receivable = ?t.accounts_receivable,
        current_assets = ?t.current_assets_total,
        current_liabilities = ?t.current_liabilities_total,
        "balance sheet extracted by account type"
    );
    t
}

pub fn pnl(tree: &RawReportNode, accounts: &AccountTypeMap) -> PnlTotals {
    let mut t = PnlTotals::default();
    let matched = for_each_account_row(tree, accounts, |kind, _, v| match kind {
        AccountType::Revenue | AccountType::Sales | AccountType::Otherincome => {
            add(&mut t.revenue, v)
        }
        AccountType::Cogs | AccountType::Directcosts => add(&mut t.cost_of_sales, v),
        AccountType::Expense | AccountType::Overheads => add(&mut t.expenses, v),
        _ => {}
    });

    if matched == 0 || !t.has_data() {
        return PnlTotals::default();
    }
    // With some P&L accounts present, an absent line means the business has none.
    if t.revenue.is_none() {
        t.revenue = Some(0.0);
    }
    if t.expenses.is_none() {
        t.expenses = Some(0.0);
    }
    t.with_derived_profit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::ReportCell;

    fn acct_row(id: &str, label: &str, value: &str) -> RawReportNode {
        RawReportNode {
            row_type: RowType::Row,
            label: label.to_string(),
            cells: vec![
                ReportCell {
                    value: label.to_string(),
                    account_id: Some(id.to_string()),
                },
                ReportCell::text(value),
            ],
            children: Vec::new(),
        }
    }

    fn tree(rows: Vec<RawReportNode>) -> RawReportNode {
        RawReportNode {
            children: vec![RawReportNode {
                row_type: RowType::Section,
                label: String::new(),
                cells: Vec::new(),
                children: rows,
            }],
            ..RawReportNode::empty_report()
        }
    }

    fn map() -> AccountTypeMap {
        let mut m = AccountTypeMap::default();
        let mut put = |id: &str, t: AccountType, sys: Option<&str>| {
            m.insert(
                id,
                AccountInfo {
                    account_type: t,
                    system_account: sys.map(str::to_string),
                },
            )
        };
        put("bank1", AccountType::Bank, None);
        put("bank2", AccountType::Bank, None);
        put("ar", AccountType::Current, Some("DEBTORS"));
        put("gst", AccountType::Current, None);
        put("stock", AccountType::Inventory, None);
        put("van", AccountType::Fixed, None);
        put("dep", AccountType::Depreciatn, None);
        put("ap", AccountType::Currliab, Some("CREDITORS"));
        put("wages", AccountType::Currliab, None);
        put("loan", AccountType::Termliab, None);
        put("capital", AccountType::Equity, None);
        put("sales", AccountType::Sales, None);
        put("interest", AccountType::Otherincome, None);
        put("cogs", AccountType::Directcosts, None);
        put("rent", AccountType::Overheads, None);
        m
    }

    #[test]
    fn sums_balance_sheet_by_account_type() {
        let t = balance_sheet(
            &tree(vec![
                acct_row("bank1", "Cheque", "1,000.00"),
                acct_row("bank2", "Savings", "500"),
                acct_row("ar", "Accounts Receivable", "300"),
                acct_row("gst", "GST", "20"),
                acct_row("stock", "Inventory", "80"),
                acct_row("van", "Vehicles", "10000"),
                acct_row("dep", "Less Depreciation", "(2,000.00)"),
                acct_row("ap", "Accounts Payable", "250"),
                acct_row("wages", "Wages Payable", "50"),
                acct_row("loan", "Bank Loan", "4000"),
                acct_row("capital", "Owner Funds", "5600"),
                acct_row("unknown", "Mystery", "999"),
            ]),
            &map(),
        );
        assert_eq!(t.cash, Some(1500.0));
        assert_eq!(t.accounts_receivable, Some(300.0));
        assert_eq!(t.other_current_assets, Some(20.0));
        assert_eq!(t.current_assets_total, Some(1900.0));
        assert_eq!(t.total_assets, Some(9900.0));
        assert_eq!(t.accounts_payable, Some(250.0));
        assert_eq!(t.current_liabilities_total, Some(300.0));
        assert_eq!(t.total_liabilities, Some(4300.0));
        assert_eq!(t.equity, Some(5600.0));
        assert_eq!(t.prepayments, None);
        assert_eq!(t.non_current_assets, None);
    }

    #[test]
    fn no_matching_accounts_means_unknown_not_zero() {
        let t = balance_sheet(&tree(vec![acct_row("unknown", "Mystery", "1")]), &map());
        assert_eq!(t, BalanceSheetTotals::default());
        assert!(!t.has_data());
    }

    #[test]
    fn sums_pnl_by_account_type() {
        let p = pnl(
            &tree(vec![
                acct_row("sales", "Sales", "10,000"),
                acct_row("interest", "Interest Income", "100"),
                acct_row("cogs", "Purchases", "4,000"),
                acct_row("rent", "Rent", "2,500"),
                acct_row("bank1", "Cheque", "123"),
            ]),
            &map(),
        );
        assert_eq!(p.revenue, Some(10100.0));
        assert_eq!(p.cost_of_sales, Some(4000.0));
        assert_eq!(p.expenses, Some(2500.0));
        assert_eq!(p.gross_profit, Some(6100.0));
        assert_eq!(p.net_profit, Some(3600.0));
    }

    #[test]
    fn service_business_keeps_cost_of_sales_unknown() {
        let p = pnl(&tree(vec![acct_row("sales", "Sales", "800")]), &map());
        assert_eq!(p.cost_of_sales, None);
        assert_eq!(p.expenses, Some(0.0));
        assert_eq!(p.net_profit, Some(800.0));
    }
}
