//! Report trees and invoice lists to typed aggregates.
//!
//! Rows carrying an account id are classified through the [`AccountTypeMap`];
//! label matching only fills what that leaves unknown.

pub mod account_keyed;
pub mod ageing;
pub mod labels;
pub mod value;

use crate::domain::financials::{
    AccountTypeMap, BalanceSheetTotals, ExtractedFinancials, MonthlyPnl, PnlSeries, PnlTotals,
};
use crate::domain::report::RawReportNode;
use crate::ingest::orchestrator::FetchOutcome;

pub fn balance_sheet(tree: &RawReportNode, accounts: &AccountTypeMap) -> BalanceSheetTotals {
    if tree.is_empty() {
        return BalanceSheetTotals::default();
    }
    let keyed = account_keyed::balance_sheet(tree, accounts);
    let by_label = labels::balance_sheet(tree);
    if !keyed.has_data() {
        return by_label;
    }
    BalanceSheetTotals {
        cash: keyed.cash.or(by_label.cash),
        accounts_receivable: keyed.accounts_receivable.or(by_label.accounts_receivable),
        accounts_payable: keyed.accounts_payable.or(by_label.accounts_payable),
        current_assets_total: keyed.current_assets_total.or(by_label.current_assets_total),
        current_liabilities_total: keyed
            .current_liabilities_total
            .or(by_label.current_liabilities_total),
        total_assets: keyed.total_assets.or(by_label.total_assets),
        total_liabilities: keyed.total_liabilities.or(by_label.total_liabilities),
        equity: keyed.equity.or(by_label.equity),
        ..keyed
    }
}

pub fn pnl(tree: &RawReportNode, accounts: &AccountTypeMap) -> PnlTotals {
    if tree.is_empty() {
        return PnlTotals::default();
    }
    let keyed = account_keyed::pnl(tree, accounts);
    if keyed.has_data() {
        keyed
    } else {
        labels::pnl(tree)
    }
}

/// Trial balance rows always carry account ids; there is no label fallback.
pub fn trial_balance_pnl(tree: &RawReportNode, accounts: &AccountTypeMap) -> PnlTotals {
    account_keyed::pnl(tree, accounts)
}

pub fn extract_all(outcome: &FetchOutcome) -> ExtractedFinancials {
    let accounts = &outcome.accounts;
    let today = outcome.today();

    let pnl = PnlSeries {
        months: outcome
            .pnl_months
            .iter()
            .map(|m| MonthlyPnl {
                period: m.period,
                totals: pnl(&m.report, accounts),
            })
            .collect(),
    };

    let receivables = (!outcome.failed(outcome.receivables.kind.label()))
        .then(|| ageing::from_summary(&outcome.receivables, today));
    let payables = (!outcome.failed(outcome.payables.kind.label()))
        .then(|| ageing::from_summary(&outcome.payables, today));

    let out = ExtractedFinancials {
        balance_sheet: balance_sheet(&outcome.balance_sheet, accounts),
        balance_sheet_prior: balance_sheet(&outcome.balance_sheet_prior, accounts),
        pnl,
        trial_balance_pnl: trial_balance_pnl(&outcome.trial_balance, accounts),
        receivables,
        payables,
    };

    tracing::info!(
        tenant_id = %outcome.tenant_id,
        cash = ?out.balance_sheet.cash,
        accounts_receivable = ?out.balance_sheet.accounts_receivable,
        accounts_payable = ?out.balance_sheet.accounts_payable,
        pnl_months = out.pnl.len(),
        latest_revenue = ?out.pnl.latest().and_then(|m| m.totals.revenue),
        "extraction complete"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::financials::{
        AccountInfo, AccountType, InvoiceKind, InvoiceRecord, InvoiceSummary,
    };
    use crate::domain::period::{FinancialPeriod, TenantId};
    use crate::domain::report::{ReportCell, RowType};
    use crate::ingest::orchestrator::{MonthlyReport, SyncError};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn node(kind: RowType, label: &str, account: Option<&str>, value: &str) -> RawReportNode {
        RawReportNode {
            row_type: kind,
            label: label.to_string(),
            cells: vec![
                ReportCell {
                    value: label.to_string(),
                    account_id: account.map(str::to_string),
                },
                ReportCell::text(value),
            ],
            children: Vec::new(),
        }
    }

    fn tree(children: Vec<RawReportNode>) -> RawReportNode {
        let mut header = node(RowType::Header, "", None, "31 Jan 2026");
        header.cells[0] = ReportCell::text("");
        let mut rows = vec![header];
        rows.extend(children);
        RawReportNode {
            row_type: RowType::Report,
            label: "Report".into(),
            cells: Vec::new(),
            children: rows,
        }
    }

    fn accounts() -> AccountTypeMap {
        let mut m = AccountTypeMap::default();
        m.insert(
            "bank",
            AccountInfo {
                account_type: AccountType::Bank,
                system_account: None,
            },
        );
        m.insert(
            "sales",
            AccountInfo {
                account_type: AccountType::Revenue,
                system_account: None,
            },
        );
        m
    }

    #[test]
    fn label_fallback_fills_gaps_left_by_account_rows() {
        let bs = tree(vec![
            node(RowType::Row, "Cheque", Some("bank"), "1,000.00"),
            node(RowType::SummaryRow, "Total Current Liabilities", None, "400.00"),
        ]);
        let t = balance_sheet(&bs, &accounts());
        assert_eq!(t.cash, Some(1000.0));
        assert_eq!(t.current_liabilities_total, Some(400.0));
        assert_eq!(t.accounts_payable, None);
    }

    #[test]
    fn pnl_prefers_account_rows_over_labels() {
        let report = tree(vec![
            node(RowType::Row, "Sales", Some("sales"), "900"),
            node(RowType::SummaryRow, "Total Income", None, "12345"),
        ]);
        let t = pnl(&report, &accounts());
        assert_eq!(t.revenue, Some(900.0));
        assert_eq!(t.expenses, Some(0.0));

        let free_form = tree(vec![node(RowType::SummaryRow, "Total Income", None, "12345")]);
        assert_eq!(pnl(&free_form, &AccountTypeMap::default()).revenue, Some(12345.0));
    }

    #[test]
    fn empty_reports_stay_unknown() {
        let empty = RawReportNode::empty_report();
        assert_eq!(balance_sheet(&empty, &accounts()), BalanceSheetTotals::default());
        assert_eq!(pnl(&empty, &accounts()).revenue, None);
    }

    fn outcome(errors: Vec<SyncError>) -> FetchOutcome {
        let month = FinancialPeriod::month_of(d(2026, 1, 1));
        let mut receivables = InvoiceSummary::empty(InvoiceKind::Receivable);
        receivables.invoices.push(InvoiceRecord {
            invoice_id: "r1".into(),
            invoice_number: None,
            contact_name: None,
            currency_code: Some("NZD".into()),
            amount_due: 300.0,
            due_date: Some(d(2026, 1, 1)),
        });
        FetchOutcome {
            tenant_id: TenantId(uuid::Uuid::nil()),
            period: month,
            fetched_at: Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap(),
            balance_sheet: tree(vec![node(RowType::Row, "Cheque", Some("bank"), "500")]),
            balance_sheet_prior: RawReportNode::empty_report(),
            pnl_months: vec![MonthlyReport {
                period: month,
                report: tree(vec![node(RowType::Row, "Sales", Some("sales"), "900")]),
            }],
            accounts: accounts(),
            trial_balance: RawReportNode::empty_report(),
            receivables,
            payables: InvoiceSummary::empty(InvoiceKind::Payable),
            errors,
        }
    }

    #[test]
    fn extracts_every_section_of_an_outcome() {
        let x = extract_all(&outcome(Vec::new()));
        assert_eq!(x.balance_sheet.cash, Some(500.0));
        assert_eq!(x.balance_sheet_prior, BalanceSheetTotals::default());
        assert_eq!(x.pnl.len(), 1);
        assert_eq!(x.pnl.latest().unwrap().totals.revenue, Some(900.0));
        let ar = x.receivables.unwrap();
        assert_eq!(ar.days_31_60.amount, 300.0);
        assert_eq!(x.payables.unwrap().count, 0);
        assert_eq!(x.trial_balance_pnl, PnlTotals::default());
    }

    #[test]
    fn failed_invoice_fetch_leaves_ageing_unknown() {
        let x = extract_all(&outcome(vec![SyncError {
            endpoint: "Payables".into(),
            status: Some(500),
            message: "boom".into(),
            requires_reauthorization: false,
        }]));
        assert!(x.receivables.is_some());
        assert!(x.payables.is_none());
    }
}
