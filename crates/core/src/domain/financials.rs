use crate::domain::period::FinancialPeriod;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Bank,
    Current,
    Currliab,
    Depreciatn,
    Directcosts,
    Cogs,
    Equity,
    Expense,
    Fixed,
    Inventory,
    Liability,
    Noncurrent,
    Otherincome,
    Overheads,
    Prepayment,
    Revenue,
    Sales,
    Termliab,
}

impl AccountType {
    /// Case-insensitive parse of the upstream classification tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let t = tag.trim().to_ascii_uppercase();
        let v = match t.as_str() {
            "BANK" => Self::Bank,
            "CURRENT" => Self::Current,
            "CURRLIAB" => Self::Currliab,
            "DEPRECIATN" => Self::Depreciatn,
            "DIRECTCOSTS" => Self::Directcosts,
            "COGS" => Self::Cogs,
            "EQUITY" => Self::Equity,
            "EXPENSE" => Self::Expense,
            "FIXED" => Self::Fixed,
            "INVENTORY" => Self::Inventory,
            "LIABILITY" => Self::Liability,
            "NONCURRENT" => Self::Noncurrent,
            "OTHERINCOME" => Self::Otherincome,
            "OVERHEADS" => Self::Overheads,
            "PREPAYMENT" => Self::Prepayment,
            "REVENUE" => Self::Revenue,
            "SALES" => Self::Sales,
            "TERMLIAB" => Self::Termliab,
            _ => return None,
        };
        Some(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_type: AccountType,
    /// Upstream system flag, e.g. `DEBTORS` or `CREDITORS`.
    #[serde(default)]
    pub system_account: Option<String>,
}

impl AccountInfo {
    pub fn is_system(&self, flag: &str) -> bool {
        self.system_account
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(flag))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountTypeMap(pub BTreeMap<String, AccountInfo>);

impl AccountTypeMap {
    pub fn get(&self, account_id: &str) -> Option<&AccountInfo> {
        self.0.get(account_id)
    }

    pub fn insert(&mut self, account_id: impl Into<String>, info: AccountInfo) {
        self.0.insert(account_id.into(), info);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetTotals {
    pub cash: Option<f64>,
    pub accounts_receivable: Option<f64>,
    pub other_current_assets: Option<f64>,
    pub inventory: Option<f64>,
    pub prepayments: Option<f64>,
    pub current_assets_total: Option<f64>,
    pub fixed_assets: Option<f64>,
    pub non_current_assets: Option<f64>,
    pub accumulated_depreciation: Option<f64>,
    pub total_assets: Option<f64>,
    pub accounts_payable: Option<f64>,
    pub other_current_liabilities: Option<f64>,
    pub current_liabilities_total: Option<f64>,
    pub long_term_liabilities: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub equity: Option<f64>,
}

impl BalanceSheetTotals {
    pub fn has_data(&self) -> bool {
        self.cash.is_some()
            || self.current_assets_total.is_some()
            || self.current_liabilities_total.is_some()
            || self.total_assets.is_some()
            || self.total_liabilities.is_some()
            || self.equity.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlTotals {
    pub revenue: Option<f64>,
    pub cost_of_sales: Option<f64>,
    pub expenses: Option<f64>,
    pub gross_profit: Option<f64>,
    pub net_profit: Option<f64>,
}

impl PnlTotals {
    /// Fills the derived profit lines from whatever components are known.
    pub fn with_derived_profit(mut self) -> Self {
        if let Some(rev) = self.revenue {
            let gross = rev - self.cost_of_sales.unwrap_or(0.0);
            self.gross_profit = Some(gross);
            if let Some(exp) = self.expenses {
                self.net_profit = Some(gross - exp);
            }
        }
        self
    }

    pub fn has_data(&self) -> bool {
        self.revenue.is_some() || self.expenses.is_some() || self.cost_of_sales.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPnl {
    pub period: FinancialPeriod,
    pub totals: PnlTotals,
}

/// Contiguous monthly P&L, newest month first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlSeries {
    pub months: Vec<MonthlyPnl>,
}

impl PnlSeries {
    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn latest(&self) -> Option<&MonthlyPnl> {
        self.months.first()
    }

    /// Up to `n` newest months.
    pub fn newest(&self, n: usize) -> &[MonthlyPnl] {
        &self.months[..n.min(self.months.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Receivable,
    Payable,
}

impl InvoiceKind {
    /// Upstream invoice type filter value.
    pub fn wire_type(self) -> &'static str {
        match self {
            Self::Receivable => "ACCREC",
            Self::Payable => "ACCPAY",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Receivable => "Receivables",
            Self::Payable => "Payables",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
    pub amount_due: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub kind: InvoiceKind,
    /// Base-currency invoices only.
    pub invoices: Vec<InvoiceRecord>,
    pub total: f64,
    pub count: usize,
    pub overdue_amount: f64,
    pub overdue_count: usize,
    pub avg_days_overdue: Option<f64>,
    pub base_currency: Option<String>,
    pub currencies_found: Vec<String>,
    pub excluded_foreign_count: usize,
    pub pages_fetched: u32,
    pub truncated: bool,
    pub multi_currency_detected: bool,
}

impl InvoiceSummary {
    pub fn empty(kind: InvoiceKind) -> Self {
        Self {
            kind,
            invoices: Vec::new(),
            total: 0.0,
            count: 0,
            overdue_amount: 0.0,
            overdue_count: 0,
            avg_days_overdue: None,
            base_currency: None,
            currencies_found: Vec::new(),
            excluded_foreign_count: 0,
            pages_fetched: 0,
            truncated: false,
            multi_currency_detected: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeingBucketKind {
    Current,
    Days1To30,
    Days31To60,
    Days61To90,
    Over90,
}

impl AgeingBucketKind {
    pub const ALL: [AgeingBucketKind; 5] = [
        Self::Current,
        Self::Days1To30,
        Self::Days31To60,
        Self::Days61To90,
        Self::Over90,
    ];

    /// `days_overdue <= 0` is not yet due.
    pub fn for_days_overdue(days: i64) -> Self {
        match days {
            d if d <= 0 => Self::Current,
            1..=30 => Self::Days1To30,
            31..=60 => Self::Days31To60,
            61..=90 => Self::Days61To90,
            _ => Self::Over90,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeingBucket {
    pub amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAgeing {
    pub current: AgeingBucket,
    pub days_1_30: AgeingBucket,
    pub days_31_60: AgeingBucket,
    pub days_61_90: AgeingBucket,
    pub over_90: AgeingBucket,
    /// Sum of bucketed amounts.
    pub total: f64,
    pub count: usize,
    /// Positive-balance invoices without a due date; never bucketed.
    pub unbucketed_amount: f64,
    pub unbucketed_count: usize,
}

impl InvoiceAgeing {
    pub fn bucket(&self, kind: AgeingBucketKind) -> &AgeingBucket {
        match kind {
            AgeingBucketKind::Current => &self.current,
            AgeingBucketKind::Days1To30 => &self.days_1_30,
            AgeingBucketKind::Days31To60 => &self.days_31_60,
            AgeingBucketKind::Days61To90 => &self.days_61_90,
            AgeingBucketKind::Over90 => &self.over_90,
        }
    }

    pub fn bucket_mut(&mut self, kind: AgeingBucketKind) -> &mut AgeingBucket {
        match kind {
            AgeingBucketKind::Current => &mut self.current,
            AgeingBucketKind::Days1To30 => &mut self.days_1_30,
            AgeingBucketKind::Days31To60 => &mut self.days_31_60,
            AgeingBucketKind::Days61To90 => &mut self.days_61_90,
            AgeingBucketKind::Over90 => &mut self.over_90,
        }
    }

    pub fn bucket_sum(&self) -> f64 {
        AgeingBucketKind::ALL
            .iter()
            .map(|k| self.bucket(*k).amount)
            .sum()
    }

    /// Bucket share of `total` in percent; None when nothing is bucketed.
    pub fn percentage(&self, kind: AgeingBucketKind) -> Option<f64> {
        (self.total > 0.0).then(|| self.bucket(kind).amount / self.total * 100.0)
    }

    pub fn over_30_ratio(&self) -> Option<f64> {
        (self.total > 0.0).then(|| {
            (self.days_31_60.amount + self.days_61_90.amount + self.over_90.amount) / self.total
        })
    }

    pub fn over_60_ratio(&self) -> Option<f64> {
        (self.total > 0.0).then(|| (self.days_61_90.amount + self.over_90.amount) / self.total)
    }
}

/// Everything the extractors derived from one sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFinancials {
    pub balance_sheet: BalanceSheetTotals,
    /// Balance sheet roughly one month earlier.
    pub balance_sheet_prior: BalanceSheetTotals,
    pub pnl: PnlSeries,
    /// Year-to-date P&L reconstructed from the trial balance.
    pub trial_balance_pnl: PnlTotals,
    pub receivables: Option<InvoiceAgeing>,
    pub payables: Option<InvoiceAgeing>,
}
