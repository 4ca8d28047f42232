use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "health_score.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoryId {
    A,
    B,
    C,
    D,
    E,
}

impl CategoryId {
    pub const ALL: [CategoryId; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    pub fn name(self) -> &'static str {
        match self {
            Self::A => "Cash & Runway",
            Self::B => "Profitability & Efficiency",
            Self::C => "Revenue Quality & Momentum",
            Self::D => "Working Capital & Liquidity",
            Self::E => "Compliance & Data Confidence",
        }
    }

    pub fn max_points(self) -> f64 {
        match self {
            Self::A => 30.0,
            Self::B => 25.0,
            Self::C => 15.0,
            Self::D => 20.0,
            Self::E => 10.0,
        }
    }

    pub fn metrics(self) -> Vec<MetricId> {
        MetricId::ALL
            .into_iter()
            .filter(|m| m.category() == self)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricId {
    A1,
    A2,
    A3,
    B1,
    B2,
    B3,
    C1,
    C2,
    D1,
    D2,
    D3,
    D4,
    E1,
    E2,
    E3,
}

impl MetricId {
    pub const ALL: [MetricId; 15] = [
        Self::A1,
        Self::A2,
        Self::A3,
        Self::B1,
        Self::B2,
        Self::B3,
        Self::C1,
        Self::C2,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::E1,
        Self::E2,
        Self::E3,
    ];

    pub fn category(self) -> CategoryId {
        match self {
            Self::A1 | Self::A2 | Self::A3 => CategoryId::A,
            Self::B1 | Self::B2 | Self::B3 => CategoryId::B,
            Self::C1 | Self::C2 => CategoryId::C,
            Self::D1 | Self::D2 | Self::D3 | Self::D4 => CategoryId::D,
            Self::E1 | Self::E2 | Self::E3 => CategoryId::E,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::A1 => "Runway Months",
            Self::A2 => "Cash Volatility",
            Self::A3 => "Cash Conversion Buffer",
            Self::B1 => "Net Profit Margin",
            Self::B2 => "Gross Margin",
            Self::B3 => "Operating Expense Load",
            Self::C1 => "Revenue Trend",
            Self::C2 => "Revenue Consistency",
            Self::D1 => "Current Ratio",
            Self::D2 => "Quick Ratio",
            Self::D3 => "Receivables Health",
            Self::D4 => "Payables Pressure",
            Self::E1 => "Bank Reconciliation Freshness",
            Self::E2 => "Categorisation Completeness",
            Self::E3 => "Data Completeness",
        }
    }

    /// Point budget before any redistribution.
    pub fn base_points(self) -> f64 {
        match self {
            Self::A1 => 15.0,
            Self::A2 => 10.0,
            Self::A3 => 5.0,
            Self::B1 => 10.0,
            Self::B2 => 8.0,
            Self::B3 => 7.0,
            Self::C1 => 10.0,
            Self::C2 => 5.0,
            Self::D1 => 8.0,
            Self::D2 => 5.0,
            Self::D3 => 4.0,
            Self::D4 => 3.0,
            Self::E1 => 3.0,
            Self::E2 => 2.0,
            Self::E3 => 5.0,
        }
    }

    pub fn formula(self) -> &'static str {
        match self {
            Self::A1 => "Cash / AvgMonthlyNetBurn (3mo avg of expenses + COGS - revenue)",
            Self::A2 => "StdDev(MonthlyNet, 3mo) / AvgRevenue(3mo) * 100",
            Self::A3 => "AccountsReceivable / Cash",
            Self::B1 => "NetProfit / Revenue * 100 (3mo rolling)",
            Self::B2 => "(Revenue - COGS) / Revenue * 100 (3mo rolling)",
            Self::B3 => "OperatingExpenses / Revenue * 100 (3mo rolling)",
            Self::C1 => "(Rev_last3 - Rev_prev3) / Rev_prev3 * 100",
            Self::C2 => "StdDev(Revenue, 6mo) / Avg(Revenue, 6mo) * 100",
            Self::D1 => "CurrentAssets / CurrentLiabilities",
            Self::D2 => "(Cash + AR) / CurrentLiabilities",
            Self::D3 => "Share of AR >30 and >60 days overdue",
            Self::D4 => "Share of AP >60 days overdue",
            Self::E1 => "Days since last bank reconciliation (not exposed upstream)",
            Self::E2 => "Share of uncategorised transactions (not exposed upstream)",
            Self::E3 => "Data availability checks (P&L 3mo, cash, AR, AP, P&L 6mo)",
        }
    }
}

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Ok,
    Missing,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub metric_id: MetricId,
    pub name: String,
    pub base_points: f64,
    /// Base budget plus any points received through redistribution.
    pub max_points: f64,
    pub awarded_points: f64,
    pub status: MetricStatus,
    pub raw_value: Option<f64>,
    pub formula: String,
    pub tier: Option<String>,
    pub missing_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category_id: CategoryId,
    pub name: String,
    pub max_points: f64,
    pub awarded_points: f64,
    pub metrics: Vec<MetricId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub to: MetricId,
    pub points: f64,
}

/// Budget of one missing metric moved to available siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedistributionEntry {
    pub metric_id: MetricId,
    pub reason: String,
    pub points_redistributed: f64,
    pub transfers: Vec<Transfer>,
}

/// Budget of a missing metric whose recipients were all missing too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForfeitedBudget {
    pub metric_id: MetricId,
    pub points: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub metric_id: MetricId,
    pub label: String,
    /// `awarded - max/2`; positive drivers lift the score.
    pub impact_points: f64,
    pub awarded_points: f64,
    pub max_points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualitySignal {
    pub signal_id: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intermediates {
    pub cash: Option<f64>,
    pub accounts_receivable: Option<f64>,
    pub current_assets_total: Option<f64>,
    pub current_liabilities_total: Option<f64>,
    pub revenue_3mo: Option<f64>,
    pub cost_of_sales_3mo: Option<f64>,
    pub expenses_3mo: Option<f64>,
    pub gross_profit_3mo: Option<f64>,
    pub net_profit_3mo: Option<f64>,
    pub avg_monthly_revenue: Option<f64>,
    pub avg_monthly_burn: Option<f64>,
    pub runway_months: Option<f64>,
    pub runway_unbounded: bool,
    pub cash_volatility_pct: Option<f64>,
    pub ar_to_cash: Option<f64>,
    pub net_margin_pct: Option<f64>,
    pub gross_margin_pct: Option<f64>,
    pub opex_ratio_pct: Option<f64>,
    pub revenue_growth_3v3_pct: Option<f64>,
    pub revenue_cv_pct: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub ar_over_30_ratio: Option<f64>,
    pub ar_over_60_ratio: Option<f64>,
    pub ap_over_60_ratio: Option<f64>,
    pub months_of_pnl_data: usize,
    pub completeness_checks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::A
        } else if score >= 65.0 {
            Self::B
        } else if score >= 45.0 {
            Self::C
        } else {
            Self::D
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Derived from the compliance category award only.
    pub fn from_compliance_points(points: f64) -> Self {
        if points >= 8.0 {
            Self::High
        } else if points >= 5.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn cap(self) -> f64 {
        match self {
            Self::High => 100.0,
            Self::Medium => 90.0,
            Self::Low => 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScoreResult {
    pub schema_version: String,
    pub raw_score: f64,
    pub confidence: Confidence,
    pub confidence_cap: f64,
    pub final_score: f64,
    pub grade: Grade,
    pub category_breakdown: Vec<CategoryScore>,
    pub subscores: Vec<SubScore>,
    pub redistribution_log: Vec<RedistributionEntry>,
    pub forfeited: Vec<ForfeitedBudget>,
    pub drivers_positive: Vec<Driver>,
    pub drivers_negative: Vec<Driver>,
    pub data_quality_signals: Vec<DataQualitySignal>,
    pub warnings: Vec<String>,
    pub intermediates: Intermediates,
}

impl HealthScoreResult {
    pub fn subscore(&self, id: MetricId) -> Option<&SubScore> {
        self.subscores.iter().find(|s| s.metric_id == id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&CategoryScore> {
        self.category_breakdown.iter().find(|c| c.category_id == id)
    }
}
