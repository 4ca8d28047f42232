//! Composite health score over extracted financials.
//!
//! [`calculate`] is pure: the same inputs always produce the same result, and
//! missing inputs only ever move point budgets around (see [`redistribution`]).

pub mod redistribution;
pub mod tiers;

use crate::domain::financials::{BalanceSheetTotals, InvoiceAgeing, PnlSeries};
use crate::domain::score::{
    CategoryId, CategoryScore, Confidence, DataQualitySignal, Driver, Grade, HealthScoreResult,
    Intermediates, MetricId, MetricStatus, Severity, SubScore, SCHEMA_VERSION,
};
use crate::domain::validation::ValidationError;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tiers::Tier;

/// Rolling window for margins, burn and volatility.
const SHORT_WINDOW: usize = 3;
/// Window for revenue trend and consistency.
const LONG_WINDOW: usize = 6;
const TOP_DRIVERS: usize = 3;
const COMPLETENESS_CHECKS: u32 = 5;

enum Outcome {
    Scored {
        value: Option<f64>,
        tier: Tier,
        status: MetricStatus,
    },
    Missing(String),
}

fn scored(value: Option<f64>, tier: Tier) -> Outcome {
    Outcome::Scored {
        value,
        tier,
        status: MetricStatus::Ok,
    }
}

fn missing(reason: impl Into<String>) -> Outcome {
    Outcome::Missing(reason.into())
}

/// Inputs shared by several metrics, derived once.
struct Context<'a> {
    bs: &'a BalanceSheetTotals,
    pnl: &'a PnlSeries,
    receivables: Option<&'a InvoiceAgeing>,
    payables: Option<&'a InvoiceAgeing>,
    revenue_3mo: Option<f64>,
    cost_of_sales_3mo: Option<f64>,
    expenses_3mo: Option<f64>,
}

pub fn calculate(
    balance_sheet: &BalanceSheetTotals,
    pnl: &PnlSeries,
    receivables: Option<&InvoiceAgeing>,
    payables: Option<&InvoiceAgeing>,
) -> Result<HealthScoreResult, ValidationError> {
    validate(balance_sheet, pnl, receivables, payables)?;

    let recent = pnl.newest(SHORT_WINDOW);
    let ctx = Context {
        bs: balance_sheet,
        pnl,
        receivables,
        payables,
        revenue_3mo: sum_known(recent.iter().map(|m| m.totals.revenue)),
        cost_of_sales_3mo: sum_known(recent.iter().map(|m| m.totals.cost_of_sales)),
        expenses_3mo: sum_known(recent.iter().map(|m| m.totals.expenses)),
    };

    let mut im = Intermediates {
        cash: balance_sheet.cash,
        accounts_receivable: balance_sheet.accounts_receivable,
        current_assets_total: balance_sheet.current_assets_total,
        current_liabilities_total: balance_sheet.current_liabilities_total,
        revenue_3mo: ctx.revenue_3mo,
        cost_of_sales_3mo: ctx.cost_of_sales_3mo,
        expenses_3mo: ctx.expenses_3mo,
        gross_profit_3mo: match (ctx.revenue_3mo, ctx.cost_of_sales_3mo) {
            (Some(r), Some(c)) => Some(r - c),
            _ => None,
        },
        net_profit_3mo: match (ctx.revenue_3mo, ctx.expenses_3mo) {
            (Some(r), Some(e)) => Some(r - ctx.cost_of_sales_3mo.unwrap_or(0.0) - e),
            _ => None,
        },
        avg_monthly_revenue: mean_known(recent.iter().map(|m| m.totals.revenue)),
        months_of_pnl_data: pnl.len(),
        ..Intermediates::default()
    };

    let outcomes: Vec<(MetricId, Outcome)> = MetricId::ALL
        .iter()
        .map(|&id| (id, evaluate(id, &ctx, &mut im)))
        .collect();

    let missing_reasons: BTreeMap<MetricId, String> = outcomes
        .iter()
        .filter_map(|(id, o)| match o {
            Outcome::Missing(reason) => Some((*id, reason.clone())),
            Outcome::Scored { .. } => None,
        })
        .collect();
    let plan = redistribution::plan(&missing_reasons);
    let forfeited: BTreeSet<MetricId> = plan.forfeited.iter().map(|f| f.metric_id).collect();

    let subscores: Vec<SubScore> = outcomes
        .into_iter()
        .map(|(id, outcome)| {
            let base = id.base_points();
            match outcome {
                Outcome::Scored {
                    value,
                    tier,
                    status,
                } => {
                    let max = plan.effective_max(id);
                    SubScore {
                        metric_id: id,
                        name: id.name().to_string(),
                        base_points: base,
                        max_points: max,
                        awarded_points: redistribution::rescale(tier.points, base, max),
                        status,
                        raw_value: value,
                        formula: id.formula().to_string(),
                        tier: Some(tier.label.to_string()),
                        missing_reason: None,
                    }
                }
                Outcome::Missing(reason) => SubScore {
                    metric_id: id,
                    name: id.name().to_string(),
                    base_points: base,
                    // A transferred budget no longer belongs to this metric.
                    max_points: if forfeited.contains(&id) { base } else { 0.0 },
                    awarded_points: 0.0,
                    status: MetricStatus::Missing,
                    raw_value: None,
                    formula: id.formula().to_string(),
                    tier: None,
                    missing_reason: Some(reason),
                },
            }
        })
        .collect();

    let category_breakdown: Vec<CategoryScore> = CategoryId::ALL
        .iter()
        .map(|&cat| {
            let members: Vec<&SubScore> = subscores
                .iter()
                .filter(|s| s.metric_id.category() == cat)
                .collect();
            CategoryScore {
                category_id: cat,
                name: cat.name().to_string(),
                max_points: members.iter().map(|s| s.max_points).sum(),
                awarded_points: members.iter().map(|s| s.awarded_points).sum(),
                metrics: members.iter().map(|s| s.metric_id).collect(),
            }
        })
        .collect();

    let raw_score: f64 = category_breakdown.iter().map(|c| c.awarded_points).sum();
    let compliance = category_breakdown
        .iter()
        .find(|c| c.category_id == CategoryId::E)
        .map(|c| c.awarded_points)
        .unwrap_or(0.0);
    let confidence = Confidence::from_compliance_points(compliance);
    let confidence_cap = confidence.cap();
    let final_score = raw_score.min(confidence_cap);
    let grade = Grade::from_score(final_score);

    let (drivers_positive, drivers_negative) = drivers(&subscores);
    let data_quality_signals = signals(pnl.len());
    let warnings = warnings(pnl.len(), &plan);

    tracing::debug!(
        raw_score,
        final_score,
        ?grade,
        ?confidence,
        redistributed = plan.log.len(),
        forfeited = plan.forfeited.len(),
        "health score calculated"
    );

    Ok(HealthScoreResult {
        schema_version: SCHEMA_VERSION.to_string(),
        raw_score,
        confidence,
        confidence_cap,
        final_score,
        grade,
        category_breakdown,
        subscores,
        redistribution_log: plan.log,
        forfeited: plan.forfeited,
        drivers_positive,
        drivers_negative,
        data_quality_signals,
        warnings,
        intermediates: im,
    })
}

fn evaluate(id: MetricId, ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    match id {
        MetricId::A1 => runway(ctx, im),
        MetricId::A2 => cash_volatility(ctx, im),
        MetricId::A3 => ar_to_cash(ctx, im),
        MetricId::B1 => net_margin(ctx, im),
        MetricId::B2 => gross_margin(ctx, im),
        MetricId::B3 => opex_ratio(ctx, im),
        MetricId::C1 => revenue_trend(ctx, im),
        MetricId::C2 => revenue_consistency(ctx, im),
        MetricId::D1 => current_ratio(ctx, im),
        MetricId::D2 => quick_ratio(ctx, im),
        MetricId::D3 => receivables_health(ctx, im),
        MetricId::D4 => payables_pressure(ctx, im),
        MetricId::E1 => missing("bank reconciliation status is not exposed by the accounting API"),
        MetricId::E2 => missing("transaction categorisation is not exposed by the accounting API"),
        MetricId::E3 => completeness(ctx, im),
    }
}

/// Cash over average monthly burn, burn being `expenses + cost_of_sales - revenue`
/// over up to the three newest months. Non-positive burn is unbounded runway.
fn runway(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let Some(cash) = ctx.bs.cash else {
        return missing("cash balance unavailable");
    };
    let burns: Vec<f64> = ctx
        .pnl
        .newest(SHORT_WINDOW)
        .iter()
        .filter_map(|m| {
            let t = &m.totals;
            Some(t.expenses? + t.cost_of_sales.unwrap_or(0.0) - t.revenue?)
        })
        .collect();
    if burns.is_empty() {
        return missing("no monthly P&L with revenue and expenses");
    }

    let burn = mean(&burns);
    im.avg_monthly_burn = Some(burn);
    let status = if burns.len() < SHORT_WINDOW {
        MetricStatus::Estimated
    } else {
        MetricStatus::Ok
    };

    if burn <= 0.0 {
        im.runway_unbounded = true;
        return Outcome::Scored {
            value: None,
            tier: tiers::runway(None),
            status,
        };
    }
    let months = (cash / burn).max(0.0);
    im.runway_months = Some(months);
    Outcome::Scored {
        value: Some(months),
        tier: tiers::runway(Some(months)),
        status,
    }
}

/// Population standard deviation of monthly net over three months, relative to
/// average monthly revenue.
fn cash_volatility(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let recent = ctx.pnl.newest(SHORT_WINDOW);
    if recent.len() < SHORT_WINDOW {
        return missing("fewer than 3 months of P&L history");
    }
    let mut nets = Vec::with_capacity(SHORT_WINDOW);
    let mut revenues = Vec::with_capacity(SHORT_WINDOW);
    for m in recent {
        let (Some(rev), Some(exp)) = (m.totals.revenue, m.totals.expenses) else {
            return missing("monthly revenue or expenses unavailable");
        };
        nets.push(rev - m.totals.cost_of_sales.unwrap_or(0.0) - exp);
        revenues.push(rev);
    }
    let avg_revenue = mean(&revenues);
    if avg_revenue <= 0.0 {
        return missing("average monthly revenue is not positive");
    }
    let pct = std_dev(&nets) / avg_revenue * 100.0;
    im.cash_volatility_pct = Some(pct);
    scored(Some(pct), tiers::cash_volatility(pct))
}

fn ar_to_cash(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let (Some(ar), Some(cash)) = (ctx.bs.accounts_receivable, ctx.bs.cash) else {
        return missing("accounts receivable or cash unavailable");
    };
    if cash <= 0.0 {
        return scored(
            None,
            Tier {
                points: 0.0,
                label: "no positive cash balance",
            },
        );
    }
    let ratio = ar / cash;
    im.ar_to_cash = Some(ratio);
    scored(Some(ratio), tiers::ar_to_cash(ratio))
}

/// Three-month revenue, required positive for any margin.
fn margin_revenue(ctx: &Context<'_>) -> Result<f64, Outcome> {
    if ctx.pnl.len() < SHORT_WINDOW {
        return Err(missing("fewer than 3 months of P&L history"));
    }
    match ctx.revenue_3mo {
        Some(r) if r > 0.0 => Ok(r),
        Some(_) => Err(missing("no revenue in the last 3 months")),
        None => Err(missing("revenue unavailable")),
    }
}

fn net_margin(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let revenue = match margin_revenue(ctx) {
        Ok(r) => r,
        Err(o) => return o,
    };
    let Some(expenses) = ctx.expenses_3mo else {
        return missing("expenses unavailable");
    };
    let net = revenue - ctx.cost_of_sales_3mo.unwrap_or(0.0) - expenses;
    let pct = net / revenue * 100.0;
    im.net_margin_pct = Some(pct);
    scored(Some(pct), tiers::net_margin(pct))
}

fn gross_margin(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let revenue = match margin_revenue(ctx) {
        Ok(r) => r,
        Err(o) => return o,
    };
    let cogs = match ctx.cost_of_sales_3mo {
        Some(c) if c != 0.0 => c,
        _ => return missing("no cost of sales reported (service business)"),
    };
    let pct = (revenue - cogs) / revenue * 100.0;
    im.gross_margin_pct = Some(pct);
    scored(Some(pct), tiers::gross_margin(pct))
}

fn opex_ratio(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let revenue = match margin_revenue(ctx) {
        Ok(r) => r,
        Err(o) => return o,
    };
    let Some(expenses) = ctx.expenses_3mo else {
        return missing("expenses unavailable");
    };
    let pct = expenses / revenue * 100.0;
    im.opex_ratio_pct = Some(pct);
    scored(Some(pct), tiers::opex_ratio(pct))
}

/// Six newest monthly revenues, all known.
fn long_revenues(ctx: &Context<'_>) -> Option<Vec<f64>> {
    let months = ctx.pnl.newest(LONG_WINDOW);
    if months.len() < LONG_WINDOW {
        return None;
    }
    months.iter().map(|m| m.totals.revenue).collect()
}

fn revenue_trend(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let Some(revs) = long_revenues(ctx) else {
        return missing("fewer than 6 months of revenue history");
    };
    let last: f64 = revs[..SHORT_WINDOW].iter().sum();
    let prev: f64 = revs[SHORT_WINDOW..].iter().sum();
    if prev <= 0.0 {
        return missing("no revenue in the comparison period");
    }
    let pct = (last - prev) / prev * 100.0;
    im.revenue_growth_3v3_pct = Some(pct);
    scored(Some(pct), tiers::revenue_trend(pct))
}

fn revenue_consistency(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let Some(revs) = long_revenues(ctx) else {
        return missing("fewer than 6 months of revenue history");
    };
    let avg = mean(&revs);
    if avg <= 0.0 {
        return missing("average monthly revenue is not positive");
    }
    let pct = std_dev(&revs) / avg * 100.0;
    im.revenue_cv_pct = Some(pct);
    scored(Some(pct), tiers::revenue_consistency(pct))
}

fn current_liabilities(ctx: &Context<'_>) -> Option<f64> {
    ctx.bs.current_liabilities_total.filter(|cl| *cl != 0.0)
}

fn current_ratio(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let (Some(ca), Some(cl)) = (ctx.bs.current_assets_total, current_liabilities(ctx)) else {
        return missing("current assets or current liabilities unavailable");
    };
    let ratio = ca / cl;
    im.current_ratio = Some(ratio);
    scored(Some(ratio), tiers::current_ratio(ratio))
}

fn quick_ratio(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let (Some(cash), Some(ar), Some(cl)) = (
        ctx.bs.cash,
        ctx.bs.accounts_receivable,
        current_liabilities(ctx),
    ) else {
        return missing("cash, receivables or current liabilities unavailable");
    };
    let ratio = (cash + ar) / cl;
    im.quick_ratio = Some(ratio);
    scored(Some(ratio), tiers::quick_ratio(ratio))
}

fn receivables_health(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let Some(ageing) = ctx.receivables.filter(|a| a.count > 0) else {
        return missing("no dated receivable invoices");
    };
    let (Some(over_30), Some(over_60)) = (ageing.over_30_ratio(), ageing.over_60_ratio()) else {
        return missing("receivables total is zero");
    };
    im.ar_over_30_ratio = Some(over_30);
    im.ar_over_60_ratio = Some(over_60);
    scored(Some(over_60), tiers::receivables_health(over_30, over_60))
}

fn payables_pressure(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let Some(over_60) = ctx
        .payables
        .filter(|a| a.count > 0)
        .and_then(|a| a.over_60_ratio())
    else {
        return missing("no dated payable invoices");
    };
    im.ap_over_60_ratio = Some(over_60);
    scored(Some(over_60), tiers::payables_pressure(over_60))
}

/// One point per available input: 3 months of P&L, cash, receivables,
/// payables, 6 months of P&L.
fn completeness(ctx: &Context<'_>, im: &mut Intermediates) -> Outcome {
    let has_invoices =
        |a: Option<&InvoiceAgeing>| a.is_some_and(|a| a.count + a.unbucketed_count > 0);
    let checks = [
        ctx.pnl.len() >= SHORT_WINDOW,
        ctx.bs.cash.is_some(),
        has_invoices(ctx.receivables),
        has_invoices(ctx.payables),
        ctx.pnl.len() >= LONG_WINDOW,
    ];
    let passed = checks.iter().filter(|c| **c).count() as u32;
    im.completeness_checks = passed;
    let label = match passed {
        COMPLETENESS_CHECKS => "all checks passed",
        0 => "no checks passed",
        _ => "partial data",
    };
    scored(
        Some(f64::from(passed)),
        Tier {
            points: f64::from(passed) * MetricId::E3.base_points() / f64::from(COMPLETENESS_CHECKS),
            label,
        },
    )
}

fn drivers(subscores: &[SubScore]) -> (Vec<Driver>, Vec<Driver>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for s in subscores.iter().filter(|s| s.status != MetricStatus::Missing) {
        let impact = s.awarded_points - s.max_points / 2.0;
        let d = Driver {
            metric_id: s.metric_id,
            label: s.name.clone(),
            impact_points: impact,
            awarded_points: s.awarded_points,
            max_points: s.max_points,
        };
        match impact.partial_cmp(&0.0) {
            Some(Ordering::Greater) => positive.push(d),
            Some(Ordering::Less) => negative.push(d),
            _ => {}
        }
    }

    positive.sort_by(|a, b| {
        b.impact_points
            .partial_cmp(&a.impact_points)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.metric_id.cmp(&b.metric_id))
    });
    negative.sort_by(|a, b| {
        a.impact_points
            .partial_cmp(&b.impact_points)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.metric_id.cmp(&b.metric_id))
    });
    positive.truncate(TOP_DRIVERS);
    negative.truncate(TOP_DRIVERS);
    (positive, negative)
}

fn signals(months: usize) -> Vec<DataQualitySignal> {
    let mut out = Vec::new();
    if months < SHORT_WINDOW {
        out.push(DataQualitySignal {
            signal_id: "DQ_MISSING_HISTORICAL".into(),
            severity: Severity::Warning,
            message: "Less than 3 months of historical data. Runway, margin and trend metrics may be missing.".into(),
        });
    } else if months < LONG_WINDOW {
        out.push(DataQualitySignal {
            signal_id: "DQ_LIMITED_HISTORICAL".into(),
            severity: Severity::Info,
            message: "Less than 6 months of historical data. Revenue trend and consistency metrics are unavailable."
                .into(),
        });
    }
    out.push(DataQualitySignal {
        signal_id: "DQ_MISSING_RECON".into(),
        severity: Severity::Info,
        message: "Bank reconciliation status not available from the accounting API.".into(),
    });
    out
}

fn warnings(months: usize, plan: &redistribution::Plan) -> Vec<String> {
    let mut out = Vec::new();
    if months < SHORT_WINDOW {
        out.push("Score may be conservative due to missing historical data.".to_string());
    }
    let moved: f64 = plan.log.iter().map(|e| e.points_redistributed).sum();
    if moved > 0.0 {
        out.push(format!(
            "{} metrics ({} points) were redistributed due to missing data.",
            plan.log.len(),
            moved
        ));
    }
    let lost: f64 = plan.forfeited.iter().map(|f| f.points).sum();
    if lost > 0.0 {
        out.push(format!(
            "{} metrics ({} points) had no available recipient and were forfeited.",
            plan.forfeited.len(),
            lost
        ));
    }
    out
}

fn validate(
    bs: &BalanceSheetTotals,
    pnl: &PnlSeries,
    receivables: Option<&InvoiceAgeing>,
    payables: Option<&InvoiceAgeing>,
) -> Result<(), ValidationError> {
    let bs_fields = [
        ("cash", bs.cash),
        ("accounts_receivable", bs.accounts_receivable),
        ("other_current_assets", bs.other_current_assets),
        ("inventory", bs.inventory),
        ("prepayments", bs.prepayments),
        ("current_assets_total", bs.current_assets_total),
        ("fixed_assets", bs.fixed_assets),
        ("non_current_assets", bs.non_current_assets),
        ("accumulated_depreciation", bs.accumulated_depreciation),
        ("total_assets", bs.total_assets),
        ("accounts_payable", bs.accounts_payable),
        ("other_current_liabilities", bs.other_current_liabilities),
        ("current_liabilities_total", bs.current_liabilities_total),
        ("long_term_liabilities", bs.long_term_liabilities),
        ("total_liabilities", bs.total_liabilities),
        ("equity", bs.equity),
    ];
    for (field, value) in bs_fields {
        finite(field, value)?;
    }

    for m in &pnl.months {
        finite("revenue", m.totals.revenue)?;
        finite("cost_of_sales", m.totals.cost_of_sales)?;
        finite("expenses", m.totals.expenses)?;
    }
    for pair in pnl.months.windows(2) {
        let newer = pair[0].period.start_date();
        let older = pair[1].period.start_date();
        if newer <= older {
            return Err(ValidationError::UnorderedSeries { newer, older });
        }
    }

    for (field, ageing) in [
        ("receivables.total", receivables),
        ("payables.total", payables),
    ] {
        let Some(a) = ageing else { continue };
        finite(field, Some(a.total))?;
        if a.total < 0.0 {
            return Err(ValidationError::Negative {
                field,
                value: a.total,
            });
        }
    }
    Ok(())
}

fn finite(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() => Err(ValidationError::NonFinite { field, value: v }),
        _ => Ok(()),
    }
}

fn sum_known(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

fn mean_known(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let known: Vec<f64> = values.flatten().collect();
    (!known.is_empty()).then(|| mean(&known))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
