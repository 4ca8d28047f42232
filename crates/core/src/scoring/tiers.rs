//! Step tables mapping a metric value onto points of its base budget.
//!
//! Every table is monotonic: a better value never scores fewer points.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub points: f64,
    pub label: &'static str,
}

const fn tier(points: f64, label: &'static str) -> Tier {
    Tier { points, label }
}

/// A1, months of runway. Unbounded runway scores the top tier.
pub fn runway(months: Option<f64>) -> Tier {
    match months {
        None => tier(15.0, "cash-generative"),
        Some(m) if m >= 6.0 => tier(15.0, ">= 6.0 months"),
        Some(m) if m >= 3.0 => tier(12.0, "3.0-5.9 months"),
        Some(m) if m >= 2.0 => tier(9.0, "2.0-2.9 months"),
        Some(m) if m >= 1.0 => tier(5.0, "1.0-1.9 months"),
        Some(_) => tier(0.0, "< 1.0 months"),
    }
}

/// A2, volatility of monthly net as a percentage of average revenue.
pub fn cash_volatility(pct: f64) -> Tier {
    if pct <= 10.0 {
        tier(10.0, "<= 10%")
    } else if pct <= 20.0 {
        tier(8.0, "10-20%")
    } else if pct <= 35.0 {
        tier(5.0, "20-35%")
    } else if pct <= 50.0 {
        tier(2.0, "35-50%")
    } else {
        tier(0.0, "> 50%")
    }
}

/// A3, receivables per unit of cash.
pub fn ar_to_cash(ratio: f64) -> Tier {
    if ratio <= 0.5 {
        tier(5.0, "<= 0.5")
    } else if ratio <= 1.0 {
        tier(3.0, "0.5-1.0")
    } else if ratio <= 2.0 {
        tier(1.0, "1.0-2.0")
    } else {
        tier(0.0, "> 2.0")
    }
}

/// B1
pub fn net_margin(pct: f64) -> Tier {
    if pct >= 15.0 {
        tier(10.0, ">= 15%")
    } else if pct >= 8.0 {
        tier(8.0, "8-14.9%")
    } else if pct >= 3.0 {
        tier(6.0, "3-7.9%")
    } else if pct >= 0.0 {
        tier(4.0, "0-2.9%")
    } else if pct >= -5.0 {
        tier(2.0, "-0.1 to -5%")
    } else {
        tier(0.0, "< -5%")
    }
}

/// B2
pub fn gross_margin(pct: f64) -> Tier {
    if pct >= 40.0 {
        tier(8.0, ">= 40%")
    } else if pct >= 30.0 {
        tier(6.0, "30-39.9%")
    } else if pct >= 20.0 {
        tier(4.0, "20-29.9%")
    } else if pct >= 10.0 {
        tier(2.0, "10-19.9%")
    } else {
        tier(0.0, "< 10%")
    }
}

/// B3, operating expenses as a percentage of revenue.
pub fn opex_ratio(pct: f64) -> Tier {
    if pct <= 55.0 {
        tier(7.0, "<= 55%")
    } else if pct <= 70.0 {
        tier(5.0, "55-70%")
    } else if pct <= 85.0 {
        tier(3.0, "70-85%")
    } else if pct <= 100.0 {
        tier(1.0, "85-100%")
    } else {
        tier(0.0, "> 100%")
    }
}

/// C1, last three months of revenue against the three before, in percent.
pub fn revenue_trend(growth_pct: f64) -> Tier {
    if growth_pct >= 15.0 {
        tier(10.0, ">= +15%")
    } else if growth_pct >= 5.0 {
        tier(8.0, "+5% to +14.9%")
    } else if growth_pct >= -5.0 {
        tier(6.0, "-4.9% to +4.9%")
    } else if growth_pct >= -15.0 {
        tier(3.0, "-5% to -14.9%")
    } else {
        tier(0.0, "<= -15%")
    }
}

/// C2, coefficient of variation of six months of revenue, in percent.
pub fn revenue_consistency(cv_pct: f64) -> Tier {
    if cv_pct <= 15.0 {
        tier(5.0, "<= 15%")
    } else if cv_pct <= 30.0 {
        tier(3.0, "15-30%")
    } else if cv_pct <= 50.0 {
        tier(1.0, "30-50%")
    } else {
        tier(0.0, "> 50%")
    }
}

/// D1
pub fn current_ratio(ratio: f64) -> Tier {
    if ratio >= 2.0 {
        tier(8.0, ">= 2.0")
    } else if ratio >= 1.5 {
        tier(6.0, "1.5-1.99")
    } else if ratio >= 1.2 {
        tier(4.0, "1.2-1.49")
    } else if ratio >= 1.0 {
        tier(2.0, "1.0-1.19")
    } else {
        tier(0.0, "< 1.0")
    }
}

/// D2
pub fn quick_ratio(ratio: f64) -> Tier {
    if ratio >= 1.2 {
        tier(5.0, ">= 1.2")
    } else if ratio >= 1.0 {
        tier(4.0, "1.0-1.19")
    } else if ratio >= 0.8 {
        tier(2.0, "0.8-0.99")
    } else {
        tier(0.0, "< 0.8")
    }
}

/// D3, shares (0..=1) of receivables more than 30 and 60 days overdue.
pub fn receivables_health(over_30: f64, over_60: f64) -> Tier {
    if over_60 <= 0.10 && over_30 <= 0.35 {
        tier(4.0, ">60d <= 10% and >30d <= 35%")
    } else if over_60 <= 0.20 && over_30 <= 0.50 {
        tier(3.0, ">60d <= 20% and >30d <= 50%")
    } else if over_60 <= 0.35 && over_30 <= 0.65 {
        tier(2.0, ">60d <= 35% and >30d <= 65%")
    } else {
        tier(0.0, "poor receivables health")
    }
}

/// D4, share (0..=1) of payables more than 60 days overdue.
pub fn payables_pressure(over_60: f64) -> Tier {
    if over_60 <= 0.15 {
        tier(3.0, ">60d <= 15%")
    } else if over_60 <= 0.30 {
        tier(2.0, ">60d 15-30%")
    } else {
        tier(0.0, ">60d > 30%")
    }
}
