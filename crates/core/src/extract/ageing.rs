use crate::domain::financials::{AgeingBucketKind, InvoiceAgeing, InvoiceRecord, InvoiceSummary};
use chrono::NaiveDate;

/// Buckets positive balances by days past due as of `today`.
///
/// Invoices without a due date are tallied separately and never bucketed;
/// `total` covers bucketed invoices only, so the buckets always sum to it.
pub fn ageing(invoices: &[InvoiceRecord], today: NaiveDate) -> InvoiceAgeing {
    let mut out = InvoiceAgeing::default();
    for inv in invoices {
        if inv.amount_due.is_nan() || inv.amount_due <= 0.0 {
            continue;
        }
        let Some(due) = inv.due_date else {
            out.unbucketed_amount += inv.amount_due;
            out.unbucketed_count += 1;
            continue;
        };
        let days = (today - due).num_days();
        let bucket = out.bucket_mut(AgeingBucketKind::for_days_overdue(days));
        bucket.amount += inv.amount_due;
        bucket.count += 1;
        out.total += inv.amount_due;
        out.count += 1;
    }
    out
}

pub fn from_summary(summary: &InvoiceSummary, today: NaiveDate) -> InvoiceAgeing {
    let a = ageing(&summary.invoices, today);
    if a.unbucketed_count > 0 {
        tracing::debug!(
            kind = ?summary.kind,
            unbucketed = a.unbucketed_count,
            "invoices without due date left out of ageing"
        );
    }
    a
}
