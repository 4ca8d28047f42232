//! Conversion of accounting API payloads into internal shapes.
//!
//! The API (and the SDKs wrapping it) emit both `PascalCase` and `snake_case`
//! keys; the wire structs accept either so nothing downstream has to probe.

use crate::domain::financials::{AccountInfo, AccountType, AccountTypeMap, InvoiceRecord};
use crate::domain::report::{RawReportNode, ReportCell, RowType};
use crate::ingest::error::ApiError;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ReportsEnvelope {
    #[serde(rename = "Reports", alias = "reports", default)]
    reports: Vec<WireReport>,
}

#[derive(Debug, Deserialize)]
struct WireReport {
    #[serde(rename = "ReportName", alias = "report_name", default)]
    report_name: Option<String>,
    #[serde(rename = "ReportTitle", alias = "report_title", default)]
    report_title: Option<String>,
    #[serde(rename = "Rows", alias = "rows", default)]
    rows: Vec<WireRow>,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    #[serde(rename = "RowType", alias = "row_type", default)]
    row_type: String,
    #[serde(rename = "Title", alias = "title", default)]
    title: Option<String>,
    #[serde(rename = "Cells", alias = "cells", default)]
    cells: Vec<WireCell>,
    #[serde(rename = "Rows", alias = "rows", default)]
    rows: Vec<WireRow>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    #[serde(rename = "Value", alias = "value", default)]
    value: Option<Value>,
    #[serde(rename = "Attributes", alias = "attributes", default)]
    attributes: Vec<WireAttribute>,
}

#[derive(Debug, Deserialize)]
struct WireAttribute {
    #[serde(rename = "Id", alias = "id", default)]
    id: String,
    #[serde(rename = "Value", alias = "value", default)]
    value: Option<Value>,
}

/// Normalizes the first report in a reports envelope. An envelope without
/// reports yields an empty tree.
pub fn report_tree(payload: &Value) -> Result<RawReportNode, ApiError> {
    let env = ReportsEnvelope::deserialize(payload)
        .map_err(|e| ApiError::Decode(format!("unexpected report payload: {e}")))?;
    let Some(report) = env.reports.into_iter().next() else {
        return Ok(RawReportNode::empty_report());
    };

    Ok(RawReportNode {
        row_type: RowType::Report,
        label: report
            .report_name
            .or(report.report_title)
            .unwrap_or_default(),
        cells: Vec::new(),
        children: report.rows.into_iter().map(convert_row).collect(),
    })
}

fn convert_row(row: WireRow) -> RawReportNode {
    let row_type = match row.row_type.as_str() {
        "Header" | "HEADER" | "header" => RowType::Header,
        "Section" | "SECTION" | "section" => RowType::Section,
        "SummaryRow" | "SUMMARYROW" | "summary_row" | "summaryrow" => RowType::SummaryRow,
        _ => RowType::Row,
    };
    let cells: Vec<ReportCell> = row.cells.into_iter().map(convert_cell).collect();
    let label = match row_type {
        RowType::Section => row.title.unwrap_or_default(),
        _ => cells.first().map(|c| c.value.clone()).unwrap_or_default(),
    };
    RawReportNode {
        row_type,
        label,
        cells,
        children: row.rows.into_iter().map(convert_row).collect(),
    }
}

fn convert_cell(cell: WireCell) -> ReportCell {
    let account_id = cell
        .attributes
        .iter()
        .find(|a| a.id.eq_ignore_ascii_case("account"))
        .and_then(|a| a.value.as_ref())
        .map(value_text)
        .filter(|s| !s.is_empty());
    ReportCell {
        value: cell.value.as_ref().map(value_text).unwrap_or_default(),
        account_id,
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct AccountsEnvelope {
    #[serde(rename = "Accounts", alias = "accounts", default)]
    accounts: Vec<WireAccount>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    #[serde(rename = "AccountID", alias = "account_id", default)]
    account_id: Option<String>,
    #[serde(rename = "Type", alias = "type", default)]
    account_type: Option<String>,
    #[serde(rename = "SystemAccount", alias = "system_account", default)]
    system_account: Option<String>,
}

/// Account id → classification. Accounts with unknown tags are skipped.
pub fn account_type_map(payload: &Value) -> Result<AccountTypeMap, ApiError> {
    let env = AccountsEnvelope::deserialize(payload)
        .map_err(|e| ApiError::Decode(format!("unexpected accounts payload: {e}")))?;

    let mut map = AccountTypeMap::default();
    for acc in env.accounts {
        let (Some(id), Some(tag)) = (acc.account_id, acc.account_type) else {
            continue;
        };
        let Some(account_type) = AccountType::parse(&tag) else {
            tracing::debug!(account_id = %id, tag = %tag, "skipping account with unknown type");
            continue;
        };
        map.insert(
            id,
            AccountInfo {
                account_type,
                system_account: acc.system_account.filter(|s| !s.trim().is_empty()),
            },
        );
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
struct InvoicesEnvelope {
    #[serde(rename = "Invoices", alias = "invoices", default)]
    invoices: Vec<WireInvoice>,
}

#[derive(Debug, Deserialize)]
struct WireInvoice {
    #[serde(rename = "InvoiceID", alias = "invoice_id", default)]
    invoice_id: Option<String>,
    #[serde(rename = "InvoiceNumber", alias = "invoice_number", default)]
    invoice_number: Option<String>,
    #[serde(rename = "Contact", alias = "contact", default)]
    contact: Option<WireContact>,
    #[serde(rename = "CurrencyCode", alias = "currency_code", default)]
    currency_code: Option<String>,
    #[serde(rename = "AmountDue", alias = "amount_due", default)]
    amount_due: Option<Value>,
    #[serde(rename = "DueDate", alias = "due_date", default)]
    due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContact {
    #[serde(rename = "Name", alias = "name", default)]
    name: Option<String>,
}

/// One page of invoices.
pub fn invoice_page(payload: &Value) -> Result<Vec<InvoiceRecord>, ApiError> {
    let env = InvoicesEnvelope::deserialize(payload)
        .map_err(|e| ApiError::Decode(format!("unexpected invoices payload: {e}")))?;

    Ok(env
        .invoices
        .into_iter()
        .enumerate()
        .map(|(idx, inv)| InvoiceRecord {
            invoice_id: inv.invoice_id.unwrap_or_else(|| format!("unknown-{idx}")),
            invoice_number: inv.invoice_number,
            contact_name: inv.contact.and_then(|c| c.name),
            currency_code: inv
                .currency_code
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty()),
            amount_due: inv.amount_due.as_ref().and_then(amount_value).unwrap_or(0.0),
            due_date: inv.due_date.as_deref().and_then(parse_wire_date),
        })
        .collect())
}

fn amount_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => crate::extract::value::parse_amount(s),
        _ => None,
    }
}

/// Accepts ISO dates/datetimes and the `/Date(1706659200000+0000)/` form.
pub fn parse_wire_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    if let Some(inner) = t.strip_prefix("/Date(").and_then(|r| r.strip_suffix(")/")) {
        let millis_str = inner
            .split(|c| c == '+' || c == '-')
            .find(|p| !p.is_empty())?;
        let millis = millis_str.parse::<i64>().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive());
    }
    let date_part = t.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
