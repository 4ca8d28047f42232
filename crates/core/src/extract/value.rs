//! Parsing of monetary cell values as they appear in rendered reports.

const CURRENCY_MARKERS: [&str; 9] = ["USD", "EUR", "GBP", "AUD", "NZD", "CAD", "$", "£", "€"];

/// Parses a report cell into a number.
///
/// Empty cells are unknown (`None`); a lone dash is an explicit zero.
/// Accepts `(1,234.56)` negatives and both `1,234.56` and `1.234,56` grouping.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }
    if matches!(s.as_str(), "-" | "\u{2014}" | "\u{2013}") {
        return Some(0.0);
    }

    for marker in CURRENCY_MARKERS {
        s = s.replace(marker, "");
    }
    s.retain(|c| !c.is_whitespace());

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    }

    let normalized = if is_grouped_decimal(&s, '.', ',') {
        s.replace('.', "").replace(',', ".")
    } else if is_grouped_decimal(&s, ',', '.') {
        s.replace(',', "")
    } else if s.contains(',') && !s.contains('.') {
        if is_grouped_integer(&s, ',') {
            s.replace(',', "")
        } else {
            s.replace(',', ".")
        }
    } else if s.matches('.').count() > 1 && is_grouped_integer(&s, '.') {
        // A single dot stays a decimal point; "1.234" is ambiguous.
        s.replace('.', "")
    } else {
        s.replace(',', "")
    };

    let v = normalized.parse::<f64>().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(if negative { -v } else { v })
}

/// `1.234,56` style: grouped integer part, then one or two fraction digits.
fn is_grouped_decimal(s: &str, thousands: char, decimal: char) -> bool {
    let Some((int_part, frac)) = s.rsplit_once(decimal) else {
        return false;
    };
    !frac.is_empty()
        && frac.len() <= 2
        && frac.chars().all(|c| c.is_ascii_digit())
        && int_part.contains(thousands)
        && is_grouped_integer(int_part, thousands)
}

fn is_grouped_integer(s: &str, sep: char) -> bool {
    let mut groups = s.split(sep);
    let Some(head) = groups.next() else {
        return false;
    };
    if head.is_empty() || head.len() > 3 || !head.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut saw_group = false;
    for g in groups {
        if g.len() != 3 || !g.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        saw_group = true;
    }
    saw_group
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_renderings() {
        assert_eq!(parse_amount("1234.50"), Some(1234.5));
        assert_eq!(parse_amount("$1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("NZD 1,234,567.8"), Some(1234567.8));
        assert_eq!(parse_amount("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_amount("1234,5"), Some(1234.5));
        assert_eq!(parse_amount("12,000"), Some(12000.0));
        assert_eq!(parse_amount("1.234.567"), Some(1234567.0));
        assert_eq!(parse_amount("€ 2.500.000"), Some(2500000.0));
        assert_eq!(parse_amount("1.234"), Some(1.234));
        assert_eq!(parse_amount("1.23.4"), None);
    }

    #[test]
    fn negatives_and_zero_markers() {
        assert_eq!(parse_amount("(500.00)"), Some(-500.0));
        assert_eq!(parse_amount("-1.234,56"), Some(-1234.56));
        assert_eq!(parse_amount("(-5)"), Some(5.0));
        assert_eq!(parse_amount("-"), Some(0.0));
        assert_eq!(parse_amount("\u{2014}"), Some(0.0));
    }

    #[test]
    fn blank_or_garbage_is_unknown() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("Total Assets"), None);
        assert_eq!(parse_amount("NaN"), None);
    }
}
