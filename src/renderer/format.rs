//! Currency formatting for rendered reports

/// Format an amount as Indian rupees with no fraction digits.
///
/// Uses Indian digit grouping: the last three digits, then groups of two
/// (`1234567` becomes `₹12,34,567`).
pub fn format_inr(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let grouped = group_indian(&digits);

    if rounded < 0.0 {
        format!("-₹{}", grouped)
    } else {
        format!("₹{}", grouped)
    }
}

fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(digits.len() - 3);

    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}
