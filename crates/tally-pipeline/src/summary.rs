//! Summary rendering for the chat reply (Telegram HTML)

use tally_domain::{ExtractionResult, UNKNOWN_ITEM};

/// Escape text for the HTML parse mode
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the reply for one extraction event.
///
/// Header with the total and currency, an optional cashier annotation, then
/// one line per position. Without positions the header names the fallback
/// item instead of listing lines.
pub fn render_summary(result: &ExtractionResult, total: f64) -> String {
    let currency = escape_html(&result.currency);

    let mut header = format!("<b>TOTAL</b> {:.2} {}", total, currency);
    if result.has_cashier() {
        header.push_str(&format!(
            " | Cashier <code>{}</code>",
            escape_html(result.cashier_name.trim())
        ));
    }
    header.push(':');

    if result.positions.is_empty() {
        return format!("{} <i>{}</i>", header, UNKNOWN_ITEM);
    }

    let items: Vec<String> = result
        .positions
        .iter()
        .map(|p| {
            format!(
                "<b>{}</b> (<i>{:.2}</i> {})",
                escape_html(&p.name),
                p.price,
                currency
            )
        })
        .collect();

    format!("{}\n{}", header, items.join("\n"))
}
