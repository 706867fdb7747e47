//! Presentation boundary: renders Gold output as text tables and a
//! key-ordered JSON export. Consumes nothing but the `KpiSet`.

use crate::domain::KpiSet;
use crate::error::Result;

/// Deterministic JSON export of the Gold tables (struct field order, no
/// wall-clock fields), so re-runs on unchanged input are byte-identical.
pub fn export_json(kpis: &KpiSet) -> Result<String> {
    Ok(serde_json::to_string_pretty(kpis)?)
}

/// Renders the four KPI tables as fixed-width text.
pub fn render_tables(kpis: &KpiSet) -> String {
    let mut out = String::new();

    out.push_str(&table(
        "Repeat Customers",
        &["customer_id", "customer_name", "region", "order_count", "total_spend"],
        kpis.repeat_customers
            .iter()
            .map(|r| {
                vec![
                    r.customer_id.clone(),
                    r.customer_name.clone(),
                    r.region.to_string(),
                    r.order_count.to_string(),
                    r.total_spend.to_string(),
                ]
            })
            .collect(),
    ));

    out.push_str(&table(
        "Monthly Trends",
        &["month", "total_orders", "total_revenue"],
        kpis.monthly_trends
            .iter()
            .map(|r| {
                vec![
                    r.month.clone(),
                    r.total_orders.to_string(),
                    r.total_revenue.to_string(),
                ]
            })
            .collect(),
    ));

    out.push_str(&table(
        "Regional Revenue",
        &["region", "regional_revenue"],
        kpis.regional_revenue
            .iter()
            .map(|r| vec![r.region.to_string(), r.regional_revenue.to_string()])
            .collect(),
    ));

    out.push_str(&table(
        &format!("Top Customers (30 days to {})", kpis.as_of.format("%Y-%m-%d")),
        &["customer_id", "customer_name", "total_spend"],
        kpis.top_customers
            .iter()
            .map(|r| {
                vec![
                    r.customer_id.clone(),
                    r.customer_name.clone(),
                    r.total_spend.to_string(),
                ]
            })
            .collect(),
    ));

    out
}

fn table(title: &str, headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let render_row = |cells: Vec<String>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let separator = format!(
        "+{}+\n",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = format!("{title}\n{separator}");
    out.push_str(&render_row(headers.iter().map(|h| h.to_string()).collect()));
    out.push_str(&separator);
    if rows.is_empty() {
        out.push_str(&format!("| {} |\n", "(no rows)"));
    } else {
        for row in rows {
            out.push_str(&render_row(row));
        }
    }
    out.push_str(&separator);
    out.push('\n');
    out
}
