//! Renders executor result rows into the Markdown the engine persists
//! back into a note in place of a Dataview block/span.

use crate::executor::Row;

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn format_table(rows: &[Row], headers: &[String]) -> String {
    if rows.is_empty() {
        return "*No results*".to_string();
    }

    let mut out = String::new();
    out.push('|');
    for header in headers {
        out.push_str(&format!(" {} |", header));
    }
    out.push('\n');
    out.push('|');
    for _ in headers {
        out.push_str(" --- |");
    }
    out.push('\n');

    for row in rows {
        out.push('|');
        for header in headers {
            let cell = row.get(header).map(|v| v.render()).unwrap_or_default();
            out.push_str(&format!(" {} |", escape_cell(&cell)));
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}

pub fn format_list(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "*No results*".to_string();
    }

    rows.iter()
        .filter_map(|row| row.get("file.link").map(|v| v.render()))
        .map(|link| format!("- {}", link))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_tasks(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "*No results*".to_string();
    }

    rows.iter()
        .map(|row| {
            let done = row
                .get("done")
                .map(|v| v.is_truthy())
                .unwrap_or(false);
            let text = row.get("text").map(|v| v.render()).unwrap_or_default();
            let link = row.get("file.link").map(|v| v.render()).unwrap_or_default();
            let marker = if done { "x" } else { " " };
            format!("- [{}] {} ({})", marker, text, link)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn empty_results_render_placeholder() {
        assert_eq!(format_list(&[]), "*No results*");
    }

    #[test]
    fn table_escapes_pipes_in_cells() {
        let mut row = Row::new();
        row.insert("title".to_string(), Value::String("A | B".to_string()));
        let rendered = format_table(&[row], &["title".to_string()]);
        assert!(rendered.contains("A \\| B"));
    }
}
