use colored::*;

use crate::model::{SessionInfo, User};

const USER_HEADERS: [&str; 3] = ["ID", "Name", "Phone"];

/// Render users as an aligned text table.
pub fn render_table(users: &[User]) -> String {
    let rows: Vec<[String; 3]> = users
        .iter()
        .map(|u| {
            [
                u.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                u.name.clone(),
                u.phone.clone(),
            ]
        })
        .collect();
    render(USER_HEADERS, &rows, "(no users)")
}

pub fn render_sessions(sessions: &[SessionInfo]) -> String {
    let rows: Vec<[String; 4]> = sessions
        .iter()
        .map(|s| {
            [
                s.username.clone(),
                format!("{}:{}", s.ip, s.port),
                if s.active { "yes" } else { "no" }.to_string(),
                s.subscribed_topics.join(", "),
            ]
        })
        .collect();
    render(
        ["User", "Address", "Active", "Topics"],
        &rows,
        "(no sessions)",
    )
}

/// Print users with a highlighted header line.
pub fn print_table(users: &[User]) {
    print_highlighted(&render_table(users));
}

pub fn print_sessions(sessions: &[SessionInfo]) {
    print_highlighted(&render_sessions(sessions));
}

fn print_highlighted(table: &str) {
    let mut lines = table.lines();
    if let Some(header) = lines.next() {
        println!("{}", header.bright_cyan().bold());
    }
    for line in lines {
        println!("{}", line);
    }
}

fn render<const N: usize>(headers: [&str; N], rows: &[[String; N]], empty: &str) -> String {
    let mut widths = headers.map(|h| h.chars().count());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push_str(&rule.join("─┼─"));
    out.push('\n');

    if rows.is_empty() {
        out.push_str(empty);
        out.push('\n');
    }
    for row in rows {
        push_row(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    out.push_str(padded.join(" │ ").trim_end());
    out.push('\n');
}
