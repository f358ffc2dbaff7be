//! Display of generated plan text
//!
//! Provider output is untrusted. It is shown as plain text: light markdown
//! markers are stripped for the terminal, and the HTML form escapes every
//! markup character and turns newlines into explicit `<br>` breaks.

/// Lines of plan text with markdown emphasis and bullets removed
#[must_use]
pub fn plan_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim_end();
            let body = line.trim_start();
            let indent = &line[..line.len() - body.len()];

            let body = body
                .strip_prefix("- ")
                .or_else(|| body.strip_prefix("* "))
                .map_or_else(|| body.to_string(), |rest| format!("• {rest}"));
            let body = body.trim_start_matches('#').trim_start();

            format!("{indent}{}", body.replace("**", "").replace("__", ""))
        })
        .collect()
}

/// Plan text for terminal output
#[must_use]
pub fn to_plain(text: &str) -> String {
    plan_lines(text).join("\n")
}

/// Plan text as an HTML fragment safe to insert into a page
#[must_use]
pub fn to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("<br>");
            }
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}
