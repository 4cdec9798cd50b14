// Escaping helpers shared by the DOT and HTML writers

/// Escape text for HTML pages and Graphviz HTML-like labels.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Quote a DOT identifier.
pub fn dot_quote(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\\\""))
}

/// Pad a label cell to half again its length so Graphviz leaves some room around the text.
pub fn widen(text: &str) -> String {
    let len = text.chars().count();
    format!("{:<width$}", text, width = len * 3 / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escape_covers_markup() {
        assert_eq!(
            html_escape(r#"-m comment --comment "a<b & c>d""#),
            "-m comment --comment &quot;a&lt;b &amp; c&gt;d&quot;"
        );
        assert_eq!(html_escape("plain"), "plain");
    }

    #[test]
    fn dot_quote_escapes_quotes() {
        assert_eq!(dot_quote("INPUT"), "\"INPUT\"");
        assert_eq!(dot_quote(r#"LOG --log-prefix "x""#), r#""LOG --log-prefix \"x\"""#);
    }

    #[test]
    fn widen_pads_by_half() {
        assert_eq!(widen("INPUT"), "INPUT  ");
        assert_eq!(widen(""), "");
    }
}
