//! HTML for the form and the result pages.

use crate::config::WorksheetAllowList;
use crate::error::ItemError;

/// Escape text for use in HTML content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n<style>\n\
body {{ font-family: system-ui, sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; }}\n\
label {{ display: block; margin-top: 1rem; font-weight: 600; }}\n\
button {{ margin-top: 1.5rem; padding: .5rem 1.5rem; }}\n\
pre {{ background: #f4f4f4; padding: 1rem; overflow-x: auto; }}\n\
</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(title),
        body = body
    )
}

/// The upload form.
pub fn form_page(worksheets: &WorksheetAllowList) -> String {
    let options: String = worksheets
        .names()
        .iter()
        .map(|name| {
            let name = escape(name);
            format!("<option value=\"{name}\">{name}</option>\n")
        })
        .collect();
    layout(
        "Upload PDF",
        &format!(
            "<h1>Upload PDF</h1>\n\
<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
<label for=\"pdf_file\">PDF file</label>\n\
<input type=\"file\" id=\"pdf_file\" name=\"pdf_file\" accept=\".pdf,application/pdf\" required>\n\
<label for=\"sheet_name\">Worksheet</label>\n\
<select id=\"sheet_name\" name=\"sheet_name\" required>\n\
<option value=\"\" disabled selected>Select a worksheet</option>\n{options}</select>\n\
<button type=\"submit\">Upload</button>\n</form>"
        ),
    )
}

pub fn success_page(worksheet: &str) -> String {
    layout(
        "Done",
        &format!(
            "<p>Success! Worksheet <strong>{}</strong> has been updated with the images.</p>\n\
<p><a href=\"/\">Upload another PDF</a></p>",
            escape(worksheet)
        ),
    )
}

/// The sheet was updated but some images were lost on the way.
pub fn partial_page(worksheet: &str, rows_written: usize, failures: &[ItemError]) -> String {
    let items: String = failures
        .iter()
        .map(|f| format!("<li>{}</li>\n", escape(&f.to_string())))
        .collect();
    layout(
        "Partially done",
        &format!(
            "<p>Worksheet <strong>{}</strong> was updated with {} rows, but {} images could not be published:</p>\n\
<ul>\n{}</ul>\n<p><a href=\"/\">Upload another PDF</a></p>",
            escape(worksheet),
            rows_written,
            failures.len(),
            items
        ),
    )
}

pub fn error_page(detail: &str) -> String {
    layout(
        "Error",
        &format!("<h2>An error occurred:</h2>\n<pre>{}</pre>", escape(detail)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(
            escape("<b>\"O'Neil\" & co</b>"),
            "&lt;b&gt;&quot;O&#39;Neil&quot; &amp; co&lt;/b&gt;"
        );
    }

    #[test]
    fn form_lists_every_worksheet() {
        let html = form_page(&WorksheetAllowList::parse("bulco,martin"));
        assert!(html.contains("<option value=\"bulco\">bulco</option>"));
        assert!(html.contains("<option value=\"martin\">martin</option>"));
        assert!(html.contains("name=\"pdf_file\""));
        assert!(html.contains("enctype=\"multipart/form-data\""));
    }

    #[test]
    fn pages_escape_user_text() {
        assert!(success_page("<script>").contains("&lt;script&gt;"));
        assert!(error_page("a < b").contains("a &lt; b"));
    }
}
