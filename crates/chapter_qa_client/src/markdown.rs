//! Markdown → safe HTML for assistant answers.
//!
//! Raw HTML in the input is re-emitted as text so the writer escapes it; a
//! script-bearing answer can never become live markup. Soft line breaks
//! render as `<br>`, GitHub-flavored tables and strikethrough are enabled.

use pulldown_cmark::{html, Event, Options, Parser};

/// Render `input` markdown as HTML with raw HTML neutralized.
pub fn render(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(input, options).map(|event| match event {
        Event::Html(s) => Event::Text(s),
        Event::InlineHtml(s) => Event::Text(s),
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}
