//! JavaScript snippets run inside the browser to extract page content.

use serde_json::{json, Value};

use crate::browser::session::Extractor;

/// Document title
pub const TITLE: &str = "return document.title || '';";

/// Rendered text of every element matching `arguments[0]` (the body by default)
pub const TEXT: &str = r#"
const selector = arguments[0] || 'body';
return Array.from(document.querySelectorAll(selector))
    .map(element => element.innerText || '')
    .join(' ');
"#;

/// Every anchor with its resolved href, visible text and title attribute
pub const LINKS: &str = r#"
return Array.from(document.querySelectorAll('a')).map(link => ({
    url: link.href || '',
    text: (link.innerText || '').trim(),
    title: link.title || null
}));
"#;

/// Non-empty headings and paragraphs in document order, outside embedded content
pub const SECTIONS: &str = r#"
return Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6, p'))
    .filter(element => !element.closest('script, style, noscript, iframe'))
    .map(element => {
        const text = (element.innerText || '').replace(/\s+/g, ' ').trim();
        if (!text) {
            return null;
        }
        const tag = element.tagName.toLowerCase();
        return tag === 'p'
            ? { type: 'paragraph', text }
            : { type: 'heading', level: Number(tag.substring(1)), text };
    })
    .filter(section => section !== null);
"#;

/// Script and arguments for an extractor
pub fn for_extractor(extractor: &Extractor) -> (&'static str, Vec<Value>) {
    match extractor {
        Extractor::Title => (TITLE, Vec::new()),
        Extractor::Text { selector } => (TEXT, vec![json!(selector)]),
        Extractor::Links => (LINKS, Vec::new()),
        Extractor::Sections => (SECTIONS, Vec::new()),
    }
}
