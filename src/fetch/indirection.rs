// HTML landing page indirection
//
// An HTTP(S) response served as `text/html` is a landing page. It must carry
// `<link rel="yas" href="...">` pointing at the real script; the href is resolved against the
// page's own URL and fetched in turn.

use scraper::{ElementRef, Html};

/// Media type that marks a landing page
pub const LANDING_MEDIA_TYPE: &str = "text/html";

/// `rel` token of the indirection link
pub const INDIRECTION_REL: &str = "yas";

/// Maximum number of landing pages followed for a single fetch
pub const MAX_INDIRECTIONS: usize = 16;

/// Find the `href` of the first `<link rel="yas">` in document order
pub fn find_indirection_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    find_link(document.root_element())
}

/// Depth-first, first-match walk over the element tree
fn find_link(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    if value.name().eq_ignore_ascii_case("link") && has_indirection_rel(value.attr("rel")) {
        if let Some(href) = value.attr("href") {
            let href = href.trim();
            if !href.is_empty() {
                return Some(href.to_string());
            }
        }
    }

    element
        .children()
        .filter_map(ElementRef::wrap)
        .find_map(find_link)
}

fn has_indirection_rel(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case(INDIRECTION_REL))
    })
}
