use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node};
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("valid regex"));
static EXTRA_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Converts provider HTML into plain text with paragraph breaks preserved.
/// Handles descriptions delivered entity-escaped (`&lt;p&gt;...`) as well.
pub fn clean(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let unescaped;
    let html = if !input.contains('<') && input.contains("&lt;") {
        unescaped = fragment_text(input);
        unescaped.as_str()
    } else {
        input
    };

    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    walk(fragment.root_element(), &mut out);

    let out = out.replace('\u{a0}', " ");
    let out = SPACE_AROUND_NEWLINE.replace_all(&out, "\n");
    let out = EXTRA_NEWLINES.replace_all(&out, "\n\n");
    out.trim().to_string()
}

fn fragment_text(input: &str) -> String {
    Html::parse_fragment(input).root_element().text().collect()
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = WHITESPACE.replace_all(text, |caps: &Captures| {
                    if caps[0].matches('\n').count() >= 2 { "\n\n" } else { " " }
                });
                if collapsed.trim().is_empty() && (out.is_empty() || out.ends_with('\n')) {
                    continue;
                }
                out.push_str(&collapsed);
            }
            Node::Element(el) => {
                let Some(child_el) = ElementRef::wrap(child) else { continue };
                match el.name() {
                    "script" | "style" | "head" => {}
                    "br" => out.push('\n'),
                    "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" => {
                        paragraph_break(out);
                        walk(child_el, out);
                        paragraph_break(out);
                    }
                    "div" | "li" | "tr" | "section" => {
                        line_break(out);
                        walk(child_el, out);
                        line_break(out);
                    }
                    _ => walk(child_el, out),
                }
            }
            _ => {}
        }
    }
}

fn line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn paragraph_break(out: &mut String) {
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
}
