//! Finalized markdown rendering for the terminal.
//!
//! During an explain stream fragments are printed as plain text; once the
//! stream finalizes the full accumulated text is run through this renderer
//! exactly once. Headings, code blocks, emphasis and lists come out with
//! ANSI styling; everything else passes through as-is.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::colors::ansi::*;

enum ListKind {
    Unordered,
    Ordered { next: u64 },
}

/// Render a complete markdown document to an ANSI-styled string.
pub fn render(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH);

    let mut out = String::new();
    let mut lists: Vec<ListKind> = Vec::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                ensure_blank_line(&mut out);
                out.push_str(BOLD);
                out.push_str(CYAN);
            }
            Event::End(TagEnd::Heading(_)) => {
                out.push_str(RESET);
                out.push('\n');
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                ensure_blank_line(&mut out);
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        out.push_str(GRAY);
                        out.push_str(&lang);
                        out.push_str(RESET);
                        out.push('\n');
                    }
                }
                out.push_str(DIM);
            }
            Event::End(TagEnd::CodeBlock) => {
                out.push_str(RESET);
                out.push('\n');
            }
            Event::Start(Tag::Emphasis) => out.push_str(ITALIC),
            Event::End(TagEnd::Emphasis) => out.push_str(RESET),
            Event::Start(Tag::Strong) => out.push_str(BOLD),
            Event::End(TagEnd::Strong) => out.push_str(RESET),
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                out.push('\n');
                if lists.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::List(start)) => {
                lists.push(match start {
                    Some(n) => ListKind::Ordered { next: n },
                    None => ListKind::Unordered,
                });
            }
            Event::End(TagEnd::List(_)) => {
                lists.pop();
                if lists.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Item) => {
                let depth = lists.len().saturating_sub(1);
                out.push_str(&"  ".repeat(depth));
                match lists.last_mut() {
                    Some(ListKind::Ordered { next }) => {
                        out.push_str(&format!("{}. ", next));
                        *next += 1;
                    }
                    _ => out.push_str("- "),
                }
            }
            Event::End(TagEnd::Item) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Start(Tag::BlockQuote(_)) => out.push_str(GRAY),
            Event::End(TagEnd::BlockQuote(_)) => out.push_str(RESET),
            Event::Code(code) => {
                out.push_str(CYAN);
                out.push_str(&code);
                out.push_str(RESET);
            }
            Event::Text(text) => out.push_str(&text),
            Event::SoftBreak => out.push('\n'),
            Event::HardBreak => out.push('\n'),
            Event::Rule => {
                ensure_blank_line(&mut out);
                out.push_str(DIM);
                out.push_str(&"─".repeat(40));
                out.push_str(RESET);
                out.push('\n');
            }
            _ => {}
        }
    }

    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn ensure_blank_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with("\n\n") {
        if out.ends_with('\n') {
            out.push('\n');
        } else {
            out.push_str("\n\n");
        }
    }
}
