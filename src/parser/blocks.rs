//! Top-level block extraction from configuration text.
//!
//! Locates `resource`/`variable`/`locals` declaration headers and delimits
//! each body by brace-depth scanning. Brace depth alone delimits blocks;
//! braces inside string literals are not special-cased, so a string value
//! containing `{` or `}` can desynchronize the scan. That is an accepted
//! limitation of this narrow parser, not a bug to patch around.

use once_cell::sync::Lazy;
use regex::Regex;

use super::RawBlock;
use crate::diagnostics::Diagnostic;

/// Which declaration keyword to extract. Resources carry the provider type
/// from their header; variables carry a name; `locals` blocks are anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind<'a> {
    Resource(&'a str),
    Variable,
    Locals,
}

static VARIABLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*variable\s+"([A-Za-z0-9_-]+)"\s*\{"#).unwrap());
static LOCALS_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*locals\s*\{").unwrap());

fn resource_header(resource_type: &str) -> Regex {
    // The type name comes from caller configuration; escape it so it is
    // matched literally.
    Regex::new(&format!(
        r#"(?m)^\s*resource\s+"{}"\s+"([A-Za-z0-9_-]+)"\s*\{{"#,
        regex::escape(resource_type)
    ))
    .unwrap()
}

/// Extract every block of the given kind from `text`. An unterminated block
/// is skipped with an error diagnostic; extraction continues with the next
/// declaration header.
pub fn extract_blocks(
    text: &str,
    kind: BlockKind<'_>,
    origin: &str,
) -> (Vec<RawBlock>, Vec<Diagnostic>) {
    let owned_header;
    let header: &Regex = match kind {
        BlockKind::Resource(resource_type) => {
            owned_header = resource_header(resource_type);
            &owned_header
        }
        BlockKind::Variable => &VARIABLE_HEADER,
        BlockKind::Locals => &LOCALS_HEADER,
    };

    let mut blocks = Vec::new();
    let mut diagnostics = Vec::new();

    for captures in header.captures_iter(text) {
        let full = captures.get(0).expect("capture group 0 always present");
        let declared_name = captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "locals".to_string());

        // The header pattern ends with the opening brace.
        let open = full.end() - 1;
        match body_by_brace_depth(text, open) {
            Some(body_text) => blocks.push(RawBlock {
                declared_name,
                body_text,
            }),
            None => {
                diagnostics.push(Diagnostic::error(
                    origin,
                    format!(
                        "unterminated block '{}': brace depth never returned to zero",
                        declared_name
                    ),
                ));
            }
        }
    }

    (blocks, diagnostics)
}

/// Scan forward from the opening brace at byte offset `open`, counting brace
/// depth. Returns the body between the matched braces, or `None` if the
/// block never closes.
pub(crate) fn body_by_brace_depth(text: &str, open: usize) -> Option<String> {
    let mut depth = 1usize;
    for (offset, ch) in text[open + 1..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[open + 1..open + 1 + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
