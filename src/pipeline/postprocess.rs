//! Optional cleanup of model-generated HTML.
//!
//! The model client returns content verbatim, and callers must not assume
//! it is well-formed. When [`crate::config::GenerationConfig::postprocess`]
//! is enabled, these deterministic rules remove the most common wrapper
//! artefacts without touching the document itself:
//!
//! 1. Strip an outer ```` ```html ```` fence (models sometimes disobey the prompt)
//! 2. Drop chatter before the first `<!DOCTYPE` / `<html` tag
//! 3. Normalise line endings (CRLF → LF)
//! 4. Ensure the document ends with exactly one newline
//!
//! Rule 2 only fires when a doctype or `<html` tag exists; fragments are
//! left alone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules in order.
pub fn clean_html(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = strip_leading_chatter(&s);
    let s = normalise_line_endings(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Drop text before the document start ──────────────────────────────

static RE_DOC_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!doctype\s+html|<html[\s>]").unwrap());

fn strip_leading_chatter(input: &str) -> String {
    match RE_DOC_START.find(input) {
        Some(m) => input[m.start()..].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 3: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Single trailing newline ──────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_fence() {
        let input = "```html\n<html><body>x</body></html>\n```";
        assert_eq!(clean_html(input), "<html><body>x</body></html>\n");
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\n<!DOCTYPE html>\n<html></html>\n```\n";
        assert_eq!(clean_html(input), "<!DOCTYPE html>\n<html></html>\n");
    }

    #[test]
    fn drops_preamble_before_doctype() {
        let input = "Here is the HTML you asked for:\n\n<!DOCTYPE html>\n<html lang=\"en\"></html>";
        assert_eq!(clean_html(input), "<!DOCTYPE html>\n<html lang=\"en\"></html>\n");
    }

    #[test]
    fn leaves_fragments_alone() {
        assert_eq!(clean_html("<div>hi</div>"), "<div>hi</div>\n");
    }

    #[test]
    fn inner_fences_are_kept() {
        let input = "<html><pre>```rust\nfn main() {}\n```</pre></html>";
        assert_eq!(clean_html(input), format!("{input}\n"));
    }

    #[test]
    fn normalises_crlf() {
        assert_eq!(clean_html("<html>\r\n</html>\r\n\r\n"), "<html>\n</html>\n");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(clean_html("   \n"), "");
    }
}
