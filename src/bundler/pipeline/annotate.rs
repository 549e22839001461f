//! Pure-call annotation of downleveled ES5 code.
//!
//! Minifiers may drop a call prefixed with `/*@__PURE__*/` when its result is
//! unused. Only a fixed allow-list of shapes is annotated:
//!
//! - class IIFEs: `var X = (function () {` whose body starts with `function X(`
//! - subclass IIFEs: `var X = (function (_super) {` followed by `__extends(X, _super);`
//! - token construction: `new InjectionToken(` and `new OpaqueToken(`
//!
//! Markers are inserted inline, so line structure never changes.

use std::sync::LazyLock;

use regex::Regex;

/// The marker comment.
pub const PURE_MARKER: &str = "/*@__PURE__*/";

/// Constructors known to be free of side effects.
const PURE_CONSTRUCTORS: &[&str] = &["InjectionToken", "OpaqueToken"];

static CLASS_IIFE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(var (\S+) = )\(function \((_super)?\) \{\s*$").expect("valid regex")
});

static PURE_NEW: LazyLock<Regex> = LazyLock::new(|| {
    let names = PURE_CONSTRUCTORS.join("|");
    Regex::new(&format!(r"\bnew (?:{names})\(")).expect("valid regex")
});

/// Inline insertion: `(line, column, width)` in coordinates of the input.
pub type Insertion = (u32, u32, u32);

/// Annotates `code`, returning the rewritten text and every insertion made.
pub fn annotate_pure_calls(code: &str) -> (String, Vec<Insertion>) {
    let lines: Vec<&str> = code.split_inclusive('\n').collect();
    let mut out = String::with_capacity(code.len());
    let mut insertions = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let mut columns: Vec<usize> = Vec::new();

        if let Some(caps) = CLASS_IIFE.captures(line) {
            let class = &caps[2];
            let is_subclass = caps.get(3).is_some();
            let rest = &lines[index + 1..];
            let matches = if is_subclass {
                next_code_line(rest, false)
                    .is_some_and(|l| l.starts_with(&format!("__extends({class}, _super);")))
            } else {
                next_code_line(rest, true).is_some_and(|l| l.starts_with(&format!("function {class}(")))
            };
            if matches {
                columns.push(caps[1].len());
            }
        }

        for m in PURE_NEW.find_iter(line) {
            if !line[..m.start()].trim_end().ends_with(PURE_MARKER) {
                columns.push(m.start());
            }
        }

        if columns.is_empty() {
            out.push_str(line);
            continue;
        }

        columns.sort_unstable();
        let mut last = 0;
        for column in columns {
            out.push_str(&line[last..column]);
            out.push_str(PURE_MARKER);
            last = column;
            insertions.push((index as u32, column as u32, PURE_MARKER.len() as u32));
        }
        out.push_str(&line[last..]);
    }

    (out, insertions)
}

/// First line of `lines` that is not blank, trimmed; comment lines are
/// skipped when `skip_comments` is set.
fn next_code_line<'a>(lines: &[&'a str], skip_comments: bool) -> Option<&'a str> {
    lines.iter().map(|l| l.trim()).find(|l| {
        if l.is_empty() {
            return false;
        }
        !(skip_comments
            && (l.starts_with("/**") || l.starts_with('*') || l.starts_with("//")))
    })
}
