//! [Node] to block-style YAML text
//!
//! Two spaces per level. Nested collections inside sequences are written compactly
//! (`- - a`, `- Key: value`). An intrinsic whose argument is another intrinsic is written in
//! long form (`Fn::Base64:`), YAML does not allow two tags on one node.
//!
//! Multi-line strings are literal blocks (`|`) unless a block would change them; those are
//! double quoted. The writer never produces an empty or whitespace-only line.
use super::{quote, Node};

const INDENT: &str = "  ";
const BANNER: &str =
    "----------------------------------------------------------------------------------------";

fn pad(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn is_call(node: &Node) -> bool {
    matches!(node, Node::Call { .. })
}

/// `key: value` at `level`
pub(crate) fn write_entry(out: &mut String, level: usize, key: &str, node: &Node) {
    pad(out, level);
    out.push_str(key);
    out.push(':');
    write_value(out, level + 1, node);
}

/// `- value` at `level`
pub(crate) fn write_item(out: &mut String, level: usize, node: &Node) {
    let mut block = String::new();
    match node {
        Node::Sequence(items) if !items.is_empty() => write_items(&mut block, level + 1, items),
        Node::Mapping(entries) if !entries.is_empty() => {
            write_entries(&mut block, level + 1, entries)
        }
        Node::Call { function, argument } if is_call(argument) => {
            write_entry(&mut block, level + 1, &function.long_form(), argument)
        }
        _ => {
            pad(out, level);
            out.push('-');
            write_value(out, level + 1, node);
            return;
        }
    }

    // the block starts with the indentation of `level + 1`, which is as wide as `- `
    pad(out, level);
    out.push_str("- ");
    out.push_str(&block[(level + 1) * INDENT.len()..]);
}

fn write_items(out: &mut String, level: usize, items: &[Node]) {
    for item in items {
        write_item(out, level, item);
    }
}

fn write_entries(out: &mut String, level: usize, entries: &[(String, Node)]) {
    for (key, value) in entries {
        write_entry(out, level, key, value);
    }
}

/// Everything after `key:` or `-`, children at `level`
fn write_value(out: &mut String, level: usize, node: &Node) {
    match node {
        Node::Scalar(scalar) => write_scalar(out, level, scalar),
        Node::Sequence(items) if items.is_empty() => out.push_str(" []\n"),
        Node::Sequence(items) => {
            out.push('\n');
            write_items(out, level, items);
        }
        Node::Mapping(entries) if entries.is_empty() => out.push_str(" {}\n"),
        Node::Mapping(entries) => {
            out.push('\n');
            write_entries(out, level, entries);
        }
        Node::Call { function, argument } if is_call(argument) => {
            out.push('\n');
            write_entry(out, level, &function.long_form(), argument);
        }
        Node::Call { function, argument } => {
            out.push(' ');
            out.push_str(&function.short_form());
            write_value(out, level, argument);
        }
    }
}

fn write_scalar(out: &mut String, level: usize, scalar: &str) {
    if scalar.is_empty() {
        out.push_str(" \"\"\n");
        return;
    }

    if !scalar.contains('\n') {
        out.push(' ');
        out.push_str(scalar);
        out.push('\n');
        return;
    }

    if !fits_literal_block(scalar) {
        out.push(' ');
        out.push_str(&quote(scalar));
        out.push('\n');
        return;
    }

    out.push_str(" |");
    if scalar.starts_with(' ') {
        out.push_str(&INDENT.len().to_string());
    }
    if !scalar.ends_with('\n') {
        out.push('-');
    }
    out.push('\n');

    for line in scalar.lines() {
        pad(out, level);
        out.push_str(line);
        out.push('\n');
    }
}

/// A literal block keeps at most one trailing newline and cannot hold `\r` or blank lines
/// without writing whitespace-only lines
fn fits_literal_block(scalar: &str) -> bool {
    let body = scalar.strip_suffix('\n').unwrap_or(scalar);
    !scalar.contains('\r') && body.split('\n').all(|line| !line.trim().is_empty())
}

/// `# text` at `level`, one comment line per line of `text`
pub(crate) fn write_comment(out: &mut String, level: usize, text: &str) {
    for line in text.lines() {
        pad(out, level);
        out.push_str("# ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

/// A comment framed by dashed lines
pub(crate) fn write_banner(out: &mut String, level: usize, title: &str) {
    write_comment(out, level, BANNER);
    write_comment(out, level, title);
    write_comment(out, level, BANNER);
}
