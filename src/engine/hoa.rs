//! HOA (Hanoi Omega-Automata) parser.
//!
//! Reads the single-automaton text that `ltl2tgba -H` prints and turns it
//! into an [`AutomatonGraph`]. Only the subset Spot emits for explicit,
//! transition-labelled automata is supported:
//!
//! ```text
//! HOA: v1
//! name: "G(!a | Fb)"
//! States: 2
//! Start: 0
//! AP: 2 "a" "b"
//! acc-name: Buchi
//! Acceptance: 1 Inf(0)
//! properties: trans-labels explicit-labels state-acc complete
//! properties: deterministic stutter-invariant
//! --BODY--
//! State: 0 {0}
//! [!0 | 1] 0
//! [0&!1] 1
//! State: 1
//! [1] 0
//! [!1] 1
//! --END--
//! ```
//!
//! A state is accepting when its `State:` line carries an acceptance mark.
//! Labels are rewritten with AP names: `[0&!1]` becomes `a & !b`, and the
//! constants `t` and `f` become `1` and `0`. Names that are not plain
//! identifiers keep their double quotes (`"x>0" & a`).

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::graph::{AutomatonGraph, GraphAttributes};

/// Parses one HOA automaton.
///
/// # Errors
///
/// Returns [`Error::Engine`] if the text is not a well-formed automaton or
/// references an undeclared state or proposition.
pub fn parse(text: &str) -> Result<AutomatonGraph> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = parse_header(&mut lines)?;
    let mut graph = AutomatonGraph::new(header.attributes);

    let body = parse_body(&mut lines, &graph.attributes.ap_names)?;
    for id in 0..header.states {
        graph.add_node(id, body.accepting.contains(&id));
    }
    for (src, dst, label) in body.edges {
        graph
            .add_edge(src, dst, label)
            .map_err(|e| Error::Engine(format!("malformed HOA body: {e}")))?;
    }
    graph
        .validate()
        .map_err(|e| Error::Engine(format!("malformed HOA automaton: {e}")))?;
    Ok(graph)
}

struct Header {
    states: u32,
    attributes: GraphAttributes,
}

struct Body {
    accepting: BTreeSet<u32>,
    edges: Vec<(u32, u32, String)>,
}

fn malformed(what: impl std::fmt::Display) -> Error {
    Error::Engine(format!("malformed HOA: {what}"))
}

fn parse_header<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<Header> {
    let first = lines.next().ok_or_else(|| malformed("empty input"))?;
    if !first.starts_with("HOA:") {
        return Err(malformed(format!("expected 'HOA:' but found '{first}'")));
    }

    let mut states = None;
    let mut attributes = GraphAttributes::default();
    let mut properties = BTreeSet::new();

    for line in lines.by_ref() {
        if line == "--BODY--" {
            let states = states.ok_or_else(|| malformed("missing 'States:' header"))?;
            attributes.num_states = states;
            attributes.is_deterministic = properties.contains("deterministic");
            attributes.is_terminal = properties.contains("terminal");
            attributes.has_state_based_acc = properties.contains("state-acc");
            return Ok(Header { states, attributes });
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(malformed(format!("header line '{line}'")));
        };
        let value = value.trim();
        match key {
            "States" => states = Some(parse_u32(value)?),
            "Start" => {
                // Alternating conjunctions (`0&1`) never appear in Spot's
                // non-alternating output.
                for part in value.split('&') {
                    attributes.init_states.insert(parse_u32(part.trim())?);
                }
            }
            "AP" => attributes.ap_names = parse_ap(value)?,
            "Acceptance" => {
                let (count, condition) = value
                    .split_once(char::is_whitespace)
                    .unwrap_or((value, "t"));
                attributes.num_acc_sets = parse_u32(count)?;
                attributes.acceptance = condition.trim().to_string();
            }
            "name" => attributes.formula = unquote_all(value)?.join(" "),
            "properties" => properties.extend(value.split_whitespace().map(str::to_string)),
            _ => {}
        }
    }

    Err(malformed("missing '--BODY--'"))
}

fn parse_body<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    ap_names: &[String],
) -> Result<Body> {
    let mut body = Body {
        accepting: BTreeSet::new(),
        edges: Vec::new(),
    };
    let mut current: Option<u32> = None;

    for line in lines {
        if line == "--END--" {
            return Ok(body);
        }

        if let Some(rest) = line.strip_prefix("State:") {
            let rest = rest.trim();
            let (id, tail) = split_number(rest)?;
            if tail.contains('{') {
                body.accepting.insert(id);
            }
            current = Some(id);
            continue;
        }

        let src = current.ok_or_else(|| malformed(format!("edge before any state: '{line}'")))?;
        let (label, rest) = match line.strip_prefix('[') {
            Some(labelled) => {
                let (label, rest) = labelled
                    .split_once(']')
                    .ok_or_else(|| malformed(format!("unterminated label in '{line}'")))?;
                (render_label(label, ap_names)?, rest.trim())
            }
            None => ("1".to_string(), line),
        };
        let (dst, _) = split_number(rest)?;
        body.edges.push((src, dst, label));
    }

    Err(malformed("missing '--END--'"))
}

/// Rewrites an HOA label expression using AP names.
fn render_label(label: &str, ap_names: &[String]) -> Result<String> {
    let mut out = String::new();
    let mut chars = label.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '0'..='9' => {
                let mut digits = String::from(c);
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    digits.push(d);
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| malformed(format!("AP index '{digits}'")))?;
                let name = ap_names
                    .get(index)
                    .ok_or_else(|| malformed(format!("undeclared AP index {index}")))?;
                push_ap(&mut out, name);
            }
            't' => out.push('1'),
            'f' => out.push('0'),
            '&' => out.push_str(" & "),
            '|' => out.push_str(" | "),
            '!' | '(' | ')' => out.push(c),
            c if c.is_whitespace() => {}
            other => return Err(malformed(format!("unexpected '{other}' in label"))),
        }
    }

    Ok(out)
}

/// Writes an AP name the way Spot's formula parser reads it back.
///
/// Names other than lowercase identifiers are double-quoted: Spot reads
/// `Ga` as `G a` and keeps `true`/`false` as constants.
fn push_ap(out: &mut String, name: &str) {
    let bare = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(name, "true" | "false");
    if bare {
        out.push_str(name);
        return;
    }
    out.push('"');
    for c in name.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn parse_ap(value: &str) -> Result<Vec<String>> {
    let (count, names) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
    let count = parse_u32(count)? as usize;
    let names = unquote_all(names)?;
    if names.len() != count {
        return Err(malformed(format!(
            "AP header declares {count} propositions but names {}",
            names.len()
        )));
    }
    Ok(names)
}

/// Extracts every double-quoted string, honoring backslash escapes.
fn unquote_all(value: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut s = String::new();
        loop {
            match chars.next() {
                Some('"') => break,
                Some('\\') => {
                    if let Some(escaped) = chars.next() {
                        s.push(escaped);
                    }
                }
                Some(ch) => s.push(ch),
                None => return Err(malformed(format!("unterminated string in '{value}'"))),
            }
        }
        out.push(s);
    }

    Ok(out)
}

fn split_number(s: &str) -> Result<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    Ok((parse_u32(&s[..end])?, &s[end..]))
}

fn parse_u32(s: &str) -> Result<u32> {
    s.parse()
        .map_err(|_| malformed(format!("expected a number but found '{s}'")))
}
