//! Line-level grammar for the triple notation
//!
//! Quoted strings and `<...>` IRIs are opaque atoms while splitting; a
//! literal's `^^datatype` or `@tag` suffix and a glued terminator are split
//! off the token they follow.

use std::collections::VecDeque;

use graphingest_core::Record;
use serde_json::Value;

use crate::error::DecodeError;

/// Alias-to-expansion mapping declared by an `@prefix` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixBinding {
    /// Alias including its colon, e.g. `foaf:`
    pub alias: String,
    pub expansion: String,
}

/// Where the parser stands between statements.
///
/// A remembered subject exists exactly while a `;` group is open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    ExpectingSubject,
    ExpectingContinuation { subject: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix<'a> {
    /// Datatype as written: `<iri>` or a prefixed name
    Datatype(&'a str),
    /// Language tag without `@`
    Tag(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    /// `<...>` contents
    Iri(&'a str),
    /// Unbracketed name, e.g. `foaf:name`
    Name(&'a str),
    /// Quoted string contents without the surrounding quotes
    Literal {
        value: &'a str,
        suffix: Option<Suffix<'a>>,
    },
    Terminator(char),
}

/// Parse an `@prefix ALIAS: <EXPANSION> .` line; `None` for any other line.
pub fn parse_prefix(line: &str) -> Option<PrefixBinding> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "@prefix" {
        return None;
    }
    let alias = parts.next()?;
    let expansion = parts.next()?;
    let expansion = expansion.strip_suffix('.').unwrap_or(expansion);
    let expansion = expansion.strip_prefix('<')?.strip_suffix('>')?;
    Some(PrefixBinding {
        alias: alias.to_string(),
        expansion: expansion.to_string(),
    })
}

fn is_boundary(bytes: &[u8], at: usize) -> bool {
    bytes.get(at).map_or(true, u8::is_ascii_whitespace)
}

/// End of an unbracketed token starting at `start`, leaving a glued terminator out
fn name_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && !bytes[end].is_ascii_whitespace() {
        end += 1;
    }
    if end - start > 1 && matches!(bytes[end - 1], b';' | b'.' | b',') {
        end - 1
    } else {
        end
    }
}

/// Index of the quote closing a string that starts after `start`
fn closing_quote(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn closing_bracket(line: &str, start: usize) -> Option<usize> {
    line[start..].find('>').map(|i| start + i)
}

fn tokenize(line: &str) -> Result<Vec<Token<'_>>, String> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match b {
            b'<' => {
                let end = closing_bracket(line, i).ok_or("unterminated IRI")?;
                tokens.push(Token::Iri(&line[i + 1..end]));
                i = end + 1;
            }
            b'"' => {
                let end = closing_quote(bytes, i + 1).ok_or("unterminated string literal")?;
                let value = &line[i + 1..end];
                i = end + 1;
                let suffix = if line[i..].starts_with("^^") {
                    i += 2;
                    let end = if bytes.get(i) == Some(&b'<') {
                        closing_bracket(line, i).ok_or("unterminated datatype IRI")? + 1
                    } else {
                        name_end(bytes, i)
                    };
                    if end == i {
                        return Err("empty datatype".into());
                    }
                    let datatype = &line[i..end];
                    i = end;
                    Some(Suffix::Datatype(datatype))
                } else if bytes.get(i) == Some(&b'@') {
                    let len = bytes[i + 1..]
                        .iter()
                        .take_while(|c| c.is_ascii_alphanumeric() || **c == b'-')
                        .count();
                    if len == 0 {
                        return Err("empty language tag".into());
                    }
                    let tag = &line[i + 1..i + 1 + len];
                    i += 1 + len;
                    Some(Suffix::Tag(tag))
                } else {
                    None
                };
                tokens.push(Token::Literal { value, suffix });
            }
            b';' | b'.' | b',' if is_boundary(bytes, i + 1) => {
                tokens.push(Token::Terminator(b as char));
                i += 1;
            }
            _ => {
                let end = name_end(bytes, i);
                tokens.push(Token::Name(&line[i..end]));
                i = end;
            }
        }
    }
    Ok(tokens)
}

/// Strip one leading `<` and one trailing `>` if present
pub fn strip_angle_brackets(s: &str) -> &str {
    let s = s.strip_prefix('<').unwrap_or(s);
    s.strip_suffix('>').unwrap_or(s)
}

/// Expand a name through the one binding whose alias it contains.
///
/// No match, or more than one, leaves the name as a literal IRI.
pub fn expand_name(name: &str, prefixes: &[PrefixBinding]) -> String {
    let mut matches = prefixes
        .iter()
        .filter(|p| name.contains(p.alias.as_str()));
    match (matches.next(), matches.next()) {
        (Some(binding), None) => name.replacen(binding.alias.as_str(), &binding.expansion, 1),
        _ => strip_angle_brackets(name).to_string(),
    }
}

fn resolve_term(token: &Token<'_>, prefixes: &[PrefixBinding]) -> String {
    match token {
        Token::Iri(iri) => (*iri).to_string(),
        Token::Name(name) => expand_name(name, prefixes),
        Token::Literal { value, .. } => (*value).to_string(),
        Token::Terminator(c) => c.to_string(),
    }
}

/// Build the record for one statement's terms (terminator excluded).
fn statement(
    terms: &[Token<'_>],
    state: &ParserState,
    prefixes: &[PrefixBinding],
) -> Result<Record, String> {
    let suffix = match terms.last() {
        Some(Token::Literal { suffix, .. }) => *suffix,
        _ => None,
    };
    let token_count = terms.len() + 1 + usize::from(suffix.is_some());

    let (subject, rest) = match state {
        ParserState::ExpectingSubject => {
            if terms.len() != 3 {
                return Err(format!(
                    "expected 4 or 5 tokens for a new statement, found {token_count}"
                ));
            }
            if matches!(terms[0], Token::Literal { .. }) {
                return Err("literal in subject position".into());
            }
            (resolve_term(&terms[0], prefixes), &terms[1..])
        }
        ParserState::ExpectingContinuation { subject } => {
            if terms.len() != 2 {
                return Err(format!(
                    "expected 3 or 4 tokens for a continuation, found {token_count}"
                ));
            }
            (subject.clone(), terms)
        }
    };
    if matches!(rest[0], Token::Literal { .. }) {
        return Err("literal in predicate position".into());
    }

    let mut record = Record::new();
    record.insert("subject".into(), Value::String(subject));
    record.insert(
        "predicate".into(),
        Value::String(resolve_term(&rest[0], prefixes)),
    );
    record.insert(
        "object".into(),
        Value::String(resolve_term(&rest[1], prefixes)),
    );
    match suffix {
        Some(Suffix::Datatype(datatype)) => {
            let datatype = match datatype.strip_prefix('<') {
                Some(_) => strip_angle_brackets(datatype).to_string(),
                None => expand_name(datatype, prefixes),
            };
            record.insert("type".into(), Value::String(datatype));
        }
        Some(Suffix::Tag(tag)) => {
            record.insert("type".into(), Value::String(tag.to_string()));
        }
        None => {}
    }
    Ok(record)
}

fn subject_of(record: &Record) -> String {
    record
        .get("subject")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse one data line, appending its triples to `out` and advancing `state`.
///
/// A line may hold several terminated statements; every statement on it
/// must be terminated.
pub fn parse_line(
    line: &str,
    line_no: u64,
    state: &mut ParserState,
    prefixes: &[PrefixBinding],
    out: &mut VecDeque<Record>,
) -> Result<(), DecodeError> {
    let invalid = |reason: String| DecodeError::InvalidDocument {
        line: line_no,
        text: line.trim_end().to_string(),
        reason,
    };
    let tokens = tokenize(line).map_err(invalid)?;

    let mut start = 0;
    while start < tokens.len() {
        let Some((offset, terminator)) = tokens[start..]
            .iter()
            .enumerate()
            .find_map(|(k, t)| match t {
                Token::Terminator(c) => Some((k, *c)),
                _ => None,
            })
        else {
            return Err(invalid("statement has no terminator".into()));
        };
        let end = start + offset;
        let record = statement(&tokens[start..end], state, prefixes).map_err(invalid)?;
        *state = match terminator {
            ';' => ParserState::ExpectingContinuation {
                subject: subject_of(&record),
            },
            '.' => ParserState::ExpectingSubject,
            other => return Err(invalid(format!("unsupported terminator '{other}'"))),
        };
        out.push_back(record);
        start = end + 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex() -> Vec<PrefixBinding> {
        vec![PrefixBinding {
            alias: "a:".into(),
            expansion: "http://ex.org/".into(),
        }]
    }

    fn parse(line: &str, state: &mut ParserState, prefixes: &[PrefixBinding]) -> Vec<Record> {
        let mut out = VecDeque::new();
        parse_line(line, 1, state, prefixes, &mut out).unwrap();
        out.into()
    }

    fn field<'r>(record: &'r Record, key: &str) -> &'r str {
        record[key].as_str().unwrap()
    }

    #[test]
    fn plain_literal_has_no_type() {
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "c" ."#, &mut state, &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(field(&records[0], "subject"), "a");
        assert_eq!(field(&records[0], "predicate"), "b");
        assert_eq!(field(&records[0], "object"), "c");
        assert!(records[0].get("type").is_none());
        assert_eq!(state, ParserState::ExpectingSubject);
    }

    #[test]
    fn typed_literal_carries_datatype() {
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "c"^^<http://x/int> ."#, &mut state, &[]);
        assert_eq!(field(&records[0], "object"), "c");
        assert_eq!(field(&records[0], "type"), "http://x/int");
    }

    #[test]
    fn prefixed_datatype_is_expanded() {
        let prefixes = vec![PrefixBinding {
            alias: "xsd:".into(),
            expansion: "http://www.w3.org/2001/XMLSchema#".into(),
        }];
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "1"^^xsd:int ."#, &mut state, &prefixes);
        assert_eq!(
            field(&records[0], "type"),
            "http://www.w3.org/2001/XMLSchema#int"
        );
    }

    #[test]
    fn tagged_literal_carries_tag() {
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "chat"@fr-CA ."#, &mut state, &[]);
        assert_eq!(field(&records[0], "object"), "chat");
        assert_eq!(field(&records[0], "type"), "fr-CA");
    }

    #[test]
    fn prefixed_name_matches_absolute_iri() {
        let mut state = ParserState::default();
        let prefixed = parse("a:Foo a:p a:Bar .", &mut state, &ex());
        let absolute = parse(
            "<http://ex.org/Foo> <http://ex.org/p> <http://ex.org/Bar> .",
            &mut state,
            &ex(),
        );
        assert_eq!(prefixed, absolute);
    }

    #[test]
    fn bracketed_iri_is_never_expanded() {
        let mut state = ParserState::default();
        let records = parse("<a:x> <b> <c> .", &mut state, &ex());
        assert_eq!(field(&records[0], "subject"), "a:x");
    }

    #[test]
    fn ambiguous_alias_is_left_literal() {
        let prefixes = vec![
            PrefixBinding {
                alias: "a:".into(),
                expansion: "http://one/".into(),
            },
            PrefixBinding {
                alias: "ba:".into(),
                expansion: "http://two/".into(),
            },
        ];
        assert_eq!(expand_name("ba:x", &prefixes), "ba:x");
        assert_eq!(expand_name("a:x", &prefixes), "http://one/x");
        assert_eq!(expand_name("zz:x", &prefixes), "zz:x");
    }

    #[test]
    fn continuation_inherits_subject() {
        let mut state = ParserState::default();
        let first = parse("<s> <p1> <o1> ;", &mut state, &[]);
        assert_eq!(
            state,
            ParserState::ExpectingContinuation {
                subject: "s".into()
            }
        );
        let second = parse("<p2> <o2> ;", &mut state, &[]);
        let third = parse("<p3> <o3> .", &mut state, &[]);
        assert_eq!(field(&first[0], "subject"), "s");
        assert_eq!(field(&second[0], "subject"), "s");
        assert_eq!(field(&third[0], "subject"), "s");
        assert_eq!(state, ParserState::ExpectingSubject);

        let fourth = parse("<t> <p> <o> .", &mut state, &[]);
        assert_eq!(field(&fourth[0], "subject"), "t");
    }

    #[test]
    fn two_statements_on_one_line() {
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "c" ; <d> "e" ."#, &mut state, &[]);
        assert_eq!(records.len(), 2);
        assert_eq!(field(&records[0], "subject"), "a");
        assert_eq!(field(&records[1], "subject"), "a");
        assert_eq!(field(&records[1], "predicate"), "d");
        assert_eq!(field(&records[1], "object"), "e");
    }

    #[test]
    fn glued_terminator_is_split_off() {
        let mut state = ParserState::default();
        let records = parse(r#"a:s a:p "v"@en;"#, &mut state, &ex());
        assert_eq!(field(&records[0], "type"), "en");
        let records = parse("a:q a:o.", &mut state, &ex());
        assert_eq!(field(&records[0], "object"), "http://ex.org/o");
        assert_eq!(state, ParserState::ExpectingSubject);
    }

    #[test]
    fn quoted_atoms_keep_spaces_and_escapes() {
        let mut state = ParserState::default();
        let records = parse(r#"<a> <b> "x \" ; y ." ."#, &mut state, &[]);
        assert_eq!(field(&records[0], "object"), r#"x \" ; y ."#);
    }

    #[test]
    fn wrong_token_count_reports_line() {
        let mut state = ParserState::default();
        let mut out = VecDeque::new();
        let err = parse_line("<a> <b> .", 7, &mut state, &[], &mut out).unwrap_err();
        match err {
            DecodeError::InvalidDocument { line, text, reason } => {
                assert_eq!(line, 7);
                assert_eq!(text, "<a> <b> .");
                assert!(reason.contains("found 3"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut state = ParserState::ExpectingContinuation {
            subject: "s".into(),
        };
        assert!(parse_line("<a> <b> <c> .", 8, &mut state, &[], &mut out).is_err());
    }

    #[test]
    fn unknown_terminator_is_invalid() {
        let mut state = ParserState::default();
        let mut out = VecDeque::new();
        assert!(parse_line("<a> <b> <c> , <d> .", 1, &mut state, &[], &mut out).is_err());
        assert!(parse_line("<a> <b> <c>", 2, &mut state, &[], &mut out).is_err());
    }

    #[test]
    fn prefix_lines() {
        assert_eq!(
            parse_prefix("@prefix foaf: <http://xmlns.com/foaf/0.1/> ."),
            Some(PrefixBinding {
                alias: "foaf:".into(),
                expansion: "http://xmlns.com/foaf/0.1/".into(),
            })
        );
        assert!(parse_prefix("<a> <b> <c> .").is_none());
        assert!(parse_prefix("@prefix broken").is_none());
    }
}
