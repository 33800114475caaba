// SPDX-License-Identifier: Apache-2.0

//! Query Tagger
//!
//! Recognizes island-prefixed query text such as `bdrel(select ...)` or
//! `bdcast(bdarray(scan(a)), a_rel, '(i bigint, v double)', relational)`.
//! Parsing is positional: the tag must open the text and the matching
//! close (optionally followed by `;`) must end it.

use std::sync::LazyLock;

use polystore_core::Scope;
use regex::Regex;

use super::types::{CastSpec, TaggedQuery};
use crate::error::{IslandError, IslandResult};

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(bdrel|bdarray|bdkv|bdtext|bdgraph|bddoc|bdstream|bdmyria|bdcast)\s*\(")
        .expect("tag pattern")
});
static CLOSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\)\s*;?\s*$").expect("closing pattern"));
static OBJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_@0-9a-zA-Z.]+$").expect("object name pattern"));

/// Scope named by the outermost tag.
pub fn tag_scope(query: &str) -> IslandResult<Scope> {
    let caps = TAG
        .captures(query)
        .ok_or_else(|| IslandError::unrecognized_tag(query))?;
    Scope::from_tag(&caps[1]).ok_or_else(|| IslandError::unrecognized_tag(query))
}

/// Parses a tagged query into its scope and inner text, or a cast.
pub fn parse(query: &str) -> IslandResult<TaggedQuery> {
    let caps = TAG
        .captures(query)
        .ok_or_else(|| IslandError::unrecognized_tag(query))?;
    let scope = Scope::from_tag(&caps[1]).ok_or_else(|| IslandError::unrecognized_tag(query))?;
    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);

    let closing = CLOSING
        .find_at(query, body_start)
        .ok_or_else(|| IslandError::malformed(format!("{} query is not closed", scope.tag())))?;
    let body = query[body_start..closing.start()].trim();
    if body.is_empty() {
        return Err(IslandError::malformed(format!("empty {} query", scope.tag())));
    }

    match scope {
        Scope::Cast => parse_cast(body).map(TaggedQuery::Cast),
        _ => Ok(TaggedQuery::Island {
            scope,
            body: body.to_string(),
        }),
    }
}

/// Splits on commas outside quotes and brackets.
fn split_top_level(body: &str) -> IslandResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => {
                depth -= 1;
                if depth < 0 {
                    return Err(IslandError::malformed("unbalanced brackets in cast"));
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(body[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(IslandError::malformed("unterminated quote or bracket in cast"));
    }
    parts.push(body[start..].trim());
    Ok(parts)
}

fn unquote(arg: &str) -> Option<&str> {
    let bytes = arg.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(b'\''), Some(b'\'')) | (Some(b'"'), Some(b'"')) if arg.len() >= 2 => {
            Some(&arg[1..arg.len() - 1])
        }
        _ => None,
    }
}

/// Parses the body of a `bdcast(...)`.
pub fn parse_cast(body: &str) -> IslandResult<CastSpec> {
    let args = split_top_level(body)?;
    let (inner, rest) = match args.split_first() {
        Some((inner, rest)) if !inner.is_empty() && !rest.is_empty() => (*inner, rest),
        _ => {
            return Err(IslandError::malformed(
                "cast needs an inner query and a destination island",
            ))
        }
    };
    let (destination, middle) = match rest.split_last() {
        Some((destination, middle)) => (*destination, middle),
        None => return Err(IslandError::malformed("cast names no destination island")),
    };

    let destination = Scope::from_keyword(destination)
        .filter(|scope| *scope != Scope::Cast)
        .ok_or_else(|| {
            IslandError::malformed(format!("unknown cast destination '{}'", destination))
        })?;
    let inner_scope = tag_scope(inner)?;

    let mut namespace = None;
    let mut object = None;
    let mut ddl = None;
    for arg in middle {
        match (unquote(arg), object.is_some()) {
            (Some(text), false) if namespace.is_none() => namespace = Some(text.to_string()),
            (Some(text), _) if ddl.is_none() => ddl = Some(text.to_string()),
            (None, false) if OBJECT_NAME.is_match(arg) => object = Some(arg.to_string()),
            _ => {
                return Err(IslandError::malformed(format!(
                    "unexpected cast argument '{}'",
                    arg
                )))
            }
        }
    }

    // A lone quoted clause with no object name is the schema clause.
    if object.is_none() && ddl.is_none() {
        ddl = namespace.take();
    }

    Ok(CastSpec {
        inner: inner.to_string(),
        inner_scope,
        destination,
        namespace,
        object,
        ddl,
    })
}
