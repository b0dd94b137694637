// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Extraction query templates.
//!
//! Templates are plain SQL with three kinds of token:
//!
//! - `{since}`: the watermark, bound as an integer (epoch millis)
//! - `{param:NAME}`: a named literal from configuration, bound as text
//! - `{exclusion}`: `AND <column> NOT IN (…)` over the configured denylist,
//!   or nothing when the denylist is empty
//!
//! A literal brace is written doubled: `'{{a}}'` renders as `'{a}'`.
//!
//! Rendering turns every token into dialect placeholders and returns the
//! binds in statement order, so no configured value is ever spliced into SQL.

use std::collections::BTreeMap;

use crate::entity::Value;
use crate::error::SyncError;
use crate::storage::Dialect;

/// Inputs for one render.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub since: i64,
    pub params: &'a BTreeMap<String, String>,
    /// Column and IDs for the `{exclusion}` token.
    pub exclusion: Option<(&'a str, &'a [i64])>,
}

/// SQL ready to execute plus its binds.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub binds: Vec<Value>,
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'t> {
    Since,
    Exclusion,
    Param(&'t str),
}

fn parse_token(raw: &str) -> Result<Token<'_>, SyncError> {
    match raw.trim() {
        "since" => Ok(Token::Since),
        "exclusion" => Ok(Token::Exclusion),
        other => match other.strip_prefix("param:") {
            Some(name) if !name.trim().is_empty() => Ok(Token::Param(name.trim())),
            _ => Err(SyncError::Config(format!("unknown template token '{{{}}}'", raw))),
        },
    }
}

/// Check a template without rendering it: tokens must parse and `{since}`
/// must appear, otherwise every run would re-read the full history.
pub fn validate(template: &str, params: &BTreeMap<String, String>) -> Result<(), SyncError> {
    let mut saw_since = false;
    for segment in segments(template)? {
        let Segment::Token(raw) = segment else { continue };
        match parse_token(raw)? {
            Token::Since => saw_since = true,
            Token::Param(name) if !params.contains_key(name) => {
                return Err(SyncError::Config(format!("no value configured for param '{}'", name)));
            }
            _ => {}
        }
    }
    if saw_since {
        Ok(())
    } else {
        Err(SyncError::Config("extraction query has no {since} predicate".into()))
    }
}

/// A template split into literal SQL and raw token bodies.
#[derive(Debug, PartialEq, Eq)]
enum Segment<'t> {
    Text(&'t str),
    Token(&'t str),
}

/// `{{` and `}}` stand for literal braces; any other `{` opens a token.
fn segments(template: &str) -> Result<Vec<Segment<'_>>, SyncError> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        if pos > 0 {
            found.push(Segment::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            found.push(Segment::Text(&tail[..1]));
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            found.push(Segment::Text("}"));
            rest = &tail[1..];
        } else {
            let after = &tail[1..];
            let close = after
                .find('}')
                .ok_or_else(|| SyncError::Config("unterminated template token".into()))?;
            found.push(Segment::Token(&after[..close]));
            rest = &after[close + 1..];
        }
    }
    if !rest.is_empty() {
        found.push(Segment::Text(rest));
    }
    Ok(found)
}

pub fn render(
    template: &str,
    dialect: Dialect,
    ctx: &TemplateContext<'_>,
) -> Result<RenderedQuery, SyncError> {
    let mut placeholders = dialect.placeholders();
    let mut sql = String::with_capacity(template.len() + 32);
    let mut binds = Vec::new();

    for segment in segments(template)? {
        let raw = match segment {
            Segment::Text(text) => {
                sql.push_str(text);
                continue;
            }
            Segment::Token(raw) => raw,
        };

        match parse_token(raw)? {
            Token::Since => {
                sql.push_str(&placeholders.next());
                binds.push(Value::Int(ctx.since));
            }
            Token::Param(name) => {
                let value = ctx.params.get(name).ok_or_else(|| {
                    SyncError::Config(format!("no value configured for param '{}'", name))
                })?;
                sql.push_str(&placeholders.next());
                binds.push(Value::Text(value.clone()));
            }
            Token::Exclusion => {
                if let Some((column, ids)) = ctx.exclusion {
                    if !ids.is_empty() {
                        sql.push_str(&format!(
                            "AND {} NOT IN ({})",
                            column,
                            placeholders.list(ids.len())
                        ));
                        binds.extend(ids.iter().copied().map(Value::Int));
                    }
                }
            }
        }
    }

    Ok(RenderedQuery { sql, binds })
}
