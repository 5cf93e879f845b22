// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Message templates for notify sinks.
//!
//! Understands the Go text/template subset people put in notification
//! configs: field access on `.PID`, `.Logline`, `.Timestamp`, `.Matches`
//! and `.Env`, plus `index` on `.Matches` and `.Env`. Control actions
//! (`if`, `range`, `with` and friends) are rejected with
//! [`TemplateError::Unsupported`].

use std::collections::HashMap;

use crate::errors::TemplateError;

const NO_VALUE: &str = "<no value>";

const CONTROL_ACTIONS: [&str; 8] = [
    "if", "else", "end", "range", "with", "define", "template", "block",
];

/// Values a template can reference.
pub struct TemplateData<'a> {
    pub pid: u32,
    pub logline: &'a str,
    pub timestamp: &'a str,
    pub matches: &'a [String],
    pub env: &'a HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(Vec<String>),
    Index { field: String, key: Key },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Int(usize),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut nodes = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            let mut text = &rest[..open];
            let mut body_start = open + 2;
            if rest[body_start..].starts_with("- ") {
                text = text.trim_end();
                body_start += 2;
            }
            push_text(&mut nodes, text);

            let close = rest[body_start..]
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + open))?
                + body_start;
            let mut body = &rest[body_start..close];
            let mut trim_after = false;
            if let Some(stripped) = body.strip_suffix(" -") {
                body = stripped;
                trim_after = true;
            }
            nodes.push(parse_action(body.trim())?);

            offset += close + 2;
            rest = &rest[close + 2..];
            if trim_after {
                let trimmed = rest.trim_start();
                offset += rest.len() - trimmed.len();
                rest = trimmed;
            }
        }
        push_text(&mut nodes, rest);
        Ok(Self { nodes })
    }

    pub fn render(&self, data: &TemplateData<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Field(path) => out.push_str(&resolve_field(path, data)?),
                Node::Index { field, key } => out.push_str(&resolve_index(field, key, data)?),
            }
        }
        Ok(out)
    }
}

/// Parse and render in one go.
pub fn render(source: &str, data: &TemplateData<'_>) -> Result<String, TemplateError> {
    Template::parse(source)?.render(data)
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn parse_action(body: &str) -> Result<Node, TemplateError> {
    if body.is_empty() {
        return Err(TemplateError::EmptyAction);
    }
    if body.starts_with("/*") {
        return Ok(Node::Text(String::new()));
    }
    if body.starts_with('.') {
        if body.contains(char::is_whitespace) {
            return Err(TemplateError::Malformed(body.to_string()));
        }
        return parse_field(body).map(Node::Field);
    }

    let keyword = body.split_whitespace().next().unwrap_or_default();
    if CONTROL_ACTIONS.contains(&keyword) {
        return Err(TemplateError::Unsupported(keyword.to_string()));
    }

    let mut words = split_words(body)?.into_iter();
    let func = words.next().unwrap_or_default();
    if func != "index" {
        return Err(TemplateError::UnknownFunction(func));
    }
    let (Some(target), Some(raw_key), None) = (words.next(), words.next(), words.next()) else {
        return Err(TemplateError::Malformed(body.to_string()));
    };
    let path = parse_field(&target)?;
    let [field] = path.as_slice() else {
        return Err(TemplateError::Malformed(body.to_string()));
    };
    let key = parse_key(&raw_key)?;
    Ok(Node::Index {
        field: field.clone(),
        key,
    })
}

fn parse_field(expr: &str) -> Result<Vec<String>, TemplateError> {
    let path: Vec<String> = expr
        .strip_prefix('.')
        .ok_or_else(|| TemplateError::Malformed(expr.to_string()))?
        .split('.')
        .map(str::to_string)
        .collect();
    if path.iter().any(String::is_empty) {
        return Err(TemplateError::Malformed(expr.to_string()));
    }
    Ok(path)
}

fn parse_key(raw: &str) -> Result<Key, TemplateError> {
    if let Some(quoted) = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
    {
        return Ok(Key::Str(quoted.replace("\\\"", "\"")));
    }
    raw.parse::<usize>()
        .map(Key::Int)
        .map_err(|_| TemplateError::Malformed(raw.to_string()))
}

/// Whitespace split that keeps quoted strings together.
fn split_words(body: &str) -> Result<Vec<String>, TemplateError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in body.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '`' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None if c == '|' => return Err(TemplateError::Malformed(body.to_string())),
            None => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(TemplateError::Malformed(body.to_string()));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

fn resolve_field(path: &[String], data: &TemplateData<'_>) -> Result<String, TemplateError> {
    let (head, tail) = match path {
        [head, tail @ ..] => (head.as_str(), tail),
        [] => return Err(TemplateError::EmptyAction),
    };
    match (head, tail) {
        ("PID", []) => Ok(data.pid.to_string()),
        ("Logline", []) => Ok(data.logline.to_string()),
        ("Timestamp", []) => Ok(data.timestamp.to_string()),
        ("Matches", []) => Ok(format!("[{}]", data.matches.join(" "))),
        ("Env", []) => Ok(format_env(data.env)),
        ("Env", [key]) => Ok(data
            .env
            .get(key)
            .cloned()
            .unwrap_or_else(|| NO_VALUE.to_string())),
        _ => Err(TemplateError::UnknownField(path.join("."))),
    }
}

fn resolve_index(field: &str, key: &Key, data: &TemplateData<'_>) -> Result<String, TemplateError> {
    match (field, key) {
        ("Matches", Key::Int(i)) => data
            .matches
            .get(*i)
            .cloned()
            .ok_or(TemplateError::IndexOutOfRange(*i)),
        ("Env", Key::Str(name)) => Ok(data.env.get(name).cloned().unwrap_or_default()),
        ("Matches" | "Env", _) => Err(TemplateError::Malformed(format!("index .{field}"))),
        _ => Err(TemplateError::UnknownField(field.to_string())),
    }
}

fn format_env(env: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = env.iter().collect();
    pairs.sort();
    let body: Vec<String> = pairs.into_iter().map(|(k, v)| format!("{k}:{v}")).collect();
    format!("map[{}]", body.join(" "))
}
