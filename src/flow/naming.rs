use std::sync::LazyLock;

use regex::Regex;

use crate::descriptor::ClassDescriptor;

/// Trailing qualifiers dropped from message names when deriving a flow name.
const QUALIFIERS: &[&str] = &["Command", "Query"];

/// Split an identifier on casing boundaries: lower -> upper, acronym -> word, and
/// letter <-> digit. Underscores and other separators also split.
///
/// `GetContributorByIdQuery` -> `[Get, Contributor, By, Id, Query]`,
/// `HTTPRequest2Command` -> `[HTTP, Request, 2, Command]`.
pub fn split_words(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_ascii_digit())
                || (prev.is_ascii_digit() && c.is_alphabetic())
                || (prev.is_uppercase() && c.is_uppercase() && next.is_some_and(|n| n.is_lowercase()));
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Human-readable flow name from a message type name.
///
/// `CreateContributorCommand` -> `Create Contributor`,
/// `GetContributorByIdQuery` -> `Get Contributor By Id`. An identifier without a
/// trailing `Command`/`Query` word is returned unchanged. Never fails.
pub fn derive_flow_name(message_name: &str) -> String {
    let mut words = split_words(message_name);
    let qualified = words.len() > 1 && words.last().is_some_and(|w| QUALIFIERS.contains(&w.as_str()));
    if !qualified {
        return message_name.to_owned();
    }
    words.pop();
    words
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// URL-safe identifier: lowercase words joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ---------------------------------------------------------------------------
// Entry derivation
// ---------------------------------------------------------------------------

/// How a flow is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub verb: Option<String>,
    pub route: Option<String>,
    /// `POST /api/Contributors`, or the trigger name for non-HTTP entry points.
    pub label: String,
}

static HTTP_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:Http)?(Get|Post|Put|Delete|Patch)\s*(?:\(\s*"?([^")]*)"?\s*\))?\s*$"#)
        .unwrap_or_else(|e| panic!("invalid http attribute regex: {e}"))
});

static ROUTE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*Route\s*\(\s*"([^"]*)"\s*\)\s*$"#)
        .unwrap_or_else(|e| panic!("invalid route attribute regex: {e}"))
});

/// Guess the HTTP verb from the flow name and whether the message is a query.
pub fn guess_verb(flow_name: &str, is_query: bool) -> &'static str {
    if is_query {
        return "GET";
    }
    let lower = flow_name.to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
    if starts(&["create", "add", "register"]) {
        "POST"
    } else if starts(&["update", "edit", "modify"]) {
        "PUT"
    } else if starts(&["delete", "remove"]) {
        "DELETE"
    } else if starts(&["list", "get", "find"]) {
        "GET"
    } else {
        "POST"
    }
}

/// `/api/<last word of the flow name, pluralised>`.
pub fn guess_route(flow_name: &str) -> String {
    match flow_name.split_whitespace().last() {
        Some(word) if word.ends_with('s') => format!("/api/{word}"),
        Some(word) => format!("/api/{word}s"),
        None => "/api".to_owned(),
    }
}

/// Entry descriptor for a flow started at `entry`.
///
/// `Http<Verb>(route)` and `Route(route)` attributes win; an HTTP-shaped entry point
/// (endpoint or controller base, `ApiController`) without them gets a guessed verb and
/// route; anything else is labelled with its trigger name.
pub fn derive_entry(entry: &ClassDescriptor, flow_name: &str, is_query: bool) -> Entry {
    let mut verb: Option<String> = None;
    let mut route: Option<String> = None;
    for attr in &entry.attributes {
        if let Some(caps) = HTTP_ATTR.captures(attr) {
            verb.get_or_insert_with(|| caps[1].to_uppercase());
            if let Some(r) = caps.get(2).map(|m| m.as_str().trim()).filter(|r| !r.is_empty()) {
                route.get_or_insert_with(|| r.to_owned());
            }
        } else if let Some(caps) = ROUTE_ATTR.captures(attr) {
            route.get_or_insert_with(|| caps[1].to_owned());
        }
    }

    let http_shaped = verb.is_some()
        || route.is_some()
        || entry
            .base_types
            .iter()
            .any(|b| b.contains("Endpoint") || b.contains("Controller"))
        || entry.attributes.iter().any(|a| a.contains("ApiController"));

    if !http_shaped {
        return Entry {
            verb: None,
            route: None,
            label: entry.name.clone(),
        };
    }

    let verb = verb.unwrap_or_else(|| guess_verb(flow_name, is_query).to_owned());
    let route = route.unwrap_or_else(|| guess_route(flow_name));
    Entry {
        label: format!("{verb} {route}"),
        verb: Some(verb),
        route: Some(route),
    }
}
