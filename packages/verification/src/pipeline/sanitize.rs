//! Markup stripping, text normalization, and publication date detection.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

/// Elements whose content is never part of the readable text.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head", "nav", "header",
    "footer", "aside", "form", "button",
];

static DROPPED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DROPPED_ELEMENTS
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).ok())
        .collect()
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static MAIN_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(article|main)\b[^>]*>(.*)</(?:article|main)\s*>").expect("valid regex")
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|article|main|blockquote|pre|figcaption)\b[^>]*>",
    )
    .expect("valid regex")
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex"));

static META_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+(?:property|name|itemprop)\s*=\s*["'](?:article:published_time|og:published_time|datepublished|date|pubdate|publish-date|publication_date|dc\.date|dc\.date\.issued)["'][^>]*\bcontent\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid regex")
});

static META_DATE_REVERSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+\bcontent\s*=\s*["']([^"']+)["'][^>]*(?:property|name|itemprop)\s*=\s*["'](?:article:published_time|og:published_time|datepublished|date|pubdate|publish-date|publication_date|dc\.date|dc\.date\.issued)["']"#,
    )
    .expect("valid regex")
});

static JSON_LD_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""datePublished"\s*:\s*"([^"]+)""#).expect("valid regex")
});

static TIME_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<time[^>]*\bdatetime\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"));

static DATE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{4}-\d{2}-\d{2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}|\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{4}|(?:in|since|by|until|during)\s+(?:19|20)\d{2})\b",
    )
    .expect("valid regex")
});

/// Reduce markup or raw text to plain readable text.
///
/// Comments and non-content elements are dropped, `<article>`/`<main>` is
/// preferred when present, block elements become line breaks, entities are
/// decoded and whitespace is collapsed. Text without markup passes through
/// with only whitespace and control character cleanup.
pub fn sanitize(input: &str) -> String {
    let mut text = COMMENT.replace_all(input, " ").into_owned();
    for pattern in DROPPED.iter() {
        text = pattern.replace_all(&text, " ").into_owned();
    }

    if let Some(main) = MAIN_CONTENT.captures(&text).and_then(|c| c.get(2)) {
        let inner = main.as_str();
        if !ANY_TAG.replace_all(inner, "").trim().is_empty() {
            text = inner.to_string();
        }
    }

    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    normalize_whitespace(&text)
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('-'),
                    "mdash" => Some('-'),
                    "hellip" => Some('…'),
                    "rsquo" | "lsquo" => Some('\''),
                    "rdquo" | "ldquo" => Some('"'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line
            .split(|c: char| c.is_whitespace() || c.is_control())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

/// Publication date declared by an HTML document, if any.
///
/// Checks article meta tags, then JSON-LD `datePublished`, then the first
/// `<time datetime>` element.
pub fn published_date(html: &str) -> Option<NaiveDate> {
    [&*META_DATE, &*META_DATE_REVERSED, &*JSON_LD_DATE, &*TIME_ELEMENT]
        .iter()
        .filter_map(|pattern| pattern.captures(html))
        .filter_map(|caps| caps.get(1).and_then(|m| parse_date(m.as_str())))
        .next()
}

/// Parse the date portion of ISO 8601, RFC 3339 or RFC 2822/HTTP dates.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }
    let caps = ISO_DATE.captures(value)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

/// Whether a sentence mentions a date or a year in temporal context.
pub fn mentions_date(sentence: &str) -> bool {
    DATE_MENTION.is_match(sentence)
}

/// Split plain text into sentences, keeping terminal punctuation.
///
/// Line breaks always end a sentence; `.`, `!` and `?` end one when
/// followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for line in text.lines() {
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            current.push(c);
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary {
                push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        push_sentence(&mut sentences, &current);
    }

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
