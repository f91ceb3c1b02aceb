//! Payload validation and free-text sanitization.
//!
//! Lengths are measured in Unicode scalar values, so an emoji counts as one
//! character. Validation runs on the raw input; sanitization runs afterwards
//! and its result is what gets stored and broadcast.

use retro_types::{CreateColumnPayload, CreateThreadPayload, CreateTilePayload, UpdateColumnPayload};
use thiserror::Error;

pub const MAX_TILE_CONTENT_LENGTH: usize = 1000;
pub const MAX_COLUMN_TITLE_LENGTH: usize = 100;
pub const MAX_AUTHOR_NAME_LENGTH: usize = 50;
pub const MAX_THREAD_CONTENT_LENGTH: usize = 500;

/// A rejected payload. `Display` is the exact message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("board already has the maximum of {0} columns")]
    TooManyColumns(usize),

    #[error("column already has the maximum of {0} tiles")]
    TooManyTiles(usize),
}

/// Sanitized fields for a new tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInput {
    pub column_id: String,
    pub content: String,
    pub author: String,
}

/// Sanitized fields for a new thread reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadInput {
    pub tile_id: String,
    pub content: String,
    pub author: String,
}

pub fn char_count(s: &str) -> usize {
    s.chars().count()
}

fn require_id(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

fn require_text(value: &str, field: &'static str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    check_length(value, field, max)
}

fn check_length(value: &str, field: &'static str, max: usize) -> Result<(), ValidationError> {
    if char_count(value) > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_create_tile(payload: &CreateTilePayload) -> Result<TileInput, ValidationError> {
    require_id(&payload.column_id, "column ID")?;
    require_text(&payload.content, "tile content", MAX_TILE_CONTENT_LENGTH)?;
    let author = payload.author.as_deref().unwrap_or_default();
    check_length(author, "author name", MAX_AUTHOR_NAME_LENGTH)?;

    Ok(TileInput {
        column_id: payload.column_id.clone(),
        content: sanitize(&payload.content),
        author: sanitize(author),
    })
}

pub fn validate_create_thread(payload: &CreateThreadPayload) -> Result<ThreadInput, ValidationError> {
    require_id(&payload.tile_id, "tile ID")?;
    require_text(&payload.content, "thread content", MAX_THREAD_CONTENT_LENGTH)?;
    let author = payload.author.as_deref().unwrap_or_default();
    check_length(author, "author name", MAX_AUTHOR_NAME_LENGTH)?;

    Ok(ThreadInput {
        tile_id: payload.tile_id.clone(),
        content: sanitize(&payload.content),
        author: sanitize(author),
    })
}

/// Returns the sanitized title.
pub fn validate_create_column(payload: &CreateColumnPayload) -> Result<String, ValidationError> {
    require_text(&payload.title, "column title", MAX_COLUMN_TITLE_LENGTH)?;
    Ok(sanitize(&payload.title))
}

/// Returns the sanitized title.
pub fn validate_update_column(payload: &UpdateColumnPayload) -> Result<String, ValidationError> {
    require_id(&payload.column_id, "column ID")?;
    require_text(&payload.title, "column title", MAX_COLUMN_TITLE_LENGTH)?;
    Ok(sanitize(&payload.title))
}

pub fn validate_column_id(column_id: &str) -> Result<(), ValidationError> {
    require_id(column_id, "column ID")
}

/// Normalize whitespace and HTML-escape user text.
///
/// Trims the whole string and every line, collapses runs of spaces, keeps at
/// most one blank line between paragraphs, then escapes `& < > ' "`.
pub fn sanitize(input: &str) -> String {
    let mut text = input
        .trim()
        .split('\n')
        .map(|line| collapse_spaces(line.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }

    escape_html(&text)
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev_space = false;
    for ch in line.chars() {
        if ch == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(ch);
    }
    out
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(ch),
        }
    }
    out
}
