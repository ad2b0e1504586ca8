//! Mail archive import.
//!
//! Reads RFC 5322 messages from `.eml` files and `.mbox` archives (or
//! directories of them, walked recursively) into [`Email`] records.
//!
//! MIME decoding (encoded-word subjects, transfer encodings, multipart
//! bodies) is delegated to `mail-parser`. The threading headers are read
//! from the raw, unfolded header block so ids are kept verbatim in their
//! `<...>` form.
//!
//! Email ids are UUID v5 over the `Message-ID` when present, otherwise over
//! the raw message bytes, so re-importing the same archive is idempotent.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use mail_parser::MessageParser;
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use inbox_lens_core::models::Email;
use inbox_lens_core::store::EmailStore;

use crate::config::Config;
use crate::engine::Session;
use crate::progress::ProgressMode;

fn angle_ids() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>\s]+>").expect("static regex"))
}

/// Split a raw message into its header block and body.
fn split_head_body(raw: &str) -> (&str, &str) {
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let lf = raw.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((i, sep)) => (&raw[..i], &raw[i + sep..]),
        None => (raw, ""),
    }
}

/// Parse a header block into `(name, value)` pairs.
///
/// Continuation lines (leading space or tab) are joined onto the previous
/// header with a single space. Names keep their original case.
///
/// ```rust
/// use inbox_lens::import::unfold_headers;
///
/// let headers = unfold_headers("Subject: hello\n\tworld\nFrom: a@b.c\n");
/// assert_eq!(headers[0], ("Subject".to_string(), "hello world".to_string()));
/// assert_eq!(headers[1].1, "a@b.c");
/// ```
pub fn unfold_headers(block: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                let cont = line.trim();
                if !cont.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(cont);
                }
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Every `<...>` token in a header value, space separated.
fn id_list(value: Option<&str>) -> String {
    value
        .map(|v| {
            angle_ids()
                .find_iter(v)
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

fn normalize_message_id(value: Option<&str>) -> String {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return String::new();
    };
    match angle_ids().find(value) {
        Some(m) => m.as_str().to_string(),
        None => format!("<{}>", value.trim_matches(|c| c == '<' || c == '>')),
    }
}

/// Bare address from a `From:` value such as `"Ann" <ann@example.com>`.
fn extract_address(value: &str) -> String {
    match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].trim().to_string(),
        _ => value.trim().to_string(),
    }
}

/// Parse one RFC 5322 message.
pub fn parse_message(raw: &[u8], mailbox: &str) -> Email {
    let text = String::from_utf8_lossy(raw);
    let (head, raw_body) = split_head_body(&text);
    let headers = unfold_headers(head);

    let message_id = normalize_message_id(header(&headers, "Message-ID"));
    let id_source: &[u8] = if message_id.is_empty() {
        raw
    } else {
        message_id.as_bytes()
    };
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, id_source).to_string();

    let is_html = header(&headers, "Content-Type")
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);

    let parsed = MessageParser::default().parse(raw);
    let (subject, from_address, body) = match &parsed {
        Some(msg) => {
            let subject = msg
                .subject()
                .map(str::to_string)
                .or_else(|| header(&headers, "Subject").map(str::to_string));
            let from = msg
                .from()
                .and_then(|f| f.first())
                .and_then(|a| a.address())
                .map(str::to_string);
            let body = if is_html {
                msg.body_html(0).map(|b| b.into_owned())
            } else {
                msg.body_text(0).map(|b| b.into_owned())
            };
            (subject, from, body)
        }
        None => (None, None, None),
    };

    let from_address = from_address
        .or_else(|| header(&headers, "From").map(extract_address))
        .unwrap_or_default();
    let body = body.or_else(|| {
        let trimmed = raw_body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Email {
        id,
        subject: subject
            .or_else(|| header(&headers, "Subject").map(str::to_string))
            .unwrap_or_default(),
        body,
        body_is_html: is_html,
        date: header(&headers, "Date").map(str::to_string),
        from_address,
        message_id,
        in_reply_to: id_list(header(&headers, "In-Reply-To")),
        references: id_list(header(&headers, "References")),
        mailbox: mailbox.to_string(),
    }
}

/// Split an mbox archive into raw messages.
///
/// A message starts at a `From ` separator line that opens the file or
/// follows a blank line. The separator itself is dropped and `>From ` quoting
/// in bodies is undone.
pub fn split_mbox(archive: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current: Option<String> = None;
    let mut prev_blank = true;

    for line in archive.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\r', '\n']);
        if bare.starts_with("From ") && prev_blank {
            if let Some(done) = current.take() {
                messages.push(done);
            }
            current = Some(String::new());
            prev_blank = false;
            continue;
        }
        prev_blank = bare.is_empty();
        if let Some(msg) = current.as_mut() {
            match line.strip_prefix('>') {
                Some(rest) if rest.trim_start_matches('>').starts_with("From ") => {
                    msg.push_str(rest)
                }
                _ => msg.push_str(line),
            }
        }
    }
    if let Some(done) = current {
        messages.push(done);
    }
    messages
        .into_iter()
        .map(|m| m.trim_end().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

fn is_mbox(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mbox"))
        .unwrap_or(false)
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("eml"))
        .unwrap_or(false)
}

fn default_mailbox(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("inbox")
        .to_string()
}

/// Load every message in one file.
pub fn load_file(path: &Path, mailbox: Option<&str>) -> Result<Vec<Email>> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mailbox = mailbox
        .map(str::to_string)
        .unwrap_or_else(|| default_mailbox(path));

    if is_mbox(path) {
        let text = String::from_utf8_lossy(&raw);
        Ok(split_mbox(&text)
            .iter()
            .map(|m| parse_message(m.as_bytes(), &mailbox))
            .collect())
    } else {
        Ok(vec![parse_message(&raw, &mailbox)])
    }
}

/// Files to import under `path`: the file itself, or every `.eml`/`.mbox`
/// below a directory in sorted order.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        let p = entry.path();
        if entry.file_type().is_file() && (is_eml(p) || is_mbox(p)) {
            files.push(p.to_path_buf());
        }
    }
    Ok(files)
}

/// `lens import <paths…>`
pub async fn run_import(
    config: &Config,
    paths: &[PathBuf],
    mailbox: Option<&str>,
    mode: ProgressMode,
) -> Result<()> {
    let mut emails = Vec::new();
    let mut files = 0usize;
    for path in paths {
        for file in discover(path)? {
            match load_file(&file, mailbox) {
                Ok(batch) => {
                    debug!(file = %file.display(), messages = batch.len(), "parsed");
                    files += 1;
                    emails.extend(batch);
                }
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable file"),
            }
        }
    }

    let session = Session::open(config, mode, false).await?;
    let result = session.engine.import(&emails).await;
    let total = session.engine.store().count_emails().await;
    session.finish().await;
    let imported = result?;

    println!("import");
    println!("  files: {}", files);
    println!("  messages: {}", imported);
    println!("  total emails: {}", total?);
    Ok(())
}
