//! Structural extraction from the mail view markup
//!
//! The mail view has no API; entries and tokens are pulled out of rendered
//! HTML by fixed patterns. Markup changes break this. The correlator only
//! depends on [`MailboxMarkup`], so a real parser can replace [`HtmlMarkup`]
//! without touching the polling logic.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use storefront_common::{MailboxEntry, ResetToken};

use crate::error::{E2eError, E2eResult};

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"inbox-email-item-(\d+)").expect("valid item pattern"));

static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-testid="inbox-email-subject(?:-\d+)?"[^>]*>\s*([^<]*?)\s*<"#)
        .expect("valid subject pattern")
});

static TIME_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<time[^>]*\bdatetime="([^"]+)""#).expect("valid datetime pattern")
});

static TIME_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-testid="inbox-email-(?:time|date)(?:-\d+)?"[^>]*>\s*([^<]*?)\s*<"#)
        .expect("valid time pattern")
});

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/reset-password/([a-fA-F0-9]{32,128})\b").expect("valid token pattern")
});

/// Naive layouts the mail view is known to render, tried in order
const RENDERED_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y, %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

pub trait MailboxMarkup: Send + Sync {
    /// Entries visible in a listing page, in page order
    fn extract_summaries(&self, html: &str) -> Vec<MailboxEntry>;

    /// Reset token from a message detail page
    fn extract_token(&self, html: &str) -> Option<ResetToken>;
}

/// Regex-based extraction for the storefront mail view
#[derive(Debug, Clone)]
pub struct HtmlMarkup {
    /// Offset of timestamps rendered without zone information
    render_offset: FixedOffset,
}

impl HtmlMarkup {
    /// Fails for offsets that are not a valid whole-hour zone offset
    pub fn new(render_utc_offset_hours: i32) -> E2eResult<Self> {
        let render_offset = render_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                E2eError::Config(storefront_common::Error::InvalidConfig(format!(
                    "render offset out of range: {render_utc_offset_hours} h"
                )))
            })?;
        Ok(Self { render_offset })
    }

    pub fn render_offset(&self) -> FixedOffset {
        self.render_offset
    }

    /// Parse a rendered timestamp into UTC
    pub fn parse_rendered_time(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(explicit) = DateTime::parse_from_rfc3339(text) {
            return Some(explicit.with_timezone(&Utc));
        }
        RENDERED_TIME_FORMATS.iter().find_map(|format| {
            let naive = NaiveDateTime::parse_from_str(text, format).ok()?;
            self.render_offset
                .from_local_datetime(&naive)
                .single()
                .map(|local| local.with_timezone(&Utc))
        })
    }

    fn entry_from_block(&self, id: u64, block: &str) -> MailboxEntry {
        let subject = SUBJECT_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()))
            .unwrap_or_default();

        let received_at = TIME_ATTR_RE
            .captures(block)
            .or_else(|| TIME_TEXT_RE.captures(block))
            .and_then(|c| c.get(1))
            .and_then(|m| self.parse_rendered_time(&decode_entities(m.as_str())));

        MailboxEntry {
            id,
            subject,
            received_at,
        }
    }
}

impl MailboxMarkup for HtmlMarkup {
    fn extract_summaries(&self, html: &str) -> Vec<MailboxEntry> {
        // An item's id may repeat inside its own block; a block runs until
        // the next different id.
        let mut starts: Vec<(u64, usize)> = Vec::new();
        for caps in ITEM_RE.captures_iter(html) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Ok(id) = id.as_str().parse::<u64>() else {
                continue;
            };
            if starts.last().map(|(last, _)| *last) != Some(id) {
                starts.push((id, whole.start()));
            }
        }

        starts
            .iter()
            .enumerate()
            .map(|(i, (id, start))| {
                let end = starts.get(i + 1).map_or(html.len(), |(_, next)| *next);
                self.entry_from_block(*id, &html[*start..end])
            })
            .collect()
    }

    fn extract_token(&self, html: &str) -> Option<ResetToken> {
        TOKEN_RE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| ResetToken::new(m.as_str()))
    }
}

/// Id of the first entry in a listing page
pub fn extract_first_email_id(html: &str) -> Option<u64> {
    ITEM_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
