//! Directory-style listings.
//!
//! A store listing comes back as two sets of full keys: common prefixes
//! (sub-directories) and contents (objects). [`Listing::from_store`] strips the
//! listing prefix, merges both sets into one de-duplicated, byte-wise sorted set
//! of names, and keeps a timestamp for the names that came from contents.
//! [`render`] turns that into an HTML page or a JSON array.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::config::ListingFormat;
use crate::error::{ProxyError, ProxyResult};
use crate::store::ListOutput;

/// Content type of HTML listings.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Content type of JSON listings.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry<'a> {
    /// Name relative to the listing prefix. Sub-directories end in `/`.
    pub name: &'a str,
    /// Last modification time; absent for sub-directories.
    pub last_modified: Option<DateTime<Utc>>,
}

/// De-duplicated, sorted listing relative to a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    names: BTreeSet<String>,
    updated_at: BTreeMap<String, DateTime<Utc>>,
}

impl Listing {
    /// Build a listing from a raw store listing under `prefix`.
    #[must_use]
    pub fn from_store(output: &ListOutput, prefix: &str) -> Self {
        let mut listing = Self::default();

        for common in &output.common_prefixes {
            if let Some(name) = relative_name(common, prefix) {
                listing.names.insert(name.to_owned());
            }
        }

        for object in &output.contents {
            let Some(name) = relative_name(&object.key, prefix) else {
                continue;
            };
            listing.names.insert(name.to_owned());
            if let Some(ts) = object.last_modified {
                listing.updated_at.insert(name.to_owned(), ts);
            }
        }

        listing
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the listing has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = ListingEntry<'_>> {
        self.names.iter().map(|name| ListingEntry {
            name,
            last_modified: self.updated_at.get(name).copied(),
        })
    }

    /// Render as an HTML unordered list.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut html = String::from("<!DOCTYPE html><html><body><ul>");
        for entry in self.entries() {
            let href = utf8_percent_encode(entry.name, HREF_ENCODE_SET);
            let name = escape_html(entry.name);
            // Writing to a String cannot fail.
            let _ = write!(html, "<li><a href=\"{href}\">{name}</a>");
            if let Some(ts) = entry.last_modified {
                html.push(' ');
                html.push_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            html.push_str("</li>");
        }
        html.push_str("</ul></body></html>");
        html
    }

    /// Render as a JSON array of names.
    pub fn to_json(&self) -> ProxyResult<String> {
        serde_json::to_string(&self.names)
            .map_err(|e| ProxyError::internal(format!("failed to encode listing: {e}")).with_source(e))
    }
}

/// Strip `prefix` from `key`. The directory marker itself (a key equal to the
/// prefix) yields `None`.
fn relative_name<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let name = key.strip_prefix(prefix).unwrap_or(key);
    (!name.is_empty()).then_some(name)
}

/// Characters escaped in listing links. Unreserved characters and the `/`
/// that marks a directory entry stay literal.
const HREF_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a store listing under `prefix` in `format`.
///
/// Returns the body (newline terminated) and its content type.
pub fn render(
    output: &ListOutput,
    prefix: &str,
    format: ListingFormat,
) -> ProxyResult<(String, &'static str)> {
    let listing = Listing::from_store(output, prefix);
    match format {
        ListingFormat::Html => Ok((listing.to_html() + "\n", HTML_CONTENT_TYPE)),
        ListingFormat::Json => Ok((listing.to_json()? + "\n", JSON_CONTENT_TYPE)),
    }
}
