//! Synthetic documents for comparing a failed result with its expectation.
//!
//! The document text travels inline in the URI
//! (`fcs-diff://<key>?_ts=<millis>&text=<text>`), so providing it needs no
//! state. The timestamp makes each URI unique, which stops hosts from
//! serving a cached document for a re-run test.

use url::Url;
use url::form_urlencoded;

use crate::comparator::Mismatch;

pub const DIFF_SCHEME: &str = "fcs-diff";

/// Left and right documents of one diff view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDocuments {
    pub title: String,
    pub expectation: Url,
    pub result: Url,
}

/// URI for a diff document holding `text`.
pub fn diff_uri(key: &str, text: &str) -> Result<Url, url::ParseError> {
    diff_uri_at(key, text, chrono::Utc::now().timestamp_millis())
}

fn diff_uri_at(key: &str, text: &str, millis: i64) -> Result<Url, url::ParseError> {
    // Form-encoding leaves only characters an opaque host accepts.
    let host: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
    let mut uri = Url::parse(&format!("{DIFF_SCHEME}://{host}"))?;
    uri.query_pairs_mut()
        .append_pair("_ts", &millis.to_string())
        .append_pair("text", text);
    Ok(uri)
}

/// The literal text carried by a diff URI; `None` for any other URI.
#[must_use]
pub fn provide_text(uri: &Url) -> Option<String> {
    if uri.scheme() != DIFF_SCHEME {
        return None;
    }
    uri.query_pairs()
        .find(|(name, _)| name == "text")
        .map(|(_, text)| text.into_owned())
}

/// Both sides of a failed assertion, keyed by the test's path.
pub fn diff_documents(key: &str, mismatch: &Mismatch) -> Result<DiffDocuments, url::ParseError> {
    Ok(DiffDocuments {
        title: format!("{key}: Expected ↔ Result"),
        expectation: diff_uri(&format!("{key}.expected"), &mismatch.expectation)?,
        result: diff_uri(&format!("{key}.result"), &mismatch.result)?,
    })
}
