//! Review metadata client for the Gerrit REST API.
//!
//! Batches change-status lookups under the server's cap on OR'd query
//! clauses per request, fanning the batches out across threads and joining
//! them before results merge. The single-query/multi-query response-shape
//! asymmetry is a server quirk and is normalized here; no caller sees it.

mod auth;
mod types;

pub use auth::{Credential, GerritAuth, find_cookie, parse_netrc, resolve_origin};
pub use types::{ApprovalInfo, ChangeInfo, LabelInfo};

use crate::error::{Result, RevuError};
use crate::session::Session;
use std::time::Duration;

/// The Gerrit server imposes a limit of at most 10 `q=` clauses per
/// query request.
pub const MAX_QUERY_TERMS: usize = 10;

/// Fixed timeout for each HTTP call. There is no cancellation once a
/// request is issued; this bound is the only limit.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one Gerrit server, constructed once per process.
pub struct GerritClient {
    pub auth: GerritAuth,
    http: reqwest::blocking::Client,
}

impl GerritClient {
    /// Discover the endpoint and credentials and build the client.
    pub fn new(session: &Session) -> Result<Self> {
        let auth = GerritAuth::discover(session)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| RevuError::GerritError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { auth, http })
    }

    /// The unambiguous change identifier for a commit's change on this
    /// server: `project~upstreambranch~Ihex...`.
    pub fn full_change_id(&self, upstream: &str, change_id: &str) -> String {
        format!(
            "{}~{}~{}",
            self.auth.project,
            upstream.trim_start_matches("origin/"),
            change_id
        )
    }

    /// Fetch review records for every identifier, preserving positions.
    ///
    /// `None` entries (commits without a change identifier) are sent as a
    /// sentinel query that cannot match anything server-side, so the
    /// output stays positionally aligned with the input. Identifiers are
    /// partitioned into groups of at most [`MAX_QUERY_TERMS`], one
    /// concurrent request per group; a failure in one group produces
    /// per-item errors for that group's identifiers only.
    pub fn fetch_all(
        &self,
        ids: &[Option<String>],
        options: &[&str],
    ) -> Vec<Result<Vec<ChangeInfo>>> {
        let sizes: Vec<usize> = ids.chunks(MAX_QUERY_TERMS).map(<[_]>::len).collect();
        let batches = std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(MAX_QUERY_TERMS)
                .map(|chunk| scope.spawn(move || self.fetch_batch(chunk, options)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("batch worker panicked"))
                .collect()
        });
        merge_batches(&sizes, batches)
    }

    fn fetch_batch(
        &self,
        chunk: &[Option<String>],
        options: &[&str],
    ) -> Result<Vec<Vec<ChangeInfo>>> {
        let query = batch_query(chunk, options);
        let raw = self.api_get(&format!("/a/changes/?{}", query))?;
        decode_batch(&raw, chunk.len())
    }

    /// Fetch one change by its full change ID.
    pub fn fetch_change(&self, full_id: &str, options: &[&str]) -> Result<ChangeInfo> {
        let mut path = format!("/a/changes/{}", percent_encode(full_id));
        for (i, opt) in options.iter().enumerate() {
            path.push(if i == 0 { '?' } else { '&' });
            path.push_str("o=");
            path.push_str(opt);
        }
        let raw = self.api_get(&path)?;
        decode_json_body(&raw)
    }

    /// Submit a change. Unlike status display, failures here are fatal to
    /// the caller; there is no per-item degradation on the submit path.
    pub fn submit_change(&self, full_id: &str) -> Result<ChangeInfo> {
        let path = format!("/a/changes/{}/submit", percent_encode(full_id));
        let raw = self.api_post(&path, &serde_json::json!({}))?;
        decode_json_body(&raw)
    }

    fn api_get(&self, path: &str) -> Result<Vec<u8>> {
        self.api(self.http.get(format!("{}{}", self.auth.url, path)), path)
    }

    fn api_post(&self, path: &str, body: &serde_json::Value) -> Result<Vec<u8>> {
        let req = self
            .http
            .post(format!("{}{}", self.auth.url, path))
            .json(body);
        self.api(req, path)
    }

    fn api(&self, req: reqwest::blocking::RequestBuilder, path: &str) -> Result<Vec<u8>> {
        let req = match &self.auth.credential {
            Credential::Cookie { name, value } => {
                req.header(reqwest::header::COOKIE, format!("{}={}", name, value))
            }
            Credential::Basic { user, password } => req.basic_auth(user, Some(password)),
        };

        let resp = req
            .send()
            .map_err(|e| RevuError::GerritError(format!("fetch {}: {}", path, e)))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .map_err(|e| RevuError::GerritError(format!("fetch {}: reading response body: {}", path, e)))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RevuError::GerritError(
                "change not found on Gerrit server".to_string(),
            ));
        }
        if !status.is_success() {
            let extra = String::from_utf8_lossy(&body).trim().to_string();
            let msg = if extra.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, extra)
            };
            return Err(RevuError::GerritError(msg));
        }
        Ok(body.to_vec())
    }
}

/// Flatten per-group responses back into one entry per identifier.
///
/// `sizes[i]` is the number of identifiers group `i` carried. A failed
/// group fans its error out to each of its identifiers, so positions stay
/// aligned with the original request across group boundaries.
fn merge_batches(
    sizes: &[usize],
    batches: Vec<Result<Vec<Vec<ChangeInfo>>>>,
) -> Vec<Result<Vec<ChangeInfo>>> {
    let mut results = Vec::with_capacity(sizes.iter().sum());
    for (size, batch) in sizes.iter().zip(batches) {
        match batch {
            Ok(lists) => results.extend(lists.into_iter().map(Ok)),
            Err(err) => results.extend((0..*size).map(|_| Err(err.clone()))),
        }
    }
    results
}

/// Build the query string for one batch: `q=` per identifier plus `o=`
/// options. Missing identifiers become the sentinel `is:open+is:closed`,
/// which cannot match any change.
fn batch_query(chunk: &[Option<String>], options: &[&str]) -> String {
    let mut query = String::new();
    for id in chunk {
        if !query.is_empty() {
            query.push('&');
        }
        match id {
            Some(id) => {
                query.push_str("q=change:");
                query.push_str(&percent_encode(id));
            }
            None => query.push_str("q=is:open+is:closed"),
        }
    }
    for opt in options {
        query.push_str("&o=");
        query.push_str(opt);
    }
    query
}

/// Strip Gerrit's anti-script-injection prefix line and decode JSON.
fn decode_json_body<T: serde::de::DeserializeOwned>(raw: &[u8]) -> Result<T> {
    // Every response body starts with a line like )]}' that must go
    // before the JSON parser sees the rest.
    let i = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| RevuError::GerritError("malformed json response - bad header".to_string()))?;
    serde_json::from_slice(&raw[i..])
        .map_err(|_| RevuError::GerritError("malformed json response".to_string()))
}

/// Decode one batch response into the array-of-arrays shape.
///
/// A single-query request comes back as a flat array of changes; a
/// multi-query request as an array of arrays. Both normalize to the
/// latter here. A count mismatch against the requested identifiers is a
/// protocol error for this batch.
fn decode_batch(raw: &[u8], n: usize) -> Result<Vec<Vec<ChangeInfo>>> {
    let lists: Vec<Vec<ChangeInfo>> = if n == 1 {
        vec![decode_json_body(raw)?]
    } else {
        decode_json_body(raw)?
    };
    if lists.len() != n {
        return Err(RevuError::GerritError(format!(
            "gerrit result count mismatch: {} results for {} queries",
            lists.len(),
            n
        )));
    }
    Ok(lists)
}

/// Percent-encode a query component (RFC 3986 unreserved passthrough).
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
