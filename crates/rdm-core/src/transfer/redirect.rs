//! Manual redirect following: visit counting and `Location` resolution.

use std::collections::HashMap;

use super::error::TransferError;

/// A URL may be requested at most this many times within one attempt.
pub const MAX_VISITS_PER_URL: u32 = 3;

/// Status codes followed as redirects.
pub fn is_redirect(code: u32) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

/// Counts requests per URL string during one attempt.
#[derive(Debug, Default)]
pub struct RedirectTracker {
    visits: HashMap<String, u32>,
}

impl RedirectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request to `url`. Fails once any URL exceeds the visit limit.
    pub fn visit(&mut self, url: &str) -> Result<(), TransferError> {
        let count = self.visits.entry(url.to_string()).or_insert(0);
        *count += 1;
        if *count > MAX_VISITS_PER_URL {
            return Err(TransferError::RedirectLoop {
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

/// Resolve a `Location` value against the URL that produced it.
pub fn resolve_location(current: &str, location: &str) -> Result<String, TransferError> {
    let base = url::Url::parse(current).map_err(|_| TransferError::InvalidUrl {
        url: current.to_string(),
    })?;
    let next = base
        .join(location.trim())
        .map_err(|_| TransferError::InvalidUrl {
            url: location.to_string(),
        })?;
    Ok(next.to_string())
}
