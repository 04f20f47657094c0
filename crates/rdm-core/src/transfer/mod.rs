//! One download attempt over HTTP: redirects, range resume, filename
//! resolution and streaming copy with sampled progress.
//!
//! Uses the curl crate (libcurl) with redirects disabled at the transport
//! level so every hop can be counted and resolved here. Runs on the calling
//! thread; use [`spawn_transfer`] from async code.

mod error;
mod hop;
mod progress;
mod redirect;
mod response;

pub use error::{ErrorKind, TransferError};
pub use progress::{in_flight_percent, ProgressSampler, IN_FLIGHT_MAX};
pub use redirect::{is_redirect, resolve_location, RedirectTracker, MAX_VISITS_PER_URL};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::control::AbortToken;
use crate::url_model;

/// Per-attempt transport settings.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    /// Abort when no byte arrives for this long.
    pub read_timeout: Duration,
    /// Receive buffer (chunk) size in bytes.
    pub buffer_size: usize,
    /// Minimum advance, in percentage points, between reported progress samples.
    pub progress_step: u8,
    pub user_agent: Option<String>,
    /// Skip TLS peer and host verification.
    pub accept_invalid_certs: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(15),
            buffer_size: 4096,
            progress_step: 10,
            user_agent: None,
            accept_invalid_certs: false,
        }
    }
}

/// Everything one attempt needs.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Original request URL.
    pub url: String,
    pub saved_dir: PathBuf,
    /// Known destination name. `None` lets the response decide.
    pub filename: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Length of partial data to continue from; 0 for a fresh attempt.
    pub resume_from: u64,
    pub options: TransferOptions,
}

impl TransferRequest {
    /// Destination path for `name`, falling back to the name derived from the original URL.
    pub(crate) fn destination(&self, name: Option<&str>) -> PathBuf {
        match name {
            Some(name) if !name.is_empty() => self.saved_dir.join(name),
            _ => self.saved_dir.join(url_model::fallback_filename(&self.url)),
        }
    }
}

/// Observations reported while an attempt runs, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// First 200/206 response of the attempt arrived.
    Responded {
        /// 206, or 200 with `Accept-Ranges: bytes`.
        range_proven: bool,
        /// A resume request was answered with 200; data restarts from byte 0.
        restarted: bool,
    },
    /// Destination name and MIME type are known.
    Resolved {
        filename: Option<String>,
        mime_type: Option<String>,
    },
    /// Sampled in-flight progress (never above [`IN_FLIGHT_MAX`]).
    Progress(u8),
}

/// Receives [`TransferUpdate`]s from the transfer thread.
pub trait ProgressSink {
    fn push_update(&mut self, update: TransferUpdate);
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<TransferUpdate> {
    fn push_update(&mut self, update: TransferUpdate) {
        // Receiver gone means the attempt's owner stopped listening.
        let _ = self.send(update);
    }
}

impl ProgressSink for Vec<TransferUpdate> {
    fn push_update(&mut self, update: TransferUpdate) {
        self.push(update);
    }
}

/// Result of a verified complete attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub filename: Option<String>,
    pub path: PathBuf,
    /// Final file length.
    pub total_bytes: u64,
    pub range_proven: bool,
    pub restarted: bool,
}

/// Runs one attempt to completion, failure or interruption.
pub fn run_transfer(
    req: &TransferRequest,
    abort: &AbortToken,
    sink: &mut dyn ProgressSink,
) -> Result<TransferOutcome, TransferError> {
    url::Url::parse(&req.url).map_err(|_| TransferError::InvalidUrl {
        url: req.url.clone(),
    })?;

    let mut tracker = RedirectTracker::new();
    let mut current = req.url.clone();
    tracker.visit(&current)?;
    if req.resume_from > 0 {
        tracing::debug!(url = %req.url, offset = req.resume_from, "resuming with range request");
    }

    loop {
        if abort.is_aborted() {
            return Err(TransferError::Interrupted);
        }
        match hop::perform(req, &current, abort, sink)? {
            hop::HopResult::Redirect(location) => {
                let next = resolve_location(&current, &location)?;
                tracing::debug!(from = %current, to = %next, "following redirect");
                tracker.visit(&next)?;
                current = next;
            }
            hop::HopResult::Done(outcome) => return Ok(outcome),
        }
    }
}

/// Runs [`run_transfer`] on a blocking thread. Updates go to `sink` as they
/// happen; the sink is dropped when the attempt ends.
pub fn spawn_transfer<S>(
    req: TransferRequest,
    abort: Arc<AbortToken>,
    mut sink: S,
) -> tokio::task::JoinHandle<Result<TransferOutcome, TransferError>>
where
    S: ProgressSink + Send + 'static,
{
    tokio::task::spawn_blocking(move || run_transfer(&req, &abort, &mut sink))
}
