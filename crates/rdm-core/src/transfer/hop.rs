//! A single request/response exchange within an attempt.

use std::cell::RefCell;

use curl::easy::{Easy, List};

use super::error::TransferError;
use super::progress::{in_flight_percent, ProgressSampler};
use super::redirect::is_redirect;
use super::response::{self, ResponseHead};
use super::{ProgressSink, TransferOutcome, TransferRequest, TransferUpdate};
use crate::control::AbortToken;
use crate::storage::DestinationWriter;
use crate::url_model;

pub(super) enum HopResult {
    /// 3xx with the raw `Location` value.
    Redirect(String),
    Done(TransferOutcome),
}

/// Body being written to the destination.
struct Active {
    writer: DestinationWriter,
    /// Bytes already on disk that count towards `total`.
    base: u64,
    total: Option<u64>,
    content_length: Option<u64>,
    filename: Option<String>,
    range_proven: bool,
    restarted: bool,
    sampler: ProgressSampler,
}

enum Body {
    /// No body byte seen yet.
    Pending,
    /// Redirect or unknown response; body is dropped.
    Discard,
    Write(Box<Active>),
}

struct HopState {
    lines: Vec<String>,
    body: Body,
    failure: Option<TransferError>,
}

impl HopState {
    /// Decide what to do with the body once the response head is complete.
    fn begin(
        &mut self,
        req: &TransferRequest,
        current_url: &str,
        head: &ResponseHead,
        sink: &mut dyn ProgressSink,
    ) {
        let status = match head.status {
            Some(code @ (200 | 206)) => code,
            Some(code) if is_redirect(code) => {
                self.body = Body::Discard;
                return;
            }
            Some(code) => {
                self.failure = Some(TransferError::Server { code });
                self.body = Body::Discard;
                return;
            }
            None => {
                self.body = Body::Discard;
                return;
            }
        };

        let resuming = req.resume_from > 0;
        let append = resuming && status == 206;
        let restarted = resuming && !append;
        let range_proven = status == 206 || head.accept_ranges;
        if restarted {
            tracing::debug!(url = %current_url, "range request answered with 200, restarting from byte 0");
        }

        let charset = url_model::charset(head.content_type.as_deref());
        let filename = match &req.filename {
            Some(name) if !name.is_empty() => Some(name.clone()),
            _ if !resuming => url_model::resolve_filename(
                current_url,
                head.content_disposition.as_deref(),
                charset.as_deref(),
            ),
            _ => None,
        };
        let mime_type = url_model::mime_type(head.content_type.as_deref());
        let path = req.destination(filename.as_deref());

        sink.push_update(TransferUpdate::Responded {
            range_proven,
            restarted,
        });
        sink.push_update(TransferUpdate::Resolved {
            filename: filename.clone(),
            mime_type,
        });

        let opened = if append {
            DestinationWriter::append(&path)
        } else {
            DestinationWriter::create(&path)
        };
        let writer = match opened {
            Ok(w) => w,
            Err(e) => {
                self.failure = Some(TransferError::filesystem(path, e));
                self.body = Body::Discard;
                return;
            }
        };

        let base = if append { req.resume_from } else { 0 };
        let total = head.content_length.map(|len| base + len);
        let mut sampler = ProgressSampler::new(req.options.progress_step);
        if let Some(p) = sampler.observe(in_flight_percent(base, total)) {
            sink.push_update(TransferUpdate::Progress(p));
        }

        self.body = Body::Write(Box::new(Active {
            writer,
            base,
            total,
            content_length: head.content_length,
            filename,
            range_proven,
            restarted,
            sampler,
        }));
    }

    /// Flush whatever was written so partial data survives for a later resume.
    fn flush_partial(&mut self) {
        if let Body::Write(active) = &mut self.body {
            if let Err(e) = active.writer.sync() {
                tracing::warn!(path = %active.writer.path().display(), "flushing partial data failed: {}", e);
            }
        }
    }
}

fn configure(easy: &mut Easy, req: &TransferRequest, url: &str) -> Result<(), TransferError> {
    let opts = &req.options;
    easy.url(url)?;
    easy.follow_location(false)?;
    easy.connect_timeout(opts.connect_timeout)?;
    // Read timeout: abort if less than 1 byte/s arrives for `read_timeout`.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(opts.read_timeout)?;
    easy.buffer_size(opts.buffer_size.max(1024))?;
    easy.progress(true)?;
    if let Some(ua) = &opts.user_agent {
        easy.useragent(ua)?;
    }
    if opts.accept_invalid_certs {
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
    }

    let mut list = List::new();
    for (k, v) in &req.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if req.resume_from > 0 {
        list.append(&format!("Range: bytes={}-", req.resume_from))?;
        list.append("Accept-Encoding: identity")?;
    }
    easy.http_headers(list)?;
    Ok(())
}

/// Issues one request to `url` and consumes its response.
pub(super) fn perform(
    req: &TransferRequest,
    url: &str,
    abort: &AbortToken,
    sink: &mut dyn ProgressSink,
) -> Result<HopResult, TransferError> {
    let mut easy = Easy::new();
    configure(&mut easy, req, url)?;

    let state = RefCell::new(HopState {
        lines: Vec::new(),
        body: Body::Pending,
        failure: None,
    });
    let sink = RefCell::new(sink);

    let result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            let line = response::header_line(data);
            let mut st = state.borrow_mut();
            // A new status line starts a new header block (e.g. after 100 Continue).
            if line.starts_with("HTTP/") {
                st.lines.clear();
            }
            st.lines.push(line);
            true
        })?;
        transfer.write_function(|data| {
            if abort.is_aborted() {
                return Ok(0);
            }
            let mut st = state.borrow_mut();
            let mut sink = sink.borrow_mut();
            if matches!(st.body, Body::Pending) {
                let head = response::parse_headers(&st.lines);
                st.begin(req, url, &head, &mut **sink);
            }
            let st = &mut *st;
            match &mut st.body {
                Body::Write(active) => {
                    if let Err(e) = active.writer.write_chunk(data) {
                        st.failure = Some(TransferError::filesystem(active.writer.path(), e));
                        return Ok(0);
                    }
                    let done = active.base + active.writer.written();
                    if let Some(p) = active.sampler.observe(in_flight_percent(done, active.total)) {
                        sink.push_update(TransferUpdate::Progress(p));
                    }
                    Ok(data.len())
                }
                Body::Discard if st.failure.is_some() => Ok(0),
                Body::Discard | Body::Pending => Ok(data.len()),
            }
        })?;
        transfer.progress_function(|_, _, _, _| !abort.is_aborted())?;
        transfer.perform()
    };

    let mut st = state.into_inner();
    let sink = sink.into_inner();
    if let Err(e) = result {
        st.flush_partial();
        if let Some(failure) = st.failure.take() {
            return Err(failure);
        }
        if abort.is_aborted() {
            return Err(TransferError::Interrupted);
        }
        return Err(TransferError::Transport(e));
    }

    let code = easy.response_code()?;
    if is_redirect(code) {
        let head = response::parse_headers(&st.lines);
        return match head.location {
            Some(location) if !location.trim().is_empty() => Ok(HopResult::Redirect(location)),
            _ => Err(TransferError::Server { code }),
        };
    }
    if code != 200 && code != 206 {
        return Err(TransferError::Server { code });
    }

    // Empty body: the write callback never ran.
    if matches!(st.body, Body::Pending) {
        let head = response::parse_headers(&st.lines);
        st.begin(req, url, &head, sink);
    }
    if let Some(failure) = st.failure.take() {
        return Err(failure);
    }
    let Body::Write(mut active) = st.body else {
        return Err(TransferError::Server { code });
    };

    active
        .writer
        .sync()
        .map_err(|e| TransferError::filesystem(active.writer.path(), e))?;
    let received = active.writer.written();
    if let Some(expected) = active.content_length {
        if received != expected {
            return Err(TransferError::Truncated { expected, received });
        }
    }

    Ok(HopResult::Done(TransferOutcome {
        filename: active.filename,
        path: active.writer.path().to_path_buf(),
        total_bytes: active.base + received,
        range_proven: active.range_proven,
        restarted: active.restarted,
    }))
}
