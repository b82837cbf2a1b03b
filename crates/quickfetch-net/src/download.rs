// crates/quickfetch-net/src/download.rs
//! Resumable download coordinator

use crate::error::{FetchError, FetchResult};
use crate::progress::ProgressMeter;
use crate::registry::TaskHandle;
use crate::request::Request;
use crate::service::HttpService;
use crate::util;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Next action after probing the remote length against the local file
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The local file already holds every byte; no transfer
    SkipComplete,
    /// Fetch `bytes=start-end` and append to the local file
    Remainder { start: u64, end: u64 },
    /// Remote length unknown; refetch the whole file from scratch
    Fresh,
}

/// Decides how to proceed given the local file length and the probed
/// remote total. A local file longer than the remote is unrecoverable
/// here and reported as a download failure.
pub(crate) fn plan(local_len: u64, probed_total: Option<u64>) -> FetchResult<Step> {
    match probed_total {
        Some(total) if total == local_len => Ok(Step::SkipComplete),
        Some(total) if total < local_len => Err(FetchError::DownloadFailed(format!(
            "local file ({} bytes) is longer than the remote total ({} bytes)",
            local_len, total
        ))),
        Some(total) => Ok(Step::Remainder {
            start: local_len,
            end: total,
        }),
        None => Ok(Step::Fresh),
    }
}

async fn local_length(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    }
}

/// Worker entry point for a download task: runs the coordinator and
/// finalizes through the response dispatcher
pub(crate) async fn run<F>(
    service: HttpService,
    mut request: Request,
    key: String,
    handle: TaskHandle,
    on_outcome: F,
) where
    F: FnOnce(crate::Outcome<PathBuf>) + Send + 'static,
{
    match drive(&service, &mut request, &handle).await {
        Ok(path) => {
            service.registry().remove(&key);
            if request.callbacks.is_alive() {
                service.deliver_value(&request.callbacks, path, on_outcome);
            } else {
                log::debug!(
                    "binder retired, dropping downloaded file {}",
                    path.display()
                );
            }
        }
        Err(error) => service.finish_failure(&key, &request.callbacks, error, on_outcome),
    }
}

/// The download state machine: resolve target, auto-detect the resume
/// offset, probe the remote length when the end offset is unknown, then
/// skip, fetch the remainder, or fetch fresh.
async fn drive(
    service: &HttpService,
    request: &mut Request,
    handle: &TaskHandle,
) -> FetchResult<PathBuf> {
    let dir = request
        .download_dir
        .clone()
        .unwrap_or_else(|| service.config().cache_dir.clone());
    tokio::fs::create_dir_all(&dir).await?;
    let name = match request.file_name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => util::file_name_from_url(&request.url),
    };
    let path = dir.join(&name);

    if request.resumable {
        if request.range_start == 0 {
            request.range_start = local_length(&path).await;
        }
        if request.range_end == 0 {
            // Throwaway request; only the content length is taken, the
            // body is dropped unread.
            let response = tokio::select! {
                biased;
                _ = handle.cancelled() => return Err(FetchError::Cancelled),
                result = service.send(request) => result?,
            };
            let total = response.content_length();
            drop(response);

            match plan(request.range_start, total)? {
                Step::SkipComplete => {
                    log::debug!(
                        "local file {} already complete, skipping transfer",
                        path.display()
                    );
                    return Ok(path);
                }
                Step::Remainder { start, end } => {
                    request.range_start = start;
                    request.range_end = end;
                }
                Step::Fresh => {
                    log::debug!("remote reported no length, fetching {} fresh", request.url);
                    request.resumable = false;
                    request.range_start = 0;
                    request.range_end = 0;
                }
            }
        }
    }

    let append = request.resumable && request.range_start > 0;
    let response = tokio::select! {
        biased;
        _ = handle.cancelled() => return Err(FetchError::Cancelled),
        result = service.send(request) => result?,
    };
    write_stream(service, request, handle, response, &path, &name, append).await?;
    Ok(path)
}

/// Pipes the response body into the target file, appending when resuming,
/// with throttled progress notifications
async fn write_stream(
    service: &HttpService,
    request: &Request,
    handle: &TaskHandle,
    response: reqwest::Response,
    path: &Path,
    name: &str,
    append: bool,
) -> FetchResult<()> {
    // Download totals include the resume offset.
    let total = response.content_length().map(|len| len + request.range_start);
    let mut meter = ProgressMeter::new(name, request.range_start, total);

    let mut file = if append {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?
    } else {
        tokio::fs::File::create(path).await?
    };

    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = handle.cancelled() => return Err(FetchError::Cancelled),
            chunk = stream.next() => chunk,
        };
        match chunk {
            None => break,
            Some(Ok(bytes)) => {
                file.write_all(&bytes).await?;
                log::trace!("wrote {} bytes to {}", bytes.len(), path.display());
                if let Some(event) = meter.update(bytes.len() as u64) {
                    service.post_progress(&request.callbacks, event);
                }
            }
            Some(Err(error)) => return Err(FetchError::Http(error)),
        }
    }
    file.flush().await?;

    if let Some(event) = meter.finish() {
        service.post_progress(&request.callbacks, event);
    }
    Ok(())
}
