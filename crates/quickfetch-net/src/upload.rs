// crates/quickfetch-net/src/upload.rs
//! Multipart form assembly with upload progress

use crate::error::FetchResult;
use crate::progress::ProgressMeter;
use crate::request::Request;
use crate::service::HttpService;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::sync::{Arc, Mutex};
use tokio_util::io::ReaderStream;

/// A built multipart form plus the per-file meters that still owe their
/// final `done` notification once the body has been sent
pub(crate) struct UploadParts {
    pub(crate) form: Form,
    pub(crate) meters: Vec<Arc<Mutex<ProgressMeter>>>,
}

/// Assembles the multipart body for a request with file attachments.
///
/// String parameters become plain text parts; each file becomes a
/// streamed `application/octet-stream` part that reports throttled
/// progress through the request's progress observer. Missing files are
/// skipped with a warning, matching the forgiving upload path this
/// replaces.
pub(crate) async fn multipart_form(
    service: &HttpService,
    request: &Request,
) -> FetchResult<UploadParts> {
    let mut form = Form::new();
    for (key, value) in &request.params {
        form = form.text(key.clone(), value.clone());
    }

    let mut meters = Vec::new();
    for (key, path) in &request.files {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                log::warn!("skipping missing upload file {}", path.display());
                continue;
            }
        };
        let len = metadata.len();
        let file = tokio::fs::File::open(path).await?;

        let meter = Arc::new(Mutex::new(ProgressMeter::new(key.clone(), 0, Some(len))));
        meters.push(Arc::clone(&meter));

        let progress_service = service.clone();
        let callbacks = Arc::clone(&request.callbacks);
        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                let event = meter
                    .lock()
                    .ok()
                    .and_then(|mut meter| meter.update(bytes.len() as u64));
                if let Some(event) = event {
                    progress_service.post_progress(&callbacks, event);
                }
            }
        });

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        let part = Part::stream_with_length(Body::wrap_stream(stream), len)
            .file_name(file_name)
            .mime_str(&format!(
                "application/octet-stream; charset={}",
                service.config().encoding
            ))?;
        form = form.part(key.clone(), part);
    }

    Ok(UploadParts { form, meters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let service = HttpService::new(ServiceConfig::default()).unwrap();
        let request = service
            .request("http://example.com/upload")
            .post()
            .add_file("doc", "/no/such/file.bin")
            .freeze()
            .unwrap();

        let parts = multipart_form(&service, &request).await.unwrap();
        assert!(parts.meters.is_empty());
    }

    #[tokio::test]
    async fn test_each_file_gets_a_meter() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.bin");
        let path_b = dir.path().join("b.bin");
        for path in [&path_a, &path_b] {
            let mut f = std::fs::File::create(path).unwrap();
            f.write_all(b"payload").unwrap();
        }

        let service = HttpService::new(ServiceConfig::default()).unwrap();
        let request = service
            .request("http://example.com/upload")
            .post()
            .add_file("first", &path_a)
            .add_file("second", &path_b)
            .freeze()
            .unwrap();

        let parts = multipart_form(&service, &request).await.unwrap();
        assert_eq!(parts.meters.len(), 2);
    }
}
