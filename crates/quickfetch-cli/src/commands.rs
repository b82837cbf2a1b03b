// FILE: crates/quickfetch-cli/src/commands.rs

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use quickfetch_net::{HttpService, Outcome, RequestBuilder, ServiceConfig, TaskHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;

/// Splits a repeatable `KEY=VALUE` argument; everything after the first
/// `=` belongs to the value
fn parse_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("expected KEY=VALUE, got '{}'", raw),
    }
}

fn build_service(matches: &ArgMatches) -> Result<HttpService> {
    let timeout: u64 = matches
        .get_one::<String>("timeout")
        .map(String::as_str)
        .unwrap_or("30")
        .parse()
        .context("--timeout must be a number of seconds")?;

    let mut config = ServiceConfig::new()
        .connect_timeout(Duration::from_secs(timeout))
        .read_timeout(Duration::from_secs(timeout));
    if let Some(base) = matches.get_one::<String>("base-url") {
        config = config.base_url(base);
    }
    HttpService::new(config).context("Failed to create HTTP service")
}

fn apply_pairs(
    mut builder: RequestBuilder,
    sub: &ArgMatches,
    arg: &str,
    header: bool,
) -> Result<RequestBuilder> {
    if let Some(values) = sub.get_many::<String>(arg) {
        for raw in values {
            let (key, value) = parse_pair(raw)?;
            builder = if header {
                builder.add_header(key, value)
            } else {
                builder.add_param(key, value)
            };
        }
    }
    Ok(builder)
}

async fn await_text(rx: oneshot::Receiver<Outcome<String>>) -> Result<()> {
    match rx.await.context("request was dropped before completing")? {
        Outcome::Success(body) => {
            println!("{}", body);
            Ok(())
        }
        Outcome::Failure { error, is_connect } => {
            bail!(
                "request failed{}: {}",
                if is_connect { " (connection error)" } else { "" },
                error
            )
        }
        Outcome::Parse { error, .. } => bail!("response did not decode: {}", error),
    }
}

/// GET a URL and print the body
pub async fn run_get(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let svc = build_service(matches)?;
    let url = sub.get_one::<String>("url").expect("required");

    let mut builder = svc.request(url).get();
    builder = apply_pairs(builder, sub, "param", false)?;
    builder = apply_pairs(builder, sub, "header", true)?;

    let (tx, rx) = oneshot::channel();
    builder.fetch_text(move |outcome| {
        let _ = tx.send(outcome);
    });
    await_text(rx).await
}

/// POST a form-encoded body and print the response
pub async fn run_post(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let svc = build_service(matches)?;
    let url = sub.get_one::<String>("url").expect("required");

    let mut builder = svc.request(url).post();
    builder = apply_pairs(builder, sub, "param", false)?;
    builder = apply_pairs(builder, sub, "header", true)?;

    let (tx, rx) = oneshot::channel();
    builder.fetch_text(move |outcome| {
        let _ = tx.send(outcome);
    });
    await_text(rx).await
}

fn transfer_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bytes}/{total_bytes} [{bar:40}] {bytes_per_sec}")
            .expect("static template")
            .progress_chars("=> "),
    );
    bar
}

fn schedule_cancel(sub: &ArgMatches, handle: TaskHandle) -> Result<()> {
    if let Some(raw) = sub.get_one::<String>("cancel-after") {
        let seconds: u64 = raw.parse().context("--cancel-after must be a number of seconds")?;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            log::info!("cancelling transfer after {} seconds", seconds);
            handle.cancel();
        });
    }
    Ok(())
}

/// Download a file with a progress bar, resumable by default
pub async fn run_download(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let svc = build_service(matches)?;
    let url = sub.get_one::<String>("url").expect("required");

    let mut builder = svc.request(url);
    if sub.get_flag("no-resume") {
        builder = builder.resumable(false);
    }
    if let Some(dir) = sub.get_one::<String>("out-dir") {
        builder = builder.download_dir(PathBuf::from(dir));
    }
    if let Some(name) = sub.get_one::<String>("file-name") {
        builder = builder.file_name(name);
    }
    if let Some(tag) = sub.get_one::<String>("tag") {
        builder = builder.tag(tag);
    }

    let bar = transfer_bar();
    let progress_bar = bar.clone();
    builder = builder.on_progress(move |event| {
        if let Some(total) = event.total {
            progress_bar.set_length(total);
        }
        progress_bar.set_position(event.bytes);
        if event.done {
            progress_bar.finish();
        }
    });

    let (tx, rx) = oneshot::channel();
    let handle = builder.download(move |outcome| {
        let _ = tx.send(outcome);
    });
    schedule_cancel(sub, handle)?;

    match rx.await.context("download was dropped before completing")? {
        Outcome::Success(path) => {
            bar.finish_and_clear();
            println!("downloaded to {}", path.display());
            Ok(())
        }
        Outcome::Failure { error, .. } => {
            bar.abandon();
            bail!("download failed: {}", error)
        }
        Outcome::Parse { .. } => unreachable!("downloads do not decode"),
    }
}

/// Upload files as a multipart POST with a progress bar
pub async fn run_upload(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let svc = build_service(matches)?;
    let url = sub.get_one::<String>("url").expect("required");

    let mut builder = svc.request(url).post();
    builder = apply_pairs(builder, sub, "param", false)?;
    for raw in sub.get_many::<String>("file").expect("required") {
        let (key, path) = parse_pair(raw)?;
        builder = builder.add_file(key, PathBuf::from(path));
    }

    let bar = transfer_bar();
    let progress_bar = bar.clone();
    builder = builder.on_progress(move |event| {
        if let Some(total) = event.total {
            progress_bar.set_length(total);
        }
        progress_bar.set_position(event.bytes);
    });

    let (tx, rx) = oneshot::channel();
    builder.fetch_text(move |outcome| {
        let _ = tx.send(outcome);
    });
    let result = await_text(rx).await;
    bar.finish_and_clear();
    result
}
