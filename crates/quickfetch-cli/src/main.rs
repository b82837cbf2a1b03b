// FILE: crates/quickfetch-cli/src/main.rs

use anyhow::Result;
use clap::{Arg, Command};

mod commands;

fn build_cli() -> Command {
    Command::new("quickfetch")
        .version("0.1.0")
        .about("Fluent HTTP requests, uploads and resumable downloads")
        .arg(
            Arg::new("base-url")
                .short('b')
                .long("base-url")
                .value_name("URL")
                .help("Base URL joined onto relative request paths")
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Connect and read timeout in seconds")
                .default_value("30")
                .global(true),
        )
        .subcommand(
            Command::new("get")
                .about("Perform a GET request and print the body")
                .arg(Arg::new("url").required(true).value_name("URL").help("Target URL (absolute or relative)"))
                .arg(Arg::new("param").short('p').long("param").value_name("KEY=VALUE").help("Query parameter, repeatable").action(clap::ArgAction::Append))
                .arg(Arg::new("header").short('H').long("header").value_name("KEY=VALUE").help("Request header, repeatable").action(clap::ArgAction::Append)),
        )
        .subcommand(
            Command::new("post")
                .about("Perform a form-encoded POST request and print the body")
                .arg(Arg::new("url").required(true).value_name("URL").help("Target URL (absolute or relative)"))
                .arg(Arg::new("param").short('p').long("param").value_name("KEY=VALUE").help("Form parameter, repeatable").action(clap::ArgAction::Append))
                .arg(Arg::new("header").short('H').long("header").value_name("KEY=VALUE").help("Request header, repeatable").action(clap::ArgAction::Append)),
        )
        .subcommand(
            Command::new("download")
                .about("Download a file, resuming a partial local copy by default")
                .arg(Arg::new("url").required(true).value_name("URL").help("File URL"))
                .arg(Arg::new("out-dir").short('o').long("out-dir").value_name("DIR").help("Target directory (defaults to the cache dir)"))
                .arg(Arg::new("file-name").short('n').long("file-name").value_name("NAME").help("Target file name (derived from the URL when omitted)"))
                .arg(Arg::new("no-resume").long("no-resume").help("Always fetch the whole file fresh").action(clap::ArgAction::SetTrue))
                .arg(Arg::new("tag").short('t').long("tag").value_name("TAG").help("Cancellation tag"))
                .arg(Arg::new("cancel-after").long("cancel-after").value_name("SECONDS").help("Cancel the transfer after this many seconds (demo)")),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload files as a multipart POST")
                .arg(Arg::new("url").required(true).value_name("URL").help("Target URL"))
                .arg(Arg::new("file").short('f').long("file").value_name("KEY=PATH").help("File attachment, repeatable").action(clap::ArgAction::Append).required(true))
                .arg(Arg::new("param").short('p').long("param").value_name("KEY=VALUE").help("Form parameter, repeatable").action(clap::ArgAction::Append)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("get", sub)) => commands::run_get(&matches, sub).await,
        Some(("post", sub)) => commands::run_post(&matches, sub).await,
        Some(("download", sub)) => commands::run_download(&matches, sub).await,
        Some(("upload", sub)) => commands::run_upload(&matches, sub).await,
        _ => {
            build_cli().print_help()?;
            println!();
            Ok(())
        }
    }
}
