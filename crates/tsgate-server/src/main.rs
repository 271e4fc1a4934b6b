//! `tsgate` binary: `serve` (default) or `check <url>`

use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tsgate_server::{logging, server, Gateway, LogFormat, Settings};
use url::Url;

fn cli() -> Command {
    Command::new("tsgate")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Gateway that compiles TypeScript modules on the fly")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .global(true)
                .value_parser(value_parser!(SocketAddr))
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("upstream")
                .long("upstream")
                .global(true)
                .help("Application server to front"),
        )
        .arg(
            Arg::new("scope")
                .long("scope")
                .global(true)
                .help("Path prefix under which TypeScript is compiled"),
        )
        .arg(
            Arg::new("lib-base")
                .long("lib-base")
                .global(true)
                .help("Base URL of lib.*.d.ts files"),
        )
        .arg(
            Arg::new("store-dir")
                .long("store-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of the persistent cache (in-memory when absent)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["pretty", "compact", "json"])
                .help("Log output format"),
        )
        .arg(
            Arg::new("log-filter")
                .long("log-filter")
                .global(true)
                .help("Log filter directives (RUST_LOG takes precedence)"),
        )
        .subcommand(Command::new("serve").about("Run the gateway (default)"))
        .subcommand(
            Command::new("check")
                .about("Compile one module against the upstream and print its diagnostics")
                .arg(
                    Arg::new("url")
                        .required(true)
                        .help("Module URL, or a path on the upstream"),
                ),
        )
}

fn settings(matches: &ArgMatches) -> anyhow::Result<Settings> {
    let mut settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(listen) = matches.get_one::<SocketAddr>("listen") {
        settings.listen = *listen;
    }
    if let Some(upstream) = matches.get_one::<String>("upstream") {
        settings.upstream.clone_from(upstream);
    }
    if let Some(scope) = matches.get_one::<String>("scope") {
        settings.scope.clone_from(scope);
    }
    if let Some(lib_base) = matches.get_one::<String>("lib-base") {
        settings.lib_base.clone_from(lib_base);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("store-dir") {
        settings.store_dir = Some(dir.clone());
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        settings.log.format = format.parse::<LogFormat>()?;
    }
    if let Some(filter) = matches.get_one::<String>("log-filter") {
        settings.log.filter.clone_from(filter);
    }

    settings.validate()?;
    Ok(settings)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "Cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn check(gateway: &Gateway, target: &str) -> anyhow::Result<bool> {
    let url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).with_context(|| format!("invalid url {target}"))?
    } else {
        gateway.request_url(target)?
    };

    let output = gateway.interceptor().handler().check(&url).await?;
    let report = output.report();
    if !report.is_empty() {
        println!("{}", report.render());
    }
    println!(
        "{} modules, {} compiled, {} errors",
        output.files.len(),
        output.compiled_count(),
        report.error_count()
    );
    Ok(report.error_count() == 0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let settings = settings(&matches)?;
    logging::init(&settings.log)?;

    let gateway = Arc::new(Gateway::from_settings(settings).context("cannot configure gateway")?);

    match matches.subcommand() {
        Some(("check", args)) => {
            let target = args
                .get_one::<String>("url")
                .context("missing module url")?;
            let passed = check(&gateway, target).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        _ => server::serve(gateway, shutdown_signal())
            .await
            .context("gateway stopped with an error"),
    }
}
