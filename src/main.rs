//! Spotter - command-line runner for one-off detection and input
//!
//! ```text
//! spotter [--config PATH] windows
//! spotter [--config PATH] exists <TEMPLATE>
//! spotter [--config PATH] wait <TEMPLATE>
//! spotter [--config PATH] click <TEMPLATE>
//! spotter [--config PATH] snapshot [REASON]
//! ```

use anyhow::{Context, bail};
use spotter::Config;
use spotter::session::Session;
use spotter::window::CoordinateMapper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: spotter [--config PATH] <windows|exists|wait|click|snapshot> [TEMPLATE|REASON]";

enum Command {
    Windows,
    Exists(String),
    Wait(String),
    Click(String),
    Snapshot(String),
}

struct Args {
    config: Option<String>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(args.next().context("--config needs a path")?),
            "--help" | "-h" => bail!(USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next().context(USAGE)?;
    let mut template = || positional.next().with_context(|| format!("'{}' needs a template name\n{}", name, USAGE));
    let command = match name.as_str() {
        "windows" => Command::Windows,
        "exists" => Command::Exists(template()?),
        "wait" => Command::Wait(template()?),
        "click" => Command::Click(template()?),
        "snapshot" => Command::Snapshot(positional.next().unwrap_or_default()),
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    };

    Ok(Args { config, command })
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    if let Command::Windows = args.command {
        let backend = spotter::backend::create_backend()?;
        for window in CoordinateMapper::new(backend).list_windows()? {
            let g = window.geometry;
            println!("{:?}\t{}x{}+{}+{}\t{}\t{}", window.id, g.width, g.height, g.x, g.y, window.class, window.title);
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    let session = Session::start(config)?;

    match args.command {
        Command::Windows => {}
        Command::Exists(name) => {
            let found = session.exists(&name)?;
            println!("{}", found);
            if !found {
                std::process::exit(1);
            }
        }
        Command::Wait(name) => {
            let found = session.wait_for(&name)?;
            println!("{:.3}\t{}\t{}", found.score, found.rect, found.center);
        }
        Command::Click(name) => {
            let clicked = session.click_if_exists(&name)?;
            println!("{}", clicked);
            if !clicked {
                std::process::exit(1);
            }
        }
        Command::Snapshot(reason) => {
            let path = session.save_snapshot(&reason)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
