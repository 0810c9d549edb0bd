//! Contract Lens - contract-address detection and token analysis

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use contract_lens::{
    analysis::{Aggregator, AnalysisRecord},
    bus::EventBus,
    cli::{Cli, Command, HistoryCommand, OutputFormat},
    config::Config,
    detect::{AddressMatch, PatternRegistry, resolve},
    popover::{PopoverBody, PopoverView},
    setup_tracing,
    store::{History, HistoryEntry, JsonFileStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Scan { ref text } => run_scan(&config, text.clone(), cli.format),
        Command::Analyze {
            ref address,
            no_history,
        } => run_analyze(&config, address, no_history, cli.format).await,
        Command::History(ref cmd) => run_history(&config, cmd, cli.format),
    }
}

/// Print `value` in the requested format; `text` renders the human form
fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T) -> String) -> ExitCode {
    let rendered = match format {
        OutputFormat::Text => Ok(text(value)),
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(out) => {
            println!("{}", out.trim_end());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn open_history(config: &Config) -> contract_lens::Result<History> {
    let store = JsonFileStore::open(config.history.resolved_path())?;
    Ok(History::new(Arc::new(store), config.history.capacity))
}

/// Find addresses in text
fn run_scan(config: &Config, text: Option<String>, format: OutputFormat) -> ExitCode {
    let registry = match PatternRegistry::from_config(&config.detection) {
        Ok(r) => r,
        Err(e) => {
            error!("Invalid detection settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                error!("Failed to read stdin: {e}");
                return ExitCode::FAILURE;
            }
            buf
        }
    };

    let matches = resolve(&registry, &text);
    info!(found = matches.len(), "Scan complete");
    emit(format, &matches, |matches: &Vec<AddressMatch>| {
        if matches.is_empty() {
            return "No addresses found.".to_string();
        }
        matches
            .iter()
            .map(|m| format!("{:<7} {}  [{}..{}]", m.network.label(), m.value, m.start, m.end))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Query every source for one address
async fn run_analyze(
    config: &Config,
    address: &str,
    no_history: bool,
    format: OutputFormat,
) -> ExitCode {
    let history = if no_history {
        None
    } else {
        match open_history(config) {
            Ok(h) => Some(h),
            Err(e) => {
                error!("Failed to open history store: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let aggregator = match Aggregator::from_config(config, EventBus::default(), history) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("Failed to create aggregator: {e}");
            return ExitCode::FAILURE;
        }
    };

    let record = aggregator.analyze(address).await;
    let code = emit(format, record.as_ref(), |record: &AnalysisRecord| {
        render_record(address, record)
    });
    if record.is_unavailable() {
        ExitCode::FAILURE
    } else {
        code
    }
}

fn render_record(address: &str, record: &AnalysisRecord) -> String {
    let view = PopoverView::from_record(address, record);
    let mut lines = vec![format!("Smart Contract  [{}]", view.network)];
    match (record.name(), record.symbol()) {
        (Some(name), Some(symbol)) => lines.push(format!("{name} ({symbol})")),
        (Some(name), None) => lines.push(name.to_string()),
        (None, Some(symbol)) => lines.push(symbol.to_string()),
        (None, None) => {}
    }
    lines.push(view.address.clone());
    match &view.body {
        PopoverBody::Ready(rows) => {
            for row in rows {
                lines.push(format!("  {:<9} {}", row.label, row.value));
            }
        }
        PopoverBody::Unavailable(msg) => lines.push(format!("  {msg}")),
        PopoverBody::Loading => {}
    }
    if let Some(url) = &view.buy_url {
        lines.push(format!("  Buy       {url}"));
    }
    for report in record.sources.iter().filter(|r| !r.ok) {
        lines.push(format!(
            "  ! {} failed: {}",
            report.source,
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }
    lines.join("\n")
}

/// Show or clear history
fn run_history(config: &Config, cmd: &HistoryCommand, format: OutputFormat) -> ExitCode {
    let history = match open_history(config) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to open history store: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cmd {
        HistoryCommand::List => match history.entries() {
            Ok(entries) => emit(format, &entries, |entries: &Vec<HistoryEntry>| {
                if entries.is_empty() {
                    return "No analyses yet.".to_string();
                }
                entries
                    .iter()
                    .map(|e| {
                        format!(
                            "{}  {:<7} {}  {}",
                            e.analysed_at.format("%Y-%m-%d %H:%M"),
                            e.network.map_or("?", |n| n.label()),
                            e.address,
                            e.symbol.as_deref().or(e.name.as_deref()).unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
            Err(e) => {
                error!("Failed to read history: {e}");
                ExitCode::FAILURE
            }
        },
        HistoryCommand::Clear => match history.clear() {
            Ok(()) => {
                println!("History cleared.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to clear history: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
