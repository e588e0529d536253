use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;
use std::path::Path;

use pcap_threatscan::{
    analysis::AnalysisResult,
    service::{AnalysisService, UploadRequest},
    storage::{Feedback, ReportType},
    utils::format_timestamp,
    Config,
};

fn cli() -> Command {
    Command::new("pcap-threatscan")
        .version("0.1.0")
        .about("Capture-file traffic analysis with flood and scan heuristics")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/default.json")
                .global(true)
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("analyze")
                .about("Analyze a libpcap capture file")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("PCAP")
                        .help("Capture file to analyze")
                        .required(true)
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the full result as JSON")
                        .action(ArgAction::SetTrue)
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("N")
                        .help("Decoder threads (overrides configuration)")
                        .value_parser(clap::value_parser!(usize))
                )
                .arg(
                    Arg::new("user")
                        .short('u')
                        .long("user")
                        .value_name("ID")
                        .help("Save the result as a report owned by this user")
                )
                .arg(
                    Arg::new("save")
                        .long("save")
                        .value_name("NAME")
                        .help("Report name")
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("TYPE")
                        .help("Report type: PDF, JSON or CSV")
                        .default_value("JSON")
                )
        )
        .subcommand(
            Command::new("reports")
                .about("Manage saved reports")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List reports for a user, newest first")
                        .arg(Arg::new("user").short('u').long("user").value_name("ID").required(true))
                )
                .subcommand(
                    Command::new("show")
                        .about("Print one report as JSON")
                        .arg(Arg::new("id").long("id").value_name("ID").required(true))
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete one report")
                        .arg(Arg::new("id").long("id").value_name("ID").required(true))
                )
        )
        .subcommand(
            Command::new("feedback")
                .about("Submit feedback")
                .arg(Arg::new("name").long("name").value_name("NAME").required(true))
                .arg(Arg::new("email").long("email").value_name("EMAIL").required(true))
                .arg(Arg::new("message").long("message").value_name("TEXT").required(true))
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.json");
    let config = if Path::new(config_path).exists() {
        Config::from_file(config_path).with_context(|| format!("loading {}", config_path))?
    } else {
        Config::default()
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str())).init();
    if !Path::new(config_path).exists() {
        info!("Config file {} not found, using defaults", config_path);
    }

    match matches.subcommand() {
        Some(("analyze", sub_matches)) => run_analyze(sub_matches, config).await,
        Some(("reports", sub_matches)) => run_reports(sub_matches, &config),
        Some(("feedback", sub_matches)) => run_feedback(sub_matches, &config).await,
        _ => unreachable!("subcommand is required"),
    }
}

async fn run_analyze(matches: &ArgMatches, mut config: Config) -> anyhow::Result<()> {
    let file = matches.get_one::<String>("file").context("missing --file")?;
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.analysis.workers = *workers;
    }
    let report_type: ReportType = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("JSON")
        .parse()?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading capture {}", file))?;

    let service = AnalysisService::from_config(&config)?;
    let request = UploadRequest {
        user_id: matches.get_one::<String>("user").cloned(),
        report_name: matches.get_one::<String>("save").cloned(),
        report_type,
        // One-shot runs keep nothing on disk.
        retain: false,
        ..UploadRequest::new(file.as_str())
    };

    let outcome = service
        .analyze_upload(bytes, request)
        .await
        .with_context(|| format!("analyzing {}", file))?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    } else {
        print_summary(&outcome.result);
    }

    if let Some(id) = &outcome.report_id {
        println!("\nReport saved: {}", id);
    }

    Ok(())
}

fn run_reports(matches: &ArgMatches, config: &Config) -> anyhow::Result<()> {
    if config.storage.reports_dir.is_none() {
        log::warn!("No reports_dir configured; reports are not persisted between runs");
    }
    let service = AnalysisService::from_config(config)?;
    let store = service.reports().context("no report store configured")?;

    match matches.subcommand() {
        Some(("list", sub)) => {
            let user = sub.get_one::<String>("user").context("missing --user")?;
            let reports = store.list_by_user(user)?;
            if reports.is_empty() {
                println!("No reports for {}", user);
            }
            for report in reports {
                println!(
                    "{}  {}  {}  {}  ({} packets, {} threats)",
                    report.id,
                    format_timestamp(&report.created_at),
                    report.report_type,
                    report.report_name,
                    report.data.total_packets,
                    report.data.threats.len()
                );
            }
        }
        Some(("show", sub)) => {
            let id = sub.get_one::<String>("id").context("missing --id")?;
            let report = store
                .get(id)?
                .with_context(|| format!("report {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(("delete", sub)) => {
            let id = sub.get_one::<String>("id").context("missing --id")?;
            if store.delete(id)? {
                println!("Deleted report {}", id);
            } else {
                anyhow::bail!("report {} not found", id);
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

async fn run_feedback(matches: &ArgMatches, config: &Config) -> anyhow::Result<()> {
    let service = AnalysisService::from_config(config)?;
    let feedback = Feedback {
        name: matches.get_one::<String>("name").cloned().unwrap_or_default(),
        email: matches.get_one::<String>("email").cloned().unwrap_or_default(),
        message: matches.get_one::<String>("message").cloned().unwrap_or_default(),
    };
    service.submit_feedback(feedback).await?;
    println!("Thank you for your feedback.");
    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    println!("\n=== CAPTURE ANALYSIS ===");
    println!("Completed: {}", format_timestamp(&result.timestamp));
    println!("Total frames: {}", result.total_packets);
    println!("IPv4 packets: {}", result.packet_details.len());
    println!("Skipped frames: {}", result.skipped_frames());

    println!("\n--- Protocol Distribution ---");
    for (protocol, count) in result.protocol_distribution() {
        println!("{}: {}", protocol, count);
    }

    println!("\n--- Threats ---");
    if result.threats.is_empty() {
        println!("None detected");
    }
    for threat in &result.threats {
        println!("[{}] {}", threat.kind, threat.description);
    }
}
