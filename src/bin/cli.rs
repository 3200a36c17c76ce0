use anyhow::{bail, Context, Result};
use seistamp::ntp::{ClockSync, ReferenceServer, DEFAULT_NTP_PORT};
use seistamp::sei::{decode_record, extract_payload, nal_units, start_code_offsets, TimestampRecord};
use seistamp::SeiStampConfig;
use serde::Serialize;
use std::env;
use std::time::Duration;

const USAGE: &str = "Usage: seistamp-cli <command> [args]

Commands:
  sync <host> [--port N] [--timeout-ms N] [--json]
  serve [--bind ADDR] [--skew-ms N]
  inspect <file.h264> [--json]
  config [--path P]";

fn main() -> Result<()> {
    seistamp::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "sync" => cmd_sync(&args),
        "serve" => cmd_serve(&args),
        "inspect" => cmd_inspect(&args),
        "config" => cmd_config(&args),
        "--version" | "version" => {
            println!("{} {}", seistamp::NAME, seistamp::VERSION);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => match args.get(i + 1) {
            Some(value) => Ok(Some(value.as_str())),
            None => bail!("{} requires a value", flag),
        },
        None => Ok(None),
    }
}

/// First argument after the command that is neither a flag nor a flag value
fn positional(args: &[String]) -> Option<&str> {
    let mut i = 2;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--json" {
            i += 1;
        } else if arg.starts_with("--") {
            i += 2;
        } else {
            return Some(arg);
        }
    }
    None
}

#[derive(Serialize)]
struct SyncReport {
    server: String,
    port: u16,
    offset_ns: i64,
    delay_ns: i64,
    reference_time: Option<String>,
}

fn cmd_sync(args: &[String]) -> Result<()> {
    let Some(host) = positional(args) else {
        eprintln!("Usage: seistamp-cli sync <host> [--port N] [--timeout-ms N] [--json]");
        std::process::exit(1);
    };
    let port = match flag_value(args, "--port")? {
        Some(p) => p.parse().context("invalid --port")?,
        None => DEFAULT_NTP_PORT,
    };
    let timeout_ms: u64 = match flag_value(args, "--timeout-ms")? {
        Some(t) => t.parse().context("invalid --timeout-ms")?,
        None => 5000,
    };

    let mut engine =
        ClockSync::configure(host, port)?.with_timeout(Duration::from_millis(timeout_ms));
    let sample = engine.synchronize()?;
    let now = engine.current_time()?;

    let report = SyncReport {
        server: host.to_string(),
        port,
        offset_ns: sample.offset_ns,
        delay_ns: sample.delay_ns,
        reference_time: now.to_datetime().map(|dt| dt.to_rfc3339()),
    };

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("Server:    {}:{}", report.server, report.port);
        println!("Offset:    {:.3} ms", report.offset_ns as f64 / 1e6);
        println!("Delay:     {:.3} ms", report.delay_ns as f64 / 1e6);
        if let Some(time) = &report.reference_time {
            println!("Reference: {}", time);
        }
    }
    Ok(())
}

fn cmd_serve(args: &[String]) -> Result<()> {
    let bind = flag_value(args, "--bind")?.unwrap_or("0.0.0.0:123").to_string();
    let skew_ms: i64 = match flag_value(args, "--skew-ms")? {
        Some(s) => s.parse().context("invalid --skew-ms")?,
        None => 0,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .context("failed to install Ctrl-C handler")?;

    let served = runtime.block_on(async move {
        let server = ReferenceServer::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {}", bind))?
            .with_skew(skew_ms * 1_000_000);
        println!("Serving reference time on {} (Ctrl-C to stop)", server.local_addr()?);
        Ok::<_, anyhow::Error>(server.run(shutdown_rx).await?)
    })?;

    println!("Served {} requests", served);
    Ok(())
}

#[derive(Serialize)]
struct FoundRecord {
    offset: usize,
    #[serde(flatten)]
    record: TimestampRecord,
    reference_ns: i64,
    reference_time: Option<String>,
}

#[derive(Serialize)]
struct InspectReport {
    bytes: usize,
    nal_units: usize,
    records: Vec<FoundRecord>,
}

fn scan_records(data: &[u8]) -> Vec<FoundRecord> {
    start_code_offsets(data)
        .into_iter()
        .filter_map(|offset| {
            let sei = extract_payload(&data[offset..]).ok()?;
            let record = decode_record(sei.data, true)?;
            Some(FoundRecord {
                offset,
                record,
                reference_ns: record.reference_ns(),
                reference_time: record.time.to_datetime().map(|dt| dt.to_rfc3339()),
            })
        })
        .collect()
}

fn cmd_inspect(args: &[String]) -> Result<()> {
    let Some(path) = positional(args) else {
        eprintln!("Usage: seistamp-cli inspect <file.h264> [--json]");
        std::process::exit(1);
    };
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path))?;

    let report = InspectReport {
        bytes: data.len(),
        nal_units: nal_units(&data).len(),
        records: scan_records(&data),
    };

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!("{}: {} bytes, {} NAL units", path, report.bytes, report.nal_units);
    if report.records.is_empty() {
        println!("No timestamp records found");
    }
    for found in &report.records {
        println!(
            "@{:>10}  pts {:>14} ns  reference {}",
            found.offset,
            found.record.capture_pts,
            found.reference_time.as_deref().unwrap_or("<out of range>")
        );
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> Result<()> {
    let path = match flag_value(args, "--path")? {
        Some(p) => p.into(),
        None => SeiStampConfig::default_path(),
    };
    let config = SeiStampConfig::load_layered(&path)?;
    println!("# effective configuration ({})", path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
