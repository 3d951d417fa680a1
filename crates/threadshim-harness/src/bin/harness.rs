//! CLI entrypoint for the threadshim conformance harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use threadshim_harness::report::{LOG_FILE, SUITE};
use threadshim_harness::structured_log::{LogEmitter, validate_log_file};
use threadshim_harness::{ConformanceReport, ConformanceRunner, Property};

/// Conformance tooling for threadshim.
#[derive(Debug, Parser)]
#[command(name = "threadshim-harness")]
#[command(about = "Conformance harness for the threadshim primitives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check every primitive's contract on the compiled backend.
    Conformance {
        /// Directory for the run log, report and artifact index.
        #[arg(long, default_value = "target/conformance")]
        out_dir: PathBuf,
        /// Contending threads per property.
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Run identifier (defaults to `<unix-seconds>-<pid>`).
        #[arg(long)]
        run_id: Option<String>,
        /// Only run these properties (repeatable).
        #[arg(long = "property")]
        properties: Vec<String>,
    },
    /// Validate a structured JSONL run log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// Print backend and host identity as JSON.
    Hostinfo,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Conformance {
            out_dir,
            threads,
            run_id,
            properties,
        } => {
            let selected = if properties.is_empty() {
                Property::ALL.to_vec()
            } else {
                properties
                    .iter()
                    .map(|name| {
                        Property::from_name(name).ok_or_else(|| format!("unknown property: {name}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };
            let run_id = run_id.unwrap_or_else(default_run_id);

            std::fs::create_dir_all(&out_dir)?;
            let log_path = out_dir.join(LOG_FILE);
            let mut emitter = LogEmitter::to_file(&log_path, SUITE, &run_id)?;
            let runner = ConformanceRunner::new(threads, &out_dir);
            eprintln!(
                "Running {} properties on backend {} with {} threads",
                selected.len(),
                threadshim_core::backend_name(),
                runner.threads()
            );
            let results = runner.run(&selected, &mut emitter)?;
            drop(emitter);

            let report = ConformanceReport::new(&run_id, runner.threads(), results);
            for r in &report.results {
                match &r.message {
                    Some(msg) => eprintln!("  FAIL {:<28} {msg}", r.property.name()),
                    None => eprintln!("  ok   {:<28} {}ms", r.property.name(), r.duration_ms),
                }
            }
            for path in report.write_artifacts(&out_dir, &log_path)? {
                eprintln!("Wrote {}", path.display());
            }
            if !report.all_passed() {
                return Err(format!(
                    "{} of {} properties failed",
                    report.failed,
                    report.results.len()
                )
                .into());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{}: {} errors in {lines} lines",
                    log.display(),
                    errors.len()
                )
                .into());
            }
            eprintln!("{}: {lines} lines valid", log.display());
        }
        Command::Hostinfo => {
            let (now, zone) = threadshim_core::compat::gettimeofday()?;
            let info = serde_json::json!({
                "backend": threadshim_core::backend_name(),
                "hostname": threadshim_core::compat::hostname(),
                "pid": threadshim_core::process_self().as_u64(),
                "thread": threadshim_core::thread_self().as_u64(),
                "unix_micros": now.as_micros(),
                "minutes_west": zone.minutes_west,
                "dst": zone.dst_time,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

fn default_run_id() -> String {
    let secs = threadshim_core::compat::gettimeofday()
        .map(|(tv, _)| tv.sec)
        .unwrap_or_default();
    format!("{secs}-{}", threadshim_core::process_self())
}
