use clap::Parser;
use script_core::{render_value, CacheError, ScriptingSubsystem, SubsystemMode};
use serde::Serialize;
use std::io::{self, Read};

/// Compile and run a script body against the demo scripting engine, then
/// emit a JSON execution report.
#[derive(Parser, Debug)]
#[command(name = "script-cli", about = "Compile and run a script against the demo scripting engine")]
struct Args {
    /// Read the script body from a file instead of stdin.
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Comma-separated KEYS passed to the script.
    #[arg(long)]
    keys: Option<String>,

    /// Comma-separated ARGV passed to the script.
    #[arg(long, name = "args")]
    argv: Option<String>,

    /// Pin the script as if loaded via `SCRIPT LOAD` instead of `EVAL`.
    #[arg(long)]
    script_load: bool,
}

#[derive(Serialize)]
struct ExecutionReport {
    digest: String,
    engine: String,
    pinned: bool,
    result: Option<String>,
    error: Option<String>,
    elapsed_ms: f64,
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(s) if !s.is_empty() => s.split(',').map(|part| part.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let body = if let Some(path) = args.file {
        std::fs::read(&path).unwrap_or_else(|e| {
            eprintln!("Error reading file: {e}");
            std::process::exit(1);
        })
    } else {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf).unwrap_or_else(|e| {
            eprintln!("Error reading stdin: {e}");
            std::process::exit(1);
        });
        buf
    };

    let keys = split_csv(args.keys);
    let argv = split_csv(args.argv);

    let subsystem = ScriptingSubsystem::with_demo_engine();

    let report = match subsystem.cache.compile_and_store(&subsystem.registry, &body, SubsystemMode::AdHoc, args.script_load) {
        Ok(digest) => {
            let info = subsystem.cache.show(&digest).expect("just-stored entry is present");
            let start = std::time::Instant::now();
            let run_result = subsystem.cache.run(&subsystem.registry, &digest, &keys, &argv);
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            match run_result {
                Ok(value) => ExecutionReport {
                    digest: digest.to_string(),
                    engine: info.engine_name,
                    pinned: info.pinned,
                    result: Some(render_value(&value)),
                    error: None,
                    elapsed_ms,
                },
                Err(e) => ExecutionReport {
                    digest: digest.to_string(),
                    engine: info.engine_name,
                    pinned: info.pinned,
                    result: None,
                    error: Some(render_cache_error(&e)),
                    elapsed_ms,
                },
            }
        }
        Err(e) => ExecutionReport {
            digest: String::new(),
            engine: String::new(),
            pinned: false,
            result: None,
            error: Some(render_cache_error(&e)),
            elapsed_ms: 0.0,
        },
    };

    let json = serde_json::to_string(&report).expect("ExecutionReport is always serializable");
    println!("{json}");
}

fn render_cache_error(e: &CacheError) -> String {
    e.to_string()
}
