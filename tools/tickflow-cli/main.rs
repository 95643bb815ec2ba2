use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::time::Instant;
use tickflow::bytecode::visualizer::disassemble_scpi;
use tickflow::prelude::*;

// --- JSON Deserialization Structs (Input Format Specific) ---
// Canned instrument responses, keyed by the exact command or query text.

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Text(String),
    Detailed {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        blob: Option<Vec<u8>>,
    },
}

impl RawResponse {
    fn into_response(self) -> ScpiResponse {
        match self {
            RawResponse::Text(text) => ScpiResponse::text(text),
            RawResponse::Detailed {
                error: Some(message),
                ..
            } => ScpiResponse::error(message),
            RawResponse::Detailed {
                blob: Some(bytes), ..
            } => ScpiResponse::blob(bytes),
            RawResponse::Detailed { text, .. } => {
                text.map_or_else(ScpiResponse::empty, ScpiResponse::text)
            }
        }
    }
}

/// Runs flow assets headlessly against a scripted instrument
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the flow assets (`.json`, or the binary form written by `--save`)
    assets_path: String,

    /// Index of the flow to start
    #[arg(short, long, default_value_t = 0)]
    flow: usize,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 10)]
    ticks: u64,

    /// Milliseconds of host clock between ticks
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// JSON object mapping command/query text to canned responses
    #[arg(short, long)]
    responses: Option<String>,

    /// Engine configuration JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Write the assets in binary form to this path and exit
    #[arg(long)]
    save: Option<String>,

    /// Print the instruction listing of every SCPI component and exit
    #[arg(short, long)]
    disassemble: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let assets = FlowAssets::from_file(&cli.assets_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to load assets from '{}': {}",
            cli.assets_path, e
        ))
    });

    if cli.disassemble {
        print_listings(&assets);
        return;
    }

    if let Some(path) = &cli.save {
        assets
            .save(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to save assets: {}", e)));
        println!("Saved {} flow(s) to '{}'", assets.flows.len(), path);
        return;
    }

    run(cli, assets);
}

fn run(cli: Cli, assets: FlowAssets) {
    let config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to read config file '{}': {}", path, e))
            });
            EngineConfig::from_json_str(&json)
                .unwrap_or_else(|e| exit_with_error(&format!("Invalid configuration: {}", e)))
        }
        None => EngineConfig::default(),
    };

    let mut host = ScriptedHost::new();
    if let Some(path) = &cli.responses {
        let json = fs::read_to_string(path).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to read responses file '{}': {}", path, e))
        });
        let raw: BTreeMap<String, RawResponse> = serde_json::from_str(&json)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse responses JSON: {}", e)));
        for (text, response) in raw {
            host = host.with_response(text, response.into_response());
        }
    }

    let mut engine = FlowEngine::builder(assets)
        .with_config(config)
        .with_host(host)
        .with_debugger(JsonLinesDebugger::new(io::stdout()))
        .build()
        .unwrap_or_else(|e| exit_with_error(&format!("Invalid configuration: {}", e)));

    let page = engine
        .start_flow(cli.flow)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to start flow: {}", e)));

    let mut ui = HeadlessUi::new();
    let start = Instant::now();
    let mut executed = 0;
    for tick in 0..cli.ticks {
        let report = engine.tick(tick * cli.tick_ms, &mut ui);
        executed += report.executed;
    }
    let duration = start.elapsed();

    let errors = engine.drain_errors();
    println!("\n--- Run Summary ---");
    println!("Ticks:                {}", cli.ticks);
    println!("Component Executions: {}", executed);
    println!("Errors:               {}", errors.len());
    for error in &errors {
        println!("  -> {}", error);
    }

    println!("\n--- Globals ---");
    for (index, value) in engine.assets().globals.iter().enumerate() {
        let current = engine.global(index as u16).unwrap_or(value);
        println!("  ${:<3} = {}", index, current);
    }
    if let Some(state) = engine.flow_state(page) {
        println!("\n--- Locals of flow state {} ---", page);
        for (index, value) in state.locals.iter().enumerate() {
            println!("  #{:<3} = {}", index, value);
        }
    }
    println!("\nTotal Execution:      {:?}", duration);
}

fn print_listings(assets: &FlowAssets) {
    for (flow_index, flow) in assets.flows.iter().enumerate() {
        for (index, component) in flow.components.iter().enumerate() {
            let ComponentKind::Scpi(scpi) = &component.kind else {
                continue;
            };
            println!("--- Flow #{} '{}', component #{} ---", flow_index, flow.name, index);
            match disassemble_scpi(&scpi.instructions) {
                Ok(listing) => println!("{}", listing),
                Err(e) => println!("<invalid instruction stream: {}>", e),
            }
        }
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
