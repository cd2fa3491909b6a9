use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nocs::{BlockInstance, RecordingSink, SchemaRegistry, TracingLog};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Emit {
    /// Register writes issued by `--set` requests
    Writes,
    /// Resolved block schema
    Schema,
    /// Resolved port attributes
    Ports,
    /// Committed argument values
    Args,
}

#[derive(Parser, Debug)]
#[command(
    name = "nocs",
    version,
    about = "NocScript block engine — validates block arguments and prints the register writes they imply"
)]
struct Cli {
    /// Block descriptor files (.json)
    descriptors: Vec<PathBuf>,

    /// Directory of block descriptors (repeatable)
    #[arg(long)]
    blocks_dir: Vec<PathBuf>,

    /// Block to instantiate, by name (optional when only one is loaded)
    #[arg(long)]
    block: Option<String>,

    /// Argument assignment `name=value` (repeatable, applied in order)
    #[arg(long = "set", value_parser = parse_assignment)]
    sets: Vec<(String, String)>,

    /// What to print
    #[arg(long, value_enum, default_value_t = Emit::Writes)]
    emit: Emit,

    /// Make the recording sink fail after accepting N writes (defaults included)
    #[arg(long, value_name = "N")]
    fail_after: Option<usize>,

    /// Print load and set progress
    #[arg(long)]
    verbose: bool,
}

fn parse_assignment(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{}'", text)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "nocs=debug" } else { "nocs=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ── Load descriptors ──
    let mut registry = SchemaRegistry::new();
    for dir in &cli.blocks_dir {
        match registry.load_dir(dir) {
            Ok(n) => {
                if cli.verbose {
                    eprintln!("nocs: loaded {} descriptors from {}", n, dir.display());
                }
            }
            Err(e) => {
                eprintln!("nocs: error: {}", e);
                std::process::exit(2);
            }
        }
    }
    for path in &cli.descriptors {
        if let Err(e) = registry.load_descriptor(path) {
            eprintln!("nocs: error: {}", e);
            std::process::exit(2);
        }
    }

    // ── Pick the block ──
    let schema = match &cli.block {
        Some(name) => registry.lookup_name(name).cloned(),
        None if registry.len() == 1 => registry.schemas().next().cloned(),
        None => None,
    };
    let Some(schema) = schema else {
        let mut names: Vec<&str> = registry.schemas().map(|s| s.name()).collect();
        names.sort_unstable();
        match &cli.block {
            Some(name) => eprintln!("nocs: error: unknown block '{}'", name),
            None => eprintln!("nocs: error: choose a block with --block"),
        }
        eprintln!("nocs: loaded blocks: {}", names.join(", "));
        std::process::exit(2);
    };

    if let Emit::Schema = cli.emit {
        print!("{}", schema);
        return;
    }

    // ── Instantiate ──
    let mut sink = RecordingSink::new();
    if let Some(n) = cli.fail_after {
        sink = sink.fail_after(n);
    }
    let journal = sink.journal();
    let instance_id = schema.instance_id(0, 0);
    let block = match BlockInstance::new(schema, instance_id, Box::new(sink), Arc::new(TracingLog)) {
        Ok(block) => block,
        Err(e) => {
            eprintln!("nocs: error: {}", e);
            std::process::exit(1);
        }
    };
    let defaults = journal.take();
    if cli.verbose {
        eprintln!("nocs: {} initialized with {} write(s)", block.name(), defaults.len());
    }

    // ── Apply assignments ──
    let mut failed = false;
    for (name, value) in &cli.sets {
        match block.set_arg_str(name, value) {
            Ok(report) => {
                if cli.verbose {
                    eprintln!("nocs: {} = {}: {} write(s)", name, report.value, report.writes.len());
                }
            }
            Err(e) => {
                eprintln!("nocs: error: {}", e);
                failed = true;
                break;
            }
        }
    }

    match cli.emit {
        Emit::Writes => {
            for write in journal.take() {
                println!("{:#06x}  {}", write.address, write);
            }
        }
        Emit::Ports => match block.ports() {
            Ok(ports) => {
                for port in ports {
                    println!("{}", port);
                }
            }
            Err(e) => {
                eprintln!("nocs: error: {}", e);
                failed = true;
            }
        },
        Emit::Args => {
            for (name, value) in block.args() {
                println!("{} = {}", name, value);
            }
        }
        Emit::Schema => {}
    }

    if failed {
        std::process::exit(1);
    }
}
