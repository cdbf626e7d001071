use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::{Parser, Subcommand};
use colored::*;
use cosmos_vm::{
    vmio::{decode_real, encode_real, ObjectFile, ObjectReader, ObjectWriter, TagNode},
    ProcessKind, ProcessOutcome, ProcessState, RunStep, Scheduler, Value, VmConfig,
};

mod demo;
mod natives;

#[derive(Parser)]
#[command(name = "cosmos")]
#[command(version, about = "Runs and inspects saved Cosmos auto tasks", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log VM activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an object file holding a sample auto task
    Demo {
        out: PathBuf,

        /// Fuel level below which the task stops
        #[arg(long, default_value_t = 50)]
        limit: i32,
    },

    /// Load an object file and run its processes
    Run {
        file: PathBuf,

        /// Print each process' context after it yields
        #[arg(long)]
        trace: bool,

        /// Number of turns; suspended processes are continued once per turn
        #[arg(long, default_value_t = 1)]
        turns: u32,

        /// Save the processes still alive afterwards
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Disassemble bytecode and list saved processes
    Dump { file: PathBuf },

    /// Convert legacy 48-bit reals
    Real {
        #[command(subcommand)]
        action: RealAction,
    },
}

#[derive(Subcommand)]
enum RealAction {
    /// Decode 12 hex digits (six bytes, file order)
    Decode { hex: String },
    /// Encode a number
    Encode {
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Demo { out, limit } => write_demo(&out, limit, &config),
        Commands::Run {
            file,
            trace,
            turns,
            save,
        } => run_file(&file, trace, turns, save.as_deref(), config),
        Commands::Dump { file } => dump_file(&file, &config),
        Commands::Real { action } => convert_real(action),
    });
    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(feature = "logging")]
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

#[cfg(not(feature = "logging"))]
fn init_logging(_verbose: bool) {}

fn load_config(path: Option<&Path>) -> Result<VmConfig, String> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir().map(|dir| dir.join("cosmos").join("config.toml")) {
            Some(path) if path.is_file() => path,
            _ => return Ok(VmConfig::default()),
        },
    };
    let text = fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    VmConfig::from_toml_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

fn read_objects(path: &Path, config: &VmConfig) -> Result<cosmos_vm::vmio::LoadedObjects, String> {
    let file = ObjectFile::read_from_file(path).map_err(|e| e.to_string())?;
    let charset = config.make_charset().map_err(|e| e.to_string())?;
    let loaded = ObjectReader::new(charset.as_ref(), config)
        .load(&file)
        .map_err(|e| e.to_string())?;
    for skipped in &loaded.report.skipped {
        println!(
            "{} skipped {:?} record {}: {}",
            "warning:".yellow().bold(),
            skipped.kind,
            skipped.index,
            skipped.reason
        );
    }
    Ok(loaded)
}

fn write_demo(out: &Path, limit: i32, config: &VmConfig) -> Result<(), String> {
    let bco = demo::fuel_watch().map_err(|e| e.to_string())?;
    let mut scheduler = Scheduler::new(config.clone());
    scheduler
        .add_named_process("Fuel watch", ProcessKind::ShipTask, bco, &[Value::Integer(limit)])
        .map_err(|e| e.to_string())?;
    save_processes(&scheduler, out, config)?;
    println!("{} {}", "Wrote".green(), out.display());
    Ok(())
}

fn save_processes(scheduler: &Scheduler, out: &Path, config: &VmConfig) -> Result<(), String> {
    let charset = config.make_charset().map_err(|e| e.to_string())?;
    let mut writer = ObjectWriter::new(charset.as_ref());
    for process in scheduler.iter() {
        writer
            .add_process(process)
            .map_err(|e| format!("process {} '{}': {}", process.id(), process.name(), e))?;
    }
    writer.finish().write_to_file(out).map_err(|e| e.to_string())
}

fn run_file(path: &Path, trace: bool, turns: u32, save: Option<&Path>, config: VmConfig) -> Result<(), String> {
    let loaded = read_objects(path, &config)?;
    let mut scheduler = Scheduler::new(config.clone());
    natives::register(scheduler.environment_mut());
    for process in loaded.processes {
        scheduler.adopt(process);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_interrupted = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("{}", "Ctrl+C received, terminating processes...".yellow());
        handler_interrupted.store(true, Ordering::SeqCst);
    }) {
        eprintln!("{} cannot install Ctrl+C handler: {}", "warning:".yellow().bold(), e);
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    'turns: for turn in 1..=turns {
        let suspended: Vec<_> = scheduler
            .iter()
            .filter(|p| p.state() == ProcessState::Suspended)
            .map(|p| p.id())
            .collect();
        for id in suspended {
            scheduler.continue_process(id).map_err(|e| e.to_string())?;
        }
        println!("{}", format!("-- turn {} --", turn).cyan());

        loop {
            if interrupted.load(Ordering::SeqCst) {
                for outcome in scheduler.terminate_all() {
                    print_outcome(&outcome);
                }
                break 'turns;
            }
            match scheduler.run_next() {
                RunStep::Finished(outcome) => print_outcome(&outcome),
                RunStep::Progress(id) => {
                    if let (true, Some(process)) = (trace, scheduler.get(id)) {
                        let context = serde_json::to_string_pretty(&process.format_context()).unwrap_or_default();
                        println!("{}", context.as_str().dimmed());
                    }
                }
                RunStep::Idle => {
                    let Some((id, key)) = scheduler.waiting().into_iter().next() else {
                        break;
                    };
                    print!("{} {} ", format!("[{}]", id).cyan(), key.0.as_str().bold());
                    io::stdout().flush().map_err(|e| e.to_string())?;
                    let mut line = String::new();
                    if input.read_line(&mut line).map_err(|e| e.to_string())? == 0 {
                        println!();
                        break 'turns;
                    }
                    scheduler
                        .resume(id, natives::parse_input(&line))
                        .map_err(|e| e.to_string())?;
                }
            }
        }
        if scheduler.is_empty() {
            break;
        }
    }

    match save {
        Some(out) => {
            save_processes(&scheduler, out, &config)?;
            println!("{} {} process(es) to {}", "Saved".green(), scheduler.len(), out.display());
        }
        None if !scheduler.is_empty() => {
            println!("{} process(es) still alive", scheduler.len());
        }
        None => {}
    }
    Ok(())
}

fn print_outcome(outcome: &ProcessOutcome) {
    let label = format!("[{}] {}", outcome.id, outcome.name);
    match outcome.state {
        ProcessState::Ended => {
            let result = outcome
                .result
                .as_ref()
                .map(|v| format!(" => {}", v.to_string(true)))
                .unwrap_or_default();
            println!("{} {}{}", label.green(), "ended".green(), result);
        }
        ProcessState::Failed => {
            let error = outcome.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
            println!("{} {} {}", label.red(), "failed:".red().bold(), error);
        }
        state => println!("{} {}", label.yellow(), state.to_string().as_str().yellow()),
    }
}

fn dump_file(path: &Path, config: &VmConfig) -> Result<(), String> {
    let loaded = read_objects(path, config)?;
    for bco in &loaded.bytecode {
        println!("{}", bco.disassemble());
    }
    for process in &loaded.processes {
        let waiting = process
            .suspension_key()
            .map(|k| format!(", waiting for {:?}", k.0))
            .unwrap_or_default();
        println!(
            "{} '{}' ({:?}, {}{})",
            "Process".bold(),
            process.name(),
            process.kind(),
            process.state(),
            waiting
        );
        for frame in process.frames().iter().rev() {
            let line = frame
                .bytecode()
                .line_for_pc(frame.pc())
                .map(|l| format!(" line {}", l))
                .unwrap_or_default();
            println!("  at {} pc {}{}", frame.bytecode().name(), frame.pc(), line);
        }
        let stack: Vec<String> = process.stack().iter().map(|v| v.to_string(true)).collect();
        println!("  stack: [{}]", stack.join(", "));
    }
    Ok(())
}

fn convert_real(action: RealAction) -> Result<(), String> {
    match action {
        RealAction::Decode { hex } => {
            let hex = hex.trim();
            if hex.len() != 12 || !hex.is_ascii() {
                return Err(format!("expected 12 hex digits, got '{}'", hex));
            }
            let mut bytes = [0u8; 6];
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16)
                    .map_err(|_| format!("invalid hex digits '{}'", &hex[2 * i..2 * i + 2]))?;
            }
            let node = TagNode::from_bytes(bytes);
            if !node.is_real() {
                return Err(format!("tag 0x{:04X} is not a real", node.tag));
            }
            println!("{}", decode_real(node));
        }
        RealAction::Encode { value } => {
            let hex: Vec<String> = encode_real(value).to_bytes().iter().map(|b| format!("{:02X}", b)).collect();
            println!("{}", hex.join(""));
        }
    }
    Ok(())
}
