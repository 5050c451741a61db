//! LS-8 Emulator - CLI Entry Point
//!
//! Commands:
//! - `ls8-emu run <program>` - Run a program image (`.ls8`) or assembly (`.asm`)
//! - `ls8-emu debug <program>` - Interactive debugger
//! - `ls8-emu asm <source>` - Assemble to a program image
//! - `ls8-emu disasm <program>` - Disassemble a program image
//!
//! Exit codes: 0 on HLT, 1 on a fatal CPU error, 2 if the program or
//! configuration cannot be loaded.

use std::io::Write;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use ls8::{CmpMode, Cpu, MachineConfig};

/// Exit code for a fatal error during execution.
const EXIT_FATAL: u8 = 1;
/// Exit code for a program or config that could not be loaded.
const EXIT_LOAD: u8 = 2;

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(version)]
#[command(about = "An emulator for the LS-8, a small 8-bit register machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program image or ASM file to execute
        program: String,
        #[command(flatten)]
        machine: MachineArgs,
        /// Print a trace line to stderr before each instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON to stderr
        #[arg(long)]
        dump_state: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program image or ASM file to debug
        program: String,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Assemble source to a program image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file (default: source with .ls8 extension)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a program image to readable text
    Disasm {
        /// Path to the program image or ASM file
        program: String,
    },
}

/// Machine options shared by `run` and `debug`.
#[derive(Args)]
struct MachineArgs {
    /// JSON machine configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Memory size in bytes (1-256)
    #[arg(long)]
    memory_size: Option<usize>,
    /// Maximum number of instructions to run
    #[arg(short, long)]
    max_cycles: Option<u64>,
    /// Reproduce the original CMP behavior, which never sets G
    #[arg(long)]
    legacy_cmp: bool,
}

impl MachineArgs {
    /// Build the machine config: file first, then flag overrides.
    fn resolve(&self) -> Result<MachineConfig, ls8::ConfigError> {
        let mut config = match &self.config {
            Some(path) => MachineConfig::from_json_file(path)?,
            None => MachineConfig::default(),
        };
        if let Some(size) = self.memory_size {
            config.memory_size = size;
        }
        if self.max_cycles.is_some() {
            config.max_cycles = self.max_cycles;
        }
        if self.legacy_cmp {
            config.cmp_mode = CmpMode::Legacy;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    // RUST_LOG overrides the default level
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Warn).env().init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, machine, trace, dump_state }) => {
            run_program(&program, &machine, trace, dump_state)
        }
        Some(Commands::Debug { program, machine }) => {
            debug_program(&program, &machine)
        }
        Some(Commands::Asm { source, output }) => {
            assemble_file(&source, output)
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program)
        }
        None => {
            println!("LS-8 Emulator v{}", env!("CARGO_PKG_VERSION"));
            println!("An emulator for the LS-8 8-bit register machine");
            println!();
            println!("Use --help for available commands");
            ExitCode::SUCCESS
        }
    }
}

/// Load the program and machine config, or report why not.
fn prepare(path: &str, machine: &MachineArgs) -> Result<(Vec<u8>, MachineConfig), ExitCode> {
    let config = machine.resolve().map_err(|e| {
        eprintln!("Config error: {}", e);
        ExitCode::from(EXIT_LOAD)
    })?;

    let program = ls8::load_program(path).map_err(|e| {
        eprintln!("Failed to load {}: {}", path, e);
        ExitCode::from(EXIT_LOAD)
    })?;

    if program.len() > config.memory_size {
        eprintln!(
            "Failed to load {}: program size {} exceeds memory size {}",
            path,
            program.len(),
            config.memory_size
        );
        return Err(ExitCode::from(EXIT_LOAD));
    }

    log::info!("{}: {} bytes", path, program.len());
    Ok((program, config))
}

fn run_program(path: &str, machine: &MachineArgs, trace: bool, dump_state: bool) -> ExitCode {
    let (program, config) = match prepare(path, machine) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let mut cpu = match Cpu::with_config(&config) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::from(EXIT_LOAD);
        }
    };
    if let Err(e) = cpu.load_program(&program) {
        eprintln!("Failed to load {}: {}", path, e);
        return ExitCode::from(EXIT_LOAD);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let limit = config.max_cycles.unwrap_or(u64::MAX);

    let mut result = Ok(());
    while cpu.is_running() && cpu.cycles < limit {
        if trace {
            eprintln!("{}", cpu.trace());
        }
        if let Err(e) = cpu.step(&mut out) {
            result = Err(e);
            break;
        }
    }
    let flushed = out.flush();

    if dump_state {
        match serde_json::to_string_pretty(&cpu) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Failed to serialize state: {}", e),
        }
    }

    if let Err(e) = result {
        eprintln!("{} (PC={:02X}, cycle {})", e, cpu.regs.pc, cpu.cycles);
        return ExitCode::from(EXIT_FATAL);
    }

    // PRN output that never reached stdout is a failed run
    if let Err(e) = flushed {
        eprintln!("Failed to write output: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    if cpu.is_running() {
        eprintln!("Reached max cycles limit ({}) without halting", limit);
        return ExitCode::from(EXIT_FATAL);
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, machine: &MachineArgs) -> ExitCode {
    let (program, config) = match prepare(path, machine) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    if let Err(e) = ls8::run_debugger(program, config) {
        eprintln!("Debugger error: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }
    ExitCode::SUCCESS
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _machine: &MachineArgs) -> ExitCode {
    eprintln!("This build does not include the debugger (enable the `tui` feature)");
    ExitCode::from(EXIT_FATAL)
}

fn assemble_file(source_path: &str, output: Option<String>) -> ExitCode {
    let out_path = output.unwrap_or_else(|| {
        std::path::Path::new(source_path)
            .with_extension("ls8")
            .display()
            .to_string()
    });

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", source_path, e);
            return ExitCode::from(EXIT_LOAD);
        }
    };

    let bytes = match ls8::assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Assembly error: {}", e);
            return ExitCode::from(EXIT_LOAD);
        }
    };

    if let Err(e) = ls8::save_image(&out_path, &bytes) {
        eprintln!("Failed to save {}: {}", out_path, e);
        return ExitCode::from(EXIT_FATAL);
    }

    println!("Assembled {} bytes: {} -> {}", bytes.len(), source_path, out_path);
    ExitCode::SUCCESS
}

fn disassemble_file(path: &str) -> ExitCode {
    match ls8::load_program(path) {
        Ok(bytes) => {
            print!("{}", ls8::disassemble(&bytes));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to load {}: {}", path, e);
            ExitCode::from(EXIT_LOAD)
        }
    }
}
