use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use heimdall_core::package::{Manifest, normalize_package_path};
use heimdall_core::{
    AdbCommand, FrontendConfig, FrontendSession, SystemProcess, TerminalOutcome, ToolEvent,
    ToolObserver, TracingObserver, build_package, read_pit_file,
};
use tracing::{error, info};

const POLL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "Frontend for the Heimdall Samsung flashing tool", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging and pass --verbose to Heimdall
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Resume a session left open by a previous --no-reboot run
    #[arg(long, global = true)]
    resume: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a local PIT file
    Pit { file: PathBuf },
    /// Show the contents of a firmware package
    Inspect { package: PathBuf },
    /// Build a package from a manifest whose paths point at local files
    Package {
        manifest: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Map loose images onto a PIT and write a package
    Convert {
        #[arg(long)]
        pit: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Flash a firmware package
    Flash {
        package: PathBuf,
        /// Flash against this PIT instead of the packaged one
        #[arg(long)]
        pit: Option<PathBuf>,
        /// Leave the device in download mode afterwards
        #[arg(long)]
        no_reboot: bool,
    },
    /// Check whether a device in download mode is connected
    Detect,
    /// Close the PC screen on the device
    ClosePcScreen,
    /// Save the device's PIT to a file
    DownloadPit {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the device's PIT, or a local PIT through Heimdall
    PrintPit {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Run a device utility command
    Adb {
        #[command(subcommand)]
        action: AdbAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdbAction {
    RebootRecovery,
    RebootDownload,
    RebootFastboot,
    Shutdown,
    Devices,
    Ls,
    Logcat {
        #[arg(long)]
        lines: Option<u32>,
    },
    CheckRoot,
    Install { apk: PathBuf },
    Getprop,
    /// Arbitrary adb arguments
    Custom {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl AdbAction {
    fn into_command(self, config: &FrontendConfig) -> Option<AdbCommand> {
        Some(match self {
            AdbAction::RebootRecovery => AdbCommand::RebootRecovery,
            AdbAction::RebootDownload => AdbCommand::RebootDownload,
            AdbAction::RebootFastboot => AdbCommand::RebootFastboot,
            AdbAction::Shutdown => AdbCommand::Shutdown,
            AdbAction::Devices => AdbCommand::Devices,
            AdbAction::Ls => AdbCommand::ShellLsRoot,
            AdbAction::Logcat { lines } => AdbCommand::Logcat {
                lines: lines.unwrap_or(config.logcat_lines),
            },
            AdbAction::CheckRoot => AdbCommand::CheckRoot,
            AdbAction::Install { apk } => AdbCommand::Install(apk),
            AdbAction::Getprop => AdbCommand::GetProp,
            AdbAction::Custom { args } => return AdbCommand::custom(&args.join(" ")),
        })
    }
}

/// Prints tool output to stdout and logs everything else.
struct ConsoleObserver;

impl ToolObserver for ConsoleObserver {
    fn on_event(&self, event: &ToolEvent) {
        match event {
            ToolEvent::Output { text } | ToolEvent::AdbOutput { text } => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            ToolEvent::Progress { .. } => {}
            other => TracingObserver.on_event(other),
        }
    }
}

type Session = FrontendSession<ConsoleObserver>;

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => FrontendConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => FrontendConfig::default(),
    };
    config.verbose |= args.verbose;
    config.resume |= args.resume;

    let mut session: Session = FrontendSession::with_processes(
        config,
        Arc::new(ConsoleObserver),
        Box::new(SystemProcess::new()),
        Box::new(SystemProcess::new()),
    );

    match args.command {
        Command::Pit { file } => {
            let pit = read_pit_file(&file)?;
            print!("{}", pit);
        }
        Command::Inspect { package } => {
            let firmware = session.load_package(&package)?;
            println!("Name:       {}", firmware.name);
            println!("Version:    {}", firmware.version);
            println!("Platform:   {}", firmware.platform);
            println!("Developers: {}", firmware.developers.join(", "));
            for device in &firmware.devices {
                println!("Device:     {}", device);
            }
            println!("PIT:        {}", firmware.pit_filename.display());
            println!("Repartition: {}", firmware.repartition);
            for file in &firmware.files {
                println!("  [{}] {}", file.partition_id, file.filename.display());
            }
        }
        Command::Package { manifest, output } => {
            let text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("reading {}", manifest.display()))?;
            let firmware = Manifest::from_toml(&text)?.firmware;
            let missing = firmware.missing_package_fields();
            if !missing.is_empty() {
                bail!("Firmware is missing: {}", missing.join(", "));
            }
            let pit = read_pit_file(&firmware.pit_filename)?;
            firmware.check_ready_to_flash(&pit)?;

            let output = normalize_package_path(&output);
            build_package(&output, &firmware)?;
            info!("Package written to {}", output.display());
        }
        Command::Convert { pit, output, files } => {
            let written = session.quick_convert(&pit, &files, &output)?;
            info!("Package written to {}", written.display());
        }
        Command::Flash {
            package,
            pit,
            no_reboot,
        } => {
            session.load_package(&package)?;
            session.load_for_flash()?;
            if let Some(pit) = pit {
                session.select_pit(&pit)?;
            }
            if no_reboot {
                session.working_firmware_mut()?.no_reboot = true;
            }
            session.start_flash()?;
            finish_tool(&mut session)?;
        }
        Command::Detect => {
            session.detect_device()?;
            finish_tool(&mut session)?;
        }
        Command::ClosePcScreen => {
            session.close_pc_screen()?;
            finish_tool(&mut session)?;
        }
        Command::DownloadPit { output } => {
            session.download_pit(&output)?;
            finish_tool(&mut session)?;
        }
        Command::PrintPit { file } => {
            session.print_pit(file.as_deref())?;
            finish_tool(&mut session)?;
        }
        Command::Adb { action } => {
            let Some(command) = action.into_command(session.config()) else {
                bail!("Please enter an ADB command");
            };
            run_adb(&mut session, command)?;
        }
    }

    Ok(())
}

fn finish_tool(session: &mut Session) -> Result<TerminalOutcome> {
    let outcome = loop {
        if let Some(outcome) = session.wait_tool(POLL) {
            break outcome;
        }
        if session.monitor().is_idle() {
            bail!("Heimdall run ended without reporting an outcome");
        }
    };
    if !outcome.is_success() {
        bail!("{}", outcome);
    }
    Ok(outcome)
}

fn run_adb(session: &mut Session, command: AdbCommand) -> Result<()> {
    session.run_adb(command.clone())?;
    let outcome = loop {
        if let Some(outcome) = session.wait_adb(POLL) {
            break outcome;
        }
        if !session.adb_running() {
            bail!("adb ended without reporting an outcome");
        }
    };

    if outcome.is_success() {
        if let Some(note) = command.completion_note() {
            println!("{}", note);
        }
        return Ok(());
    }
    if let Some(hint) = outcome.hint(&command) {
        info!("{}", hint);
    }
    bail!("{}", outcome)
}
