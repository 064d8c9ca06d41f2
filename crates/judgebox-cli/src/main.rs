//! judgebox CLI - run one program in the sandbox and print the verdict as JSON

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use judgebox_sandbox::{Config, Limit, SeccompRule};

#[derive(Parser)]
#[command(name = "judgebox")]
#[command(author, version, about = "Run an untrusted program under limits and judge the outcome")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the program and print the result (requires root)
    Run {
        #[command(flatten)]
        target: Target,
    },

    /// Check the configuration without running anything
    Check {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Executable to run; the only one the child may exec
    exe_path: PathBuf,

    /// Arguments passed after argv[0]
    #[arg(last = true)]
    args: Vec<String>,

    /// Environment entry for the child (KEY=VALUE, repeatable)
    #[arg(short, long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// File connected to stdin
    #[arg(long)]
    input_path: Option<PathBuf>,

    /// File receiving stdout
    #[arg(long)]
    output_path: Option<PathBuf>,

    /// File receiving stderr (may equal --output-path)
    #[arg(long)]
    error_path: Option<PathBuf>,

    /// Append the run's log to this file
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Directory to chroot into before exec
    #[arg(long)]
    chroot_path: Option<PathBuf>,

    /// Run as this uid
    #[arg(long)]
    uid: Option<u32>,

    /// Run as this gid
    #[arg(long)]
    gid: Option<u32>,

    /// Syscall policy
    #[arg(long, value_enum, default_value_t = Policy::None)]
    seccomp_rule: Policy,

    /// CPU time in milliseconds, or "unlimited"
    #[arg(long, default_value = "unlimited", allow_hyphen_values = true)]
    max_cpu_time: Limit,

    /// Wall-clock time in milliseconds, or "unlimited"
    #[arg(long, default_value = "unlimited", allow_hyphen_values = true)]
    max_real_time: Limit,

    /// Peak memory in bytes, or "unlimited"
    #[arg(long, default_value = "unlimited", allow_hyphen_values = true)]
    max_memory: Limit,

    /// Largest output file in bytes, or "unlimited"
    #[arg(long, default_value = "unlimited", allow_hyphen_values = true)]
    max_output_size: Limit,

    /// Process count, or "unlimited"
    #[arg(long, default_value = "unlimited", allow_hyphen_values = true)]
    max_process_number: Limit,

    /// Stack size in bytes
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_stack: u64,

    /// Judge memory from peak usage only, without capping the address space
    #[arg(long)]
    memory_limit_check_only: bool,
}

impl Target {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.exe_path)
            .args(self.args)
            .max_cpu_time(self.max_cpu_time)
            .max_real_time(self.max_real_time)
            .max_memory(self.max_memory)
            .max_output_size(self.max_output_size)
            .max_process_number(self.max_process_number)
            .max_stack(self.max_stack)
            .memory_limit_check_only(self.memory_limit_check_only);
        config.env = self.env;
        config.input_path = self.input_path;
        config.output_path = self.output_path;
        config.error_path = self.error_path;
        config.log_path = self.log_path;
        config.chroot_path = self.chroot_path;
        config.uid = self.uid;
        config.gid = self.gid;
        config.seccomp_rule = self.seccomp_rule.rule();
        config
    }
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    Ok((key.to_owned(), value.to_owned()))
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// No syscall filter
    None,
    /// CPython interpreter whitelist
    Python,
}

impl Policy {
    fn rule(self) -> Option<SeccompRule> {
        match self {
            Self::None => None,
            Self::Python => Some(SeccompRule::Python),
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("judgebox=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { target } => {
            let config = target.into_config();
            tracing::info!(exe = %config.exe_path.display(), "running");

            let result = judgebox_sandbox::run(&config);
            println!("{}", serde_json::to_string_pretty(&result)?);

            if let Some(error) = result.error {
                tracing::error!(code = error.code(), "{error}");
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Check { target } => {
            let config = target.into_config();
            if let Err(e) = config.validate() {
                eprintln!("invalid config: {e}");
                return Ok(ExitCode::FAILURE);
            }
            println!("config ok");
        }
    }

    Ok(ExitCode::SUCCESS)
}
