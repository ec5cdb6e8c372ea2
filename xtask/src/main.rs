//! xtask: Development tasks for chardev
//!
//! Run with: `cargo xtask <command>`

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tasks for chardev")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all tests (workspace + fuzz harnesses in test mode)
    Test,
    /// Run fuzz tests with bolero
    Fuzz {
        /// Target to fuzz (e.g., "buffer", "lifecycle")
        /// If not specified, runs all fuzz harnesses in test mode (quick smoke test)
        target: Option<String>,
    },
    /// Run clippy on all code
    Clippy,
    /// Check formatting
    Fmt {
        /// Fix formatting issues instead of just checking
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Find workspace root (where Cargo.toml with [workspace] lives)
    let workspace_root = std::env::var("CARGO_MANIFEST_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().unwrap())
        .parent()
        .unwrap()
        .to_path_buf();
    sh.change_dir(&workspace_root);

    match cli.command {
        Commands::Test => {
            println!("=== Running workspace tests ===");

            // Try nextest first, fall back to cargo test
            if cmd!(sh, "cargo nextest --version").quiet().run().is_ok() {
                println!("Using cargo-nextest");
                cmd!(sh, "cargo nextest run --workspace").run()?;
            } else {
                println!("cargo-nextest not found, using cargo test");
                cmd!(sh, "cargo test --workspace").run()?;
            }

            println!("\n=== All tests passed ===");
        }
        Commands::Fuzz { target } => {
            if let Some(t) = target {
                println!("=== Fuzzing target: {t} ===");
                println!("Press Ctrl+C to stop.\n");

                // Check if cargo-bolero is installed
                if cmd!(sh, "cargo bolero --version").quiet().run().is_err() {
                    eprintln!("cargo-bolero not found. Install with:");
                    eprintln!("  cargo install cargo-bolero");
                    return Err("cargo-bolero not installed".into());
                }

                cmd!(sh, "cargo bolero test -p chardev-fuzz {t}").run()?;
            } else {
                println!("=== Running all fuzz harnesses in test mode ===");
                println!("(For real fuzzing, specify a target: cargo xtask fuzz buffer)\n");
                println!("Available targets:");
                println!("  - buffer    (SharedBuffer/session clamping and contents)");
                println!("  - lifecycle (initialize/teardown all-or-nothing)\n");

                cmd!(sh, "cargo test -p chardev-fuzz").run()?;
            }
        }
        Commands::Clippy => {
            println!("=== Running clippy ===");
            cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
        }
        Commands::Fmt { fix } => {
            if fix {
                println!("=== Fixing formatting ===");
                cmd!(sh, "cargo fmt --all").run()?;
            } else {
                println!("=== Checking formatting ===");
                cmd!(sh, "cargo fmt --all -- --check").run()?;
            }
        }
    }

    Ok(())
}
