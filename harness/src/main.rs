use anyhow::Result;
use clap::{Parser, Subcommand};

use func_harness::{cli, exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "func-harness",
    version,
    about = "Create, build, run and invoke every function template under the current directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every discovered template (the default).
    Run,
    /// Print discovered targets and the builder each would use.
    List,
    /// Remove scratch directories preserved by earlier runs.
    Clean,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let args = Cli::parse();
    let root = std::env::current_dir()?;
    match args.command.unwrap_or(Command::Run) {
        Command::Run => cli::run_harness(&root),
        Command::List => cli::list_targets(&root).map(|()| exit_codes::OK),
        Command::Clean => cli::clean_scratch().map(|()| exit_codes::OK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_means_run() {
        let cli = Cli::parse_from(["func-harness"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from(["func-harness", "list"]);
        assert!(matches!(cli.command, Some(Command::List)));
        let cli = Cli::parse_from(["func-harness", "clean"]);
        assert!(matches!(cli.command, Some(Command::Clean)));
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["func-harness", "--fast"]).is_err());
    }
}
