//! # Command Line Interface
//!
//! Dispatch commands to `commands` module.

use damdb::commands;
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let main_cmd = cli::build_cli();
    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("identify") {
        return commands::identify(cmd);
    }

    if let Some(cmd) = matches.subcommand_matches("lookup") {
        return commands::lookup(cmd);
    }

    if let Some(cmd) = matches.subcommand_matches("verify") {
        return commands::verify(cmd);
    }

    unreachable!("clap requires a known subcommand")
}
