use clap::{arg, crate_version, Command};

pub fn build_cli() -> Command {
    let long_help = "damdb answers endgame queries for 10x10 international draughts.
Point it at a directory of database files.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
identify a database:   `damdb identify -d /eg/db`
probe a position:      `damdb lookup -d /eg/db -f \"W:W31,K4:B12,13\"`
probe with search:     `damdb lookup -d /eg/db -f <fen> --search`
check file checksums:  `damdb verify -d /eg/db`";

    Command::new("damdb")
        .about("endgame database engine for international draughts")
        .after_long_help(long_help)
        .version(crate_version!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("identify")
                .arg(arg!(-d --dir <PATH> "database directory").required(true))
                .about("report the database format and piece count"),
        )
        .subcommand(
            Command::new("lookup")
                .arg(arg!(-d --dir <PATH> "database directory").required(true))
                .arg(arg!(-f --fen <FEN> "position, e.g. B:WK4,19:B12,K13").required(true))
                .arg(arg!(-c --cachemb <MB> "cache RAM budget in MB").required(false))
                .arg(arg!(-o --options <LIST> "driver options, e.g. maxpieces=8").required(false))
                .arg(
                    clap::Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_name("TYPE")
                        .help("database type, skips identification"),
                )
                .arg(
                    arg!(--search "resolve capture positions by search")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--stats "print lookup statistics as JSON")
                        .action(clap::ArgAction::SetTrue),
                )
                .about("look up the value of a position"),
        )
        .subcommand(
            Command::new("verify")
                .arg(arg!(-d --dir <PATH> "database directory").required(true))
                .arg(arg!(-c --cachemb <MB> "cache RAM budget in MB").required(false))
                .arg(arg!(-o --options <LIST> "driver options, e.g. maxpieces=8").required(false))
                .arg(
                    clap::Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_name("TYPE")
                        .help("database type, skips identification"),
                )
                .about("verify database files against the checksum manifest"),
        )
}
