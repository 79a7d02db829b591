//! # Commands Module
//!
//! CLI subcommand implementations.  Thin wrappers over the library: parse
//! arguments, open a driver, print results to standard output.

use crate::db::Value;
use crate::engine::fen::parse_fen;
use crate::search::WldSearch;
use crate::{DbType, DYNERR, STDRESULT};
use clap::ArgMatches;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("the position cannot be parsed")]
    BadPosition,
}

fn open_driver(cmd: &ArgMatches) -> Result<crate::Driver, DYNERR> {
    let dir = cmd.get_one::<String>("dir").expect("required arg");
    let (options, cache_mb) = driver_args(cmd);
    let driver = match cmd.get_one::<String>("type") {
        Some(t) => crate::open_type(t.parse::<DbType>()?, &options, cache_mb, Path::new(dir))?,
        None => crate::open(&options, cache_mb, Path::new(dir))?,
    };
    Ok(driver)
}

fn driver_args(cmd: &ArgMatches) -> (String, u64) {
    let options = cmd
        .get_one::<String>("options")
        .cloned()
        .unwrap_or_default();
    let cache_mb = cmd
        .get_one::<String>("cachemb")
        .and_then(|v| v.parse().ok())
        .unwrap_or(500);
    (options, cache_mb)
}

pub fn identify(cmd: &ArgMatches) -> STDRESULT {
    let dir = cmd.get_one::<String>("dir").expect("required arg");
    let (db_type, max_pieces) = crate::identify(Path::new(dir))?;
    println!("{} {}", db_type, max_pieces);
    Ok(())
}

pub fn lookup(cmd: &ArgMatches) -> STDRESULT {
    let fen = cmd.get_one::<String>("fen").expect("required arg");
    let (pos, color) =
        parse_fen(fen).map_err(|_| -> DYNERR { Box::new(CommandError::BadPosition) })?;
    let driver = open_driver(cmd)?;

    let raw = driver.lookup(&pos, color, false);
    match driver.db_type() {
        DbType::MtcRunlen => println!("mtc {}", raw),
        DbType::Dtw => println!("dtw {}", raw),
        _ => {
            let value = Value::from_i32(raw);
            if cmd.get_flag("search") && !value.is_exact() {
                let mut search = WldSearch::new(&driver);
                let resolved = search.lookup_with_search(&pos, color, false);
                println!("{:?} (searched, depth {})", resolved, search.get_maxdepth());
            } else {
                println!("{:?}", value);
            }
        }
    }

    if cmd.get_flag("stats") {
        let s = driver.get_stats();
        let json = serde_json::json!({
            "db_requests": s.db_requests,
            "db_returns": s.db_returns,
            "db_not_present_requests": s.db_not_present_requests,
            "lru_cache_hits": s.lru_cache_hits,
            "lru_cache_loads": s.lru_cache_loads,
            "autoload_hits": s.autoload_hits,
            "avg_ht_list_length": s.avg_ht_list_length,
        });
        println!("{}", json);
    }
    Ok(())
}

pub fn verify(cmd: &ArgMatches) -> STDRESULT {
    let driver = open_driver(cmd)?;
    let abort = std::sync::atomic::AtomicBool::new(false);
    let msgs = crate::VerifyMsgs::default();
    let errors = driver.verify(&mut |msg| print!("{}", msg), &abort, &msgs);
    if errors > 0 {
        return Err(format!("{} files failed verification", errors).into());
    }
    Ok(())
}
