//! Simple CLI for poking at a store file.
//!
//! Usage:
//!   bplus_cli <db_path> set <key> <value>
//!   bplus_cli <db_path> get <key>
//!   bplus_cli <db_path> del <key>
//!   bplus_cli <db_path> status
//!   bplus_cli <db_path> fill <count>
//!
//! Set RUST_LOG=debug to watch splits and merges happen.

use bplus_store::{Config, Db};
use std::env;
use std::process::exit;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: bplus_cli <db_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  set <key> <value> - Insert or overwrite a record");
        eprintln!("  get <key>         - Print the value for a key");
        eprintln!("  del <key>         - Delete a key");
        eprintln!("  status            - Show store statistics");
        eprintln!("  fill <count>      - Insert count sequential test records");
        exit(1);
    }

    let db_path = &args[1];
    let command = &args[2];

    let mut db = match Db::open(Config::new(db_path)) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: failed to open database: {}", e);
            exit(1);
        }
    };

    match command.as_str() {
        "set" => {
            if args.len() < 5 {
                eprintln!("Usage: bplus_cli <db_path> set <key> <value>");
                exit(1);
            }
            let key = parse_key(&args[3]);
            match db.insert(key, args[4].as_bytes()) {
                Ok(()) => println!("OK"),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "get" => {
            if args.len() < 4 {
                eprintln!("Usage: bplus_cli <db_path> get <key>");
                exit(1);
            }
            let key = parse_key(&args[3]);
            match db.get(key) {
                Ok(Some(value)) => match String::from_utf8(value) {
                    Ok(s) => println!("{}", s),
                    Err(_) => println!("<binary data>"),
                },
                Ok(None) => println!("NOT_FOUND"),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "del" => {
            if args.len() < 4 {
                eprintln!("Usage: bplus_cli <db_path> del <key>");
                exit(1);
            }
            let key = parse_key(&args[3]);
            match db.delete(key) {
                Ok(true) => println!("DELETED"),
                Ok(false) => println!("NOT_FOUND"),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    exit(1);
                }
            }
        }

        "status" => match db.status() {
            Ok(status) => {
                println!("page_size: {}", status.page_size);
                println!("root_page_id: {}", status.root_page_id);
                println!("height: {}", status.height);
                println!("node_count: {}", status.node_count);
                println!("split_count: {}", status.split_count);
                println!("merge_count: {}", status.merge_count);
                println!("fill_rate: {}", status.fill_rate);
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                exit(1);
            }
        },

        "fill" => {
            if args.len() < 4 {
                eprintln!("Usage: bplus_cli <db_path> fill <count>");
                exit(1);
            }
            let count: i32 = match args[3].parse() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("ERROR: invalid count");
                    exit(1);
                }
            };

            let start = std::time::Instant::now();
            for i in 0..count {
                let value = format!("value_{}", i);
                if let Err(e) = db.insert(i, value.as_bytes()) {
                    eprintln!("ERROR at {}: {}", i, e);
                    exit(1);
                }
            }
            let elapsed = start.elapsed();
            println!("INSERTED: {}", count);
            println!("TIME_MS: {}", elapsed.as_millis());
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            exit(1);
        }
    }

    if let Err(e) = db.close() {
        eprintln!("Warning: failed to close cleanly: {}", e);
    }
}

fn parse_key(arg: &str) -> i32 {
    match arg.parse() {
        Ok(key) => key,
        Err(_) => {
            eprintln!("ERROR: keys are 32-bit integers, got {:?}", arg);
            exit(1);
        }
    }
}
