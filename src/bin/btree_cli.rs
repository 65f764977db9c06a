//! Thin command-line wrapper around the `btreekv` library surface.
//!
//! Usage:
//!   btree_cli <db_path> put <key> <value>
//!   btree_cli <db_path> get <key>
//!   btree_cli <db_path> delete <key>
//!   btree_cli <db_path> scan [start] [end]
//!   btree_cli <db_path> stats
//!   btree_cli <db_path> debug <key>

use btreekv::Db;
use std::env;
use std::process::exit;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: btree_cli <db_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  put <key> <value>   - Insert or update a key-value pair");
        eprintln!("  get <key>           - Get value for a key");
        eprintln!("  delete <key>        - Delete a key");
        eprintln!("  scan [start] [end]  - Scan keys in range, lexicographically");
        eprintln!("  stats               - Show database statistics");
        eprintln!("  debug <key>         - Trace a key lookup level by level");
        exit(1);
    }

    let db_path = &args[1];
    let command = &args[2];

    let mut db = match Db::open(db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: failed to open database: {}", e);
            exit(1);
        }
    };

    let result = match command.as_str() {
        "put" => run_put(&mut db, &args),
        "get" => run_get(&mut db, &args),
        "delete" => run_delete(&mut db, &args),
        "scan" => run_scan(&mut db, &args),
        "stats" => run_stats(&mut db),
        "debug" => run_debug(&mut db, &args),
        other => {
            eprintln!("Unknown command: {}", other);
            exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        exit(1);
    }

    if let Err(e) = db.flush() {
        eprintln!("Warning: failed to flush: {}", e);
    }
}

fn run_put(db: &mut Db, args: &[String]) -> btreekv::Result<()> {
    if args.len() < 5 {
        eprintln!("Usage: btree_cli <db_path> put <key> <value>");
        exit(1);
    }
    db.put(args[3].as_bytes(), args[4].as_bytes())?;
    println!("OK");
    Ok(())
}

fn run_get(db: &mut Db, args: &[String]) -> btreekv::Result<()> {
    if args.len() < 4 {
        eprintln!("Usage: btree_cli <db_path> get <key>");
        exit(1);
    }
    match db.get(args[3].as_bytes())? {
        Some(value) => match String::from_utf8(value) {
            Ok(s) => println!("{}", s),
            Err(_) => println!("<binary data>"),
        },
        None => println!("NOT_FOUND"),
    }
    Ok(())
}

fn run_delete(db: &mut Db, args: &[String]) -> btreekv::Result<()> {
    if args.len() < 4 {
        eprintln!("Usage: btree_cli <db_path> delete <key>");
        exit(1);
    }
    if db.delete(args[3].as_bytes())? {
        println!("DELETED");
    } else {
        println!("NOT_FOUND");
    }
    Ok(())
}

fn run_scan(db: &mut Db, args: &[String]) -> btreekv::Result<()> {
    let start = args.get(3).map(|s| s.as_bytes());
    let end = args.get(4).map(|s| s.as_bytes());

    let mut it = db.iter();
    match start {
        Some(key) => it.seek(key)?,
        None => it.seek_first()?,
    }

    let mut count = 0usize;
    let mut rows = Vec::new();
    while it.valid() {
        let (key, value) = it.entry()?.expect("valid cursor has an entry");
        if let Some(end) = end {
            if key.as_slice() > end {
                break;
            }
        }
        rows.push((key, value));
        count += 1;
        it.next()?;
    }

    println!("COUNT: {}", count);
    for (key, value) in rows {
        println!(
            "{} -> {}",
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(&value)
        );
    }
    Ok(())
}

fn run_stats(db: &mut Db) -> btreekv::Result<()> {
    let stats = db.stats()?;
    println!("total_pages: {}", stats.total_pages);
    println!("cached_pages: {}", stats.cached_pages);
    println!("cache_capacity: {}", stats.cache_capacity);
    println!("tree_height: {}", stats.tree_height);
    println!("has_free_pages: {}", stats.has_free_pages);
    Ok(())
}

fn run_debug(db: &mut Db, args: &[String]) -> btreekv::Result<()> {
    if args.len() < 4 {
        eprintln!("Usage: btree_cli <db_path> debug <key>");
        exit(1);
    }
    for line in db.debug_get(args[3].as_bytes())? {
        println!("{}", line);
    }
    Ok(())
}
