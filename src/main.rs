use anyhow::Result;
use std::io::{self, BufRead};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sparsebit::commands::{dispatch, Reply};
use sparsebit::keyspace::KeySpace;

//-------------------------------------------------------------------------

fn print_reply(r: &Reply) {
    match r {
        Reply::Ok => println!("OK"),
        Reply::Integer(n) => println!("(integer) {}", n),
        Reply::Bulk(s) => println!("\"{}\"", s),
        Reply::Nil => println!("(nil)"),
        Reply::Array(items) => {
            if items.is_empty() {
                println!("(empty array)");
            }
            for (i, item) in items.iter().enumerate() {
                match item {
                    Reply::Integer(n) => println!("{}) (integer) {}", i + 1, n),
                    Reply::Bulk(s) => println!("{}) \"{}\"", i + 1, s),
                    other => println!("{}) {:?}", i + 1, other),
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut ks = KeySpace::new();
    info!("sparsebit host ready; one command per line (quit to exit)");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }

        // the handful of keyspace commands the host would own
        match args[0].to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "del" => {
                let n = args[1..].iter().filter(|&&k| ks.delete(k)).count();
                println!("(integer) {}", n);
            }
            "flushall" => {
                ks.flush();
                println!("OK");
            }
            _ => match dispatch(&mut ks, &args) {
                Ok(reply) => print_reply(&reply),
                Err(e) => println!("(error) {}", e),
            },
        }
    }

    Ok(())
}

//-------------------------------------------------------------------------
