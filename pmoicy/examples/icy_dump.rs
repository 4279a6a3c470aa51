//! Example: dump an ICY stream and print its metadata changes
//!
//! Run with: cargo run -p pmoicy --example icy_dump -- http://radio.example.com:8000/live
//! Save the audio: cargo run -p pmoicy --example icy_dump -- <url> out.mp3
//!
//! Environment:
//! - `ICY_DUMP_JSON=1` prints each metadata snapshot as JSON
//! - `ICY_DUMP_MAX_BYTES=<n>` stops after `n` audio bytes

use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::thread;

use anyhow::{bail, Context};
use pmoconfig::get_config;
use pmoicy::{IcyClient, IcyConfigExt};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = get_config();

    // Initialize console logging from the configured level
    if config.get_log_enable_console()? {
        let level = config.get_log_min_level()?.to_lowercase();
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .init();
    }

    let mut args = env::args().skip(1);
    let Some(url) = args.next() else {
        bail!("usage: icy_dump <url> [output]");
    };
    let output = args.next();

    let as_json = env::var("ICY_DUMP_JSON").is_ok_and(|v| v == "1");
    let max_bytes = match env::var("ICY_DUMP_MAX_BYTES") {
        Ok(v) => Some(v.parse::<u64>().context("ICY_DUMP_MAX_BYTES must be a number")?),
        Err(_) => None,
    };

    let client = IcyClient::from_config(&config)?;
    let mut stream = client
        .open(&url)
        .with_context(|| format!("cannot open {}", url))?;

    println!("Station: {}", stream.name());
    println!("  Genre: {}", stream.genre());
    println!("  Description: {}", stream.description());
    println!("  Homepage: {}", stream.url());
    println!("  Bitrate: {} kbit/s", stream.bitrate());
    println!("  Metadata every {} bytes", stream.metaint());
    if as_json {
        println!("{}", serde_json::to_string_pretty(stream.station())?);
    }
    println!("---");

    // Metadata printing happens off the reading thread
    let updates = stream.subscribe_metadata(config.get_icy_metadata_queue_capacity()?);
    let printer = thread::spawn(move || {
        for metadata in updates {
            if as_json {
                match serde_json::to_string(&metadata) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("cannot encode metadata: {}", e),
                }
            } else {
                match (metadata.artist(), metadata.title()) {
                    (Some(artist), Some(title)) => println!("♪ {} - {}", artist, title),
                    (None, Some(title)) => println!("♪ {}", title),
                    _ => println!("♪ {}", metadata),
                }
            }
        }
    });

    let mut sink: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path))?,
        )),
        None => Box::new(io::sink()),
    };

    let mut buf = vec![0u8; config.get_icy_read_buffer_size()?];
    loop {
        if max_bytes.is_some_and(|max| stream.audio_bytes() >= max) {
            break;
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
    }
    sink.flush()?;

    println!("---");
    println!(
        "{} audio bytes, {} metadata blocks",
        stream.audio_bytes(),
        stream.metadata_blocks()
    );

    stream.close()?;
    // the metadata sender goes away with the stream, ending the printer
    drop(stream);
    let _ = printer.join();

    Ok(())
}
