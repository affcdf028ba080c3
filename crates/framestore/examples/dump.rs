//! Simple dumper to inspect frame store files.
//!
//! Reads a binary, compressed, or text file and prints every top-level value
//! in text notation. Set `RUST_LOG=framestore=trace` to watch the decoder.

use std::fs;

use framestore::codec::is_compressed;
use framestore::limits::STREAM_MARKER;
use framestore::{decompress, Decoder, PrintOptions, Store, TextReader, Value};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .expect("usage: dump <file> [max-values]");
    let max_values: usize = std::env::args()
        .nth(2)
        .map(|n| n.parse().expect("max-values must be a number"))
        .unwrap_or(20);

    println!("Reading: {}", path);

    let data = fs::read(&path).expect("Failed to read file");
    println!("File size: {} bytes", data.len());

    let mut store = Store::new();
    let before = store.len();
    let values = if is_compressed(&data) {
        let raw = decompress(&data).expect("Failed to decompress");
        println!("Format: compressed ({} bytes uncompressed)", raw.len());
        read_binary(&mut store, &raw)
    } else if data.first() == Some(&STREAM_MARKER) {
        println!("Format: binary");
        read_binary(&mut store, &data)
    } else {
        println!("Format: text");
        let text = std::str::from_utf8(&data).expect("Text input is not UTF-8");
        let mut reader = TextReader::new(&mut store, text);
        let mut values = Vec::new();
        while let Some(value) = reader.read().expect("Failed to parse") {
            values.push(value);
        }
        values
    };

    let frames = store.len() - before;
    let named = store.names().filter(|(_, h)| store.owns(*h)).count();

    println!("\n=== Store ===");
    println!("  Top-level values: {}", values.len());
    println!("  Frames: {}", frames);
    println!("  Names: {}", named);

    println!("\n=== First {} values ===", max_values.min(values.len()));
    for value in values.iter().take(max_values) {
        println!("{}", store.text_with(value, &PrintOptions::pretty()));
    }
    if values.len() > max_values {
        println!("... and {} more values", values.len() - max_values);
    }
}

fn read_binary(store: &mut Store, data: &[u8]) -> Vec<Value> {
    let mut decoder = Decoder::new(store, data);
    let mut values = Vec::new();
    while !decoder.is_done() {
        values.push(decoder.read().expect("Failed to decode"));
    }
    values
}
