//! Benchmark for frame store serialization using city data.
//!
//! Loads cities from a JSON file (the `countries-states-cities` dump format)
//! or generates a synthetic set, builds a graph of city, state and country
//! frames, and times the binary codec, compression and the text notation.

use std::fs;
use std::path::Path;
use std::time::Instant;

use framestore::codec::compress::compress;
use framestore::{FrameBuilder, FrameId, PrintOptions, Printer, QString, Store, Value};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DECODE_ITERS: u32 = 10;
const SYNTHETIC_CITIES: u32 = 50_000;

// =============================================================================
// JSON DATA STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
struct City {
    id: u32,
    name: String,
    state_id: u32,
    state_code: String,
    state_name: String,
    country_id: u32,
    country_code: String,
    country_name: String,
    latitude: String,
    longitude: String,
    native: Option<String>,
    #[serde(rename = "type")]
    city_type: Option<String>,
    population: Option<i64>,
    timezone: Option<String>,
    translations: Option<std::collections::BTreeMap<String, String>>,
    #[serde(rename = "wikiDataId")]
    wikidata_id: Option<String>,
}

fn synthetic_cities(count: u32) -> Vec<City> {
    (0..count)
        .map(|i| {
            let state = i / 40;
            let country = state / 25;
            City {
                id: i,
                name: format!("City {i}"),
                state_id: state,
                state_code: format!("S{}", state % 100),
                state_name: format!("State {state}"),
                country_id: country,
                country_code: format!("C{country:02}"),
                country_name: format!("Country {country}"),
                latitude: format!("{:.4}", (i % 180) as f64 - 90.0),
                longitude: format!("{:.4}", (i % 360) as f64 - 180.0),
                native: (i % 3 == 0).then(|| format!("Ciudad {i}")),
                city_type: (i % 5 == 0).then(|| "municipality".to_string()),
                population: (i % 2 == 0).then_some(i64::from(i) * 37),
                timezone: Some(format!("Zone/{}", country % 24)),
                translations: (i % 4 == 0).then(|| {
                    [("de", format!("Stadt {i}")), ("fr", format!("Ville {i}"))]
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect()
                }),
                wikidata_id: Some(format!("Q{}", 1000 + i)),
            }
        })
        .collect()
}

// =============================================================================
// CONVERSION TO FRAMES
// =============================================================================

/// Schema frames shared by every city.
struct Schema {
    city: FrameId,
    state: FrameId,
    country: FrameId,
    code: FrameId,
    native_name: FrameId,
    city_type: FrameId,
    population: FrameId,
    location: FrameId,
    latitude: FrameId,
    longitude: FrameId,
    timezone: FrameId,
    wikidata: FrameId,
    translation: FrameId,
    in_state: FrameId,
    in_country: FrameId,
}

impl Schema {
    fn new(store: &mut Store) -> Self {
        let mut kind = |id: &str, name: &str| FrameBuilder::new().id(id).name(name).build(store);
        let city = kind("/geo/city", "City");
        let state = kind("/geo/state", "State");
        let country = kind("/geo/country", "Country");
        Self {
            city,
            state,
            country,
            code: store.lookup("/geo/code"),
            native_name: store.lookup("/geo/native_name"),
            city_type: store.lookup("/geo/city_type"),
            population: store.lookup("/geo/population"),
            location: store.lookup("/geo/location"),
            latitude: store.lookup("/geo/lat"),
            longitude: store.lookup("/geo/lng"),
            timezone: store.lookup("/geo/timezone"),
            wikidata: store.lookup("/geo/wikidata"),
            translation: store.lookup("/geo/translation"),
            in_state: store.lookup("/geo/in_state"),
            in_country: store.lookup("/geo/in_country"),
        }
    }

    fn frames(&self) -> [FrameId; 3] {
        [self.city, self.state, self.country]
    }
}

fn build_city(store: &mut Store, schema: &Schema, city: &City) -> FrameId {
    let state = store.lookup(&format!("/geo/state/{}", city.state_id));
    let country = store.lookup(&format!("/geo/country/{}", city.country_id));

    let mut builder = FrameBuilder::new()
        .id(format!("/geo/city/{}", city.id))
        .isa(schema.city)
        .name(city.name.as_str());

    if let Some(native) = city.native.as_deref().filter(|n| !n.is_empty()) {
        builder = builder.slot(schema.native_name, native);
    }
    if let Some(city_type) = &city.city_type {
        builder = builder.slot(schema.city_type, city_type.as_str());
    }
    if let Some(population) = city.population {
        builder = builder.slot(schema.population, population);
    }
    if let (Ok(lat), Ok(lng)) = (city.latitude.parse::<f32>(), city.longitude.parse::<f32>()) {
        let location = FrameBuilder::new()
            .slot(schema.latitude, lat)
            .slot(schema.longitude, lng)
            .build(store);
        builder = builder.slot(schema.location, location);
    }
    if let Some(tz) = &city.timezone {
        builder = builder.slot(schema.timezone, tz.as_str());
    }
    if let Some(wikidata) = &city.wikidata_id {
        builder = builder.slot(schema.wikidata, wikidata.as_str());
    }
    if let Some(translations) = &city.translations {
        for (lang, text) in translations {
            let qualifier = store.lookup(&format!("/lang/{lang}"));
            builder = builder.slot(schema.translation, QString::new(text.as_str(), qualifier));
        }
    }

    builder
        .slot(schema.in_state, state)
        .slot(schema.in_country, country)
        .build(store)
}

/// Builds the whole graph and returns its top-level values: schema first,
/// then each country and state when first seen, then the cities.
fn convert_cities(store: &mut Store, cities: &[City]) -> Vec<Value> {
    let schema = Schema::new(store);
    let mut values: Vec<Value> = schema.frames().into_iter().map(Value::Frame).collect();

    let mut countries: FxHashSet<u32> = FxHashSet::default();
    let mut states: FxHashSet<u32> = FxHashSet::default();

    for city in cities {
        let country_id = format!("/geo/country/{}", city.country_id);
        if countries.insert(city.country_id) {
            let country = FrameBuilder::new()
                .id(country_id.as_str())
                .isa(schema.country)
                .name(city.country_name.as_str())
                .slot(schema.code, city.country_code.as_str())
                .build(store);
            values.push(Value::Frame(country));
        }

        if states.insert(city.state_id) {
            let country = store.lookup(&country_id);
            let state = FrameBuilder::new()
                .id(format!("/geo/state/{}", city.state_id))
                .isa(schema.state)
                .name(city.state_name.as_str())
                .slot(schema.code, city.state_code.as_str())
                .slot(schema.in_country, country)
                .build(store);
            values.push(Value::Frame(state));
        }

        values.push(Value::Frame(build_city(store, &schema, city)));
    }

    values
}

fn throughput(bytes: usize, secs: f64) -> f64 {
    (bytes as f64 / 1_000_000.0) / secs
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let data_path = std::env::args().nth(1);

    let (cities, json_size) = match &data_path {
        Some(path) => {
            println!("Loading cities from: {}", path);
            let json_data = fs::read_to_string(path).expect("Failed to read cities file");
            let parse_start = Instant::now();
            let cities: Vec<City> =
                serde_json::from_str(&json_data).expect("Failed to parse JSON");
            println!("Loaded {} cities in {:?}", cities.len(), parse_start.elapsed());
            (cities, Some(json_data.len()))
        }
        None => {
            println!("No input file, generating {} synthetic cities", SYNTHETIC_CITIES);
            (synthetic_cities(SYNTHETIC_CITIES), None)
        }
    };

    // Build the graph
    let mut store = Store::new();
    let convert_start = Instant::now();
    let values = convert_cities(&mut store, &cities);
    let convert_time = convert_start.elapsed();
    info!(values = values.len(), frames = store.len(), elapsed = ?convert_time, "built graph");

    let total_slots: usize = values
        .iter()
        .filter_map(Value::as_frame)
        .filter_map(|h| store.get(h))
        .map(|f| f.len())
        .sum();

    println!(
        "Built {} top-level frames ({} frames in store) in {:?}",
        values.len(),
        store.len(),
        convert_time
    );
    println!("  - {} slots on top-level frames", total_slots);

    // Binary encoding
    let encode_start = Instant::now();
    let encoded = store.encode_all(&values).expect("Failed to encode");
    let encode_time = encode_start.elapsed();
    info!(bytes = encoded.len(), elapsed = ?encode_time, "encoded");

    println!("\nBinary: {} bytes in {:?}", encoded.len(), encode_time);
    println!(
        "  Throughput: {:.2} MB/s",
        throughput(encoded.len(), encode_time.as_secs_f64())
    );

    // Compression
    let compress_start = Instant::now();
    let compressed = compress(&encoded, 3).expect("Failed to compress");
    let compress_time = compress_start.elapsed();
    info!(bytes = compressed.len(), level = 3, elapsed = ?compress_time, "compressed");

    println!(
        "\nCompressed (level 3): {} bytes in {:?}",
        compressed.len(),
        compress_time
    );
    println!(
        "  Compression ratio: {:.1}x",
        encoded.len() as f64 / compressed.len() as f64
    );

    // Binary decoding
    for _ in 0..3 {
        Store::new().decode(&encoded).expect("Failed to decode");
    }

    let decode_start = Instant::now();
    let mut decoded_frames = 0;
    for _ in 0..DECODE_ITERS {
        let mut target = Store::new();
        target.decode(&encoded).expect("Failed to decode");
        decoded_frames = target.len();
    }
    let decode_time = decode_start.elapsed() / DECODE_ITERS;
    info!(frames = decoded_frames, iterations = DECODE_ITERS, avg = ?decode_time, "decoded binary");

    println!(
        "\nDecode (binary): {:?} (avg of {} iterations)",
        decode_time, DECODE_ITERS
    );
    println!(
        "  Throughput: {:.2} MB/s",
        throughput(encoded.len(), decode_time.as_secs_f64())
    );
    println!("  Frames: {}", decoded_frames);

    // Compressed decoding through format detection
    let decode_compressed_start = Instant::now();
    for _ in 0..DECODE_ITERS {
        let mut target = Store::new();
        target.parse(&compressed).expect("Failed to decode compressed");
        assert_eq!(target.len(), decoded_frames);
    }
    let decode_compressed_time = decode_compressed_start.elapsed() / DECODE_ITERS;
    info!(iterations = DECODE_ITERS, avg = ?decode_compressed_time, "decoded compressed");

    println!(
        "\nDecode (compressed): {:?} (avg of {} iterations)",
        decode_compressed_time, DECODE_ITERS
    );
    println!(
        "  Throughput: {:.2} MB/s (uncompressed equivalent)",
        throughput(encoded.len(), decode_compressed_time.as_secs_f64())
    );

    // Text notation
    let print_start = Instant::now();
    let mut printer = Printer::new(&store, PrintOptions::compact());
    for value in &values {
        printer.print(value);
    }
    let text = printer.finish();
    let print_time = print_start.elapsed();
    info!(bytes = text.len(), elapsed = ?print_time, "printed text");

    println!("\nText: {} bytes printed in {:?}", text.len(), print_time);

    let parse_start = Instant::now();
    let mut reparsed = Store::new();
    reparsed.parse_text(&text).expect("Failed to parse text");
    let parse_time = parse_start.elapsed();
    info!(frames = reparsed.len(), elapsed = ?parse_time, "parsed text");

    println!("  Parsed in {:?}", parse_time);
    println!(
        "  Throughput: {:.2} MB/s",
        throughput(text.len(), parse_time.as_secs_f64())
    );
    println!("  Frames: {}", reparsed.len());

    // Write output files next to the input
    if let Some(path) = &data_path {
        let input_path = Path::new(path);
        let stem = input_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        let parent = input_path.parent().unwrap_or(Path::new("."));

        let output_binary = parent.join(format!("{}.frm", stem));
        let output_compressed = parent.join(format!("{}.frmz", stem));

        fs::write(&output_binary, &encoded).expect("Failed to write .frm file");
        fs::write(&output_compressed, &compressed).expect("Failed to write .frmz file");

        println!("\n=== Output Files ===");
        println!("Binary:     {}", output_binary.display());
        println!("Compressed: {}", output_compressed.display());
    }

    // Summary
    println!("\n=== Summary ===");
    println!("Cities: {}", cities.len());
    println!("Frames: {}", store.len());
    if let Some(json_size) = json_size {
        println!(
            "JSON size: {} bytes ({:.1} MB)",
            json_size,
            json_size as f64 / 1_000_000.0
        );
    }
    println!(
        "Binary: {} bytes ({:.1} MB)",
        encoded.len(),
        encoded.len() as f64 / 1_000_000.0
    );
    println!(
        "Compressed: {} bytes ({:.1} MB)",
        compressed.len(),
        compressed.len() as f64 / 1_000_000.0
    );
    println!(
        "Text: {} bytes ({:.1} MB)",
        text.len(),
        text.len() as f64 / 1_000_000.0
    );
    if let Some(json_size) = json_size {
        println!(
            "Size vs JSON: {:.1}% (binary), {:.1}% (compressed)",
            100.0 * encoded.len() as f64 / json_size as f64,
            100.0 * compressed.len() as f64 / json_size as f64
        );
    }
}
