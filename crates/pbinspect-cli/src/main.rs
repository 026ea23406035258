//! pbinspect - Inspect and decode Protocol Buffer binary data
//!
//! Without a schema this tool lists every record in the input with its
//! offset, field number and wire type. Given `.proto` files or compiled
//! descriptor sets, it decodes the input as a named message and prints the
//! result as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use pbinspect_core::{Decoder, DecoderConfig, Inspector, InspectorConfig, SchemaStore};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect and decode Protocol Buffer binary data
#[derive(Parser, Debug)]
#[command(name = "pbinspect")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Input file, or `-` to read standard input
    input: PathBuf,

    /// Package of the message to decode (requires a schema)
    package: Option<String>,

    /// Message to decode; omit to list the messages of PACKAGE
    name: Option<String>,

    /// How the input file is encoded
    #[arg(long, value_enum, default_value = "binary")]
    file_type: FileType,

    /// Schema file: `.proto` source or a compiled descriptor set (repeatable)
    #[arg(long = "pb-file", value_name = "FILE")]
    pb_files: Vec<PathBuf>,

    /// Directory searched recursively for `.proto`, `.pb` and `.desc` files
    #[arg(long, value_name = "DIR")]
    pb_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dump every byte of length-delimited payloads
    #[arg(long)]
    verbose_bytes: bool,

    /// Treat a truncated tag at the end of a message as an error
    #[arg(long)]
    strict: bool,

    /// Decode oneof members instead of skipping them
    #[arg(long)]
    decode_oneofs: bool,

    /// Maximum embedded-message nesting depth
    #[arg(long, default_value = "100")]
    max_depth: usize,
}

/// Encoding of the input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileType {
    /// Raw wire-format bytes
    Binary,
    /// Hex digits; whitespace is ignored
    Hex,
}

/// How a schema file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaKind {
    /// `.proto` source text
    Source,
    /// Compiled `FileDescriptorSet`
    DescriptorSet,
}

impl SchemaKind {
    /// Classifies a path by extension; `None` for files that are not schemas
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("proto") => Some(Self::Source),
            Some("pb") | Some("desc") => Some(Self::DescriptorSet),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data = read_input(&cli.input, cli.file_type)?;
    let schema_files = collect_schema_files(&cli)?;

    println!("{}", hex::encode(&data));

    if schema_files.is_empty() {
        if cli.package.is_some() {
            bail!("Decoding a message needs a schema (--pb-file or --pb-dir)");
        }
        return inspect(&cli, &data);
    }

    let store = load_schema(&schema_files)?;

    match (cli.package.as_deref(), cli.name.as_deref()) {
        (Some(package), Some(name)) => decode(&cli, &store, package, name, &data),
        (Some(package), None) => list_messages(&store, package),
        (None, _) => {
            debug!("No package given, falling back to schema-less inspection");
            inspect(&cli, &data)
        }
    }
}

/// Reads the input file (or stdin) and undoes its encoding
fn read_input(input: &Path, file_type: FileType) -> Result<Vec<u8>> {
    let raw = if input == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read standard input")?;
        buf
    } else {
        if !input.is_file() {
            bail!("Input file does not exist: {}", input.display());
        }
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input.display()))?
    };

    trace!("Read {} input bytes", raw.len());

    match file_type {
        FileType::Binary => Ok(raw),
        FileType::Hex => parse_hex(&raw),
    }
}

/// Decodes hex text, ignoring any whitespace between digits
fn parse_hex(raw: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    hex::decode(digits).context("Input is not valid hex")
}

/// Explicit `--pb-file`s first, then everything found under `--pb-dir`
fn collect_schema_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut files = cli.pb_files.clone();
    if let Some(ref dir) = cli.pb_dir {
        files.extend(discover_schema_files(dir)?);
    }
    Ok(files)
}

/// Walks `dir` for schema files, sorted by path
fn discover_schema_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Schema directory does not exist: {}", dir.display());
    }

    info!("Scanning schema directory: {}", dir.display());

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .filter(|path| SchemaKind::of(path).is_some())
        .collect();
    found.sort();

    debug!("Found {} schema file(s)", found.len());
    Ok(found)
}

fn load_schema(files: &[PathBuf]) -> Result<SchemaStore> {
    let mut store = SchemaStore::new();

    for path in files {
        match SchemaKind::of(path).unwrap_or(SchemaKind::Source) {
            SchemaKind::Source => store
                .read_file(path)
                .with_context(|| format!("Failed to load schema: {}", path.display()))?,
            SchemaKind::DescriptorSet => {
                let bytes = fs::read(path)
                    .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
                store
                    .read_descriptor_set(&path.to_string_lossy(), &bytes)
                    .with_context(|| format!("Failed to load descriptor set: {}", path.display()))?;
            }
        }
    }

    info!(
        "Loaded {} message(s) and {} enum(s) from {} file(s)",
        store.message_count(),
        store.enum_count(),
        files.len()
    );
    Ok(store)
}

fn inspect(cli: &Cli, data: &[u8]) -> Result<()> {
    let config = InspectorConfig::new().verbose(cli.verbose_bytes);
    let mut out = String::new();
    let result = Inspector::with_config(config).inspect_text(data, &mut out);

    println!("=>");
    print!("{}", out);

    let summary = result.context("Failed to inspect input")?;
    if !summary.is_balanced() {
        warn!("Input ended with {} unclosed group(s)", summary.depth);
    }
    Ok(())
}

fn list_messages(store: &SchemaStore, package: &str) -> Result<()> {
    let messages = store.messages_in_package(package);
    if messages.is_empty() {
        bail!("No messages found in package '{}'", package);
    }

    println!("Messages in package '{}':", package);
    for message in messages {
        println!("  {}", message.name);
    }
    Ok(())
}

fn decode(cli: &Cli, store: &SchemaStore, package: &str, name: &str, data: &[u8]) -> Result<()> {
    let config = DecoderConfig::new()
        .max_depth(cli.max_depth)
        .strict(cli.strict)
        .decode_oneofs(cli.decode_oneofs);

    println!("=> (pkg={} name={})", package, name);

    let fields = Decoder::with_config(store, config)
        .decode(package, name, data)
        .with_context(|| format!("Failed to decode input as {}.{}", package, name))?;

    let json = serde_json::to_string_pretty(&fields).context("Failed to render JSON")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from([
            "pbinspect",
            "msg.bin",
            "shop.v1",
            "Order",
            "--pb-file",
            "a.proto",
            "--pb-file",
            "b.desc",
            "--file-type",
            "hex",
            "-vv",
            "--strict",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("msg.bin"));
        assert_eq!(cli.package.as_deref(), Some("shop.v1"));
        assert_eq!(cli.name.as_deref(), Some("Order"));
        assert_eq!(cli.pb_files.len(), 2);
        assert_eq!(cli.file_type, FileType::Hex);
        assert_eq!(cli.verbose, 2);
        assert!(cli.strict);
        assert!(!cli.decode_oneofs);
        assert_eq!(cli.max_depth, 100);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex(b"08 96\n01\r\n").unwrap(), vec![0x08, 0x96, 0x01]);
        assert!(parse_hex(b"0g").is_err());
        assert!(parse_hex(b"123").is_err());
    }

    #[test]
    fn test_read_input_hex_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input.hex");
        fs::write(&path, "0801 1002\n").unwrap();

        assert_eq!(
            read_input(&path, FileType::Hex).unwrap(),
            vec![0x08, 0x01, 0x10, 0x02]
        );
        assert_eq!(read_input(&path, FileType::Binary).unwrap(), b"0801 1002\n");
        assert!(read_input(&dir.path().join("missing"), FileType::Binary).is_err());
    }

    #[test]
    fn test_schema_kind() {
        assert_eq!(SchemaKind::of(Path::new("a/b.proto")), Some(SchemaKind::Source));
        assert_eq!(SchemaKind::of(Path::new("set.pb")), Some(SchemaKind::DescriptorSet));
        assert_eq!(SchemaKind::of(Path::new("set.desc")), Some(SchemaKind::DescriptorSet));
        assert_eq!(SchemaKind::of(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_discover_schema_files() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested/deeper");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("b.proto"), "").unwrap();
        fs::write(nested.join("a.proto"), "").unwrap();
        fs::write(nested.join("types.desc"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        fs::write(dir.path().join(".hidden.proto"), "").unwrap();

        let found = discover_schema_files(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("b.proto"),
                PathBuf::from("nested/deeper/a.proto"),
                PathBuf::from("nested/deeper/types.desc"),
            ]
        );

        assert!(discover_schema_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_load_schema_and_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("point.proto");
        fs::write(
            &path,
            "syntax = \"proto3\";\npackage geo;\nmessage Point { int32 x = 1; int32 y = 2; }\n",
        )
        .unwrap();

        let store = load_schema(&[path]).unwrap();
        assert_eq!(store.messages_in_package("geo").len(), 1);

        let fields = Decoder::new(&store)
            .decode("geo", "Point", &[0x08, 0x01, 0x10, 0x02])
            .unwrap();
        assert_eq!(
            serde_json::to_string(&fields).unwrap(),
            r#"{"x":1,"y":2}"#
        );
    }

    #[test]
    fn test_load_schema_reports_bad_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.proto");
        fs::write(&path, "message {").unwrap();
        assert!(load_schema(&[path]).is_err());
    }
}
