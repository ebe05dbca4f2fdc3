// Command-line front end for the `.mjo` codec.
//
// Explicit subcommands with long-form options: disassemble a script, rebuild
// it through the encoder, dump the de-obfuscated image, or print its header.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::container::Container;
use crate::io::{self as file_io, IoError, OpenStats, WriteStats, hex_digest};
use crate::mjo::decoder::CodecOptions;
use crate::mjo::header::{FIXED_HEADER_LEN, SIGNATURE};
use crate::mjo::keystream::{KEYSTREAM_LEN, KeystreamTable, ResourceError};
use crate::mjo::opcode::MAX_GENERIC_OPCODE;
use crate::mjo::text::TextEncoding;

const BUF_SIZE: usize = 64 * 1024;

fn parse_encoding(s: &str) -> Result<TextEncoding, String> {
    s.parse()
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Majiro `.mjo` script disassembler/rebuilder.
#[derive(Parser, Debug)]
#[command(
    name = "mjo",
    version,
    about = "Majiro MajiroObjX1.000 script codec",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Keystream resource (whitespace-separated hex bytes). Defaults to the
    /// builtin table.
    #[arg(long, short = 'k', global = true, value_hint = ValueHint::FilePath)]
    keystream: Option<PathBuf>,

    /// Legacy text encoding of string operands (sjis, gbk, utf8).
    #[arg(long, short = 'e', global = true, value_parser = parse_encoding, default_value = "sjis")]
    encoding: TextEncoding,

    /// Fail on string operands that do not round-trip through the encoding.
    #[arg(long = "strict-text", global = true)]
    strict_text: bool,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a text disassembly of a script.
    Disasm(IoArgs),
    /// Decode a script and encode it again.
    Rebuild(RebuildArgs),
    /// Write the de-obfuscated container image.
    Unpack(IoArgs),
    /// Print header fields and the entry table.
    Header(PrintArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input `.mjo` file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output file (default: stdout).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RebuildArgs {
    /// Compare the rebuilt image with the input instead of writing it.
    #[arg(long = "check-only", conflicts_with = "output")]
    check_only: bool,

    #[command(flatten)]
    io: IoArgs,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Input `.mjo` file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Disasm,
    Rebuild,
    Unpack,
    Header,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    check_only: bool,
    keystream: Option<PathBuf>,
    codec: CodecOptions,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        check_only: false,
        keystream: cli.keystream,
        codec: CodecOptions {
            encoding: cli.encoding,
            strict_text: cli.strict_text,
        },
        input_file: None,
        output_file: None,
    };

    match cli.command {
        Cmd::Disasm(args) => {
            opts.command = Command::Disasm;
            opts.input_file = Some(args.input);
            opts.output_file = args.output;
        }
        Cmd::Rebuild(args) => {
            opts.command = Command::Rebuild;
            opts.check_only = args.check_only;
            opts.input_file = Some(args.io.input);
            opts.output_file = args.io.output;
        }
        Cmd::Unpack(args) => {
            opts.command = Command::Unpack;
            opts.input_file = Some(args.input);
            opts.output_file = args.output;
        }
        Cmd::Header(args) => {
            opts.command = Command::Header;
            opts.input_file = Some(args.input);
        }
        Cmd::Config => {}
    }
    opts
}

fn log_filter(opts: &Options) -> &'static str {
    if opts.quiet {
        return "error";
    }
    match opts.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("mjo".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = log_filter(&opts);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn load_keystream(opts: &Options) -> Result<KeystreamTable, ResourceError> {
    match &opts.keystream {
        Some(path) => KeystreamTable::load(path),
        None => Ok(KeystreamTable::builtin()),
    }
}

/// Load the keystream and open the input container, reporting failures.
fn open_input(opts: &Options) -> Option<(Container, OpenStats, KeystreamTable)> {
    let Some(input) = opts.input_file.as_deref() else {
        eprintln!("mjo: an input file is required");
        return None;
    };
    let key = match load_keystream(opts) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("mjo: keystream: {e}");
            return None;
        }
    };
    match file_io::open_file(input, &key, opts.codec) {
        Ok((container, stats)) => Some((container, stats, key)),
        Err(e) => {
            eprintln!("mjo: {}: {e}", input.display());
            None
        }
    }
}

fn check_output(opts: &Options, path: &Path) -> bool {
    if path.exists() && !opts.force {
        eprintln!(
            "mjo: to overwrite output file specify -f: {}",
            path.display()
        );
        return false;
    }
    true
}

fn write_stdout(bytes: &[u8]) -> io::Result<()> {
    let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
    out.write_all(bytes)?;
    out.flush()
}

fn digest_json(digest: Option<[u8; 32]>) -> serde_json::Value {
    digest.map_or(serde_json::Value::Null, |d| hex_digest(&d).into())
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => eprintln!("{text}"),
        Err(e) => eprintln!("mjo: json: {e}"),
    }
}

fn report(opts: &Options, command: &str, input: &OpenStats, output: Option<&WriteStats>) {
    if opts.verbose > 0 && !opts.quiet {
        eprint!(
            "mjo: {command}: input size: {}, header: {:#x}, instructions: {}",
            input.file_size, input.header_len, input.instructions
        );
        match output {
            Some(out) => eprintln!(", output size: {}", out.size),
            None => eprintln!(),
        }
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": command,
            "input_size": input.file_size,
            "header_len": input.header_len,
            "instructions": input.instructions,
            "input_sha256": digest_json(input.sha256),
            "output_size": output.map(|o| o.size),
            "output_sha256": digest_json(output.and_then(|o| o.sha256)),
        });
        print_json(&json);
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("mjo version {version} (Rust)");

    let file_io = cfg!(feature = "file-io") as u8;
    let signature = String::from_utf8_lossy(&SIGNATURE[..SIGNATURE.len() - 1]);

    eprintln!("FILE_IO={file_io}");
    eprintln!("SIGNATURE={signature}");
    eprintln!("FIXED_HEADER_LEN={FIXED_HEADER_LEN:#x}");
    eprintln!("KEYSTREAM_LEN={KEYSTREAM_LEN}");
    eprintln!("MAX_GENERIC_OPCODE={MAX_GENERIC_OPCODE}");
    eprintln!("DEFAULT_ENCODING={}", TextEncoding::default());

    0
}

// ---------------------------------------------------------------------------
// Disasm command
// ---------------------------------------------------------------------------

fn cmd_disasm(opts: &Options) -> i32 {
    let Some((container, in_stats, _key)) = open_input(opts) else {
        return 1;
    };

    let out_stats = match &opts.output_file {
        Some(path) => {
            if !check_output(opts, path) {
                return 1;
            }
            match file_io::write_disassembly(&container, path) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    eprintln!("mjo: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        None => {
            let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
            let written = container
                .disassemble()
                .write_to(&mut out)
                .and_then(|()| out.flush());
            if let Err(e) = written {
                eprintln!("mjo: write error: {e}");
                return 1;
            }
            None
        }
    };

    report(opts, "disasm", &in_stats, out_stats.as_ref());
    0
}

// ---------------------------------------------------------------------------
// Rebuild command
// ---------------------------------------------------------------------------

fn cmd_rebuild(opts: &Options) -> i32 {
    let Some((container, in_stats, key)) = open_input(opts) else {
        return 1;
    };

    if opts.check_only {
        let Some(input) = opts.input_file.as_deref() else {
            return 1;
        };
        let result = container
            .to_bytes(&key)
            .map_err(IoError::from)
            .and_then(|rebuilt| Ok((rebuilt, std::fs::read(input)?)));
        let (rebuilt, original) = match result {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("mjo: rebuild error: {e}");
                return 1;
            }
        };
        if let Some(pos) = rebuilt.iter().zip(&original).position(|(a, b)| a != b) {
            eprintln!("mjo: rebuilt image differs at offset {pos:#x}");
            return 1;
        }
        if rebuilt.len() != original.len() {
            eprintln!(
                "mjo: rebuilt image is {} bytes, input is {}",
                rebuilt.len(),
                original.len()
            );
            return 1;
        }
        if !opts.quiet {
            eprintln!("mjo: {}: round-trip ok", input.display());
        }
        report(opts, "rebuild", &in_stats, None);
        return 0;
    }

    let out_stats = match &opts.output_file {
        Some(path) => {
            if !check_output(opts, path) {
                return 1;
            }
            match file_io::write_container(&container, &key, path) {
                Ok(stats) => stats,
                Err(e) => {
                    eprintln!("mjo: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        None => {
            let image = match container.to_bytes(&key) {
                Ok(image) => image,
                Err(e) => {
                    eprintln!("mjo: rebuild error: {e}");
                    return 1;
                }
            };
            if let Err(e) = write_stdout(&image) {
                eprintln!("mjo: write error: {e}");
                return 1;
            }
            WriteStats {
                size: image.len() as u64,
                sha256: None,
            }
        }
    };

    report(opts, "rebuild", &in_stats, Some(&out_stats));
    0
}

// ---------------------------------------------------------------------------
// Unpack command
// ---------------------------------------------------------------------------

fn cmd_unpack(opts: &Options) -> i32 {
    let Some((container, in_stats, _key)) = open_input(opts) else {
        return 1;
    };

    let out_stats = match &opts.output_file {
        Some(path) => {
            if !check_output(opts, path) {
                return 1;
            }
            match file_io::write_plain(&container, path) {
                Ok(stats) => stats,
                Err(e) => {
                    eprintln!("mjo: {}: {e}", path.display());
                    return 1;
                }
            }
        }
        None => {
            let image = match container.to_plain_bytes() {
                Ok(image) => image,
                Err(e) => {
                    eprintln!("mjo: unpack error: {e}");
                    return 1;
                }
            };
            if let Err(e) = write_stdout(&image) {
                eprintln!("mjo: write error: {e}");
                return 1;
            }
            WriteStats {
                size: image.len() as u64,
                sha256: None,
            }
        }
    };

    report(opts, "unpack", &in_stats, Some(&out_stats));
    0
}

// ---------------------------------------------------------------------------
// Header command
// ---------------------------------------------------------------------------

fn cmd_header(opts: &Options) -> i32 {
    let Some((container, stats, _key)) = open_input(opts) else {
        return 1;
    };

    if opts.json_output {
        let entries: Vec<_> = container
            .entries()
            .iter()
            .map(|e| serde_json::json!({ "hash": e.hash, "offset": e.offset }))
            .collect();
        let json = serde_json::json!({
            "command": "header",
            "line_count": container.line_count(),
            "entry_count": container.entry_count(),
            "header_len": container.header_len(),
            "body_len": stats.file_size as usize - container.header_len(),
            "instructions": container.instructions().len(),
            "trailer_len": container.trailer().len(),
            "entries": entries,
        });
        print_json(&json);
        return 0;
    }

    println!("Line count:                   {}", container.line_count());
    println!("Entry count:                  {}", container.entry_count());
    println!("Header length:                {:#x}", container.header_len());
    println!(
        "Body length:                  {}",
        stats.file_size as usize - container.header_len()
    );
    println!("Instructions:                 {}", container.instructions().len());
    if !container.trailer().is_empty() {
        println!("Trailing bytes:               {}", container.trailer().len());
    }
    if let Some(digest) = stats.sha256 {
        println!("SHA-256:                      {}", hex_digest(&digest));
    }
    if !container.entries().is_empty() {
        println!();
        println!("  Index       Hash     Offset");
        for (i, entry) in container.entries().iter().enumerate() {
            println!("  {i:5}  {:08x}  {:#9x}", entry.hash, entry.offset);
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Disasm => cmd_disasm(&opts),
        Command::Rebuild => cmd_rebuild(&opts),
        Command::Unpack => cmd_unpack(&opts),
        Command::Header => cmd_header(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
