use clap::Parser as ClapParser;
use log::{error, info};
use slippc::analyzer;
use slippc::codec::Codec;
use slippc::compress::{self, Compressor, Decompressor};
use slippc::error::SlippcError;
use slippc::pipeline::{self, EncodeOptions};
use slippc::replay::metadata_summary_json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit codes follow the same load/validate/output/missing-input/bad-output-dir
/// split the error types themselves are divided into.
const EXIT_LOAD_FAILURE: u8 = 2;
const EXIT_VALIDATE_FAILURE: u8 = 3;
const EXIT_OUTPUT_FAILURE: u8 = 4;
const EXIT_MISSING_INPUT: u8 = 255; // -1
const EXIT_BAD_OUTPUT_DIR: u8 = 254; // -2

#[derive(ClapParser, Debug)]
#[command(
    name = "slippc",
    version,
    about = "Parses, analyzes, and losslessly re-encodes Slippi replay files."
)]
struct Args {
    /// Input `.slp`/`.zlp` file, or a directory of them.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Write the replay's metadata summary as JSON here (`-` for stdout).
    #[arg(short = 'j', long = "json", num_args = 0..=1, default_missing_value = "-")]
    json: Option<String>,

    /// Write the interaction analysis as JSON here (`-` for stdout).
    #[arg(short = 'a', long = "analysis", num_args = 0..=1, default_missing_value = "-")]
    analysis: Option<String>,

    /// Skip the round-trip validation pass after encoding.
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Force encode direction, regardless of the input's current state.
    #[arg(short = 'x', long = "encode")]
    encode: bool,

    /// Explicit output path; defaults to the input path with its extension swapped.
    #[arg(short = 'X', long = "output")]
    output: Option<PathBuf>,

    /// Parser/codec debug verbosity, 0-9.
    #[arg(short = 'd', long = "debug", default_value_t = 0)]
    debug: u8,

    /// Do the requested work but don't write the re-encoded/decoded replay itself.
    #[arg(long = "skip-save")]
    skip_save: bool,

    /// Stop after the codec's predictive transforms, without shuffling columns.
    #[arg(long = "raw-enc")]
    raw_enc: bool,

    /// Print any Gecko code list embedded in the replay's metadata.
    #[arg(long = "dump-gecko")]
    dump_gecko: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.debug {
        0 => log::LevelFilter::Warn,
        1..=2 => log::LevelFilter::Info,
        3..=5 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder().filter_level(level).format_timestamp(None).init();

    if !args.input.exists() {
        error!("input path '{}' does not exist", args.input.display());
        return ExitCode::from(EXIT_MISSING_INPUT);
    }

    if let Some(out) = &args.output {
        if let Some(parent) = out.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                error!("output directory '{}' does not exist", parent.display());
                return ExitCode::from(EXIT_BAD_OUTPUT_DIR);
            }
        }
    }

    let files: Vec<PathBuf> = if args.input.is_dir() {
        match fs::read_dir(&args.input) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("slp") | Some("zlp")))
                .collect(),
            Err(e) => {
                error!("could not read directory '{}': {e}", args.input.display());
                return ExitCode::from(EXIT_MISSING_INPUT);
            }
        }
    } else {
        vec![args.input.clone()]
    };

    if files.is_empty() {
        error!("no .slp/.zlp files found under '{}'", args.input.display());
        return ExitCode::from(EXIT_MISSING_INPUT);
    }

    let mut worst: Option<u8> = None;
    for file in &files {
        if let Err(code) = process_one(&args, file) {
            worst = Some(worst.map_or(code, |w| w.max(code)));
        }
    }

    match worst {
        Some(code) => ExitCode::from(code),
        None => ExitCode::SUCCESS,
    }
}

fn process_one(args: &Args, path: &Path) -> Result<(), u8> {
    info!("processing {}", path.display());
    let bytes = fs::read(path).map_err(|e| {
        error!("failed to read '{}': {e}", path.display());
        EXIT_LOAD_FAILURE
    })?;

    let already_zlp = path.extension().and_then(|e| e.to_str()) == Some("zlp") || compress::is_compressed(&bytes);
    let want_encode = args.encode && !already_zlp;
    let want_decode = already_zlp && !args.encode;

    if args.dump_gecko {
        dump_gecko(&bytes);
    }

    if args.raw_enc {
        return process_raw_enc(args, path, &bytes, want_encode);
    }

    let output_bytes = if want_encode {
        let opts = EncodeOptions { compression_level: 3, validate: !args.force };
        pipeline::encode(&bytes, &opts).map_err(|e| classify_error(&e))?
    } else if want_decode {
        pipeline::decode(&bytes).map_err(|e| classify_error(&e))?
    } else {
        bytes.clone()
    };

    if args.json.is_some() || args.analysis.is_some() {
        let replay = pipeline::parse_for_inspection(&output_bytes).map_err(|e| classify_error(&e))?;
        if let Some(dest) = &args.json {
            write_json(dest, path, "json", &metadata_summary_json(&replay.metadata))?;
        }
        if let Some(dest) = &args.analysis {
            let analysis = analyzer::analyze(&replay);
            write_json(dest, path, "analysis.json", &analyzer::analysis_json(&analysis))?;
        }
    }

    if !args.skip_save {
        let encoding = want_encode;
        let out_path = match &args.output {
            Some(p) => p.clone(),
            None => derive_output_path(path, encoding),
        };
        let out_str = out_path.to_string_lossy().to_string();
        pipeline::check_output_extension(&out_str, encoding).map_err(|_| EXIT_OUTPUT_FAILURE)?;
        if out_path.exists() && !args.force {
            let err = SlippcError::OutputExists(out_path.display().to_string());
            error!("{err}");
            return Err(classify_error(&err));
        }
        fs::write(&out_path, &output_bytes).map_err(|e| {
            error!("failed to write '{}': {e}", out_path.display());
            EXIT_OUTPUT_FAILURE
        })?;
    }

    Ok(())
}

/// `--raw-enc`: runs only the predictive codec, skipping the column shuffle,
/// leaving the output as a plain (still fully-eventstream-shaped) file.
fn process_raw_enc(args: &Args, path: &Path, bytes: &[u8], want_encode: bool) -> Result<(), u8> {
    let parsed_bytes = if compress::is_compressed(bytes) {
        let mut d = Decompressor::new().map_err(|_| EXIT_LOAD_FAILURE)?;
        compress::decompress(&mut d, bytes, bytes.len() * 8).map_err(|_| EXIT_LOAD_FAILURE)?
    } else {
        bytes.to_vec()
    };

    let parser = slippc::parser::Parser::new(args.debug);
    let parsed = parser.parse(&parsed_bytes).map_err(|_| EXIT_LOAD_FAILURE)?;

    let version = parsed.replay.version;
    let seed0 = slippc::binary::read_u32(&parsed.game_start_raw, slippc::schema::O_RNG_GAME_START);
    let codec = Codec::new(version, seed0);
    let mut stream = parsed.game_loop.clone();

    if want_encode {
        codec.encode(&mut stream).map_err(|_| EXIT_VALIDATE_FAILURE)?;
    } else {
        codec.decode(&mut stream).map_err(|_| EXIT_VALIDATE_FAILURE)?;
    }

    if !args.skip_save {
        let out_path = args.output.clone().unwrap_or_else(|| derive_output_path(path, want_encode));
        let mut out = Vec::new();
        out.extend_from_slice(&parsed.game_start_raw);
        out.extend_from_slice(&stream.to_bytes());
        out.extend_from_slice(&parsed.game_end_raw);
        fs::write(&out_path, &out).map_err(|_| EXIT_OUTPUT_FAILURE)?;
    }
    Ok(())
}

fn classify_error(e: &SlippcError) -> u8 {
    match e {
        SlippcError::ValidationMismatch { .. } => EXIT_VALIDATE_FAILURE,
        SlippcError::OutputExists(_) | SlippcError::BadOutputExtension(_) => EXIT_OUTPUT_FAILURE,
        _ => EXIT_LOAD_FAILURE,
    }
}

fn derive_output_path(input: &Path, encoding: bool) -> PathBuf {
    input.with_extension(pipeline::expected_extension(encoding))
}

fn write_json(dest: &str, source: &Path, suffix: &str, value: &serde_json::Value) -> Result<(), u8> {
    let text = serde_json::to_string_pretty(value).unwrap_or_default();
    if dest == "-" {
        println!("{text}");
        return Ok(());
    }
    let path = if Path::new(dest).is_dir() {
        Path::new(dest).join(source.with_extension(suffix).file_name().unwrap())
    } else {
        PathBuf::from(dest)
    };
    fs::write(&path, text).map_err(|e| {
        error!("failed to write '{}': {e}", path.display());
        EXIT_OUTPUT_FAILURE
    })
}

fn dump_gecko(bytes: &[u8]) {
    let Ok(replay) = pipeline::parse_for_inspection(bytes) else { return };
    if let Some(codes) = replay.metadata.raw_json.get("gecko_codes").or_else(|| replay.metadata.raw_json.get("geckoCodes")) {
        println!("{}", serde_json::to_string_pretty(codes).unwrap_or_default());
    } else {
        info!("no embedded gecko code list found");
    }
}
