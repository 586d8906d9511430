// Command-line interface for blocksync.
//
// Local halves of the reconciliation flow as explicit subcommands:
// fingerprint a file, diff two fingerprints, build a patch against a stale
// fingerprint, apply a patch, and inspect persisted artifacts. Shipping
// artifacts between machines is left to ssh/scp or whatever transport the
// caller prefers.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::engine;
use crate::fingerprint::build::BuildOptions;
use crate::patch::codec::{DEFAULT_COMPRESSION_LEVEL, PatchReader};

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    if num == 0 {
        return Err(format!("size must be non-zero: '{s}'"));
    }
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Fixed-block fingerprint/diff/patch tool for large files.
#[derive(Parser, Debug)]
#[command(
    name = "blocksync",
    version,
    about = "Reconcile large files by transferring only changed blocks",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output results as JSON to stdout.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compute a file's fingerprint and persist it.
    Fingerprint(FingerprintArgs),
    /// Compare two persisted fingerprints.
    Diff(DiffArgs),
    /// Build a compressed patch for a file against a stale fingerprint.
    BuildPatch(BuildPatchArgs),
    /// Apply a persisted patch to a file.
    Apply(ApplyArgs),
    /// Inspect a persisted fingerprint or patch.
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
struct FingerprintArgs {
    /// File to fingerprint.
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,

    /// Output path (default: <file>.fingerprint).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Chunk size (supports K/M/G suffix).
    #[arg(long = "chunk-size", value_parser = parse_byte_size, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Worker threads (default: half the available parallelism).
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(clap::Args, Debug)]
struct DiffArgs {
    /// The older fingerprint.
    #[arg(long, value_hint = ValueHint::FilePath)]
    old: PathBuf,

    /// The newer fingerprint.
    #[arg(long, value_hint = ValueHint::FilePath)]
    new: PathBuf,
}

#[derive(clap::Args, Debug)]
struct BuildPatchArgs {
    /// File holding the current content.
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,

    /// Stale fingerprint to diff against (default: <file>.fingerprint).
    #[arg(long, value_hint = ValueHint::FilePath)]
    fingerprint: Option<PathBuf>,

    /// Output path (default: <file>.blockpatch).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// zstd compression level.
    #[arg(long, short = 'l', value_parser = clap::value_parser!(i32).range(1..=19), default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    level: i32,
}

#[derive(clap::Args, Debug)]
struct ApplyArgs {
    /// File to patch.
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,

    /// Patch to apply (default: <file>.blockpatch).
    #[arg(long, value_hint = ValueHint::FilePath)]
    patch: Option<PathBuf>,

    /// Write directly into the target instead of patching a shadow copy
    /// and renaming it into place.
    #[arg(long = "in-place")]
    in_place: bool,
}

#[derive(clap::Args, Debug)]
struct ShowArgs {
    /// Fingerprint or patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    artifact: PathBuf,
}

// ---------------------------------------------------------------------------
// Fingerprint command
// ---------------------------------------------------------------------------

fn cmd_fingerprint(args: &FingerprintArgs, ctx: &Ctx) -> i32 {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| engine::fingerprint_path_for(&args.file));
    if output.exists() && !ctx.force {
        eprintln!(
            "blocksync: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return 1;
    }

    let opts = BuildOptions {
        chunk_size: args.chunk_size,
        workers: args.workers,
    };
    let fp = match engine::build_and_save_fingerprint_with(&args.file, &output, &opts) {
        Ok(fp) => fp,
        Err(e) => {
            eprintln!("blocksync: {e}");
            return 1;
        }
    };

    if ctx.json {
        let json = serde_json::json!({
            "command": "fingerprint",
            "file": args.file.display().to_string(),
            "output": output.display().to_string(),
            "chunk_size": fp.chunk_size(),
            "chunks": fp.chunk_count(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else if !ctx.quiet {
        println!(
            "wrote {} ({} chunks of {} bytes)",
            output.display(),
            fp.chunk_count(),
            fp.chunk_size()
        );
    }
    0
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn cmd_diff(args: &DiffArgs, ctx: &Ctx) -> i32 {
    let old = match engine::load_fingerprint(&args.old) {
        Ok(fp) => fp,
        Err(e) => {
            eprintln!("blocksync: {}: {e}", args.old.display());
            return 1;
        }
    };
    let new = match engine::load_fingerprint(&args.new) {
        Ok(fp) => fp,
        Err(e) => {
            eprintln!("blocksync: {}: {e}", args.new.display());
            return 1;
        }
    };

    let changed = match engine::diff(&old, &new) {
        Ok(indices) => indices,
        Err(e) => {
            eprintln!("blocksync: {e}");
            return 1;
        }
    };

    if ctx.json {
        let json = serde_json::json!({
            "command": "diff",
            "chunks": old.chunk_count(),
            "changed": changed,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else if changed.is_empty() {
        if !ctx.quiet {
            println!("fingerprints are identical");
        }
    } else {
        for index in &changed {
            println!("{index}");
        }
        if ctx.verbose > 0 {
            eprintln!(
                "blocksync: {} of {} chunks differ",
                changed.len(),
                old.chunk_count()
            );
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Build-patch command
// ---------------------------------------------------------------------------

fn cmd_build_patch(args: &BuildPatchArgs, ctx: &Ctx) -> i32 {
    let fingerprint = args
        .fingerprint
        .clone()
        .unwrap_or_else(|| engine::fingerprint_path_for(&args.file));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| engine::patch_path_for(&args.file));
    if output.exists() && !ctx.force {
        eprintln!(
            "blocksync: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return 1;
    }

    let changed = match engine::make_patch_file(&args.file, &fingerprint, &output, args.level) {
        Ok(changed) => changed,
        Err(e) => {
            eprintln!("blocksync: {e}");
            return 1;
        }
    };

    if ctx.json {
        let json = serde_json::json!({
            "command": "build-patch",
            "file": args.file.display().to_string(),
            "changed": changed,
            "output": if changed.is_empty() { None } else { Some(output.display().to_string()) },
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else if changed.is_empty() {
        if !ctx.quiet {
            println!("file is unchanged since its fingerprint; no patch written");
        }
    } else if !ctx.quiet {
        println!(
            "wrote {} ({} changed chunks)",
            output.display(),
            changed.len()
        );
    }
    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(args: &ApplyArgs, ctx: &Ctx) -> i32 {
    let patch = args
        .patch
        .clone()
        .unwrap_or_else(|| engine::patch_path_for(&args.file));

    if let Err(e) = engine::apply_patch_file(&args.file, &patch, args.in_place) {
        eprintln!("blocksync: {e}");
        return 1;
    }

    if ctx.json {
        let json = serde_json::json!({
            "command": "apply",
            "file": args.file.display().to_string(),
            "patch": patch.display().to_string(),
            "in_place": args.in_place,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else if !ctx.quiet {
        println!("applied {} to {}", patch.display(), args.file.display());
    }
    0
}

// ---------------------------------------------------------------------------
// Show command
// ---------------------------------------------------------------------------

fn cmd_show(args: &ShowArgs, ctx: &Ctx) -> i32 {
    // A fingerprint envelope is not a zstd frame, so try it first and fall
    // back to reading the artifact as a patch.
    if let Ok(fp) = crate::fingerprint::codec::read_file(&args.artifact) {
        if ctx.json {
            let json = serde_json::json!({
                "kind": "fingerprint",
                "chunk_size": fp.chunk_size(),
                "chunks": fp.chunk_count(),
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap());
        } else {
            println!("kind:        fingerprint");
            println!("chunk size:  {}", fp.chunk_size());
            println!("chunks:      {}", fp.chunk_count());
        }
        return 0;
    }

    let file = match std::fs::File::open(&args.artifact) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("blocksync: {}: {e}", args.artifact.display());
            return 1;
        }
    };
    let mut reader = match PatchReader::new(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!(
                "blocksync: {} is neither a fingerprint nor a patch: {e}",
                args.artifact.display()
            );
            return 1;
        }
    };

    let chunk_size = reader.chunk_size();
    let mut entries: Vec<u64> = Vec::new();
    let mut payload = 0u64;
    loop {
        match reader.next_entry() {
            Ok(Some((index, bytes))) => {
                entries.push(index);
                payload += bytes.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                eprintln!("blocksync: {}: {e}", args.artifact.display());
                return 1;
            }
        }
    }

    if ctx.json {
        let json = serde_json::json!({
            "kind": "patch",
            "chunk_size": chunk_size,
            "entries": entries,
            "payload_bytes": payload,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("kind:          patch");
        println!("chunk size:    {chunk_size}");
        println!("entries:       {}", entries.len());
        println!("payload bytes: {payload}");
        if ctx.verbose > 0 {
            for index in &entries {
                println!("  chunk {index}");
            }
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

struct Ctx {
    force: bool,
    quiet: bool,
    verbose: u8,
    json: bool,
}

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let ctx = Ctx {
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json: cli.json_output,
    };

    let exit_code = match &cli.command {
        Cmd::Fingerprint(args) => cmd_fingerprint(args, &ctx),
        Cmd::Diff(args) => cmd_diff(args, &ctx),
        Cmd::BuildPatch(args) => cmd_build_patch(args, &ctx),
        Cmd::Apply(args) => cmd_apply(args, &ctx),
        Cmd::Show(args) => cmd_show(args, &ctx),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
