#![cfg(not(target_arch = "wasm32"))]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn, LevelFilter};

use slop_textures::{FileDecoder, HeadlessDevice, TextureEngine, TextureSettings};

const USAGE: &str = "usage: texpipe [--settings FILE] [--root DIR] [--reload] SET.json...

Texture sets and every texture name in them are relative to the media root.";

struct Args {
    settings: Option<PathBuf>,
    root: PathBuf,
    reload: bool,
    sets: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        settings: None,
        root: PathBuf::from("."),
        reload: false,
        sets: Vec::new(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => args.settings = Some(it.next().context("--settings needs a file")?.into()),
            "--root" => args.root = it.next().context("--root needs a directory")?.into(),
            "--reload" => args.reload = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ => args.sets.push(arg.into()),
        }
    }
    if args.sets.is_empty() {
        bail!("no texture sets given\n{}", USAGE);
    }
    Ok(args)
}

fn setup_logging() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    setup_logging();
    let args = parse_args()?;

    let settings = match &args.settings {
        Some(path) => TextureSettings::from_json_file(path)
            .with_context(|| format!("loading settings {}", path.display()))?,
        None => TextureSettings::default(),
    };

    std::env::set_current_dir(&args.root)
        .with_context(|| format!("entering media root {}", args.root.display()))?;
    let source = Arc::new(FileDecoder::new("."));
    let mut engine = TextureEngine::new(HeadlessDevice::new(), source, settings);

    let mut sets = engine.open_sets(&args.sets)?;
    engine.load_sets(&mut sets)?;
    engine.mount_sets(&mut sets)?;

    let missing = engine.registry().missing();
    for (path, set) in args.sets.iter().zip(&sets) {
        let complete = set
            .entries()
            .iter()
            .filter(|e| engine.slots().slot(e.slot).is_some_and(|s| s.loaded))
            .count();
        println!("{}: {}/{} slots complete", path.display(), complete, set.len());
        for entry in set.entries() {
            let Some(slot) = engine.slots().slot(entry.slot) else {
                continue;
            };
            for tex in &slot.sts {
                if tex.t == Some(missing) {
                    warn!("slot {} {}: {} missing", slot.index.0, tex.role.key(), tex.name);
                }
            }
        }
    }

    if args.reload {
        engine.cleanup_all();
        let reloaded = engine.reload_all();
        engine.load_active()?;
        info!("reloaded {} textures", reloaded);
    }

    let stats = engine.stats();
    println!(
        "textures: {} ({} resident), slots: {} active of {}, variants: {}, uploads: {}",
        stats.textures,
        stats.resident,
        stats.active_slots,
        stats.slots,
        stats.variants,
        engine.registry().device().upload_count()
    );
    Ok(())
}
