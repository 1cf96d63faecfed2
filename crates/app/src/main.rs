//! svarog-texpipe: run textures through the pool's post-load filters and
//! inspect texgen render state.
//!
//! Usage: svarog-texpipe [--txa=FILE] [--model-path=DIRS] [--out-dir=DIR]
//!        [--texgen=stage:mode,...] [--archive=FILE] [TEXTURE...]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use asset::{PipelineConfig, TexturePool, TxaFileFilter};
use corelib::{GeomRendering, TexGenAttrib, TexGenMode, TextureStage, bam};
use renderer::SoftwareGsg;

fn arg_value(prefix: &str) -> Option<String> {
    std::env::args()
        .skip(1)
        .filter_map(|arg| arg.strip_prefix(prefix).map(str::to_owned))
        .last()
}

fn parse_txa_arg() -> Option<PathBuf> {
    // --txa=path/to/textures.txa
    arg_value("--txa=").map(PathBuf::from)
}

fn parse_model_path_arg() -> Vec<PathBuf> {
    // --model-path=dir1:dir2 (platform path list)
    arg_value("--model-path=")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default()
}

fn parse_out_dir_arg() -> Option<PathBuf> {
    arg_value("--out-dir=").map(PathBuf::from)
}

fn parse_archive_arg() -> Option<PathBuf> {
    arg_value("--archive=").map(PathBuf::from)
}

/// --texgen=env:eye_sphere_map,sprite:point_sprite
fn parse_texgen_arg() -> Result<Vec<(String, TexGenMode)>> {
    let Some(spec) = arg_value("--texgen=") else {
        return Ok(Vec::new());
    };
    spec.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| -> Result<(String, TexGenMode)> {
            let (stage, mode) = item
                .split_once(':')
                .with_context(|| format!("Expected stage:mode, got '{item}'"))?;
            let mode = mode.parse::<TexGenMode>()?;
            Ok((stage.trim().to_owned(), mode))
        })
        .collect()
}

fn parse_texture_args() -> Vec<PathBuf> {
    std::env::args()
        .skip(1)
        .filter(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .collect()
}

/// Stages are sorted in the order given on the command line.
fn build_tex_gen(entries: &[(String, TexGenMode)]) -> Arc<TexGenAttrib> {
    entries
        .iter()
        .enumerate()
        .fold(TexGenAttrib::make(), |attrib, (i, (name, mode))| {
            let stage = TextureStage::new(name.as_str()).with_sort(i as i32).into_shared();
            attrib.add_stage(&stage, *mode)
        })
}

fn run_textures(config: &PipelineConfig, textures: &[PathBuf], out_dir: Option<&PathBuf>) -> usize {
    let mut pool = TexturePool::global().lock();
    pool.set_config(config.clone());
    pool.register_filter(Box::new(TxaFileFilter::from_config(config)));

    let mut failures = 0;
    for path in textures {
        let tex = match pool.load_texture(path) {
            Ok(tex) => tex,
            Err(err) => {
                log::error!("{err:#}");
                failures += 1;
                continue;
            }
        };
        if let Some(dir) = out_dir {
            let target = dir.join(format!("{}.png", tex.name()));
            match tex.data().save_png(&target) {
                Ok(()) => log::info!("Wrote {:?}", target),
                Err(err) => {
                    log::error!("{err:#}");
                    failures += 1;
                }
            }
        }
    }
    failures
}

fn run_texgen(entries: &[(String, TexGenMode)], archive: Option<PathBuf>) -> Result<()> {
    let attrib = build_tex_gen(entries);
    log::info!("{}", attrib);

    let mut gsg = SoftwareGsg::new();
    attrib.issue(&mut gsg);
    log::info!(
        "points render as {:?}; shader uniform {:?}",
        gsg.geom_rendering(GeomRendering::POINT),
        gsg.uniform()
    );

    if let Some(path) = archive {
        let bytes = bam::write_tex_gen_attribs(&[attrib.clone()])?;
        fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
        let restored = bam::read_tex_gen_attribs(&bytes)?;
        log::info!("Archived {} bytes to {:?}: {}", bytes.len(), path, restored[0]);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = PipelineConfig::from_env();
    if let Some(txa) = parse_txa_arg() {
        config.txa_file = txa;
    }
    config.model_path.extend(parse_model_path_arg());
    let out_dir = parse_out_dir_arg();
    let textures = parse_texture_args();
    let texgen = parse_texgen_arg()?;

    log::info!(
        "Starting svarog-texpipe. txa={:?}, model_path={:?}, textures={}, texgen stages={}",
        config.txa_file,
        config.model_path,
        textures.len(),
        texgen.len()
    );

    if let Some(dir) = &out_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let failures = run_textures(&config, &textures, out_dir.as_ref());
    if !texgen.is_empty() {
        run_texgen(&texgen, parse_archive_arg())?;
    }

    if failures > 0 {
        anyhow::bail!("{failures} texture(s) failed");
    }
    log::info!("Done.");
    Ok(())
}
