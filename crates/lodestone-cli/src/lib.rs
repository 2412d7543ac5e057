//! # Lodestone CLI
//!
//! Command-line driver for the Lodestone mesh optimizer.
//!
//! Meshes are generated procedurally (`--shape`, `--detail`, `--scramble`)
//! since asset import lives outside this workspace.
//!
//! ## Commands
//! - `analyze` - Print mesh statistics
//! - `validate` - Report mesh issues, failing on an invalid mesh
//! - `optimize` - Run the GPU-order passes and print before/after statistics
//! - `lod` - Build an optimized LOD chain and pick a level by distance

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use lodestone_core::PipelineConfig;
use lodestone_mesh::{Mesh, MeshOptimizer, primitives};

/// Lodestone mesh optimizer CLI
#[derive(Parser)]
#[command(name = "lodestone")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline configuration (JSON); missing fields use defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Simulated vertex cache size
    #[arg(long, global = true)]
    pub cache_size: Option<u32>,

    /// Procedural input mesh
    #[arg(short, long, global = true, value_enum, default_value_t = Shape::Sphere)]
    pub shape: Shape,

    /// Tessellation of the input mesh
    #[arg(short, long, global = true, default_value = "16")]
    pub detail: u32,

    /// Shuffle the triangle order with the given seed
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "0")]
    pub scramble: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Procedural input meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shape {
    /// 24-vertex unit cube
    Cube,
    /// `detail` × `detail` flat grid
    Grid,
    /// UV sphere with `detail` rings and `2 × detail` segments
    Sphere,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print mesh statistics
    Analyze {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Report mesh issues
    Validate,

    /// Run vertex cache, vertex fetch and overdraw optimization
    Optimize {
        /// Skip vertex cache optimization
        #[arg(long)]
        skip_cache: bool,

        /// Skip vertex fetch optimization
        #[arg(long)]
        skip_fetch: bool,

        /// Skip overdraw optimization
        #[arg(long)]
        skip_overdraw: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Build an optimized LOD chain
    Lod {
        /// Number of evenly spaced levels (overrides the configured ratios)
        #[arg(short, long)]
        levels: Option<u32>,

        /// Viewer distance used to select a level
        #[arg(long)]
        distance: Option<f32>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Summary of one LOD level
#[derive(Debug, Serialize)]
struct LodLevelReport {
    level: usize,
    ratio: f32,
    vertices: usize,
    triangles: usize,
    acmr: f32,
}

/// Summary of a whole LOD chain
#[derive(Debug, Serialize)]
struct LodReport {
    levels: Vec<LodLevelReport>,
    distance: Option<f32>,
    selected: Option<usize>,
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let file = File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Configuration after applying the config file and flag overrides
pub fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(cache_size) = cli.cache_size {
        config.optimizer.cache_size = cache_size;
    }
    if cli.verbose {
        config.optimizer.verbose_logging = true;
    }
    Ok(config)
}

/// Input mesh described by the shape flags
pub fn build_mesh(cli: &Cli) -> Mesh {
    let detail = cli.detail.max(1);
    let mesh = match cli.shape {
        Shape::Cube => primitives::cube(1.0),
        Shape::Grid => primitives::grid(detail, detail, 1.0),
        Shape::Sphere => primitives::uv_sphere(detail.max(2), detail.max(2) * 2, 1.0),
    };

    match cli.scramble {
        Some(seed) => primitives::scramble_triangles(&mesh, seed),
        None => mesh,
    }
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let stdout = std::io::stdout();
    run(&cli, &mut stdout.lock())
}

/// Run a command, writing its report to `out`
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let config = resolve_config(cli)?;
    let optimizer = MeshOptimizer::new(config)?;
    let mut mesh = build_mesh(cli);
    log::info!(
        "Input mesh '{}': {} vertices, {} triangles",
        mesh.name,
        mesh.vertex_count(),
        mesh.triangle_count()
    );

    match &cli.command {
        Commands::Analyze { json } => {
            let analysis = optimizer.analyze(&mesh);
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&analysis)?)?;
            } else {
                writeln!(out, "{analysis}")?;
            }
        }

        Commands::Validate => {
            let issues = optimizer.issues(&mesh);
            if issues.is_empty() {
                writeln!(out, "Mesh '{}' is valid", mesh.name)?;
            } else {
                for issue in &issues {
                    writeln!(out, "  {issue}")?;
                }
                bail!("Mesh '{}' has {} issue(s)", mesh.name, issues.len());
            }
        }

        Commands::Optimize {
            skip_cache,
            skip_fetch,
            skip_overdraw,
            json,
        } => {
            let stats = optimizer.optimize_with_stats(&mut mesh, !skip_cache, !skip_fetch, !skip_overdraw);
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            } else {
                writeln!(out, "{stats}")?;
            }
        }

        Commands::Lod { levels, distance, json } => {
            let optimizer = match levels {
                Some(count) => {
                    let mut config = optimizer.config().clone();
                    let count = (*count).max(1);
                    config.lod.simplification_ratios =
                        (1..count).map(|i| 1.0 - i as f32 / count as f32).collect();
                    MeshOptimizer::new(config)?
                }
                None => optimizer,
            };

            let chain = optimizer.create_optimized_lod_chain(&mesh);
            let cache_size = optimizer.config().optimizer.cache_len();
            let selected = distance.and_then(|d| {
                let chosen = optimizer.select_lod(&chain, d)?;
                chain.meshes().position(|m| std::ptr::eq(m, chosen))
            });

            let report = LodReport {
                levels: chain
                    .levels()
                    .iter()
                    .enumerate()
                    .map(|(level, lod)| LodLevelReport {
                        level,
                        ratio: lod.ratio,
                        vertices: lod.mesh.vertex_count(),
                        triangles: lod.mesh.triangle_count(),
                        acmr: lodestone_mesh::calculate_acmr(&lod.mesh.indices, cache_size),
                    })
                    .collect(),
                distance: *distance,
                selected,
            };

            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                writeln!(out, "LOD chain ({} levels):", report.levels.len())?;
                for level in &report.levels {
                    writeln!(
                        out,
                        "  LOD {}: ratio {:.2}, {} vertices, {} triangles, ACMR {:.3}",
                        level.level, level.ratio, level.vertices, level.triangles, level.acmr
                    )?;
                }
                if let (Some(distance), Some(selected)) = (report.distance, report.selected) {
                    writeln!(out, "Selected LOD {selected} at distance {distance}")?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_string(args: &[&str]) -> Result<String> {
        let cli = Cli::parse_from(args);
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["lodestone", "analyze"]);
        assert!(matches!(cli.command, Commands::Analyze { json: false }));
        assert_eq!(cli.shape, Shape::Sphere);
        assert_eq!(cli.detail, 16);
        assert_eq!(cli.scramble, None);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "lodestone", "optimize", "--shape", "grid", "-d", "8", "--scramble", "--cache-size", "16",
        ]);
        assert_eq!(cli.shape, Shape::Grid);
        assert_eq!(cli.detail, 8);
        assert_eq!(cli.scramble, Some(0));

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.optimizer.cache_size, 16);
        assert_eq!(build_mesh(&cli).triangle_count(), 128);
    }

    #[test]
    fn test_lod_command() {
        let cli = Cli::parse_from(["lodestone", "lod", "--levels", "3", "--distance", "75"]);
        if let Commands::Lod { levels, distance, json } = cli.command {
            assert_eq!(levels, Some(3));
            assert_eq!(distance, Some(75.0));
            assert!(!json);
        } else {
            panic!("Expected Lod command");
        }
    }

    #[test]
    fn test_analyze_json_output() {
        let output = run_to_string(&["lodestone", "analyze", "--shape", "cube", "--json"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["vertex_count"], 24);
        assert_eq!(value["triangle_count"], 12);
    }

    #[test]
    fn test_validate_clean_mesh() {
        let output = run_to_string(&["lodestone", "validate", "--shape", "grid", "-d", "4"]).unwrap();
        assert!(output.contains("is valid"));
    }

    #[test]
    fn test_optimize_reports_stats() {
        let output =
            run_to_string(&["lodestone", "optimize", "--shape", "grid", "-d", "12", "--scramble", "7"]).unwrap();
        assert!(output.starts_with("Mesh Optimization Results:"));
    }

    #[test]
    fn test_lod_selects_level() {
        let output = run_to_string(&[
            "lodestone", "lod", "--shape", "sphere", "-d", "8", "--levels", "3", "--distance", "75", "--json",
        ])
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["levels"][0]["ratio"], 1.0);
        assert_eq!(value["selected"], 1);
    }

    #[test]
    fn test_zero_cache_size_is_an_error() {
        assert!(run_to_string(&["lodestone", "analyze", "--cache-size", "0"]).is_err());
    }
}
