use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use astrostack_core::align::{
    PlanetaryAlignmentConfig, PlateSolverConfig, StarDetectionConfig, SurfaceAlignmentConfig,
};
use astrostack_core::quality::FocusMeasure;
use astrostack_core::stack::StackingConfig;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// How frames are registered against the reference frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMethod {
    /// Plate solving on star asterisms
    #[default]
    Stars,
    /// Center of mass and principal axis of a bright disk
    Planetary,
    /// Center of mass of a bright disk, translation only
    PlanetaryWithoutRotation,
    /// Local shifts of alignment points (lunar and solar surfaces)
    Surface,
    /// Star solution shifted to follow a comet
    Comet,
}

/// Alignment settings, one table per method.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    pub method: AlignmentMethod,
    /// Frame ranking for the star and comet methods; the surface and
    /// planetary tables carry their own.
    pub focus_measure: FocusMeasure,
    pub stars: StarDetectionConfig,
    pub plate_solver: PlateSolverConfig,
    pub surface: SurfaceAlignmentConfig,
    pub planetary: PlanetaryAlignmentConfig,
}

/// Everything `align`, `stack` and `master` read from a `--config` file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub alignment: AlignmentSettings,
    pub stacking: StackingConfig,
}

impl ProjectConfig {
    /// Read `path`, or the defaults when no file is given. Missing tables
    /// and keys keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Alignment method written as the default
    #[arg(long, value_enum, default_value_t = AlignmentMethod::Stars)]
    pub method: AlignmentMethod,
}

/// Print or save the default project config as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let mut config = ProjectConfig::default();
    config.alignment.method = args.method;
    let toml_str = toml::to_string_pretty(&config)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &toml_str)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Default config saved to {}", path.display());
        }
        None => print!("{toml_str}"),
    }
    Ok(())
}
