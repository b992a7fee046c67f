use clap::Parser;
use std::path::PathBuf;
use subbasin_lib::{PipelineConfig, Result, ScoringMode};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Subbasin Namer - Assigns main rivers, display names, fragments and downstream chains to watershed sub-basins
pub struct Settings {
    /// JSON pipeline configuration; the options below override its values
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// River lines (GeoJSON)
    #[clap(long, value_name = "FILE")]
    pub rivers: Option<PathBuf>,

    /// River network table with name and downstream properties (GeoJSON)
    #[clap(long, value_name = "FILE")]
    pub river_network: Option<PathBuf>,

    /// Sub-basin polygons (GeoJSON)
    #[clap(long, value_name = "FILE")]
    pub subbasins: Option<PathBuf>,

    /// Proxy reach lines, one per sub-basin (GeoJSON)
    #[clap(long, value_name = "FILE")]
    pub proxy_lines: Option<PathBuf>,

    /// Main-river cache (CSV), read if present and written after computing
    #[clap(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Output file, or a directory to receive a timestamped file
    #[clap(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Buffer applied to proxy lines before scoring (0 keeps lines)
    #[clap(long)]
    pub proxy_buffer: Option<f64>,

    /// Buffer applied to the sub-basin working geometry (negative shrinks)
    #[clap(long, allow_hyphen_values = true)]
    pub subbasin_buffer: Option<f64>,

    /// Simplification tolerance for the sub-basin working geometry
    #[clap(long)]
    pub simplify_tolerance: Option<f64>,

    /// Intersection scoring: count or length
    #[clap(long, value_parser = parse_scoring)]
    pub scoring: Option<ScoringMode>,

    /// Keep the MainRiver column in the output
    #[clap(long, default_value = "false")]
    pub keep_main_river: bool,

    /// Skip the FlowTo columns
    #[clap(long, default_value = "false")]
    pub no_hierarchy: bool,
}

impl Settings {
    /// Parse the command line, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Build the pipeline configuration: defaults, then the config file, then overrides
    pub fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Reading configuration from {}", path.display());
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => PipelineConfig::default(),
        };

        let paths = &mut config.paths;
        if let Some(rivers) = self.rivers {
            paths.rivers = rivers;
        }
        if let Some(network) = self.river_network {
            paths.river_network = network;
        }
        if let Some(subbasins) = self.subbasins {
            paths.subbasins = subbasins;
        }
        if let Some(proxy_lines) = self.proxy_lines {
            paths.proxy_lines = proxy_lines;
        }
        if self.cache.is_some() {
            paths.main_river_cache = self.cache;
        }
        if let Some(output) = self.output {
            paths.output = output;
        }

        let geometry = &mut config.geometry;
        if let Some(buffer) = self.proxy_buffer {
            geometry.proxy_buffer = buffer;
        }
        if let Some(buffer) = self.subbasin_buffer {
            geometry.subbasin_buffer = buffer;
        }
        if let Some(tolerance) = self.simplify_tolerance {
            geometry.simplify_tolerance = tolerance;
        }
        if let Some(scoring) = self.scoring {
            geometry.scoring = scoring;
        }

        config.keep_main_river |= self.keep_main_river;
        if self.no_hierarchy {
            config.hierarchy_columns = false;
        }
        Ok(config)
    }
}

fn parse_scoring(value: &str) -> std::result::Result<ScoringMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "count" => Ok(ScoringMode::Count),
        "length" => Ok(ScoringMode::Length),
        other => Err(format!("unknown scoring mode {other:?}, expected count or length")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_arguments() {
        let settings = Settings::try_parse_from(["subbasin-namer"]).unwrap();
        let config = settings.into_config().unwrap();
        assert_eq!(config.geometry.proxy_buffer, 25.0);
        assert!(config.hierarchy_columns);
        assert!(!config.keep_main_river);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::try_parse_from([
            "subbasin-namer",
            "--rivers",
            "rivers.geojson",
            "--cache",
            "main_rivers.csv",
            "--subbasin-buffer",
            "-150",
            "--scoring",
            "Length",
            "--keep-main-river",
            "--no-hierarchy",
        ])
        .unwrap();
        let config = settings.into_config().unwrap();
        assert_eq!(config.paths.rivers, PathBuf::from("rivers.geojson"));
        assert_eq!(
            config.paths.main_river_cache,
            Some(PathBuf::from("main_rivers.csv"))
        );
        assert_eq!(config.geometry.subbasin_buffer, -150.0);
        assert_eq!(config.geometry.scoring, ScoringMode::Length);
        assert!(config.keep_main_river);
        assert!(!config.hierarchy_columns);
    }

    #[test]
    fn test_config_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "paths": { "rivers": "from_file.geojson", "output": "out" },
                "geometry": { "proxy_buffer": 0.0 },
                "unnamed_label": "unnamed"
            }"#,
        )
        .unwrap();

        let settings = Settings::try_parse_from([
            "subbasin-namer",
            "--config",
            path.to_str().unwrap(),
            "--output",
            "elsewhere",
        ])
        .unwrap();
        let config = settings.into_config().unwrap();
        assert_eq!(config.paths.rivers, PathBuf::from("from_file.geojson"));
        assert_eq!(config.paths.output, PathBuf::from("elsewhere"));
        assert_eq!(config.geometry.proxy_buffer, 0.0);
        // Unset fields keep their defaults
        assert_eq!(config.geometry.simplify_tolerance, 20.0);
        assert_eq!(config.unnamed_label, "unnamed");
        assert_eq!(config.terminal_sinks.len(), 2);
    }

    #[test]
    fn test_unknown_scoring_is_rejected() {
        let result = Settings::try_parse_from(["subbasin-namer", "--scoring", "area"]);
        assert!(result.is_err());
    }
}
