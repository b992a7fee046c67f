//! End-to-end run over the configured layers
//!
//! Stage order: harmonise CRS, resolve main rivers (cache-aware), assign them, optimise the
//! working geometry, fragment, name, fill the downstream columns, restore the original
//! geometry and export.

use crate::cache::{load_main_river_cache, save_main_river_cache};
use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostics, Stage};
use crate::export::{ExportColumns, export_subbasins, output_file_path};
use crate::fragment::fragment_subbasins;
use crate::geometry;
use crate::hierarchy::RiverHierarchy;
use crate::layers::{ProxyLayer, RiverLayer, RiverNetwork, SubbasinLayer};
use crate::resolver::MainRiverResolver;
use crate::Result;
use std::path::PathBuf;

/// The four input layers of a run
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub rivers: RiverLayer,
    pub network: RiverNetwork,
    pub subbasins: SubbasinLayer,
    pub proxies: ProxyLayer,
}

/// Summary of a run
#[derive(Debug, Default)]
pub struct RunReport {
    pub subbasins: usize,
    /// Sub-basins that received a main river
    pub with_main_river: usize,
    /// Sub-basins that received a fragment index
    pub fragmented: usize,
    /// Whether main rivers came from the persisted cache
    pub cache_used: bool,
    /// Longest downstream chain, i.e. the number of `FlowTo2..` columns
    pub flow_to_depth: usize,
    /// Written file, if the run exported
    pub output: Option<PathBuf>,
    pub diagnostics: Diagnostics,
}

/// Runs every stage from a [`PipelineConfig`]
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, process and export
    pub fn run(&self) -> Result<RunReport> {
        let (mut layers, load_diagnostics) = self.load()?;
        let mut report = self.process(&mut layers)?;

        let mut diagnostics = load_diagnostics;
        diagnostics.extend(std::mem::take(&mut report.diagnostics));
        report.diagnostics = diagnostics;

        let path = output_file_path(&self.config.paths.output, chrono::Local::now().time());
        export_subbasins(
            &layers.subbasins,
            &self.config.properties,
            ExportColumns {
                keep_main_river: self.config.keep_main_river,
                flow_to_depth: report.flow_to_depth,
            },
            &path,
        )?;
        report.output = Some(path);

        tracing::info!(
            "Done: {} subbasins, {} with a main river, {} fragmented, {} diagnostics",
            report.subbasins,
            report.with_main_river,
            report.fragmented,
            report.diagnostics.len()
        );
        Ok(report)
    }

    /// Load the four input layers concurrently
    pub fn load(&self) -> Result<(Layers, Diagnostics)> {
        let paths = &self.config.paths;
        let names = &self.config.properties;

        let ((rivers, network), (subbasins, proxies)) = rayon::join(
            || {
                rayon::join(
                    || with_diagnostics(|d| RiverLayer::load(&paths.rivers, &names.river_name, d)),
                    || {
                        RiverNetwork::load(
                            &paths.river_network,
                            &names.network_name,
                            &names.network_flow_to,
                        )
                    },
                )
            },
            || {
                rayon::join(
                    || {
                        with_diagnostics(|d| {
                            SubbasinLayer::load(&paths.subbasins, &names.subbasin_id, d)
                        })
                    },
                    || {
                        with_diagnostics(|d| {
                            ProxyLayer::load(&paths.proxy_lines, &names.subbasin_id, d)
                        })
                    },
                )
            },
        );

        let (rivers, mut diagnostics) = rivers?;
        let network = network?;
        let (subbasins, subbasin_diagnostics) = subbasins?;
        let (proxies, proxy_diagnostics) = proxies?;
        diagnostics.extend(subbasin_diagnostics);
        diagnostics.extend(proxy_diagnostics);

        Ok((
            Layers {
                rivers,
                network,
                subbasins,
                proxies,
            },
            diagnostics,
        ))
    }

    /// Run every stage up to (not including) export on in-memory layers.
    ///
    /// On return the sub-basins carry their derived attributes and their original geometry.
    pub fn process(&self, layers: &mut Layers) -> Result<RunReport> {
        let mut diagnostics = Diagnostics::new();
        let Layers {
            rivers,
            network,
            subbasins,
            proxies,
        } = layers;

        // Harmonise CRS
        subbasins.reproject(rivers.crs);
        proxies.reproject(rivers.crs);

        // Resolve and assign main rivers
        let (resolver, cache_used) = self.main_river_resolver(rivers, proxies, &mut diagnostics);
        for subbasin in subbasins.subbasins_mut() {
            subbasin.main_river = resolver.resolve(subbasin.id).map(str::to_string);
        }

        // Optimise working geometry
        let params = &self.config.geometry;
        for subbasin in subbasins.subbasins_mut() {
            match geometry::optimize(
                &subbasin.working,
                params.subbasin_buffer,
                params.simplify_tolerance,
                params.repair_tolerance,
            ) {
                Ok(optimized) => subbasin.working = optimized,
                Err(e) => diagnostics.record(Stage::Optimize, format!("subbasin {}", subbasin.id), e),
            }
        }

        diagnostics.extend(fragment_subbasins(
            subbasins.subbasins_mut(),
            rivers,
            &self.config.unnamed_label,
        ));

        for subbasin in subbasins.subbasins_mut() {
            subbasin.display_name = self
                .config
                .naming
                .display_name(subbasin.main_river.as_deref());
        }

        let flow_to_depth = if self.config.hierarchy_columns {
            self.fill_downstream(network, subbasins)
        } else {
            0
        };

        subbasins.restore_original_geometry();

        let items = subbasins.subbasins();
        Ok(RunReport {
            subbasins: items.len(),
            with_main_river: items.iter().filter(|s| s.main_river.is_some()).count(),
            fragmented: items.iter().filter(|s| s.fragment.is_some()).count(),
            cache_used,
            flow_to_depth,
            output: None,
            diagnostics,
        })
    }

    /// Resolver holding the cached map when the cache file loads, else freshly computed
    /// results (saved to the cache file when one is configured)
    fn main_river_resolver<'r>(
        &self,
        rivers: &'r RiverLayer,
        proxies: &ProxyLayer,
        diagnostics: &mut Diagnostics,
    ) -> (MainRiverResolver<'r>, bool) {
        let mut resolver = MainRiverResolver::new(rivers, self.config.geometry.scoring);
        let cache_path = self.config.paths.main_river_cache.as_deref();

        if let Some(path) = cache_path.filter(|p| p.exists()) {
            match load_main_river_cache(path) {
                Ok(map) => return (resolver.with_results(map), true),
                Err(e) => diagnostics.record(Stage::Cache, path.display().to_string(), e),
            }
        }

        diagnostics.extend(resolver.resolve_all(proxies, self.config.geometry.proxy_buffer));

        if let Some(path) = cache_path {
            if let Err(e) = save_main_river_cache(path, resolver.results()) {
                diagnostics.record(Stage::Cache, path.display().to_string(), e);
            }
        }
        (resolver, false)
    }

    /// Fill `flow_to` and `downstream`; returns the longest chain length
    fn fill_downstream(&self, network: &RiverNetwork, subbasins: &mut SubbasinLayer) -> usize {
        let hierarchy = RiverHierarchy::build(network, self.config.terminal_sinks.as_slice());

        for subbasin in subbasins.subbasins_mut() {
            let Some(main_river) = subbasin.main_river.as_deref() else {
                subbasin.flow_to = None;
                subbasin.downstream.clear();
                continue;
            };
            let flow_to = hierarchy.flows_to(main_river).map(str::to_string);
            subbasin.downstream = match &flow_to {
                Some(flow_to) => hierarchy
                    .get(&(main_river.to_string(), flow_to.clone()))
                    .map(<[String]>::to_vec)
                    .unwrap_or_else(|| hierarchy.chain(main_river)),
                None => {
                    tracing::debug!("{:?} is not in the river network", main_river);
                    Vec::new()
                }
            };
            subbasin.flow_to = flow_to;
        }

        hierarchy.max_chain_len()
    }
}

fn with_diagnostics<T>(load: impl FnOnce(&mut Diagnostics) -> Result<T>) -> Result<(T, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let value = load(&mut diagnostics)?;
    Ok((value, diagnostics))
}
