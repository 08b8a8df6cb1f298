use std::sync::Arc;

use ess_storage::{HolderCache, StorageObject};
use tracing::debug;

use crate::error::MetricsResult;
use crate::graph::{Graph, MetricsReport};
use crate::stats::{Module, ServerStats};

/// A read-only count sampled on every report.
pub trait Gauge: Send + Sync {
    fn value(&self) -> MetricsResult<u64>;
}

/// Number of open holders in a cache.
impl<T: StorageObject> Gauge for HolderCache<T> {
    fn value(&self) -> MetricsResult<u64> {
        Ok(self.len() as u64)
    }
}

/// Adapts a closure into a [`Gauge`].
pub struct FnGauge<F>(pub F);

impl<F> Gauge for FnGauge<F>
where
    F: Fn() -> MetricsResult<u64> + Send + Sync,
{
    fn value(&self) -> MetricsResult<u64> {
        (self.0)()
    }
}

/// Builds [`MetricsReport`]s from a [`ServerStats`] view plus any
/// registered storage gauges.
#[derive(Default)]
pub struct Collector {
    gauges: Vec<(String, Arc<dyn Gauge>)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample `gauge` under `name` in the "Storage" graph.
    pub fn register_gauge(&mut self, name: impl Into<String>, gauge: Arc<dyn Gauge>) {
        self.gauges.push((name.into(), gauge));
    }

    pub fn gauge_count(&self) -> usize {
        self.gauges.len()
    }

    /// Collect every graph. Any failing count aborts the whole report.
    pub fn collect(&self, stats: &dyn ServerStats) -> MetricsResult<MetricsReport> {
        let mut graphs = vec![
            modules_graph(stats),
            locale_graph(stats),
            features_graph(stats)?,
            enabled_features_graph(stats)?,
            dependencies_graph(stats),
            signs_graph(stats),
        ];
        if !self.gauges.is_empty() {
            graphs.push(self.storage_graph()?);
        }
        debug!(graphs = graphs.len(), "metrics collected");
        Ok(MetricsReport::new(graphs))
    }

    fn storage_graph(&self) -> MetricsResult<Graph> {
        let mut graph = Graph::new("Storage");
        for (name, gauge) in &self.gauges {
            graph.count(name.clone(), gauge.value()?);
        }
        Ok(graph)
    }
}

fn modules_graph(stats: &dyn ServerStats) -> Graph {
    let mut graph = Graph::new("Modules Used");
    for module in Module::ALL {
        graph.present_if(stats.is_module_enabled(module), module.as_str());
    }
    graph
}

fn locale_graph(stats: &dyn ServerStats) -> Graph {
    let mut graph = Graph::new("Locale");
    graph.present(stats.locale_language());
    graph
}

fn features_graph(stats: &dyn ServerStats) -> MetricsResult<Graph> {
    let mut graph = Graph::new("Features");
    graph
        .count("Unique Accounts", stats.unique_accounts()?)
        .count("Jails", stats.jail_count()?)
        .count("Kits", stats.kit_count()?.unwrap_or(0))
        .count("Warps", stats.warp_count()?);
    Ok(graph)
}

fn enabled_features_graph(stats: &dyn ServerStats) -> MetricsResult<Graph> {
    let settings = stats.features();
    let mut graph = Graph::new("EnabledFeatures");
    graph
        .present("Total")
        .present_if(stats.jail_count()? > 0, "Jails")
        .present_if(stats.kit_count()?.is_some_and(|n| n > 0), "Kits")
        .present_if(stats.warp_count()? > 0, "Warps")
        .present_if(!settings.teleport_cooldown.is_zero(), "TeleportCooldown")
        .present_if(!settings.teleport_delay.is_zero(), "TeleportDelay")
        .present_if(!settings.signs_disabled, "Signs")
        .present_if(!settings.auto_afk.is_zero(), "AutoAFK")
        .present_if(settings.change_player_list_name, "PlayerListName")
        .present_if(settings.operator_color.is_some(), "OpColour")
        .present_if(settings.change_display_name, "DisplayName")
        .present_if(settings.chat_radius >= 1, "LocalChat");
    Ok(graph)
}

fn dependencies_graph(stats: &dyn ServerStats) -> Graph {
    let mut graph = Graph::new("Dependencies");
    if let Some(economy) = stats.economy() {
        graph.present(economy.label());
    }
    graph.present(stats.permissions_handler());
    graph
}

fn signs_graph(stats: &dyn ServerStats) -> Graph {
    let mut graph = Graph::new("Signs");
    for sign in stats.enabled_signs() {
        graph.present(sign);
    }
    graph
}
