use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, MetricsResult};

/// A single named value inside a [`Graph`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plotter {
    pub name: String,
    pub value: u64,
}

impl Plotter {
    /// A plotter carrying a count.
    pub fn count(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// A plotter that only records presence (value 1).
    pub fn present(name: impl Into<String>) -> Self {
        Self::count(name, 1)
    }
}

/// A named group of plotters, e.g. "Modules Used" or "Features".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    pub plotters: Vec<Plotter>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plotters: Vec::new(),
        }
    }

    pub fn add(&mut self, plotter: Plotter) -> &mut Self {
        self.plotters.push(plotter);
        self
    }

    pub fn present(&mut self, name: impl Into<String>) -> &mut Self {
        self.add(Plotter::present(name))
    }

    pub fn count(&mut self, name: impl Into<String>, value: u64) -> &mut Self {
        self.add(Plotter::count(name, value))
    }

    /// Add a presence plotter only when `condition` holds.
    pub fn present_if(&mut self, condition: bool, name: impl Into<String>) -> &mut Self {
        if condition {
            self.present(name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Plotter> {
        self.plotters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plotters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.plotters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plotters.is_empty()
    }
}

/// One round of collected statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Wall-clock milliseconds since UNIX epoch at collection time.
    pub collected_ms: u64,
    pub graphs: Vec<Graph>,
}

impl MetricsReport {
    pub fn new(graphs: Vec<Graph>) -> Self {
        let collected_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            collected_ms,
            graphs,
        }
    }

    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.iter().find(|g| g.name == name)
    }

    /// Render as compact JSON.
    pub fn to_json(&self) -> MetricsResult<String> {
        serde_json::to_string(self).map_err(|e| MetricsError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_plotters_have_value_one() {
        let p = Plotter::present("Jails");
        assert_eq!(p.value, 1);
    }

    #[test]
    fn graph_builder_chains() {
        let mut g = Graph::new("EnabledFeatures");
        g.present("Total")
            .present_if(false, "Kits")
            .present_if(true, "Warps")
            .count("Homes", 12);
        assert_eq!(g.names(), vec!["Total", "Warps", "Homes"]);
        assert_eq!(g.get("Homes").unwrap().value, 12);
        assert!(g.get("Kits").is_none());
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn report_lookup_and_json() {
        let mut g = Graph::new("Locale");
        g.present("English");
        let report = MetricsReport::new(vec![g]);
        assert!(report.graph("Locale").is_some());
        assert!(report.graph("Signs").is_none());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"name\":\"Locale\""));
        assert!(json.contains("\"English\""));
    }
}
