//! What the reporter needs to know about the running server.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MetricsResult;

/// Optional plugin modules shipped alongside the core plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Module {
    Essentials,
    EssentialsAntiBuild,
    EssentialsAntiCheat,
    EssentialsChat,
    EssentialsSpawn,
    EssentialsProtect,
    EssentialsGeoIP,
}

impl Module {
    pub const ALL: [Module; 7] = [
        Module::Essentials,
        Module::EssentialsAntiBuild,
        Module::EssentialsAntiCheat,
        Module::EssentialsChat,
        Module::EssentialsSpawn,
        Module::EssentialsProtect,
        Module::EssentialsGeoIP,
    ];

    /// Plugin name as registered with the server.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essentials => "Essentials",
            Self::EssentialsAntiBuild => "EssentialsAntiBuild",
            Self::EssentialsAntiCheat => "EssentialsAntiCheat",
            Self::EssentialsChat => "EssentialsChat",
            Self::EssentialsSpawn => "EssentialsSpawn",
            Self::EssentialsProtect => "EssentialsProtect",
            Self::EssentialsGeoIP => "EssentialsGeoIP",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that decide which features count as enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSettings {
    pub teleport_cooldown: Duration,
    pub teleport_delay: Duration,
    pub signs_disabled: bool,
    pub auto_afk: Duration,
    pub change_player_list_name: bool,
    pub operator_color: Option<String>,
    pub change_display_name: bool,
    pub chat_radius: i32,
}

/// How the economy dependency is provided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EconomyKind {
    /// Bridged through Vault; the underlying economy plugin is reported.
    Vault { economy: String },
    /// A directly supported economy plugin.
    Plugin,
}

/// The active economy dependency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyInfo {
    pub name: String,
    pub version: String,
    pub kind: EconomyKind,
}

impl EconomyInfo {
    /// `"<name> <version>"` as reported in the Dependencies graph.
    ///
    /// Vault reports the bridged economy's name. Other plugins report their
    /// version with any build suffix after the first `-` removed, unless the
    /// version starts with `-`.
    pub fn label(&self) -> String {
        let version = match &self.kind {
            EconomyKind::Vault { economy } => economy.as_str(),
            EconomyKind::Plugin => match self.version.find('-') {
                Some(pos) if pos > 0 => &self.version[..pos],
                _ => self.version.as_str(),
            },
        };
        format!("{} {}", self.name, version)
    }
}

/// Read-only view of the server used to build a report.
///
/// Counts may come from storage and can fail; the rest are plain settings.
pub trait ServerStats: Send + Sync {
    fn is_module_enabled(&self, module: Module) -> bool;

    /// English display name of the configured locale's language.
    fn locale_language(&self) -> String;

    fn unique_accounts(&self) -> MetricsResult<u64>;

    fn jail_count(&self) -> MetricsResult<u64>;

    /// Number of configured kits, `None` when no kits section exists.
    fn kit_count(&self) -> MetricsResult<Option<u64>>;

    fn warp_count(&self) -> MetricsResult<u64>;

    fn features(&self) -> FeatureSettings;

    fn economy(&self) -> Option<EconomyInfo>;

    fn permissions_handler(&self) -> String;

    fn enabled_signs(&self) -> Vec<String>;
}
