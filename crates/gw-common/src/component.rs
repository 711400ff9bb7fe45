//! Component catalog.
//!
//! A component is one independently capturable unit of gateway state. Each
//! component owns a top-level folder in the image archive and is selected
//! on the command line by a flag of the same name (`-config`, `-os`, ...).

use serde::{Deserialize, Serialize};

/// Backupable units of gateway state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    /// Operating system files listed in the backup manifest.
    Os,
    /// Node configuration files.
    Config,
    /// Main database dump, excluding audit data.
    #[serde(rename = "maindb")]
    MainDb,
    /// Audit table dump.
    Audits,
    /// Custom assertion jars and their property files.
    Ca,
    /// Modular assertion archives.
    Ma,
    /// `runtime/lib/ext` libraries.
    Ext,
    /// Version marker of the producing gateway.
    Version,
    /// Enterprise Service Manager data.
    Esm,
    /// node.properties and omp.dat; only reported during migrate.
    NodeIdentity,
}

impl ComponentType {
    /// Every component in the order operations run them.
    pub const ALL: [ComponentType; 10] = [
        ComponentType::Version,
        ComponentType::Config,
        ComponentType::MainDb,
        ComponentType::Audits,
        ComponentType::Os,
        ComponentType::Ca,
        ComponentType::Ma,
        ComponentType::Ext,
        ComponentType::Esm,
        ComponentType::NodeIdentity,
    ];

    /// Components that can be requested by a command-line flag.
    pub const SELECTABLE: [ComponentType; 8] = [
        ComponentType::Config,
        ComponentType::MainDb,
        ComponentType::Audits,
        ComponentType::Os,
        ComponentType::Ca,
        ComponentType::Ma,
        ComponentType::Ext,
        ComponentType::Esm,
    ];

    /// Canonical component name, also the archive folder name where one exists.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::Os => "os",
            ComponentType::Config => "config",
            ComponentType::MainDb => "maindb",
            ComponentType::Audits => "audits",
            ComponentType::Ca => "ca",
            ComponentType::Ma => "ma",
            ComponentType::Ext => "ext",
            ComponentType::Version => "version",
            ComponentType::Esm => "esm",
            ComponentType::NodeIdentity => "node identity",
        }
    }

    /// Archive folder for this component.
    ///
    /// `Version` is a root file, not a folder, and `NodeIdentity` lives inside
    /// the config folder, so neither has one.
    pub fn folder(&self) -> Option<&'static str> {
        match self {
            ComponentType::Version | ComponentType::NodeIdentity => None,
            other => Some(other.name()),
        }
    }

    /// Human readable description used in logs and result payloads.
    pub fn description(&self) -> &'static str {
        match self {
            ComponentType::Os => "Operating System files",
            ComponentType::Config => "Gateway Config",
            ComponentType::MainDb => "Database backup and data excluding audit data",
            ComponentType::Audits => "Database audit data",
            ComponentType::Ca => "Custom Assertions",
            ComponentType::Ma => "Modular Assertions",
            ComponentType::Ext => "Gateway/runtime/lib/ext",
            ComponentType::Version => "Gateway Version Information",
            ComponentType::Esm => "Enterprise Service Manager",
            ComponentType::NodeIdentity => "node.properties & omp.dat",
        }
    }

    /// Command-line flag that selects this component, e.g. `-config`.
    pub fn option_name(&self) -> Option<String> {
        if Self::SELECTABLE.contains(self) {
            Some(format!("-{}", self.name()))
        } else {
            None
        }
    }

    /// Whether the file set comes from a manifest rather than a fixed layout.
    pub fn is_manifest_driven(&self) -> bool {
        matches!(self, ComponentType::Os)
    }

    /// Whether the component is backed by the external database client.
    pub fn is_database(&self) -> bool {
        matches!(self, ComponentType::MainDb | ComponentType::Audits)
    }

    /// Look up a component by its archive folder name.
    pub fn from_folder(folder: &str) -> Option<ComponentType> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.folder() == Some(folder))
    }

    /// Look up a component by its command-line flag (with the leading dash).
    pub fn from_option(option: &str) -> Option<ComponentType> {
        let name = option.strip_prefix('-')?;
        Self::SELECTABLE.iter().copied().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
