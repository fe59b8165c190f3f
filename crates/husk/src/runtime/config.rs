//! Runtime configuration.

use std::path::PathBuf;

use husk_common::{HuskPaths, ResourceConfig};

/// Runtime configuration options.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Paths for runtime data.
    pub paths: HuskPaths,
}

impl RuntimeConfig {
    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = HuskPaths::with_root(root);
        self
    }
}

/// Everything `run` needs to start one container.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Resource limits for the container's cgroup.
    pub resources: ResourceConfig,
    /// Raw `host:container` volume spec, or empty.
    pub volume: String,
    /// Requested name. The generated id is used when empty.
    pub container_name: String,
    /// Image whose archive backs the root filesystem.
    pub image_name: String,
    /// Network to connect to, or empty.
    pub network: String,
    /// Extra `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// `hostPort:containerPort` entries.
    pub port_mapping: Vec<String>,
    /// The command and its arguments.
    pub commands: Vec<String>,
}

impl RunConfig {
    /// Configuration for running `commands` from `image`.
    #[must_use]
    pub fn new(image: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            image_name: image.into(),
            commands,
            ..Self::default()
        }
    }

    /// Set the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    /// Set the volume spec.
    #[must_use]
    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = volume.into();
        self
    }

    /// Attach the container to `network`.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Set the resource limits.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceConfig) -> Self {
        self.resources = resources;
        self
    }

    /// Set the port mappings.
    #[must_use]
    pub fn with_port_mapping(mut self, port_mapping: Vec<String>) -> Self {
        self.port_mapping = port_mapping;
        self
    }

    /// Set extra environment entries.
    #[must_use]
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }
}
