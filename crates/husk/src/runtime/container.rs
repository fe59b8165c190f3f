//! Container lifecycle operations.

use std::fs::File;
use std::path::PathBuf;
use std::process::Command;

use husk_common::{
    ContainerRecord, ContainerStatus, HuskError, HuskResult, generate_container_id, validate_name,
};
use husk_network::NetworkManager;

use super::config::{RunConfig, RuntimeConfig};
use super::process::{self, ContainerProcess, SpawnConfig};
use super::state::RecordStore;
use crate::cgroup::CgroupManager;
use crate::exec::nsenter::{ENV_EXEC_CMD, ENV_EXEC_PID};
use crate::filesystem::LayerStore;

/// Parent directory of every container's cgroup.
const CGROUP_PARENT: &str = "husk";

/// Cgroup path of the container with this id.
#[must_use]
pub fn cgroup_path(id: &str) -> PathBuf {
    PathBuf::from(CGROUP_PARENT).join(id)
}

/// Starts, stops and removes containers.
#[derive(Debug, Clone)]
pub struct ContainerManager {
    config: RuntimeConfig,
    records: RecordStore,
    layers: LayerStore,
}

impl ContainerManager {
    /// Create a manager over the given runtime configuration.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            records: RecordStore::new(config.paths.clone()),
            layers: LayerStore::new(config.paths.clone()),
            config,
        }
    }

    /// Runtime configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The record store.
    #[must_use]
    pub const fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Start a container.
    ///
    /// The workspace is assembled first, then the init process is cloned with
    /// the mount point as its working directory. Once its pid is recorded the
    /// cgroup and the network endpoint are set up, and only then is the
    /// command released to init. Errors after the spawn are returned as is;
    /// the half-started container is left for `stop`/`rm` to clean up.
    pub fn new_container(
        &self,
        interactive: bool,
        config: &RunConfig,
    ) -> HuskResult<(ContainerProcess, ContainerRecord)> {
        if config.commands.is_empty() {
            return Err(HuskError::config("no command given"));
        }

        let id = generate_container_id();
        let name = if config.container_name.is_empty() {
            id.clone()
        } else {
            config.container_name.clone()
        };
        validate_name(&name)?;

        let paths = &self.config.paths;
        let mount_point = self.layers.new_workspace(&config.volume, &name, &config.image_name)?;

        let log = if interactive {
            None
        } else {
            std::fs::create_dir_all(paths.container(&name))?;
            Some(File::create(paths.container_log(&name))?)
        };

        let (init, pipe) = process::spawn_init(SpawnConfig {
            cwd: &mount_point,
            env: &config.env,
            log,
        })?;
        let pid = init.pid();

        let mut record = ContainerRecord::running(
            id.as_str(),
            name.as_str(),
            pid.unsigned_abs(),
            &config.commands,
            config.volume.as_str(),
            config.port_mapping.clone(),
        );
        self.records.save(&record)?;

        let cgroup = CgroupManager::new(cgroup_path(&id));
        cgroup.set(&config.resources);
        cgroup.apply(pid);

        if !config.network.is_empty() {
            let networks = NetworkManager::new(paths)?;
            let endpoint = networks.connect(&config.network, &record)?;
            record.network.clone_from(&config.network);
            record.ip_address = endpoint.ip_address.to_string();
            self.records.save(&record)?;
        }

        pipe.send(&config.commands)?;

        tracing::info!(
            container = %name,
            id = %id,
            pid,
            image = %config.image_name,
            "Container started"
        );
        Ok((init, record))
    }

    /// Send SIGTERM to a running container and mark it stopped.
    pub fn stop(&self, name: &str) -> HuskResult<ContainerRecord> {
        let mut record = self.records.load(name)?;
        let pid = record.pid_number()?;

        process::send_signal(pid, libc::SIGTERM)?;
        record.mark_stopped();
        self.records.save(&record)?;

        tracing::info!(container = name, pid, "Container stopped");
        Ok(record)
    }

    /// Delete the record directory and the workspace of `name`.
    ///
    /// No status check happens here; see [`Self::remove`].
    pub fn destroy(&self, name: &str, volume: &str) -> HuskResult<()> {
        let removed = self.records.delete(name);
        self.layers.delete_workspace(volume, name);
        removed
    }

    /// Remove a container that is no longer running.
    pub fn remove(&self, name: &str) -> HuskResult<()> {
        let record = self.records.load(name)?;
        if !record.status.can_remove() {
            return Err(HuskError::config(format!(
                "container {name} is running, stop it first"
            )));
        }
        self.teardown(&record)?;
        tracing::info!(container = name, "Container removed");
        Ok(())
    }

    /// Release everything a container holds. Only the final destroy can fail.
    pub fn teardown(&self, record: &ContainerRecord) -> HuskResult<()> {
        if record.has_endpoint() {
            let disconnected = NetworkManager::new(&self.config.paths)
                .and_then(|networks| networks.disconnect(record));
            if let Err(e) = disconnected {
                tracing::warn!(container = %record.name, error = %e, "Failed to disconnect network");
            }
        }

        if let Err(e) = CgroupManager::new(cgroup_path(&record.id)).destroy() {
            tracing::warn!(container = %record.name, error = %e, "Failed to destroy cgroup");
        }

        self.destroy(&record.name, &record.volume)
    }

    /// Run `command` inside the namespaces of a running container.
    ///
    /// The current binary is re-executed with the target pid and command in
    /// its environment; its startup path joins the namespaces before anything
    /// else runs. Returns the exit code of the command.
    pub fn exec(&self, name: &str, command: &[String]) -> HuskResult<i32> {
        let record = self.records.load(name)?;
        let pid = record.pid_number()?;
        let command = command.join(" ");
        let container_env = read_environ(pid)?;

        tracing::debug!(container = name, pid, command = %command, "Executing in container");

        let status = Command::new(std::env::current_exe()?)
            .arg("exec")
            .arg(name)
            .arg(&command)
            .envs(container_env)
            .env(ENV_EXEC_PID, pid.to_string())
            .env(ENV_EXEC_CMD, &command)
            .status()?;

        Ok(status.code().unwrap_or(1))
    }

    /// All container records.
    pub fn list(&self) -> HuskResult<Vec<ContainerRecord>> {
        self.records.list()
    }

    /// All container records, with running ones whose process is gone
    /// marked as exited.
    pub fn refresh(&self) -> HuskResult<Vec<ContainerRecord>> {
        let mut records = self.records.list()?;
        for record in &mut records {
            if record.status != ContainerStatus::Running {
                continue;
            }
            let alive = record.pid_number().is_ok_and(process::is_alive);
            if !alive {
                tracing::debug!(container = %record.name, pid = %record.pid, "Container process has exited");
                record.mark_exited();
                self.records.save(record)?;
            }
        }
        Ok(records)
    }

    /// Log file of a detached container.
    pub fn log_path(&self, name: &str) -> HuskResult<PathBuf> {
        self.records.load(name)?;
        Ok(self.config.paths.container_log(name))
    }
}

/// Environment block of a process as `(key, value)` pairs.
pub fn read_environ(pid: i32) -> HuskResult<Vec<(String, String)>> {
    let path = format!("/proc/{pid}/environ");
    let raw = std::fs::read(&path)?;
    Ok(parse_environ(&raw))
}

fn parse_environ(raw: &[u8]) -> Vec<(String, String)> {
    raw.split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
        })
        .collect()
}
