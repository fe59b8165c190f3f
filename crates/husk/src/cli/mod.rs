//! CLI command definitions and handlers.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, bail, eyre};
use husk_common::ResourceConfig;
use husk_network::{BRIDGE_DRIVER, NetworkManager};

use crate::exec::nsenter::ENV_EXEC_PID;
use crate::runtime::{ContainerManager, RunConfig, RuntimeConfig};

/// Husk - a small Linux container runtime
#[derive(Parser)]
#[command(name = "husk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for husk data [default: $HUSK_ROOT or /var/lib/husk]
    ///
    /// Container records then live under `<root>/run` instead of
    /// $HUSK_RUNTIME_DIR or /run/husk.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create and start a container
    Run(RunArgs),

    /// Container init process (used internally)
    #[command(hide = true)]
    Init,

    /// Execute a command in a running container
    Exec {
        /// Container name
        name: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Stop a running container
    Stop {
        /// Container name
        name: String,
    },

    /// Remove a stopped container
    Rm {
        /// Container name
        name: String,
    },

    /// List containers
    Ps,

    /// Print the log of a detached container
    Logs {
        /// Container name
        name: String,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },

    /// Manage networks
    #[command(subcommand)]
    Network(NetworkCommands),
}

/// Options of `husk run`.
#[derive(Args)]
pub struct RunArgs {
    /// Run the container in the background instead of attached
    #[arg(short, long)]
    pub detach: bool,

    /// Container name (defaults to the generated id)
    #[arg(long, default_value = "")]
    pub name: String,

    /// Memory limit, e.g. 100m
    #[arg(short, long, default_value = "")]
    pub memory: String,

    /// Relative CPU shares
    #[arg(long, default_value = "")]
    pub cpu_shares: String,

    /// CPUs the container may run on, e.g. 0-1
    #[arg(long, default_value = "")]
    pub cpuset: String,

    /// Volume as host_dir:container_dir
    #[arg(short, long, default_value = "")]
    pub volume: String,

    /// Environment variables as KEY=VALUE
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Network to connect to
    #[arg(long, default_value = "")]
    pub net: String,

    /// Port mappings as hostPort:containerPort
    #[arg(short, long)]
    pub publish: Vec<String>,

    /// Image name
    pub image: String,

    /// Command and arguments
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    fn into_config(self) -> RunConfig {
        RunConfig::new(self.image, self.command)
            .with_name(self.name)
            .with_volume(self.volume)
            .with_network(self.net)
            .with_port_mapping(self.publish)
            .with_env(self.env)
            .with_resources(ResourceConfig {
                memory_limit: self.memory,
                cpu_share: self.cpu_shares,
                cpu_set: self.cpuset,
            })
    }
}

/// Network commands.
#[derive(Subcommand)]
pub enum NetworkCommands {
    /// Create a network
    Create {
        /// Network name, also used for the bridge device
        name: String,

        /// Subnet in CIDR notation
        #[arg(long)]
        subnet: String,

        /// Network driver
        #[arg(long, default_value = BRIDGE_DRIVER)]
        driver: String,
    },

    /// List networks
    Ls,

    /// Remove a network
    Rm {
        /// Network name
        name: String,
    },
}

impl Cli {
    /// Execute the CLI command and return the process exit code.
    pub fn execute(self) -> Result<i32> {
        let config = runtime_config(self.root);
        let manager = ContainerManager::new(config.clone());

        match self.command {
            Commands::Run(args) => {
                let interactive = !args.detach;
                let run = args.into_config();
                if !run.container_name.is_empty() && manager.records().exists(&run.container_name) {
                    bail!("container {} already exists", run.container_name);
                }

                let (process, record) = manager.new_container(interactive, &run)?;
                if !interactive {
                    println!("{}", record.name);
                    return Ok(0);
                }

                let code = process.wait()?;
                manager.teardown(&record)?;
                Ok(code)
            }

            Commands::Init => {
                crate::exec::container_init()?;
                Ok(0)
            }

            Commands::Exec { name, command } => {
                // Namespace re-entry already happened in main.
                if std::env::var_os(ENV_EXEC_PID).is_some() {
                    return Ok(0);
                }
                Ok(manager.exec(&name, &command)?)
            }

            Commands::Stop { name } => {
                manager.stop(&name)?;
                println!("{name}");
                Ok(0)
            }

            Commands::Rm { name } => {
                manager.remove(&name)?;
                println!("{name}");
                Ok(0)
            }

            Commands::Ps => {
                let records = manager.refresh()?;
                let mut out = std::io::stdout().lock();
                writeln!(out, "ID\tNAME\tPID\tSTATUS\tCOMMAND\tCREATED")?;
                for r in records {
                    writeln!(
                        out,
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        r.id, r.name, r.pid, r.status, r.command, r.create_time
                    )?;
                }
                Ok(0)
            }

            Commands::Logs { name, follow } => {
                let path = manager.log_path(&name)?;
                print_log(&path, follow)?;
                Ok(0)
            }

            Commands::Network(command) => network_command(&config, command),
        }
    }
}

/// Paths from `--root` if given, from the environment otherwise.
fn runtime_config(root: Option<PathBuf>) -> RuntimeConfig {
    root.map_or_else(RuntimeConfig::default, |root| {
        RuntimeConfig::default().with_root(root)
    })
}

fn network_command(config: &RuntimeConfig, command: NetworkCommands) -> Result<i32> {
    let mut networks = NetworkManager::new(&config.paths)?;

    match command {
        NetworkCommands::Create {
            name,
            subnet,
            driver,
        } => {
            let network = networks.create(&driver, &subnet, &name)?;
            println!("{} {}", network.name, network.ip_range);
        }
        NetworkCommands::Ls => {
            println!("NAME\tIPRANGE\tDRIVER");
            for network in networks.list() {
                println!("{}\t{}\t{}", network.name, network.ip_range, network.driver);
            }
        }
        NetworkCommands::Rm { name } => {
            networks.delete(&name)?;
            println!("{name}");
        }
    }
    Ok(0)
}

fn print_log(path: &std::path::Path, follow: bool) -> Result<()> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre!("cannot open log {}: {e}", path.display()))?;
    let mut reader = std::io::BufReader::new(file);
    let mut out = std::io::stdout().lock();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            if !follow {
                break;
            }
            out.flush()?;
            std::thread::sleep(std::time::Duration::from_millis(200));
            continue;
        }
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_args_become_run_config() {
        let cli = Cli::try_parse_from([
            "husk", "run", "-d", "--name", "web", "-m", "100m", "--cpuset", "0", "-v",
            "/data:/data", "-e", "A=1", "--net", "br0", "-p", "8080:80", "busybox", "top", "-b",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.detach);
        let config = args.into_config();
        assert_eq!(config.container_name, "web");
        assert_eq!(config.image_name, "busybox");
        assert_eq!(config.commands, vec!["top", "-b"]);
        assert_eq!(config.resources.memory_limit, "100m");
        assert_eq!(config.resources.cpu_set, "0");
        assert_eq!(config.port_mapping, vec!["8080:80"]);
        assert_eq!(config.env, vec!["A=1"]);
    }

    #[test]
    fn run_is_attached_unless_detached() {
        let cli = Cli::try_parse_from(["husk", "run", "busybox", "sh"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(!args.detach);
    }

    #[test]
    fn root_defaults_to_environment_paths() {
        let cli = Cli::try_parse_from(["husk", "ps"]).unwrap();
        assert_eq!(cli.root, None);

        let paths = runtime_config(None).paths;
        let defaults = husk_common::HuskPaths::default();
        assert_eq!(paths.root, defaults.root);
        assert_eq!(paths.runtime, defaults.runtime);
    }

    #[test]
    fn custom_root_moves_runtime_dir() {
        let cli = Cli::try_parse_from(["husk", "--root", "/tmp/h", "ps"]).unwrap();
        let paths = runtime_config(cli.root).paths;
        assert_eq!(paths.root, PathBuf::from("/tmp/h"));
        assert_eq!(paths.runtime, PathBuf::from("/tmp/h/run"));
    }
}
