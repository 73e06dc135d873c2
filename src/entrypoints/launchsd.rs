use log::{debug, error, trace};
use std::path::{Path, PathBuf};

use crate::config;
use crate::descriptor::{self, ServiceDescriptor};
use crate::environment::SystemEnvironment;
use crate::errors::{FileSystemAction, FileSystemError, ServiceError, ValidationError, EXIT_CONFIG};
use crate::logging;
use crate::manager::ServiceDescriptorManager;

/// Runs the cli and returns the exit code
pub fn run_launchsd() -> i32 {
    let cli_args = CliArgs::try_parse().unwrap_or_else(|e| e.exit());

    if let Some(path) = &cli_args.conf {
        if !path.exists() {
            eprintln!("config path given that does not exist: {:?}", path);
            return EXIT_CONFIG;
        }
        if !path.is_dir() {
            eprintln!("config path given that is not a directory: {:?}", path);
            return EXIT_CONFIG;
        }
    }

    let (mut log_conf, conf) = config::load_config(&cli_args.conf);
    match cli_args.verbose {
        0 => {}
        1 => log_conf.level = log::LevelFilter::Debug,
        _ => log_conf.level = log::LevelFilter::Trace,
    }
    if let Err(e) = logging::setup_logging(&log_conf) {
        eprintln!("{}", e);
        return EXIT_CONFIG;
    }

    let conf = match conf {
        Ok(conf) => conf,
        Err(e) => {
            error!("Error while loading the conf: {}", e);
            if !log_conf.log_to_console {
                eprintln!("launchsd: Error while loading the conf: {}", e);
            }
            return EXIT_CONFIG;
        }
    };
    trace!("Loaded config: {:?}", conf);

    let env = SystemEnvironment::new(conf.launchctl_path.clone(), conf.launchctl_mode);
    debug!("Supervisor domain: {}", env.launchctl().domain());
    let manager = ServiceDescriptorManager::new(env).with_agents_dir(conf.agents_dir.clone());

    match run_command(&manager, &conf, cli_args.command) {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            if !log_conf.log_to_console {
                eprintln!("launchsd: {}", e);
            }
            e.exit_code()
        }
    }
}

pub(crate) fn run_command(
    manager: &ServiceDescriptorManager<SystemEnvironment>,
    conf: &config::Config,
    command: Command,
) -> Result<(), ServiceError> {
    match command {
        Command::Generate { overrides, output } => {
            let descr = overrides.apply(conf.descriptor.clone())?;
            let document = manager.generate(&descr)?;
            match output {
                Some(path) => manager.install(&document, &path)?,
                None => print!("{}", document),
            }
        }
        Command::Install { overrides, target } => {
            let descr = overrides.apply(conf.descriptor.clone())?;
            let dest = manager.install_service(&descr, target.dest.as_deref())?;
            println!("Installed and registered {} at {}", descr.label, dest.display());
        }
        Command::Uninstall { target } => {
            let label = target.label(conf);
            let dest = manager.uninstall_service(&label, target.dest.as_deref())?;
            println!("Unregistered {} ({})", label, dest.display());
        }
        Command::Register { target } => {
            let dest = target.destination(manager, conf)?;
            manager.register(&dest)?;
            println!("Registered {}", dest.display());
        }
        Command::Unregister { target } => {
            let dest = target.destination(manager, conf)?;
            manager.unregister(&dest)?;
            println!("Unregistered {}", dest.display());
        }
        Command::Status { target } => {
            let dest = target.destination(manager, conf)?;
            let state = manager.status(&dest)?;
            println!("{}: {} [{}]", target.label(conf), state, dest.display());
        }
        Command::Check { path, json } => {
            let descr = read_and_parse(&path)?;
            if json {
                // serializing a plain struct of strings and bools does not fail
                let pretty = serde_json::to_string_pretty(&descr).unwrap_or_default();
                println!("{}", pretty);
            } else {
                println!("{}: valid descriptor for {}", path.display(), descr.label);
            }
        }
        Command::Caveats { overrides } => {
            let descr = overrides.apply(conf.descriptor.clone())?;
            print!("{}", descriptor::caveats(&descr));
        }
    }
    Ok(())
}

fn read_and_parse(path: &Path) -> Result<ServiceDescriptor, ServiceError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FileSystemError::new(FileSystemAction::Read, path.to_path_buf(), e))?;
    Ok(descriptor::parse(&content)?)
}

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(
    name = "launchsd",
    version,
    about = "Generate, install and register launchd service descriptors"
)]
pub(crate) struct CliArgs {
    /// Directory containing launchsd_config.toml or launchsd_config.json
    #[clap(short, long, value_parser)]
    conf: Option<PathBuf>,
    /// More logging, can be given twice
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Print the property list (or write it to --output)
    Generate {
        #[clap(flatten)]
        overrides: DescriptorArgs,
        #[clap(short, long, value_parser)]
        output: Option<PathBuf>,
    },
    /// Write the descriptor and register it, replacing a previous instance
    Install {
        #[clap(flatten)]
        overrides: DescriptorArgs,
        #[clap(flatten)]
        target: DestArgs,
    },
    /// Stop the service, unregister it and delete the descriptor
    Uninstall {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// Load an already installed descriptor
    Register {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// Unload a descriptor and delete it
    Unregister {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// Show whether the service is installed, loaded and running
    Status {
        #[clap(flatten)]
        target: TargetArgs,
    },
    /// Parse and validate an existing descriptor
    Check {
        #[clap(value_parser)]
        path: PathBuf,
        #[clap(long)]
        json: bool,
    },
    /// How to start the service
    Caveats {
        #[clap(flatten)]
        overrides: DescriptorArgs,
    },
}

#[derive(Args, Debug)]
pub(crate) struct DestArgs {
    /// Descriptor path, defaults to <agents dir>/<label>.plist
    #[clap(short, long, value_parser)]
    dest: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    #[clap(short, long)]
    label: Option<String>,
    /// Descriptor path, defaults to <agents dir>/<label>.plist
    #[clap(short, long, value_parser)]
    dest: Option<PathBuf>,
}

impl TargetArgs {
    fn label(&self, conf: &config::Config) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| conf.descriptor.label.clone())
    }

    fn destination(
        &self,
        manager: &ServiceDescriptorManager<SystemEnvironment>,
        conf: &config::Config,
    ) -> Result<PathBuf, ServiceError> {
        match &self.dest {
            Some(dest) => Ok(dest.clone()),
            None => manager.default_destination(&self.label(conf)),
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct DescriptorArgs {
    #[clap(short, long)]
    label: Option<String>,
    #[clap(long, value_parser)]
    program: Option<PathBuf>,
    /// Argument passed to the program, can be repeated. Replaces the configured arguments
    #[clap(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    #[clap(long)]
    no_run_at_load: bool,
    #[clap(long)]
    keep_alive: bool,
    #[clap(long, value_parser)]
    stdout: Option<PathBuf>,
    #[clap(long, value_parser)]
    stderr: Option<PathBuf>,
    #[clap(long, value_parser)]
    working_dir: Option<PathBuf>,
    /// KEY=VALUE added to the environment of the service, can be repeated
    #[clap(long = "env")]
    env: Vec<String>,
}

impl DescriptorArgs {
    pub(crate) fn apply(
        self,
        mut descr: ServiceDescriptor,
    ) -> Result<ServiceDescriptor, ValidationError> {
        if let Some(label) = self.label {
            descr.label = label;
        }
        if let Some(program) = self.program {
            descr.program_path = program;
        }
        if !self.args.is_empty() {
            descr.arguments = self.args;
        }
        if self.no_run_at_load {
            descr.run_at_load = false;
        }
        if self.keep_alive {
            descr.keep_alive = true;
        }
        if let Some(stdout) = self.stdout {
            descr.stdout_path = stdout;
        }
        if let Some(stderr) = self.stderr {
            descr.stderr_path = stderr;
        }
        if let Some(dir) = self.working_dir {
            descr.working_directory = Some(dir);
        }
        for pair in self.env {
            match pair.split_once('=') {
                Some((key, value)) => {
                    descr.environment.insert(key.to_owned(), value.to_owned());
                }
                None => return Err(ValidationError::InvalidEnvironmentKey(pair)),
            }
        }
        Ok(descr)
    }
}
