//! Config can be loaded either from env vars, toml, or json.
//!
//! Currently configurable:
//! ### Logging
//! 1. Wether or not to log to disk (and the dir to put the logs in)
//! 1. Wether or not to log to the console (stderr, stdout is reserved for command output)
//! 1. The log level
//!
//! ### Service descriptor template
//! 1. Label, program, arguments, RunAtLoad, KeepAlive, output paths, working directory and environment
//! 1. The homebrew prefix used to find the default program
//!
//! ### Supervisor
//! 1. Where to put the descriptors (defaults to ~/Library/LaunchAgents)
//! 1. Which launchctl binary to use and whether to use the bootstrap or legacy subcommands
//!
//! Env vars have the form LAUNCHSD_<SECTION>_<KEY>, e.g. LAUNCHSD_SERVICE_RUN_AT_LOAD=false.
//! LAUNCHSD_SERVICE_ENV_<NAME>=<value> adds <NAME> to the environment of the service.

use crate::descriptor::{ServiceDescriptor, DEFAULT_HOMEBREW_PREFIX};
use crate::supervisor::LaunchctlMode;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

const ENV_PREFIX: &str = "LAUNCHSD_";
const SERVICE_ENV_PREFIX: &str = "LAUNCHSD_SERVICE_ENV_";

#[derive(Debug)]
pub struct LoggingConfig {
    pub log_to_console: bool,
    pub log_to_disk: bool,
    pub log_dir: PathBuf,
    pub level: log::LevelFilter,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub descriptor: ServiceDescriptor,
    pub agents_dir: Option<PathBuf>,
    pub launchctl_path: Option<PathBuf>,
    pub launchctl_mode: LaunchctlMode,
}

#[derive(Debug, Clone, PartialEq)]
enum SettingValue {
    Str(String),
    Array(Vec<SettingValue>),
    Boolean(bool),
    Map(Vec<(String, String)>),
}

fn load_toml(
    config_path: &PathBuf,
    settings: &mut HashMap<String, SettingValue>,
) -> Result<(), String> {
    let config = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Error while reading config file: {}", e))?;

    let toml_conf: toml::Value =
        toml::from_str(&config).map_err(|e| format!("Error while decoding config toml: {}", e))?;
    // toml is a superset of what we accept from json, so both go through the same code
    let as_json = serde_json::to_value(&toml_conf)
        .map_err(|e| format!("Error while decoding config toml: {}", e))?;

    collect_settings(&as_json, settings)
}

fn load_json(
    config_path: &PathBuf,
    settings: &mut HashMap<String, SettingValue>,
) -> Result<(), String> {
    let mut file = std::fs::File::open(config_path)
        .map_err(|e| format!("Error while opening config file: {}", e))?;
    let json_conf = serde_json::from_reader(&mut file)
        .map_err(|e| format!("Error while decoding config json: {}", e))?;

    collect_settings(&json_conf, settings)
}

fn to_setting(value: &serde_json::Value) -> Option<SettingValue> {
    match value {
        serde_json::Value::String(s) => Some(SettingValue::Str(s.clone())),
        serde_json::Value::Bool(b) => Some(SettingValue::Boolean(*b)),
        serde_json::Value::Array(elems) => {
            Some(SettingValue::Array(elems.iter().filter_map(to_setting).collect()))
        }
        serde_json::Value::Object(map) => Some(SettingValue::Map(
            map.iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k.clone(), s.clone()),
                    other => (k.clone(), other.to_string()),
                })
                .collect(),
        )),
        _ => None,
    }
}

fn collect_settings(
    conf: &serde_json::Value,
    settings: &mut HashMap<String, SettingValue>,
) -> Result<(), String> {
    let map = match conf {
        serde_json::Value::Object(map) => map,
        _ => return Err("Config must be a table/object at the top level".into()),
    };

    let top_level = [
        ("logging_dir", "logging.dir"),
        ("log_to_disk", "logging.to_disk"),
        ("log_to_console", "logging.to_console"),
        ("log_level", "logging.level"),
        ("homebrew_prefix", "homebrew.prefix"),
        ("agents_dir", "agents.dir"),
        ("launchctl_path", "launchctl.path"),
        ("launchctl_mode", "launchctl.mode"),
    ];
    for (name, key) in &top_level {
        if let Some(val) = map.get(*name).and_then(to_setting) {
            settings.insert((*key).to_owned(), val);
        }
    }

    if let Some(service) = map.get("service") {
        let service = match service {
            serde_json::Value::Object(service) => service,
            _ => return Err("The service setting must be a table/object".into()),
        };
        for (name, value) in service {
            match to_setting(value) {
                Some(val) => {
                    settings.insert(format!("service.{}", name), val);
                }
                None => return Err(format!("Unsupported value for service.{}: {}", name, value)),
            }
        }
    }
    Ok(())
}

fn collect_env_settings(
    vars: impl Iterator<Item = (String, String)>,
    settings: &mut HashMap<String, SettingValue>,
) {
    let mut environment = match settings.remove("service.environment") {
        Some(SettingValue::Map(map)) => map,
        _ => Vec::new(),
    };

    vars.for_each(|(key, value)| {
        if let Some(name) = key.strip_prefix(SERVICE_ENV_PREFIX) {
            environment.retain(|(existing, _)| existing != name);
            environment.push((name.to_owned(), value));
            return;
        }
        if !key.starts_with(ENV_PREFIX) {
            return;
        }
        // drop prefix, first part is the section, the rest is the key within the section
        let parts: Vec<String> = key[ENV_PREFIX.len()..]
            .split('_')
            .map(|part| part.to_lowercase())
            .collect();
        if parts.len() < 2 {
            return;
        }
        let new_key = format!("{}.{}", parts[0], parts[1..].join("_"));
        settings.insert(new_key, SettingValue::Str(value));
    });

    if !environment.is_empty() {
        settings.insert("service.environment".to_owned(), SettingValue::Map(environment));
    }
}

fn string_to_bool(s: &str) -> Option<bool> {
    match s.trim().to_uppercase().as_str() {
        "YES" | "TRUE" | "1" => Some(true),
        "NO" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn setting_bool(
    settings: &HashMap<String, SettingValue>,
    key: &str,
) -> Result<Option<bool>, String> {
    match settings.get(key) {
        None => Ok(None),
        Some(SettingValue::Boolean(b)) => Ok(Some(*b)),
        Some(SettingValue::Str(s)) => string_to_bool(s)
            .map(Some)
            .ok_or_else(|| format!("{} must be one of yes/no, true/false, 1/0 but was: {}", key, s)),
        Some(_) => Err(format!("{} must be a boolean", key)),
    }
}

fn setting_str(settings: &HashMap<String, SettingValue>, key: &str) -> Option<String> {
    settings.get(key).and_then(|val| match val {
        SettingValue::Str(s) => Some(s.clone()),
        _ => None,
    })
}

fn setting_list(
    settings: &HashMap<String, SettingValue>,
    key: &str,
) -> Result<Option<Vec<String>>, String> {
    match settings.get(key) {
        None => Ok(None),
        // single strings are split like a shell would, so env vars can carry several arguments
        Some(SettingValue::Str(s)) => shlex::split(s)
            .map(Some)
            .ok_or_else(|| format!("Could not split {} into arguments: {}", key, s)),
        Some(SettingValue::Array(arr)) => Ok(Some(
            arr.iter()
                .filter_map(|el| match el {
                    SettingValue::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        )),
        Some(_) => Err(format!("{} must be a string or a list of strings", key)),
    }
}

fn build_descriptor(settings: &HashMap<String, SettingValue>) -> Result<ServiceDescriptor, String> {
    let prefix = setting_str(settings, "homebrew.prefix")
        .unwrap_or_else(|| DEFAULT_HOMEBREW_PREFIX.to_owned());
    let mut descr = ServiceDescriptor::homebrew_default(&PathBuf::from(prefix));

    if let Some(label) = setting_str(settings, "service.label") {
        descr.label = label;
    }

    let mut inline_args = Vec::new();
    if let Some(program) = setting_str(settings, "service.program") {
        // "program" may carry arguments inline: "/usr/local/bin/foo --service"
        let mut split = shlex::split(&program)
            .ok_or_else(|| format!("Could not split service.program: {}", program))?;
        if split.is_empty() {
            return Err("service.program must not be empty".into());
        }
        descr.program_path = PathBuf::from(split.remove(0));
        inline_args = split;
    }
    let configured_args = setting_list(settings, "service.arguments")?;
    if !inline_args.is_empty() {
        inline_args.extend(configured_args.unwrap_or_default());
        descr.arguments = inline_args;
    } else if let Some(args) = configured_args {
        descr.arguments = args;
    }

    if let Some(run_at_load) = setting_bool(settings, "service.run_at_load")? {
        descr.run_at_load = run_at_load;
    }
    if let Some(keep_alive) = setting_bool(settings, "service.keep_alive")? {
        descr.keep_alive = keep_alive;
    }
    if let Some(stdout) = setting_str(settings, "service.stdout") {
        descr.stdout_path = PathBuf::from(stdout);
    }
    if let Some(stderr) = setting_str(settings, "service.stderr") {
        descr.stderr_path = PathBuf::from(stderr);
    }
    if let Some(dir) = setting_str(settings, "service.working_dir") {
        descr.working_directory = Some(PathBuf::from(dir));
    }
    if let Some(SettingValue::Map(vars)) = settings.get("service.environment") {
        descr.environment = vars.iter().cloned().collect::<BTreeMap<_, _>>();
    }

    Ok(descr)
}

pub fn load_config(config_path: &Option<PathBuf>) -> (LoggingConfig, Result<Config, String>) {
    load_config_with_env(config_path, std::env::vars())
}

pub fn load_config_with_env(
    config_path: &Option<PathBuf>,
    env_vars: impl Iterator<Item = (String, String)>,
) -> (LoggingConfig, Result<Config, String>) {
    let mut settings: HashMap<String, SettingValue> = HashMap::new();

    let default_config_path_json = PathBuf::from("./config/launchsd_config.json");
    let default_config_path_toml = PathBuf::from("./config/launchsd_config.toml");

    let config_path_json = if let Some(config_path) = config_path {
        config_path.join("launchsd_config.json")
    } else {
        default_config_path_json
    };

    let config_path_toml = if let Some(config_path) = config_path {
        config_path.join("launchsd_config.toml")
    } else {
        default_config_path_toml.clone()
    };

    let json_conf = if config_path_json.exists() {
        Some(load_json(&config_path_json, &mut settings))
    } else {
        None
    };

    let toml_conf = if config_path_toml.exists() {
        Some(load_toml(&config_path_toml, &mut settings))
    } else {
        None
    };

    collect_env_settings(env_vars, &mut settings);

    let log_dir = setting_str(&settings, "logging.dir").map(PathBuf::from);
    // broken values fall back to the defaults here, building the config below reports them
    let log_to_console = setting_bool(&settings, "logging.to_console").unwrap_or(None);
    let log_to_disk = setting_bool(&settings, "logging.to_disk").unwrap_or(None);
    let level = setting_str(&settings, "logging.level")
        .and_then(|level| level.parse::<log::LevelFilter>().ok());

    let logging_config = LoggingConfig {
        log_dir: log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_to_disk: log_to_disk.unwrap_or(false),
        log_to_console: log_to_console.unwrap_or(true),
        level: level.unwrap_or(log::LevelFilter::Info),
    };

    let build = || -> Result<Config, String> {
        let launchctl_mode = match setting_str(&settings, "launchctl.mode") {
            Some(mode) => mode.parse::<LaunchctlMode>()?,
            None => LaunchctlMode::Bootstrap,
        };
        setting_bool(&settings, "logging.to_console")?;
        setting_bool(&settings, "logging.to_disk")?;
        Ok(Config {
            descriptor: build_descriptor(&settings)?,
            agents_dir: setting_str(&settings, "agents.dir").map(PathBuf::from),
            launchctl_path: setting_str(&settings, "launchctl.path").map(PathBuf::from),
            launchctl_mode,
        })
    };

    let conf = match (json_conf, toml_conf) {
        (Some(_), Some(_)) => Err("Found both json and toml conf!".to_owned()),
        (Some(Err(e)), None) | (None, Some(Err(e))) => Err(e),
        (Some(Ok(())), None) | (None, Some(Ok(()))) => build(),
        (None, None) => {
            if config_path_toml == default_config_path_toml {
                build()
            } else {
                Err("No config file was loaded".into())
            }
        }
    };

    (logging_config, conf)
}
