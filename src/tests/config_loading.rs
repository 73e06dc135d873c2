use crate::config::load_config_with_env;
use crate::supervisor::LaunchctlMode;
use std::path::PathBuf;

fn no_env() -> std::vec::IntoIter<(String, String)> {
    Vec::new().into_iter()
}

fn env(vars: &[(&str, &str)]) -> std::vec::IntoIter<(String, String)> {
    vars.iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect::<Vec<_>>()
        .into_iter()
}

#[test]
fn test_defaults_are_the_homebrew_template() {
    let dir = tempfile::tempdir().unwrap();
    // an existing but empty config dir
    let (log_conf, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    assert!(conf.is_err());
    assert!(log_conf.log_to_console);
    assert!(!log_conf.log_to_disk);

    std::fs::write(dir.path().join("launchsd_config.toml"), "").unwrap();
    let (log_conf, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    let conf = conf.unwrap();
    assert_eq!(log_conf.level, log::LevelFilter::Info);
    assert_eq!(conf.descriptor.label, "homebrew.mxcl.wechat-backup");
    assert_eq!(
        conf.descriptor.program_path,
        PathBuf::from("/usr/local/opt/wechat-backup/bin/wechat-backup")
    );
    assert_eq!(conf.descriptor.arguments, vec!["--service".to_owned()]);
    assert!(conf.descriptor.run_at_load);
    assert_eq!(conf.descriptor.stdout_path, PathBuf::from("/tmp/wechat-backup.log"));
    assert_eq!(conf.descriptor.stderr_path, PathBuf::from("/tmp/wechat-backup.log"));
    assert_eq!(conf.launchctl_mode, LaunchctlMode::Bootstrap);
    assert_eq!(conf.agents_dir, None);
}

#[test]
fn test_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("launchsd_config.toml"),
        r#"
homebrew_prefix = "/opt/homebrew"
agents_dir = "/tmp/agents"
launchctl_mode = "legacy"
log_level = "debug"
log_to_console = false

[service]
label = "com.example.backup"
arguments = ["--service", "--quiet"]
run_at_load = false
keep_alive = true
stdout = "/tmp/out.log"

[service.environment]
WECHAT_DIR = "/Users/someone/WeChat"
"#,
    )
    .unwrap();

    let (log_conf, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    let conf = conf.unwrap();
    assert_eq!(log_conf.level, log::LevelFilter::Debug);
    assert!(!log_conf.log_to_console);

    let descr = &conf.descriptor;
    assert_eq!(descr.label, "com.example.backup");
    assert_eq!(
        descr.program_path,
        PathBuf::from("/opt/homebrew/opt/wechat-backup/bin/wechat-backup")
    );
    assert_eq!(descr.arguments, vec!["--service".to_owned(), "--quiet".to_owned()]);
    assert!(!descr.run_at_load);
    assert!(descr.keep_alive);
    assert_eq!(descr.stdout_path, PathBuf::from("/tmp/out.log"));
    assert_eq!(descr.stderr_path, PathBuf::from("/tmp/wechat-backup.log"));
    assert_eq!(
        descr.environment.get("WECHAT_DIR").map(|s| s.as_str()),
        Some("/Users/someone/WeChat")
    );
    assert_eq!(conf.agents_dir, Some(PathBuf::from("/tmp/agents")));
    assert_eq!(conf.launchctl_mode, LaunchctlMode::Legacy);
}

#[test]
fn test_json_config_and_env_override() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("launchsd_config.json"),
        r#"{
            "service": {
                "label": "com.example.json",
                "program": "/usr/bin/env backup-tool",
                "run_at_load": true
            }
        }"#,
    )
    .unwrap();

    let (_, conf) = load_config_with_env(
        &Some(dir.path().to_path_buf()),
        env(&[
            ("LAUNCHSD_SERVICE_RUN_AT_LOAD", "false"),
            ("LAUNCHSD_SERVICE_ARGUMENTS", "--service '--name=my backup'"),
            ("LAUNCHSD_SERVICE_ENV_WECHAT_DIR", "/data/wechat"),
            ("LAUNCHSD_LAUNCHCTL_PATH", "/bin/launchctl"),
            ("UNRELATED", "ignored"),
        ]),
    );
    let conf = conf.unwrap();
    let descr = &conf.descriptor;
    assert_eq!(descr.label, "com.example.json");
    assert_eq!(descr.program_path, PathBuf::from("/usr/bin/env"));
    // inline arguments from the program come first
    assert_eq!(
        descr.arguments,
        vec![
            "backup-tool".to_owned(),
            "--service".to_owned(),
            "--name=my backup".to_owned()
        ]
    );
    assert!(!descr.run_at_load);
    assert_eq!(
        descr.environment.get("WECHAT_DIR").map(|s| s.as_str()),
        Some("/data/wechat")
    );
    assert_eq!(conf.launchctl_path, Some(PathBuf::from("/bin/launchctl")));
}

#[test]
fn test_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launchsd_config.toml"), "").unwrap();
    std::fs::write(dir.path().join("launchsd_config.json"), "{}").unwrap();
    let (_, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    assert!(conf.is_err());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launchsd_config.toml"), "launchctl_mode = \"xpc\"").unwrap();
    let (_, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    assert!(conf.is_err());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launchsd_config.toml"), "service = 3").unwrap();
    let (_, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    assert!(conf.is_err());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launchsd_config.json"), "{ not json").unwrap();
    let (_, conf) = load_config_with_env(&Some(dir.path().to_path_buf()), no_env());
    assert!(conf.is_err());
}

#[test]
fn test_misspelled_bool_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("launchsd_config.toml"), "").unwrap();

    let (_, conf) = load_config_with_env(
        &Some(dir.path().to_path_buf()),
        env(&[("LAUNCHSD_SERVICE_RUN_AT_LOAD", "flase")]),
    );
    match conf {
        Err(msg) => assert!(msg.contains("service.run_at_load"), "{}", msg),
        Ok(conf) => panic!("accepted a misspelled bool: {:?}", conf.descriptor),
    }

    let (log_conf, conf) = load_config_with_env(
        &Some(dir.path().to_path_buf()),
        env(&[("LAUNCHSD_LOGGING_TO_DISK", "maybe")]),
    );
    assert!(conf.is_err());
    assert!(!log_conf.log_to_disk);

    let (_, conf) = load_config_with_env(
        &Some(dir.path().to_path_buf()),
        env(&[
            ("LAUNCHSD_SERVICE_RUN_AT_LOAD", "No"),
            ("LAUNCHSD_SERVICE_KEEP_ALIVE", "1"),
        ]),
    );
    let conf = conf.unwrap();
    assert!(!conf.descriptor.run_at_load);
    assert!(conf.descriptor.keep_alive);
}
