use crate::supervisor::{parse_list_output, parse_print_output, LaunchctlMode, SupervisorState};

#[test]
fn test_print_output() {
    let running = r#"gui/501/homebrew.mxcl.wechat-backup = {
	active count = 1
	path = /Users/someone/Library/LaunchAgents/homebrew.mxcl.wechat-backup.plist
	type = LaunchAgent
	state = running

	program = /usr/local/opt/wechat-backup/bin/wechat-backup
	arguments = {
		/usr/local/opt/wechat-backup/bin/wechat-backup
		--service
	}

	stdout path = /tmp/wechat-backup.log
	stderr path = /tmp/wechat-backup.log
	pid = 4242
	immediate reason = speculative
}
"#;
    assert_eq!(parse_print_output(running), SupervisorState::Running(4242));

    let waiting = r#"gui/501/com.example.lazy = {
	active count = 0
	path = /Users/someone/Library/LaunchAgents/com.example.lazy.plist
	state = not running
	last exit code = (never exited)
}
"#;
    assert_eq!(parse_print_output(waiting), SupervisorState::Loaded);
}

#[test]
fn test_list_output() {
    let running = r#"{
	"StandardOutPath" = "/tmp/wechat-backup.log";
	"LimitLoadToSessionType" = "Aqua";
	"StandardErrorPath" = "/tmp/wechat-backup.log";
	"Label" = "homebrew.mxcl.wechat-backup";
	"OnDemand" = true;
	"LastExitStatus" = 0;
	"PID" = 812;
	"Program" = "/usr/local/opt/wechat-backup/bin/wechat-backup";
};
"#;
    assert_eq!(parse_list_output(running), SupervisorState::Running(812));

    let stopped = r#"{
	"Label" = "com.example.lazy";
	"LastExitStatus" = 256;
};
"#;
    assert_eq!(parse_list_output(stopped), SupervisorState::Loaded);
    assert!(SupervisorState::Loaded.is_loaded());
    assert!(!SupervisorState::NotLoaded.is_loaded());
}

#[test]
fn test_mode_parsing() {
    assert_eq!("bootstrap".parse::<LaunchctlMode>(), Ok(LaunchctlMode::Bootstrap));
    assert_eq!("Legacy".parse::<LaunchctlMode>(), Ok(LaunchctlMode::Legacy));
    assert!("xpc".parse::<LaunchctlMode>().is_err());
}
