mod config_loading;
mod fake;
mod launchctl_output;
