pub fn setup_logging(conf: &crate::config::LoggingConfig) -> Result<(), String> {
    let mut logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(conf.level);

    // stdout carries the generated documents and status output
    if conf.log_to_console {
        logger = logger.chain(std::io::stderr());
    }

    if conf.log_to_disk {
        std::fs::create_dir_all(&conf.log_dir)
            .map_err(|e| format!("Error while creating log dir {:?}: {}", conf.log_dir, e))?;
        let log_file = fern::log_file(conf.log_dir.join("launchsd.log"))
            .map_err(|e| format!("Error while opening log file: {}", e))?;
        logger = logger.chain(log_file);
    }

    logger
        .apply()
        .map_err(|e| format!("Error while setting up logger: {}", e))
}
