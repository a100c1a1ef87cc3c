use pass_core::PassConfig;

pub fn format_config_lines(config: &PassConfig) -> Vec<String> {
    let store_path = config
        .storage_path
        .as_ref()
        .map_or_else(|| "(default)".to_string(), |path| path.display().to_string());
    vec![
        format!("api_base_url:        {}", config.api_base_url),
        format!(
            "app_version:         {}",
            config.app_version.as_deref().unwrap_or("(none)")
        ),
        format!("ack_debounce:        {}ms", config.ack_debounce.as_millis()),
        format!(
            "event_poll_interval: {}s",
            config.event_poll_interval.as_secs()
        ),
        format!("storage:             {:?}", config.storage),
        format!("storage_path:        {store_path}"),
    ]
}

pub fn run_config(config: &PassConfig) {
    for line in format_config_lines(config) {
        println!("{line}");
    }
}
