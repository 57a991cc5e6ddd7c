//! `quill status` — show current configuration.

use quill_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    println!();
    println!("  quill status");
    println!();
    println!("  Backend:     {}", config.backend);
    println!("  Model:       {}", config.active_model());
    println!("  Workspace:   {}", config.resolve_workspace_root().display());
    println!("  Turn cap:    {}", config.max_turns);
    println!(
        "  Remote:      {} (api key: {})",
        config.remote.base_url,
        if config.remote.api_key.is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!(
        "  Local:       {} (model: {})",
        config.local.base_url, config.local.model
    );

    let modes: Vec<&str> = [
        ("reasoning", config.modes.reasoning),
        ("planning", config.modes.planning),
        ("verbose", config.modes.verbose),
    ]
    .iter()
    .filter(|(_, on)| *on)
    .map(|(name, _)| *name)
    .collect();
    println!(
        "  Modes:       {}",
        if modes.is_empty() {
            "none".to_string()
        } else {
            modes.join(", ")
        }
    );
    if !config.shell.allowlist.is_empty() {
        println!("  Shell allow: {}", config.shell.allowlist.join(", "));
    }
    println!("  Config dir:  {}", AppConfig::config_dir().display());
    println!();

    Ok(())
}
