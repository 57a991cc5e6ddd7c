//! `quill doctor` — check backend reachability.

use quill_backends::router;
use quill_config::AppConfig;
use quill_core::ModelBackend as _;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let router = router::build_from_config(&config);

    println!();
    println!("  quill doctor");
    println!();

    if let Some(remote) = router.get("remote") {
        match remote.health_check().await {
            Ok(true) => println!("  Remote   ok        {}", config.remote.base_url),
            Ok(false) => println!("  Remote   degraded  {}", config.remote.base_url),
            Err(e) => println!("  Remote   down      {e}"),
        }
    } else {
        println!("  Remote   not configured (no API key)");
    }

    if let Some(local) = router.get("local") {
        match local.health_check().await {
            Ok(true) => {
                println!("  Local    ok        {}", config.local.base_url);
                match local.list_models().await {
                    Ok(models) if !models.is_empty() => {
                        let shown: Vec<&str> =
                            models.iter().take(5).map(|s| s.as_str()).collect();
                        println!("           models:   {}", shown.join(", "));
                    }
                    Ok(_) => println!("           models:   none pulled yet"),
                    Err(e) => println!("           models:   {e}"),
                }
            }
            Ok(false) => println!(
                "  Local    not running at {} (start your inference service)",
                config.local.base_url
            ),
            Err(e) => println!("  Local    down      {e}"),
        }
    }

    println!();
    Ok(())
}
