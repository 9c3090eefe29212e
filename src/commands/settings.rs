use colored::Colorize;

use crate::engine::Engine;
use crate::error::Result;

pub fn cmd_settings_show(engine: &Engine) -> Result<()> {
    let settings = engine.settings();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!(
        "\n  Effective model:     {}",
        settings.model().cyan()
    );
    println!("  Effective endpoint:  {}", settings.endpoint().cyan());
    println!(
        "  Effective threshold: {}",
        settings.retrieval.effective_threshold()
    );
    Ok(())
}

pub fn cmd_settings_set(engine: &Engine, key: &str, value: &str) -> Result<()> {
    let mut next = engine.settings();
    next.set(key, value)?;
    let requires_rebuild = engine.update_settings(next)?;

    println!("{} {} = {}", "Saved".green().bold(), key, value.cyan());
    if requires_rebuild {
        println!(
            "  This change invalidates the current snapshot; run {}",
            "snaprag rebuild".cyan()
        );
    }
    Ok(())
}
