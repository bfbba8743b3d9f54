//! Validate a script without rendering it.

use std::path::PathBuf;
use std::process::ExitCode;

use shortreel_assembly_engine::captions::plan_captions;
use shortreel_common::config::AppConfig;
use shortreel_script_model::{check_platforms, Script};

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<ExitCode> {
    println!("Validating script at: {}", path.display());

    let script = match Script::load(&path) {
        Ok(script) => script,
        Err(e) => {
            println!("\nScript is invalid: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    println!("  Id: {}", script.id);
    println!("  Title: {}", script.title);
    println!("  Duration: {:.2}s (scenes sum to {:.2}s)", script.total_duration, script.scenes_duration());
    println!("  Scenes: {}", script.scenes.len());
    for scene in &script.scenes {
        println!(
            "     {} {:<5} {:>6.2}s",
            scene.id,
            scene.kind.type_name(),
            scene.duration
        );
    }
    println!("  Captions: {}", script.captions.len());
    println!("  Audio tracks: {}", script.audio_tracks.len());

    let tolerance = config.video.canonical().frame_interval_secs();
    let mut warnings = match script.validate(tolerance) {
        Ok(warnings) => warnings,
        Err(e) => {
            println!("\nScript is invalid: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    match plan_captions(&script.captions, script.scenes_duration()) {
        Ok(plan) => warnings.extend(plan.warnings),
        Err(e) => {
            println!("\nScript is invalid: {e}");
            return Ok(ExitCode::from(2));
        }
    }
    warnings.extend(check_platforms(
        &script.target_platforms(),
        script.scenes_duration(),
        None,
    ));

    if warnings.is_empty() {
        println!("\nScript is valid.");
    } else {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
        println!("\nScript is valid with {} warning(s).", warnings.len());
    }

    Ok(ExitCode::SUCCESS)
}
