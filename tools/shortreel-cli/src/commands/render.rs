//! Render a script into a video.
//!
//! Prints a `GenerationResponse` JSON document on stdout. Stage failures
//! (bad script, missing asset, ffmpeg error, cancellation) exit with status 2;
//! unexpected faults propagate as errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use shortreel_assembly_engine::workspace::sanitize_component;
use shortreel_assembly_engine::{
    AssemblyEngine, AssemblyProgress, AssemblyStage, LocalAssetFetcher, ProgressCallback,
};
use shortreel_common::config::AppConfig;
use shortreel_common::error::ReelError;
use shortreel_script_model::GenerationResponse;
use shortreel_script_source::{FileScriptSource, ScriptRequest, ScriptSource};
use tokio_util::sync::CancellationToken;

const STAGE_FAILURE: u8 = 2;

pub async fn run(
    mut config: AppConfig,
    script_path: PathBuf,
    output: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
) -> anyhow::Result<ExitCode> {
    if let Some(width) = width {
        config.video.width = width;
    }
    if let Some(height) = height {
        config.video.height = height;
    }
    if let Some(fps) = fps {
        config.video.fps = fps;
    }
    config.validate()?;

    let source = FileScriptSource::new(&script_path)
        .with_tolerance(config.video.canonical().frame_interval_secs());
    let script = match source.generate(&ScriptRequest::new("")).await {
        Ok(script) => script,
        Err(e) => return report_failure(e),
    };

    let output_path = output.unwrap_or_else(|| {
        config
            .output_dir
            .join(format!("{}.mp4", sanitize_component(&script.id)))
    });
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    eprintln!("Rendering script '{}' ({})", script.title, script.id);
    eprintln!("  Scenes: {}", script.scenes.len());
    eprintln!(
        "  Format: {}x{} @ {} fps",
        config.video.width, config.video.height, config.video.fps
    );
    eprintln!("  Output: {}", output_path.display());

    // Relative asset paths resolve against the script's directory.
    let asset_root = script_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    let engine = AssemblyEngine::new(
        Arc::new(config),
        Arc::new(LocalAssetFetcher::with_root(asset_root)),
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; cancelling job");
                cancel.cancel();
            }
        })
    };

    let progress_cb: ProgressCallback = Box::new(|p: AssemblyProgress| {
        if p.stage == AssemblyStage::RenderingScenes {
            eprint!(
                "\r  Progress: {:5.1}% {} ({}/{} scenes)  ",
                p.progress * 100.0,
                p.stage,
                p.scenes_rendered,
                p.scenes_total
            );
        } else {
            eprint!("\r  Progress: {:5.1}% {}                ", p.progress * 100.0, p.stage);
        }
    });

    let result = engine
        .assemble(&script, &output_path, &cancel, Some(&progress_cb))
        .await;
    interrupt.abort();
    eprintln!();

    match result {
        Ok(report) => {
            for warning in &report.warnings {
                eprintln!("  warning: {warning}");
            }
            eprintln!("Render complete: {}", output_path.display());
            print_response(&GenerationResponse::ok(report.artifact, report.warnings))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(e),
    }
}

fn report_failure(err: ReelError) -> anyhow::Result<ExitCode> {
    if err.is_internal() {
        return Err(err.into());
    }
    eprintln!("Render failed: {err}");
    print_response(&GenerationResponse::failed(err.stage(), err.to_string()))?;
    Ok(ExitCode::from(STAGE_FAILURE))
}

fn print_response(response: &GenerationResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
