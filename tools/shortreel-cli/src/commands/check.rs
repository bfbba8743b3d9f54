//! Check system capabilities.

use std::process::ExitCode;

use shortreel_assembly_engine::fonts::{resolve_font, FontChoice};
use shortreel_assembly_engine::workspace::JobWorkspace;
use shortreel_assembly_engine::FfmpegTool;
use shortreel_common::config::AppConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<ExitCode> {
    println!("Shortreel System Check");
    println!("{}", "=".repeat(50));

    let mut required_ok = true;

    match config.validate() {
        Ok(()) => println!(
            "[OK] Output format: {}x{} @ {} fps ({}, {})",
            config.video.width,
            config.video.height,
            config.video.fps,
            config.video.video_codec,
            config.video.pixel_format
        ),
        Err(e) => {
            println!("[FAIL] Configuration: {e}");
            required_ok = false;
        }
    }

    let tool = FfmpegTool::from_config(&config.render);
    if tool.is_available().await {
        println!(
            "[OK] ffmpeg: {} / ffprobe: {}",
            tool.ffmpeg_path().display(),
            tool.ffprobe_path().display()
        );
        if tool.has_filter("drawtext").await {
            println!("[OK] drawtext filter available");
        } else {
            println!("[FAIL] drawtext filter missing (ffmpeg built without libfreetype)");
            required_ok = false;
        }
    } else {
        println!(
            "[FAIL] ffmpeg/ffprobe not runnable ({} / {})",
            tool.ffmpeg_path().display(),
            tool.ffprobe_path().display()
        );
        println!("       Install ffmpeg or set SHORTREEL_FFMPEG / SHORTREEL_FFPROBE");
        required_ok = false;
    }

    let font = resolve_font(&config.fonts);
    match &font.choice {
        FontChoice::File(path) => println!("[OK] Font: {}", path.display()),
        FontChoice::Family(family) => {
            println!("[WARN] Font: no font file found; relying on fontconfig family '{family}'")
        }
    }
    if let Some(warning) = &font.warning {
        println!("[WARN] {warning}");
    }

    let temp_root = config.temp_root();
    match JobWorkspace::create(&temp_root, "check").and_then(|ws| ws.close()) {
        Ok(()) => println!("[OK] Temp root writable: {}", temp_root.display()),
        Err(e) => {
            println!("[FAIL] Temp root {}: {e}", temp_root.display());
            required_ok = false;
        }
    }

    println!();
    if required_ok {
        println!("All required capabilities are available. Shortreel is ready.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
        Ok(ExitCode::FAILURE)
    }
}
