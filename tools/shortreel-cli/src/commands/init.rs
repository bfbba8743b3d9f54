//! Write a sample script.

use std::path::PathBuf;
use std::process::ExitCode;

use shortreel_script_model::Script;

const SAMPLE_SCRIPT: &str = r##"{
  "id": "script_sample",
  "topic": "Why octopuses are smart",
  "title": "3 facts about octopus brains",
  "description": "A quick tour of the most alien mind on Earth",
  "total_duration": 9.0,
  "scenes": [
    {
      "id": "scene_1",
      "duration": 3.0,
      "type": "text",
      "content": "Octopuses have nine brains",
      "transition": "fade",
      "transition_duration": 0.5
    },
    {
      "id": "scene_2",
      "duration": 3.0,
      "type": "text",
      "content": "Two thirds of their neurons live in their arms"
    },
    {
      "id": "scene_3",
      "duration": 3.0,
      "type": "text",
      "content": "Each arm can taste what it touches",
      "transition": "fade",
      "transition_duration": 0.5
    }
  ],
  "captions": [
    {
      "text": "Nine brains?!",
      "start_time": 0.5,
      "end_time": 3.0,
      "style": {
        "font_size": 56,
        "font_color": "#FFFFFF",
        "background_color": "#000000AA",
        "position": "bottom"
      }
    },
    {
      "text": "Arms that think",
      "start_time": 3.0,
      "end_time": 6.0
    },
    {
      "text": "Follow for more",
      "start_time": 6.0,
      "end_time": 9.0,
      "style": { "position": "top" }
    }
  ],
  "audio_tracks": [],
  "metadata": {
    "hashtags": ["octopus", "science"],
    "target_platforms": ["tiktok", "youtube"]
  }
}
"##;

pub fn run(path: PathBuf, force: bool) -> anyhow::Result<ExitCode> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    // Round-trip through the model so the sample always matches the parser.
    let script = Script::from_json(SAMPLE_SCRIPT)?;
    std::fs::write(&path, serde_json::to_string_pretty(&script)?)?;

    println!("Sample script written to {}", path.display());
    println!("  Scenes: {}", script.scenes.len());
    println!("  Captions: {}", script.captions.len());
    println!("  Duration: {:.1}s", script.total_duration);
    println!();
    println!("Render it with:");
    println!("  shortreel render {}", path.display());

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_script_is_valid() {
        let script = Script::from_json(SAMPLE_SCRIPT).unwrap();
        let warnings = script.validate(1.0 / 30.0).unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(run(path.clone(), false).is_err());
        assert!(run(path.clone(), true).is_ok());
        assert!(Script::load(&path).is_ok());
    }
}
