//! Script requests and the generation prompt.

use serde::{Deserialize, Serialize};

/// What to write a script about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub topic: String,

    /// Tone of the video, e.g. "educational" or "funny".
    #[serde(default = "default_style")]
    pub style: String,

    /// Desired length in seconds.
    #[serde(default = "default_target_duration")]
    pub target_duration: f64,

    #[serde(default = "default_platforms")]
    pub target_platforms: Vec<String>,
}

fn default_style() -> String {
    "educational".to_string()
}

fn default_target_duration() -> f64 {
    30.0
}

fn default_platforms() -> Vec<String> {
    vec!["tiktok".into(), "instagram".into(), "youtube".into()]
}

impl ScriptRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            style: default_style(),
            target_duration: default_target_duration(),
            target_platforms: default_platforms(),
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.target_duration = secs;
        self
    }

    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        self.target_platforms = platforms;
        self
    }
}

/// Prompt asking a text model for a script in the pipeline's JSON shape.
pub fn build_prompt(request: &ScriptRequest) -> String {
    let platforms = request.target_platforms.join(", ");
    let duration = request.target_duration;
    let topic = &request.topic;
    let style = &request.style;

    format!(
        r##"You are an expert video script writer for short-form vertical videos (TikTok, Instagram Reels, YouTube Shorts).

Generate a complete video script in JSON format for the following topic:
Topic: {topic}
Style: {style}
Target Duration: {duration} seconds
Target Platforms: {platforms}

Requirements:
1. Create a hook in the first 3 seconds
2. Use vertical format (9:16 aspect ratio)
3. Include engaging captions with proper timing
4. Suggest appropriate background music
5. Make it suitable for {platforms}
6. Total duration should be around {duration} seconds

Return ONLY valid JSON matching this exact structure:
{{
  "title": "Video title",
  "description": "Video description",
  "total_duration": {duration},
  "scenes": [
    {{
      "id": "scene_1",
      "duration": 3.0,
      "type": "text",
      "content": "Hook text that grabs attention",
      "transition": "fade",
      "transition_duration": 0.5
    }}
  ],
  "captions": [
    {{
      "text": "Caption text",
      "start_time": 0.0,
      "end_time": 3.0,
      "style": {{
        "font_size": 48,
        "font_color": "#FFFFFF",
        "background_color": "#000000AA",
        "position": "bottom"
      }}
    }}
  ],
  "audio_tracks": [
    {{
      "type": "music",
      "url": "https://example.com/music.mp3",
      "start_time": 0.0,
      "volume": 0.3,
      "fade_in": 1.0,
      "fade_out": 2.0
    }}
  ],
  "metadata": {{
    "hashtags": ["relevant", "hashtags"]
  }}
}}

Generate an engaging {style} video script now. Return ONLY the JSON, no other text."##
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let req: ScriptRequest = serde_json::from_str(r#"{"topic": "tides"}"#).unwrap();
        assert_eq!(req, ScriptRequest::new("tides"));
        assert_eq!(req.target_platforms.len(), 3);
    }

    #[test]
    fn test_prompt_mentions_request() {
        let req = ScriptRequest::new("Why the sky is blue")
            .with_style("funny")
            .with_duration(45.0)
            .with_platforms(vec!["tiktok".into()]);
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Topic: Why the sky is blue"));
        assert!(prompt.contains("Style: funny"));
        assert!(prompt.contains("\"total_duration\": 45"));
        assert!(prompt.contains("Target Platforms: tiktok"));
        assert!(prompt.ends_with("no other text."));
    }
}
