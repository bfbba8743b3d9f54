//! Publishing limits of the short-form platforms a script can target.

/// Limits a finished video must satisfy for one platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformLimits {
    pub name: &'static str,
    pub min_duration: f64,
    pub max_duration: f64,
    pub max_file_size: u64,
}

const MB: u64 = 1024 * 1024;

/// All known platforms. Every target is 9:16.
pub const PLATFORMS: &[PlatformLimits] = &[
    PlatformLimits {
        name: "tiktok",
        min_duration: 3.0,
        max_duration: 180.0,
        max_file_size: 287 * MB,
    },
    PlatformLimits {
        name: "instagram",
        min_duration: 3.0,
        max_duration: 90.0,
        max_file_size: 100 * MB,
    },
    PlatformLimits {
        name: "youtube",
        min_duration: 1.0,
        max_duration: 60.0,
        max_file_size: 256 * MB,
    },
];

/// Look up limits by platform name (case-insensitive).
pub fn limits_for(name: &str) -> Option<&'static PlatformLimits> {
    let name = name.trim().to_ascii_lowercase();
    PLATFORMS.iter().find(|p| p.name == name)
}

/// Report every limit the video would exceed on the listed platforms.
/// Unknown platform names are reported too. `file_size` is skipped when unknown.
pub fn check_platforms(platforms: &[String], duration: f64, file_size: Option<u64>) -> Vec<String> {
    let mut warnings = Vec::new();
    for platform in platforms {
        let Some(limits) = limits_for(platform) else {
            warnings.push(format!("unknown target platform '{platform}'"));
            continue;
        };
        if duration < limits.min_duration {
            warnings.push(format!(
                "{}: duration {duration:.1}s is below the {:.0}s minimum",
                limits.name, limits.min_duration
            ));
        }
        if duration > limits.max_duration {
            warnings.push(format!(
                "{}: duration {duration:.1}s exceeds the {:.0}s maximum",
                limits.name, limits.max_duration
            ));
        }
        if let Some(size) = file_size {
            if size > limits.max_file_size {
                warnings.push(format!(
                    "{}: file size {} bytes exceeds the {} MB limit",
                    limits.name,
                    size,
                    limits.max_file_size / MB
                ));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(limits_for("TikTok").map(|l| l.max_duration), Some(180.0));
        assert!(limits_for("myspace").is_none());
    }

    #[test]
    fn test_within_limits_has_no_warnings() {
        let platforms = vec!["tiktok".to_string(), "youtube".to_string()];
        assert!(check_platforms(&platforms, 30.0, Some(10 * MB)).is_empty());
    }

    #[test]
    fn test_reports_each_violation() {
        let platforms = vec!["youtube".to_string(), "instagram".to_string(), "vine".to_string()];
        let warnings = check_platforms(&platforms, 75.0, Some(120 * MB));
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].starts_with("youtube: duration"));
        assert!(warnings[1].starts_with("instagram: file size"));
        assert!(warnings[2].contains("vine"));
    }
}
