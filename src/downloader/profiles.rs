// Per-platform client identity
//
// Extra yt-dlp arguments some platforms need to look like a first-party
// client. Looked up by platform; call sites never branch on a platform.

use super::models::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// `--extractor-args` value
    pub extractor_args: Option<&'static str>,
    /// `--user-agent` value
    pub user_agent: Option<&'static str>,
    /// `--add-header` values, `Name:value`
    pub headers: &'static [&'static str],
}

pub const PLATFORM_PROFILES: &[PlatformProfile] = &[PlatformProfile {
    platform: Platform::Youtube,
    extractor_args: Some("youtube:player_client=android"),
    user_agent: Some("com.google.android.youtube/17.31.35 (Linux; U; Android 11) gzip"),
    headers: &["Accept-Language:en-US,en;q=0.9"],
}];

impl PlatformProfile {
    pub fn for_platform(platform: Platform) -> Option<&'static PlatformProfile> {
        PLATFORM_PROFILES.iter().find(|p| p.platform == platform)
    }

    /// Command-line arguments expressing this profile.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(extractor_args) = self.extractor_args {
            args.push("--extractor-args".to_string());
            args.push(extractor_args.to_string());
        }
        if let Some(user_agent) = self.user_agent {
            args.push("--user-agent".to_string());
            args.push(user_agent.to_string());
        }
        for header in self.headers {
            args.push("--add-header".to_string());
            args.push(header.to_string());
        }
        args
    }
}

/// Profile arguments for `platform`, empty when it has none.
pub fn profile_args(platform: Platform) -> Vec<String> {
    PlatformProfile::for_platform(platform)
        .map(PlatformProfile::args)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_gets_android_client_identity() {
        let args = profile_args(Platform::Youtube);
        assert_eq!(
            args,
            vec![
                "--extractor-args",
                "youtube:player_client=android",
                "--user-agent",
                "com.google.android.youtube/17.31.35 (Linux; U; Android 11) gzip",
                "--add-header",
                "Accept-Language:en-US,en;q=0.9",
            ]
        );
    }

    #[test]
    fn other_platforms_have_no_extra_args() {
        for platform in [Platform::Tiktok, Platform::Instagram, Platform::Generic] {
            assert!(profile_args(platform).is_empty());
        }
    }

    #[test]
    fn profiles_are_unique_per_platform() {
        for (i, a) in PLATFORM_PROFILES.iter().enumerate() {
            for b in &PLATFORM_PROFILES[i + 1..] {
                assert_ne!(a.platform, b.platform);
            }
        }
    }
}
