use crate::domain::identity::PresentationOptions;

/// Answers which platform family the process runs on.
pub trait PlatformProbe: Send + Sync + std::fmt::Debug {
    fn is_android(&self) -> bool;
    fn is_apple(&self) -> bool;
}

/// Probe backed by the compile target.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPlatform;

impl PlatformProbe for HostPlatform {
    fn is_android(&self) -> bool {
        cfg!(target_os = "android")
    }

    fn is_apple(&self) -> bool {
        cfg!(target_vendor = "apple")
    }
}

/// Capability profile of a platform family, selected once at startup.
///
/// The router and identity acquirer ask the profile what to do instead of branching on the
/// host themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    /// Foreground pushes are shown through the local renderer.
    Android,
    /// Foreground presentation is delegated to the OS; a secondary platform token exists.
    Apple,
}

impl Platform {
    /// Picks the profile for the host. Anything that is not Apple uses the Android profile.
    #[must_use]
    pub fn detect(probe: &dyn PlatformProbe) -> Self {
        if probe.is_apple() && !probe.is_android() { Self::Apple } else { Self::Android }
    }

    #[must_use]
    pub const fn uses_secondary_token(self) -> bool {
        matches!(self, Self::Apple)
    }

    #[must_use]
    pub const fn renders_foreground_locally(self) -> bool {
        matches!(self, Self::Android)
    }

    /// Whether foreground deliveries are routed per message. On Apple the OS presents them and
    /// the payload arrives once the user opens the notification.
    #[must_use]
    pub const fn routes_foreground(self) -> bool {
        matches!(self, Self::Android)
    }

    /// Presentation options applied once during setup, if the platform presents pushes itself.
    #[must_use]
    pub const fn presentation_options(self) -> Option<PresentationOptions> {
        match self {
            Self::Apple => Some(PresentationOptions::all()),
            Self::Android => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Apple => "apple",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedProbe {
        android: bool,
        apple: bool,
    }

    impl PlatformProbe for FixedProbe {
        fn is_android(&self) -> bool {
            self.android
        }

        fn is_apple(&self) -> bool {
            self.apple
        }
    }

    #[test]
    fn test_detect_selects_profile() {
        assert_eq!(Platform::detect(&FixedProbe { android: false, apple: true }), Platform::Apple);
        assert_eq!(Platform::detect(&FixedProbe { android: true, apple: false }), Platform::Android);
        assert_eq!(Platform::detect(&FixedProbe { android: false, apple: false }), Platform::Android);
    }

    #[test]
    fn test_capabilities_are_disjoint() {
        assert!(Platform::Apple.uses_secondary_token());
        assert!(!Platform::Apple.renders_foreground_locally());
        assert!(!Platform::Apple.routes_foreground());
        assert_eq!(Platform::Apple.presentation_options(), Some(PresentationOptions::all()));

        assert!(!Platform::Android.uses_secondary_token());
        assert!(Platform::Android.renders_foreground_locally());
        assert!(Platform::Android.routes_foreground());
        assert_eq!(Platform::Android.presentation_options(), None);
    }
}
