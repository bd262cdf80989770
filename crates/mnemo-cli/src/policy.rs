use std::{fmt, str::FromStr};

use mnemo_data::view::ViewConfig;

/// Standard channel inclusion policies that subject views are saved under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPolicy {
    /// Every channel and pair.
    All,
    /// Theta channels, and pairs of two theta channels.
    Theta,
    /// Channels and pairs without theta.
    NoTheta,
    /// Theta channels, and phase-encoding pairs of two theta channels.
    ThetaPhase,
}

impl ViewPolicy {
    pub const ALL: [ViewPolicy; 4] = [
        ViewPolicy::All,
        ViewPolicy::Theta,
        ViewPolicy::NoTheta,
        ViewPolicy::ThetaPhase,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ViewPolicy::All => "all",
            ViewPolicy::Theta => "theta",
            ViewPolicy::NoTheta => "notheta",
            ViewPolicy::ThetaPhase => "theta_phase",
        }
    }

    /// `base` with this policy's theta and phase filters applied.
    pub fn apply(self, base: &ViewConfig) -> ViewConfig {
        let (enforce_theta, exclude_theta, enforce_phase) = match self {
            ViewPolicy::All => (false, false, false),
            ViewPolicy::Theta => (true, false, false),
            ViewPolicy::NoTheta => (false, true, false),
            ViewPolicy::ThetaPhase => (true, false, true),
        };
        ViewConfig {
            enforce_theta,
            exclude_theta,
            enforce_phase,
            ..base.clone()
        }
    }
}

impl fmt::Display for ViewPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ViewPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown view policy '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for policy in ViewPolicy::ALL {
            assert_eq!(policy.name().parse::<ViewPolicy>().unwrap(), policy);
        }
        assert!("phase".parse::<ViewPolicy>().is_err());
    }

    #[test]
    fn test_policies_are_valid_configs() {
        for policy in ViewPolicy::ALL {
            policy.apply(&ViewConfig::default()).validate().unwrap();
        }
        let config = ViewPolicy::ThetaPhase.apply(&ViewConfig::default());
        assert!(config.enforce_theta && config.enforce_phase && !config.exclude_theta);
    }
}
