//! Named stabilization scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// EQ-001: Fault-free equitable ring reproduces its pattern
    Steady,

    /// EQ-002: Inferred sliding-window network, fault-free
    InferredRing,

    /// EQ-003: Outage on a ring member, then self-correction
    RingFault,

    /// EQ-004: Outage on a follower outside every cycle
    FollowerFault,

    /// EQ-005: Zero-length outage on a ring member
    Blip,

    /// EQ-006: Staggered outages on every follower
    FollowerStorm,

    /// EQ-007: Same seed twice, byte-identical traces
    Replay,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::InferredRing,
            ScenarioId::RingFault,
            ScenarioId::FollowerFault,
            ScenarioId::Blip,
            ScenarioId::FollowerStorm,
            ScenarioId::Replay,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::InferredRing => "inferred_ring",
            ScenarioId::RingFault => "ring_fault",
            ScenarioId::FollowerFault => "follower_fault",
            ScenarioId::Blip => "blip",
            ScenarioId::FollowerStorm => "follower_storm",
            ScenarioId::Replay => "replay",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "Equitable ring without faults, trace must equal the pattern",
            ScenarioId::InferredRing => {
                "Infer rules from a permuted sliding window, replay without faults"
            }
            ScenarioId::RingFault => "Ring member down at step 4 for 2 steps, tally must recover",
            ScenarioId::FollowerFault => "Follower down at step 4 for 2 steps, ring untouched",
            ScenarioId::Blip => "Zero-length outage on a ring member, no visible effect",
            ScenarioId::FollowerStorm => "Every follower fails in turn, ring tally never moves",
            ScenarioId::Replay => "Ring fault run twice with one seed, traces must match",
        }
    }

    /// Returns true if the scenario injects faults.
    pub fn has_faults(&self) -> bool {
        !matches!(self, ScenarioId::Steady | ScenarioId::InferredRing)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady" | "eq-001" => Ok(ScenarioId::Steady),
            "inferred_ring" | "inferredring" | "eq-002" => Ok(ScenarioId::InferredRing),
            "ring_fault" | "ringfault" | "eq-003" => Ok(ScenarioId::RingFault),
            "follower_fault" | "followerfault" | "eq-004" => Ok(ScenarioId::FollowerFault),
            "blip" | "eq-005" => Ok(ScenarioId::Blip),
            "follower_storm" | "followerstorm" | "eq-006" => Ok(ScenarioId::FollowerStorm),
            "replay" | "eq-007" => Ok(ScenarioId::Replay),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("EQ-003".parse::<ScenarioId>(), Ok(ScenarioId::RingFault));
        assert_eq!("RingFault".parse::<ScenarioId>(), Ok(ScenarioId::RingFault));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
