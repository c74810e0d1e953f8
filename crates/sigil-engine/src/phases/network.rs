//! Outbound network use and exfiltration endpoints. Pure signature phase.

use super::PhaseDetector;
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::NetworkExfil,
    probes: &[],
};
