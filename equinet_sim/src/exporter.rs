//! JSON trace exporter.
//!
//! Writes a finished run (topology cycles, per-step frames and the event log)
//! as pretty-printed JSON for offline inspection.

use crate::trace::{CorrectionEvent, RuntimeAnomaly, Snapshot, Status};
use crate::world::SimWorld;
use equinet_core::{AgentId, Cycle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single step of exported data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub step: u64,

    /// Global state in snapshot format
    pub state: String,

    /// Global ones count
    pub ones: usize,

    pub status: Status,

    /// Ones per cycle, indexed by cycle id
    pub cycle_ones: Vec<usize>,

    /// Agents Down during this step
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub down: Vec<AgentId>,
}

impl TraceFrame {
    pub fn from_snapshot(snapshot: &Snapshot, expected_ones: usize) -> Self {
        let ones = snapshot.ones();
        Self {
            step: snapshot.step,
            state: snapshot.render(),
            ones,
            status: Status::classify(ones, expected_ones),
            cycle_ones: snapshot.cycle_ones.clone(),
            down: snapshot.down.clone(),
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize)]
pub struct TraceExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub num_agents: usize,

    pub cycles: Vec<Cycle>,

    /// All frames, step 0 first
    pub frames: Vec<TraceFrame>,

    pub anomalies: Vec<RuntimeAnomaly>,

    pub corrections: Vec<CorrectionEvent>,

    /// Final result
    pub passed: bool,
}

impl TraceExport {
    /// Creates an empty export container.
    pub fn new(scenario: &str, seed: u64, num_agents: usize) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            num_agents,
            cycles: Vec::new(),
            frames: Vec::new(),
            anomalies: Vec::new(),
            corrections: Vec::new(),
            passed: false,
        }
    }

    /// Captures everything a world has recorded so far.
    pub fn from_world(scenario: &str, world: &SimWorld) -> Self {
        let topology = world.topology();
        let mut export = Self::new(scenario, world.config().seed, topology.num_agents());
        export.cycles = topology.cycles().to_vec();
        for snapshot in world.trace().iter() {
            export.add_frame(TraceFrame::from_snapshot(snapshot, world.expected_ones()));
        }
        export.anomalies = world.anomalies().to_vec();
        export.corrections = world.corrections().to_vec();
        export
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: TraceFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::{FaultSchedule, FaultWindow};
    use crate::world::SimConfig;
    use equinet_core::{EquitableGraph, SccCycleDetector, Topology};

    fn world() -> SimWorld {
        let graph = EquitableGraph::new(6, 2).unwrap();
        let topology =
            Topology::from_pattern(graph.strategies(), &graph.pattern(), &SccCycleDetector).unwrap();
        let schedule = FaultSchedule::new().with_window(FaultWindow::new(0, 2, 1));
        let mut world = SimWorld::new(topology, schedule, SimConfig::default().with_steps(4)).unwrap();
        world.run();
        world
    }

    #[test]
    fn test_export_from_world() {
        let world = world();
        let mut export = TraceExport::from_world("ring_fault", &world);
        export.finalize(true);

        assert_eq!(export.num_agents, 6);
        assert_eq!(export.frames.len(), 5);
        assert_eq!(export.frames[0].state, "110000");
        assert_eq!(export.frames[0].status, Status::Normal);
        assert_eq!(export.frames[2].down, vec![0]);
        assert_eq!(export.cycles.len(), 1);
        assert_eq!(export.corrections.len(), 1);
    }

    #[test]
    fn test_export_json_shape() {
        let export = TraceExport::from_world("ring_fault", &world());
        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();

        assert_eq!(json["scenario"], "ring_fault");
        assert_eq!(json["seed"], 42);
        assert_eq!(json["cycles"][0]["target_ones"], 1);
        assert_eq!(json["frames"][0]["step"], 0);
        assert_eq!(json["frames"][0]["state"], "110000");
        // Empty down lists are omitted
        assert!(json["frames"][0].get("down").is_none());
        assert_eq!(json["frames"][2]["down"][0], 0);
        assert_eq!(json["passed"], false);
    }
}
