//! Machine-readable record of what lowering did to a unit.

use serde::Serialize;

use crate::config::BodyPass;

/// Counters for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub stubs_created: usize,
    pub calls_rewritten: usize,
    pub resumes_rewritten: usize,
    pub intrinsics_expanded: usize,
    pub intrinsics_passed_through: usize,
    pub trampolines_generated: usize,
    pub bodies_visited: usize,
}

/// One step taken by a pass, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoweringEvent {
    StubCreated {
        original: String,
        arity: usize,
    },
    CallRewritten {
        caller: String,
        callee: String,
    },
    ResumeRewritten {
        function: String,
    },
    IntrinsicExpanded {
        function: String,
    },
    IntrinsicPassedThrough {
        function: String,
    },
    TrampolineGenerated {
        function: String,
        arity: usize,
    },
    BodyVisited {
        pass: BodyPass,
        function: String,
        function_id: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoweringReport {
    pub unit: String,
    pub stats: PassStats,
    pub events: Vec<LoweringEvent>,
}

impl LoweringReport {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, event: LoweringEvent) {
        match &event {
            LoweringEvent::StubCreated { .. } => self.stats.stubs_created += 1,
            LoweringEvent::CallRewritten { .. } => self.stats.calls_rewritten += 1,
            LoweringEvent::ResumeRewritten { .. } => self.stats.resumes_rewritten += 1,
            LoweringEvent::IntrinsicExpanded { .. } => self.stats.intrinsics_expanded += 1,
            LoweringEvent::IntrinsicPassedThrough { .. } => {
                self.stats.intrinsics_passed_through += 1
            }
            LoweringEvent::TrampolineGenerated { .. } => self.stats.trampolines_generated += 1,
            LoweringEvent::BodyVisited { .. } => self.stats.bodies_visited += 1,
        }
        self.events.push(event);
    }

    /// Ids of the bodies `pass` visited, in visit order.
    pub fn visited_by(&self, pass: BodyPass) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LoweringEvent::BodyVisited {
                    pass: p,
                    function_id,
                    ..
                } if *p == pass => Some(*function_id),
                _ => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
