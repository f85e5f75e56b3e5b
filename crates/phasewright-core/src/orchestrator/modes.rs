//! Per-stage agent configuration owned by one orchestrator.

use std::collections::BTreeMap;

use crate::agent::{AgentConfig, ExecutionMode, WorkflowMode};
use crate::config::OrchestratorConfig;
use crate::stage::{Phase, Role, Stage};

/// The live configuration of every phase and role.
///
/// Edits apply to runs started afterwards. Runs in flight, including
/// suspended ones, keep the snapshot they started with.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeTable {
    phases: BTreeMap<Phase, AgentConfig>,
    roles: BTreeMap<Role, AgentConfig>,
}

impl ModeTable {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            phases: Phase::ALL
                .iter()
                .map(|&p| (p, config.agent_config(Stage::Phase(p))))
                .collect(),
            roles: Role::ALL
                .iter()
                .map(|&r| (r, config.agent_config(Stage::Role(r))))
                .collect(),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&AgentConfig> {
        match stage {
            Stage::Phase(p) => self.phases.get(&p),
            Stage::Role(r) => self.roles.get(&r),
        }
    }

    fn get_mut(&mut self, stage: Stage) -> Option<&mut AgentConfig> {
        match stage {
            Stage::Phase(p) => self.phases.get_mut(&p),
            Stage::Role(r) => self.roles.get_mut(&r),
        }
    }

    /// Replace a stage's whole configuration.
    pub fn set(&mut self, config: AgentConfig) {
        match config.stage {
            Stage::Phase(p) => {
                self.phases.insert(p, config);
            }
            Stage::Role(r) => {
                self.roles.insert(r, config);
            }
        }
    }

    pub fn set_execution_mode(&mut self, stage: Stage, mode: ExecutionMode) {
        if let Some(config) = self.get_mut(stage) {
            config.execution_mode = mode;
        }
    }

    pub fn set_workflow_mode(&mut self, stage: Stage, mode: WorkflowMode) {
        if let Some(config) = self.get_mut(stage) {
            config.workflow_mode = mode;
        }
    }

    /// Every configured stage: phases first, then roles, each in canonical
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentConfig> {
        self.phases.values().chain(self.roles.values())
    }
}
