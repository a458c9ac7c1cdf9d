use pipelines_types::InstallStatus;

/// One installation step. Phases always run in the order of [`Phase::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ApplyPipeline,
    ValidatePipeline,
    ApplyTriggers,
    ValidateTriggers,
    ApplyAddons,
    ApplyCommunity,
}

/// What the head condition asks the controller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Run (or re-run) the phase.
    Run(Phase),
    /// Everything is installed. Only the version and identity are checked.
    SteadyState,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::ApplyPipeline,
        Phase::ValidatePipeline,
        Phase::ApplyTriggers,
        Phase::ValidateTriggers,
        Phase::ApplyAddons,
        Phase::ApplyCommunity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::ApplyPipeline => "apply-pipeline",
            Phase::ValidatePipeline => "validate-pipeline",
            Phase::ApplyTriggers => "apply-triggers",
            Phase::ValidateTriggers => "validate-triggers",
            Phase::ApplyAddons => "apply-addons",
            Phase::ApplyCommunity => "apply-community-resources",
        }
    }

    /// Code recorded when the phase succeeds and another phase follows it.
    pub fn success_code(&self) -> InstallStatus {
        match self {
            Phase::ApplyPipeline => InstallStatus::AppliedPipeline,
            Phase::ValidatePipeline => InstallStatus::ValidatedPipeline,
            Phase::ApplyTriggers => InstallStatus::AppliedTriggers,
            Phase::ValidateTriggers => InstallStatus::ValidatedTriggers,
            Phase::ApplyAddons => InstallStatus::AppliedAddons,
            Phase::ApplyCommunity => InstallStatus::Installed,
        }
    }

    /// Code recorded when the phase fails.
    pub fn error_code(&self) -> InstallStatus {
        match self {
            Phase::ApplyPipeline => InstallStatus::PipelineApplyError,
            Phase::ValidatePipeline => InstallStatus::PipelineValidateError,
            Phase::ApplyTriggers => InstallStatus::TriggersError,
            Phase::ValidateTriggers => InstallStatus::TriggersValidateError,
            Phase::ApplyAddons => InstallStatus::AddonsError,
            Phase::ApplyCommunity => InstallStatus::CommunityResourcesError,
        }
    }
}

/// Maps the code of the head condition to the next step. A phase's error
/// code re-enters that same phase, and the success code of the previous
/// phase enters it, so a failed phase is retried simply by reconciling
/// again. This table is the whole retry mechanism.
pub fn dispatch(code: InstallStatus) -> Dispatch {
    match code {
        InstallStatus::Empty
        | InstallStatus::PipelineApplyError
        | InstallStatus::InvalidResource => Dispatch::Run(Phase::ApplyPipeline),
        InstallStatus::AppliedPipeline | InstallStatus::PipelineValidateError => {
            Dispatch::Run(Phase::ValidatePipeline)
        }
        InstallStatus::ValidatedPipeline | InstallStatus::TriggersError => {
            Dispatch::Run(Phase::ApplyTriggers)
        }
        InstallStatus::AppliedTriggers | InstallStatus::TriggersValidateError => {
            Dispatch::Run(Phase::ValidateTriggers)
        }
        InstallStatus::ValidatedTriggers | InstallStatus::AddonsError => {
            Dispatch::Run(Phase::ApplyAddons)
        }
        InstallStatus::AppliedAddons | InstallStatus::CommunityResourcesError => {
            Dispatch::Run(Phase::ApplyCommunity)
        }
        InstallStatus::Installed => Dispatch::SteadyState,
    }
}

/// The phases this operator runs. Triggers are only installed when
/// their manifests are bundled and the community catalog can be
/// switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    phases: Vec<Phase>,
}

impl InstallPlan {
    pub fn new(with_triggers: bool, with_community: bool) -> Self {
        let phases = Phase::ORDER
            .iter()
            .copied()
            .filter(|phase| match phase {
                Phase::ApplyTriggers | Phase::ValidateTriggers => with_triggers,
                Phase::ApplyCommunity => with_community,
                _ => true,
            })
            .collect();
        InstallPlan { phases }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn contains(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    /// Returns the first planned phase at or after `phase` in the fixed
    /// order, or None if no planned phase remains.
    pub fn resolve(&self, phase: Phase) -> Option<Phase> {
        Phase::ORDER
            .iter()
            .skip_while(|p| **p != phase)
            .find(|p| self.contains(**p))
            .copied()
    }

    /// Code recorded when `phase` succeeds. The last planned phase
    /// completes the installation.
    pub fn success_code(&self, phase: Phase) -> InstallStatus {
        if self.phases.last() == Some(&phase) {
            InstallStatus::Installed
        } else {
            phase.success_code()
        }
    }
}

impl Default for InstallPlan {
    fn default() -> Self {
        InstallPlan::new(true, true)
    }
}
