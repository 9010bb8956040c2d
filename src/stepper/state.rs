use std::fmt;

/// Lifecycle state of the co-simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepperState {
    /// Nothing connected, loaded or resolved yet.
    #[default]
    Unconfigured,
    /// Bindings resolved; no exchange has happened.
    Configured,
    /// Instances are being created for the first warm-up epoch.
    WarmupPriming,
    WarmupStepping,
    /// Instances are being recreated for the run period.
    SteadyPriming,
    SteadyStepping,
    Terminated,
    FatalStop,
}

impl StepperState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::WarmupPriming => "warmup-priming",
            Self::WarmupStepping => "warmup-stepping",
            Self::SteadyPriming => "steady-priming",
            Self::SteadyStepping => "steady-stepping",
            Self::Terminated => "terminated",
            Self::FatalStop => "fatal-stop",
        }
    }

    /// Whether no further exchange can happen.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Terminated | Self::FatalStop)
    }
}

impl fmt::Display for StepperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
