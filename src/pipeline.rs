//! Ordered, nestable provisioning pipelines.
//!
//! A pipeline is a named sequence of steps executed strictly in order. A
//! step may return a nested pipeline, which runs depth-first before the
//! next sibling. Execution is fail-fast: the first error aborts the whole
//! run with the failing step's name on the error chain, and completed
//! steps are never rolled back. Every generation step is overwrite-based,
//! so re-running a failed pipeline is safe.
//!
//! Steps carry a filter tag instead of an enablement predicate. Tags are
//! resolved once, against a [`Selection`] derived from the network config,
//! when the pipeline is assembled; a filtered-out step never runs and
//! never re-evaluates anything at execution time.
//!
//! The shared network config stays immutable throughout; steps write
//! derived results into the mutable state value threaded through `run`.

use crate::config::NetworkConfig;
use crate::topology::Topology;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{debug, info};

/// Optional inputs a step may require beyond the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Deployed root-chain contract addresses are available.
    Contracts,
}

/// Assembly-time condition attached to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFilter {
    /// Runs in every configuration.
    Always,
    /// Runs only under the given topology.
    Topology(Topology),
    /// Runs only when the capability is present.
    Capability(Capability),
}

/// The set of tags satisfied by the current run, fixed at assembly time.
#[derive(Debug, Clone)]
pub struct Selection {
    topology: Topology,
    capabilities: Vec<Capability>,
}

impl Selection {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Derive the selection from a validated network config.
    pub fn from_config(config: &NetworkConfig) -> Self {
        let mut selection = Selection::new(config.topology);
        if config.contract_addresses.is_some() {
            selection = selection.with_capability(Capability::Contracts);
        }
        selection
    }

    pub fn allows(&self, filter: StepFilter) -> bool {
        match filter {
            StepFilter::Always => true,
            StepFilter::Topology(topology) => topology == self.topology,
            StepFilter::Capability(capability) => self.capabilities.contains(&capability),
        }
    }
}

/// What a step produced: either plain completion or a nested pipeline to
/// run before the next sibling.
pub enum StepOutcome<'a, C> {
    Done,
    Nested(Pipeline<'a, C>),
}

type StepAction<'a, C> = Box<dyn FnOnce(&mut C) -> Result<StepOutcome<'a, C>> + 'a>;

/// One named unit of provisioning work.
pub struct Step<'a, C> {
    name: String,
    filter: StepFilter,
    action: StepAction<'a, C>,
}

impl<'a, C> Step<'a, C> {
    /// A step whose action may spawn a nested pipeline.
    pub fn new(
        name: &str,
        action: impl FnOnce(&mut C) -> Result<StepOutcome<'a, C>> + 'a,
    ) -> Self {
        Self {
            name: name.to_string(),
            filter: StepFilter::Always,
            action: Box::new(action),
        }
    }

    /// A step whose action completes in place.
    pub fn leaf(name: &str, action: impl FnOnce(&mut C) -> Result<()> + 'a) -> Self {
        Self::new(name, move |state| {
            action(state)?;
            Ok(StepOutcome::Done)
        })
    }

    /// Restrict this step to one topology.
    pub fn for_topology(mut self, topology: Topology) -> Self {
        self.filter = StepFilter::Topology(topology);
        self
    }

    /// Restrict this step to runs providing a capability.
    pub fn requires(mut self, capability: Capability) -> Self {
        self.filter = StepFilter::Capability(capability);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An ordered sequence of steps sharing one state value.
pub struct Pipeline<'a, C> {
    name: String,
    steps: Vec<Step<'a, C>>,
}

impl<'a, C> Pipeline<'a, C> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: Step<'a, C>) {
        self.steps.push(step);
    }

    /// Build a pipeline from candidate steps, dropping those whose filter
    /// the selection does not satisfy. Filtering happens exactly once,
    /// here.
    pub fn assemble(name: &str, selection: &Selection, steps: Vec<Step<'a, C>>) -> Self {
        let mut pipeline = Pipeline::new(name);
        for step in steps {
            if selection.allows(step.filter) {
                pipeline.push(step);
            } else {
                debug!("[{}] step '{}' not selected, dropping", name, step.name);
            }
        }
        pipeline
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Execute every step in order, depth-first through nested pipelines,
    /// aborting on the first failure.
    pub fn run(self, state: &mut C) -> Result<()> {
        for step in self.steps {
            info!("[{}] {}", self.name, step.name);
            let outcome = (step.action)(state)
                .wrap_err_with(|| format!("step '{}' failed", step.name))?;
            if let StepOutcome::Nested(nested) = outcome {
                nested
                    .run(state)
                    .wrap_err_with(|| format!("step '{}' failed", step.name))?;
            }
        }
        debug!("[{}] all steps completed", self.name);
        Ok(())
    }
}
