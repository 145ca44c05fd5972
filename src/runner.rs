//! Shared resolve-run plumbing for the CLI.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use modweave_index::{ModuleIndex, ResourceDescriptor};
use modweave_resolver::{
    BasicSolver, ModuleResolver, ResolutionReport, ResolveError, ResolveToken, ResolverConfig,
};
use modweave_types::{Resource, WiringMap};

/// Options for one CLI resolve run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub batch_size: usize,
    /// Module names acting as triggers; empty means every module.
    pub triggers: Vec<String>,
    pub mandatory_triggers: bool,
}

/// Result of one CLI resolve run.
pub struct RunOutput {
    /// Every installed resource, in install order.
    pub resources: Vec<Arc<Resource>>,
    /// The resolved wirings (empty when the run failed hard).
    pub wirings: WiringMap,
    pub report: ResolutionReport,
    /// Set when mandatory triggers failed to resolve.
    pub failure: Option<String>,
}

/// Install a module set into a fresh index and resolve all of it.
pub fn run_set(descriptors: Vec<ResourceDescriptor>, options: &RunOptions) -> Result<RunOutput> {
    let index = Arc::new(ModuleIndex::new());
    let mut resources = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let name = descriptor.name.clone();
        let builder = descriptor
            .into_builder()
            .with_context(|| format!("invalid module '{name}'"))?;
        resources.push(index.install(builder));
    }

    let triggers: Vec<Arc<Resource>> = if options.triggers.is_empty() {
        resources.clone()
    } else {
        let mut triggers = Vec::new();
        for name in &options.triggers {
            let resource = resources
                .iter()
                .find(|r| r.symbolic_name() == name)
                .with_context(|| format!("unknown trigger module '{name}'"))?;
            triggers.push(Arc::clone(resource));
        }
        triggers
    };

    let resolver = ModuleResolver::new(index, Box::new(BasicSolver::new()))
        .with_config(ResolverConfig::with_batch_size(options.batch_size));
    let token = ResolveToken::new();

    let outcome = resolver.resolve_delta(
        &token,
        &triggers,
        options.mandatory_triggers,
        &resources,
        &WiringMap::new(),
    );
    match outcome {
        Ok(outcome) => {
            let mut wirings = WiringMap::new();
            outcome.delta.merge_into(&mut wirings);
            Ok(RunOutput {
                resources,
                wirings,
                report: outcome.report,
                failure: None,
            })
        }
        Err(ResolveError::MandatoryResolveFailed { reason, report }) => Ok(RunOutput {
            resources,
            wirings: WiringMap::new(),
            report,
            failure: Some(reason),
        }),
        Err(error) => bail!(error.to_string()),
    }
}
