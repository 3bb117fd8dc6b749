use super::{BreedContext, BreedingSource, PipelineSources, SetupContext, SourceHandle};
use crate::gp::build::GrowBuilder;
use crate::gp::{GpTree, NodeId, NodeSearch};
use crate::output::EcError;
use crate::params::Parameter;
use crate::pop::Individual;
use rand::Rng;
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::rc::Rc;

/// Subtree mutation: replaces a random subtree of a selected parent with a
/// freshly grown expression. The grown subtree is owned exclusively by this
/// pipeline, so splicing it in skips the second clone a borrowed donor
/// would require.
#[derive(Debug)]
pub struct MutationPipeline {
    sources: PipelineSources,
    builder: GrowBuilder,
    max_depth: usize,
    tries: usize,
}

impl MutationPipeline {
    pub const P_MAX_DEPTH: &'static str = "max-depth";
    pub const P_TRIES: &'static str = "tries";
    pub const P_BUILD: &'static str = "build";
    pub const NUM_SOURCES: usize = 1;

    fn pick_point(tree: &GpTree, rng: &mut StdRng) -> Option<NodeId> {
        let root = tree.root()?;
        let size = tree.num_nodes(root, NodeSearch::All);
        let p = rng.random_range(0..size);
        tree.node_in_position(root, p, NodeSearch::All).ok()
    }

    fn mutated_tree(&self, parent: &GpTree, rng: &mut StdRng) -> GpTree {
        for _ in 0..self.tries {
            let Some(old) = Self::pick_point(parent, rng) else {
                break;
            };
            let graft = self.builder.grow_subtree(rng, self.builder.max_depth);
            let candidate = parent.clone_replacing_owned(graft, old);
            let within_depth = candidate
                .root()
                .map(|r| candidate.depth(r) <= self.max_depth)
                .unwrap_or(false);
            if within_depth {
                return candidate;
            }
        }
        parent.deep_clone()
    }
}

impl BreedingSource for MutationPipeline {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        self.sources = PipelineSources::setup(ctx, base, Some(Self::NUM_SOURCES))?;
        self.builder =
            GrowBuilder::setup(ctx.params, &base.push(Self::P_BUILD), ctx.output)?;

        let max_depth =
            ctx.params
                .get_int_with_default(&base.push(Self::P_MAX_DEPTH), None, 17)?;
        if max_depth < 1 {
            return Err(ctx
                .output
                .fatal(&format!("Mutation max-depth must be >= 1, got {max_depth}")));
        }
        self.max_depth = max_depth as usize;

        let tries = ctx
            .params
            .get_int_with_default(&base.push(Self::P_TRIES), None, 1)?;
        if tries < 1 {
            return Err(ctx
                .output
                .fatal(&format!("Mutation tries must be >= 1, got {tries}")));
        }
        self.tries = tries as usize;
        Ok(())
    }

    fn typical_inds_produced(&self) -> usize {
        self.sources.typical_inds_produced().max(1)
    }

    fn prepare_to_produce(
        &mut self,
        ctx: &mut BreedContext<'_>,
        subpop: usize,
    ) -> Result<(), EcError> {
        self.sources.prepare_to_produce(ctx, subpop)
    }

    fn finish_producing(
        &mut self,
        ctx: &mut BreedContext<'_>,
        subpop: usize,
    ) -> Result<(), EcError> {
        self.sources.finish_producing(ctx, subpop)
    }

    fn produce(
        &mut self,
        min: usize,
        max: usize,
        start: usize,
        subpop: usize,
        inds: &mut [Option<Individual>],
        ctx: &mut BreedContext<'_>,
    ) -> Result<usize, EcError> {
        let n = self.typical_inds_produced().clamp(min, max);

        if !ctx.rng.random_bool(self.sources.likelihood) {
            return self.sources.reproduce(n, start, subpop, inds, ctx);
        }

        self.sources.reproduce(n, start, subpop, inds, ctx)?;
        for slot in inds.iter_mut().skip(start).take(n) {
            let Some(ind) = slot.as_mut() else {
                return Err(ctx.output.fatal("Mutation child source produced nothing"));
            };
            let t = ctx.rng.random_range(0..ind.trees.len());
            ind.trees[t] = self.mutated_tree(&ind.trees[t], ctx.rng);
            ind.evaluated = false;
            ind.fitness.value = f64::NEG_INFINITY;
        }
        Ok(n)
    }

    fn clone_source(&self) -> SourceHandle {
        Rc::new(RefCell::new(MutationPipeline {
            sources: self.sources.clone_sources(),
            builder: self.builder.clone(),
            max_depth: self.max_depth,
            tries: self.tries,
        }))
    }
}

impl Default for MutationPipeline {
    fn default() -> Self {
        Self {
            sources: PipelineSources::default(),
            builder: GrowBuilder {
                min_depth: 2,
                max_depth: 6,
                num_inputs: 1,
                num_registers: 1,
                const_min: -1.0,
                const_max: 1.0,
            },
            max_depth: 17,
            tries: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breed::test_support::evaluated_population;
    use crate::output::Output;
    use rand::SeedableRng;

    fn configured_pipeline() -> MutationPipeline {
        let params =
            crate::params::ParameterDatabase::parse("pipe.source.0 = tournament\n").unwrap();
        let mut output = Output::new();
        let registry = crate::registry::Registry::default();
        let mut ctx = SetupContext {
            params: &params,
            output: &mut output,
            registry: &registry,
        };
        let mut pipe = MutationPipeline::default();
        pipe.setup(&mut ctx, &Parameter::new("pipe")).unwrap();
        pipe.tries = 5;
        pipe
    }

    #[test]
    fn test_produce_yields_valid_unevaluated_children() {
        let pop = evaluated_population(10, 19);
        let mut rng = StdRng::seed_from_u64(12);
        let mut output = Output::new();
        let mut ctx = BreedContext {
            population: &pop,
            rng: &mut rng,
            output: &mut output,
        };

        let mut pipe = configured_pipeline();
        let mut slots: Vec<Option<Individual>> = vec![None; 6];
        let mut q = 0;
        while q < 6 {
            q += pipe.produce(1, 6 - q, q, 0, &mut slots, &mut ctx).unwrap();
        }
        for slot in &slots {
            let child = slot.as_ref().unwrap();
            assert!(!child.evaluated);
            assert!(child.trees[0].validate().is_ok());
            let root = child.trees[0].root().unwrap();
            assert!(child.trees[0].depth(root) <= pipe.max_depth);
        }
    }

    #[test]
    fn test_mutation_changes_some_children() {
        let pop = evaluated_population(10, 37);
        let mut rng = StdRng::seed_from_u64(14);
        let mut output = Output::new();
        let mut ctx = BreedContext {
            population: &pop,
            rng: &mut rng,
            output: &mut output,
        };

        let mut pipe = configured_pipeline();
        let mut slots: Vec<Option<Individual>> = vec![None; 30];
        let mut q = 0;
        while q < 30 {
            q += pipe.produce(1, 30 - q, q, 0, &mut slots, &mut ctx).unwrap();
        }
        let changed = slots
            .iter()
            .flatten()
            .filter(|child| !pop.subpops[0].filled().any(|p| p.structurally_equals(child)))
            .count();
        assert!(changed > 0);
    }
}
