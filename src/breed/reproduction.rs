use super::{BreedContext, BreedingSource, PipelineSources, SetupContext, SourceHandle};
use crate::output::EcError;
use crate::params::Parameter;
use crate::pop::Individual;
use std::cell::RefCell;
use std::rc::Rc;

/// Straight reproduction: copies individuals out of its child source into
/// the next generation unchanged. The child's clone-on-read contract is the
/// copy, so this pipeline adds no cloning of its own.
#[derive(Debug, Default)]
pub struct ReproductionPipeline {
    sources: PipelineSources,
}

impl ReproductionPipeline {
    pub const NUM_SOURCES: usize = 1;
}

impl BreedingSource for ReproductionPipeline {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        self.sources = PipelineSources::setup(ctx, base, Some(Self::NUM_SOURCES))?;
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
        self.sources.reproduce(n, start, subpop, inds, ctx)
    }

    fn clone_source(&self) -> SourceHandle {
        Rc::new(RefCell::new(ReproductionPipeline {
            sources: self.sources.clone_sources(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breed::test_support::evaluated_population;
    use crate::output::Output;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_reproduction_passes_selected_parents_through() {
        let pop = evaluated_population(8, 43);
        let mut rng = StdRng::seed_from_u64(20);
        let mut output = Output::new();

        let params =
            crate::params::ParameterDatabase::parse("pipe.source.0 = tournament\n").unwrap();
        let registry = crate::registry::Registry::default();
        let mut setup_ctx = SetupContext {
            params: &params,
            output: &mut output,
            registry: &registry,
        };
        let mut pipe = ReproductionPipeline::default();
        pipe.setup(&mut setup_ctx, &Parameter::new("pipe")).unwrap();

        let mut ctx = BreedContext {
            population: &pop,
            rng: &mut rng,
            output: &mut output,
        };
        let mut slots: Vec<Option<Individual>> = vec![None; 3];
        let n = pipe.produce(1, 3, 0, 0, &mut slots, &mut ctx).unwrap();
        assert!(n >= 1);
        for slot in slots.iter().take(n) {
            let child = slot.as_ref().unwrap();
            assert!(pop.subpops[0].filled().any(|p| p.structurally_equals(child)));
        }
    }

    #[test]
    fn test_unconfigured_pipeline_refuses_to_produce() {
        let pop = evaluated_population(4, 47);
        let mut rng = StdRng::seed_from_u64(21);
        let mut output = Output::new();
        let mut ctx = BreedContext {
            population: &pop,
            rng: &mut rng,
            output: &mut output,
        };
        let mut pipe = ReproductionPipeline::default();
        let mut slots: Vec<Option<Individual>> = vec![None; 1];
        assert!(pipe.produce(1, 1, 0, 0, &mut slots, &mut ctx).is_err());
    }
}
