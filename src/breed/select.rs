use super::{BreedContext, BreedingSource, SetupContext, SourceHandle};
use crate::output::EcError;
use crate::params::Parameter;
use crate::pop::Individual;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// Tournament selection: draw `size` contenders uniformly from the current
/// subpopulation and keep the fittest. Every pick is cloned on the way out,
/// so downstream pipelines own their parents outright.
#[derive(Debug, Clone)]
pub struct TournamentSelection {
    pub size: usize,
}

impl TournamentSelection {
    pub const P_SIZE: &'static str = "size";

    pub fn new() -> Self {
        Self { size: 2 }
    }

    fn select(&self, subpop: usize, ctx: &mut BreedContext<'_>) -> Result<usize, EcError> {
        let inds = &ctx.population.subpops[subpop].individuals;
        let mut best: Option<(usize, f64)> = None;
        for _ in 0..self.size {
            let i = ctx.rng.random_range(0..inds.len());
            if let Some(candidate) = inds[i].as_ref() {
                let value = candidate.fitness.value;
                if best.is_none_or(|(_, b)| value > b) {
                    best = Some((i, value));
                }
            }
        }
        match best {
            Some((i, _)) => Ok(i),
            None => Err(ctx
                .output
                .fatal("Tournament selection drew only unset slots")),
        }
    }
}

impl Default for TournamentSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl BreedingSource for TournamentSelection {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        let size = ctx
            .params
            .get_int_with_default(&base.push(Self::P_SIZE), None, 2)?;
        if size < 1 {
            return Err(ctx.output.fatal(&format!(
                "Tournament size must be >= 1, got {size} at '{}'",
                base.push(Self::P_SIZE)
            )));
        }
        self.size = size as usize;
        Ok(())
    }

    fn typical_inds_produced(&self) -> usize {
        1
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
        let n = min.max(1).min(max);
        for q in start..start + n {
            let winner = self.select(subpop, ctx)?;
            let ind = ctx.population.subpops[subpop].individuals[winner]
                .as_ref()
                .cloned();
            match ind {
                Some(ind) => inds[q] = Some(ind),
                None => {
                    return Err(ctx.output.fatal("Selected slot was unset"));
                }
            }
        }
        Ok(n)
    }

    fn clone_source(&self) -> SourceHandle {
        Rc::new(RefCell::new(self.clone()))
    }

    fn is_selection_method(&self) -> bool {
        true
    }
}
