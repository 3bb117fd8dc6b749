use super::{BreedContext, BreedingSource, PipelineSources, SetupContext, SourceHandle};
use crate::gp::{GpTree, NodeId, NodeSearch};
use crate::output::EcError;
use crate::params::Parameter;
use crate::pop::Individual;
use rand::Rng;
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::rc::Rc;

/// Subtree crossover over a pair of selected parents. A swap that would
/// grow a child past `max-depth` is re-attempted up to `tries` times with
/// fresh crossover points; when the tries run out, the parent's tree is
/// carried over unchanged.
#[derive(Debug)]
pub struct CrossoverPipeline {
    sources: PipelineSources,
    max_depth: usize,
    tries: usize,
}

impl CrossoverPipeline {
    pub const P_MAX_DEPTH: &'static str = "max-depth";
    pub const P_TRIES: &'static str = "tries";
    pub const NUM_SOURCES: usize = 2;

    fn pick_point(tree: &GpTree, rng: &mut StdRng) -> Option<NodeId> {
        let root = tree.root()?;
        let size = tree.num_nodes(root, NodeSearch::All);
        let p = rng.random_range(0..size);
        tree.node_in_position(root, p, NodeSearch::All).ok()
    }

    /// One child: `recipient`'s tree `t` with a random subtree replaced by a
    /// random subtree cloned out of `donor`. Falls back to a plain copy when
    /// no depth-respecting swap is found.
    fn crossed_tree(
        &self,
        recipient: &GpTree,
        donor: &GpTree,
        rng: &mut StdRng,
    ) -> GpTree {
        for _ in 0..self.tries {
            let (Some(old), Some(graft)) =
                (Self::pick_point(recipient, rng), Self::pick_point(donor, rng))
            else {
                break;
            };
            let candidate = recipient.clone_replacing(donor, graft, old);
            let within_depth = candidate
                .root()
                .map(|r| candidate.depth(r) <= self.max_depth)
                .unwrap_or(false);
            if within_depth {
                return candidate;
            }
        }
        recipient.deep_clone()
    }

    fn mate(
        &self,
        a: &mut Individual,
        b: &mut Individual,
        ctx: &mut BreedContext<'_>,
    ) -> Result<(), EcError> {
        if a.trees.len() != b.trees.len() {
            return Err(ctx
                .output
                .fatal("Crossover parents carry different numbers of trees"));
        }
        let t = ctx.rng.random_range(0..a.trees.len());
        let child_a = self.crossed_tree(&a.trees[t], &b.trees[t], ctx.rng);
        let child_b = self.crossed_tree(&b.trees[t], &a.trees[t], ctx.rng);
        a.trees[t] = child_a;
        b.trees[t] = child_b;
        for child in [a, b] {
            child.evaluated = false;
            child.fitness.value = f64::NEG_INFINITY;
        }
        Ok(())
    }
}

impl BreedingSource for CrossoverPipeline {
    fn setup(&mut self, ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<(), EcError> {
        self.sources = PipelineSources::setup(ctx, base, Some(Self::NUM_SOURCES))?;

        let max_depth =
            ctx.params
                .get_int_with_default(&base.push(Self::P_MAX_DEPTH), None, 17)?;
        if max_depth < 1 {
            return Err(ctx
                .output
                .fatal(&format!("Crossover max-depth must be >= 1, got {max_depth}")));
        }
        self.max_depth = max_depth as usize;

        let tries = ctx
            .params
            .get_int_with_default(&base.push(Self::P_TRIES), None, 1)?;
        if tries < 1 {
            return Err(ctx
                .output
                .fatal(&format!("Crossover tries must be >= 1, got {tries}")));
        }
        self.tries = tries as usize;
        Ok(())
    }

    // Crossover genuinely yields a pair per operation, whatever the child
    // sources report.
    fn typical_inds_produced(&self) -> usize {
        2
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

        let mut q = start;
        while q < start + n {
            let mut scratch: Vec<Option<Individual>> = vec![None, None];
            self.sources.sources[0]
                .borrow_mut()
                .produce(1, 1, 0, subpop, &mut scratch, ctx)?;
            self.sources.sources[1]
                .borrow_mut()
                .produce(1, 1, 1, subpop, &mut scratch, ctx)?;
            let (Some(mut a), Some(mut b)) = (scratch[0].take(), scratch[1].take()) else {
                return Err(ctx.output.fatal("Crossover child source produced nothing"));
            };

            self.mate(&mut a, &mut b, ctx)?;

            inds[q] = Some(a);
            q += 1;
            if q < start + n {
                inds[q] = Some(b);
                q += 1;
            }
        }
        Ok(n)
    }

    fn clone_source(&self) -> SourceHandle {
        Rc::new(RefCell::new(CrossoverPipeline {
            sources: self.sources.clone_sources(),
            max_depth: self.max_depth,
            tries: self.tries,
        }))
    }
}

impl Default for CrossoverPipeline {
    fn default() -> Self {
        Self {
            sources: PipelineSources::default(),
            max_depth: 17,
            tries: 1,
        }
    }
}
