use crate::breed::{SetupContext, SourceHandle};
use crate::gp::GpTree;
use crate::gp::build::GrowBuilder;
use crate::output::EcError;
use crate::params::Parameter;
use rand::rngs::StdRng;
use std::fmt;
use std::rc::Rc;

/// A simple scalar fitness; larger is better. An optional ideal threshold
/// marks the run's success criterion.
#[derive(Debug, Clone)]
pub struct Fitness {
    pub value: f64,
    pub ideal: Option<f64>,
}

impl Fitness {
    pub const P_IDEAL: &'static str = "ideal";

    pub fn unevaluated(ideal: Option<f64>) -> Self {
        Self {
            value: f64::NEG_INFINITY,
            ideal,
        }
    }

    pub fn setup(ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<Self, EcError> {
        let ideal = if ctx.params.exists(&base.push(Self::P_IDEAL), None) {
            Some(ctx.params.get_double(&base.push(Self::P_IDEAL), None)?)
        } else {
            None
        };
        Ok(Self::unevaluated(ideal))
    }

    pub fn better_than(&self, other: &Fitness) -> bool {
        self.value > other.value
    }

    pub fn is_ideal(&self) -> bool {
        matches!(self.ideal, Some(threshold) if self.value >= threshold)
    }
}

/// One candidate solution: a fixed number of program trees plus a fitness
/// record. Individuals are plain owned data; cloning one is a deep copy
/// that shares nothing mutable with the source.
#[derive(Debug, Clone)]
pub struct Individual {
    pub trees: Vec<GpTree>,
    pub fitness: Fitness,
    pub evaluated: bool,
}

impl Individual {
    /// Structural equality over aligned trees; this is the duplicate test
    /// used while populating, deliberately not an identity comparison.
    pub fn structurally_equals(&self, other: &Individual) -> bool {
        self.trees.len() == other.trees.len()
            && self
                .trees
                .iter()
                .zip(&other.trees)
                .all(|(a, b)| a.tree_equals(b))
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tree) in self.trees.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{tree}")?;
        }
        Ok(())
    }
}

/// The factory/prototype bundle for one subpopulation: an individual
/// prototype, a fitness prototype and a breeding-pipeline prototype, all
/// configured once at setup and cloned for every use thereafter.
#[derive(Debug)]
pub struct Species {
    pub i_prototype: Individual,
    pub f_prototype: Fitness,
    pub pipe_prototype: SourceHandle,
    pub builder: GrowBuilder,
}

impl Species {
    pub const P_PIPE: &'static str = "pipe";
    pub const P_INDIVIDUAL: &'static str = "ind";
    pub const P_FITNESS: &'static str = "fitness";
    pub const P_TREES: &'static str = "trees";

    pub fn setup(ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<Rc<Self>, EcError> {
        let pipe_base = base.push(Self::P_PIPE);
        let pipe_name = ctx.params.get_required_string(&pipe_base, None)?;
        let pipe_prototype = ctx.registry.source_for(&pipe_name, ctx.output)?;
        pipe_prototype.borrow_mut().setup(ctx, &pipe_base)?;
        ctx.output.exit_if_errors()?;
        if pipe_prototype.borrow().is_selection_method() {
            ctx.output.warning(&format!(
                "The pipe at '{pipe_base}' is a bare selection method; \
                 breeding will only resample existing individuals"
            ));
        }

        let ind_base = base.push(Self::P_INDIVIDUAL);
        let builder = GrowBuilder::setup(ctx.params, &ind_base, ctx.output)?;
        let num_trees =
            ctx.params
                .get_int_with_default(&ind_base.push(Self::P_TREES), None, 1)?;
        if num_trees < 1 {
            return Err(ctx
                .output
                .fatal("A species' individuals must carry at least one tree"));
        }

        let f_prototype = Fitness::setup(ctx, &base.push(Self::P_FITNESS))?;
        // The prototype's trees stay unbuilt; new_individual grows real ones.
        let i_prototype = Individual {
            trees: vec![GpTree::new(); num_trees as usize],
            fitness: f_prototype.clone(),
            evaluated: false,
        };

        Ok(Rc::new(Self {
            i_prototype,
            f_prototype,
            pipe_prototype,
            builder,
        }))
    }

    /// Stamps out a fresh individual: clones the prototypes, grows a new
    /// tree into every slot, clears the evaluated flag. Never hands back the
    /// prototype itself.
    pub fn new_individual(&self, rng: &mut StdRng) -> Individual {
        let mut ind = self.i_prototype.clone();
        for tree in ind.trees.iter_mut() {
            *tree = self.builder.build_tree(rng);
        }
        ind.fitness = self.f_prototype.clone();
        ind.evaluated = false;
        ind
    }
}

/// A fixed-capacity collection of individuals of a single species. Slots
/// are unset until populated or bred into.
#[derive(Debug)]
pub struct Subpopulation {
    pub species: Rc<Species>,
    pub individuals: Vec<Option<Individual>>,
    pub num_duplicate_retries: usize,
}

impl Subpopulation {
    pub const P_SIZE: &'static str = "size";
    pub const P_RETRIES: &'static str = "duplicate-retries";
    pub const P_SPECIES: &'static str = "species";

    pub fn setup(ctx: &mut SetupContext<'_>, base: &Parameter) -> Result<Self, EcError> {
        let species = Species::setup(ctx, &base.push(Self::P_SPECIES))?;

        let size = ctx.params.get_int(&base.push(Self::P_SIZE), None)?;
        if size <= 0 {
            return Err(ctx.output.fatal(&format!(
                "Subpopulation size must be >= 1, got {size} at '{}'",
                base.push(Self::P_SIZE)
            )));
        }

        let retries =
            ctx.params
                .get_int_with_default(&base.push(Self::P_RETRIES), None, 0)?;
        if retries < 0 {
            return Err(ctx
                .output
                .fatal("Subpopulation duplicate-retries must be >= 0"));
        }

        Ok(Self {
            species,
            individuals: vec![None; size as usize],
            num_duplicate_retries: retries as usize,
        })
    }

    /// Fills every slot with a fresh individual. When duplicate retries are
    /// configured, a structurally duplicate individual is re-generated up to
    /// that many extra times; if retries run out the last duplicate is
    /// accepted anyway, so every slot always ends up filled.
    pub fn populate(&mut self, rng: &mut StdRng) {
        for i in 0..self.individuals.len() {
            let mut candidate = self.species.new_individual(rng);
            for _ in 0..self.num_duplicate_retries {
                if !self.is_duplicate(&candidate) {
                    break;
                }
                candidate = self.species.new_individual(rng);
            }
            self.individuals[i] = Some(candidate);
        }
    }

    fn is_duplicate(&self, candidate: &Individual) -> bool {
        self.filled().any(|ind| ind.structurally_equals(candidate))
    }

    /// Same shape, same species handle, all slots unset.
    pub fn empty_clone(&self) -> Subpopulation {
        Subpopulation {
            species: Rc::clone(&self.species),
            individuals: vec![None; self.individuals.len()],
            num_duplicate_retries: self.num_duplicate_retries,
        }
    }

    pub fn filled(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter().flatten()
    }

    pub fn num_filled(&self) -> usize {
        self.filled().count()
    }
}

/// An ordered collection of subpopulations. Breeding never edits a
/// population in place; each generation replaces it wholesale.
#[derive(Debug, Default)]
pub struct Population {
    pub subpops: Vec<Subpopulation>,
}

impl Population {
    pub const P_POP: &'static str = "pop";
    pub const P_SUBPOPS: &'static str = "subpops";
    pub const P_SUBPOP: &'static str = "subpop";

    pub fn setup(ctx: &mut SetupContext<'_>) -> Result<Self, EcError> {
        let base = Parameter::new(Self::P_POP);
        let count = ctx.params.get_int(&base.push(Self::P_SUBPOPS), None)?;
        if count < 1 {
            return Err(ctx
                .output
                .fatal("The population must have at least one subpopulation"));
        }

        let mut subpops = Vec::with_capacity(count as usize);
        for i in 0..count {
            let sub_base = base.push(Self::P_SUBPOP).push(&i.to_string());
            subpops.push(Subpopulation::setup(ctx, &sub_base)?);
        }
        Ok(Self { subpops })
    }

    pub fn populate(&mut self, rng: &mut StdRng) {
        for subpop in self.subpops.iter_mut() {
            subpop.populate(rng);
        }
    }

    /// A brand-new population of the same shape, every slot unset. This is
    /// what the breeder fills while the old population stays readable.
    pub fn empty_clone(&self) -> Population {
        Population {
            subpops: self.subpops.iter().map(|s| s.empty_clone()).collect(),
        }
    }

    /// Total slot count across subpopulations.
    pub fn total_individuals(&self) -> usize {
        self.subpops.iter().map(|s| s.individuals.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breed::reproduction::ReproductionPipeline;
    use rand::SeedableRng;
    use std::cell::RefCell;

    fn test_species(builder: GrowBuilder) -> Rc<Species> {
        let f_prototype = Fitness::unevaluated(None);
        Rc::new(Species {
            i_prototype: Individual {
                trees: vec![GpTree::new()],
                fitness: f_prototype.clone(),
                evaluated: false,
            },
            f_prototype,
            pipe_prototype: Rc::new(RefCell::new(ReproductionPipeline::default())),
            builder,
        })
    }

    fn rich_builder() -> GrowBuilder {
        GrowBuilder {
            min_depth: 2,
            max_depth: 5,
            num_inputs: 2,
            num_registers: 2,
            const_min: -1.0,
            const_max: 1.0,
        }
    }

    /// Only two tree shapes exist under this builder, so duplicates are
    /// unavoidable for any subpopulation bigger than two.
    fn degenerate_builder() -> GrowBuilder {
        GrowBuilder {
            min_depth: 2,
            max_depth: 2,
            num_inputs: 0,
            num_registers: 1,
            const_min: 0.5,
            const_max: 0.5,
        }
    }

    #[test]
    fn test_new_individual_clones_prototypes() {
        let species = test_species(rich_builder());
        let mut rng = StdRng::seed_from_u64(7);
        let ind = species.new_individual(&mut rng);

        assert!(!ind.evaluated);
        assert_eq!(ind.fitness.value, f64::NEG_INFINITY);
        assert_eq!(ind.trees.len(), 1);
        // The prototype stays unbuilt; the new individual got a real tree.
        assert!(species.i_prototype.trees[0].root().is_none());
        assert!(ind.trees[0].root().is_some());
    }

    #[test]
    fn test_populate_fills_every_slot() {
        let mut subpop = Subpopulation {
            species: test_species(rich_builder()),
            individuals: vec![None; 20],
            num_duplicate_retries: 3,
        };
        let mut rng = StdRng::seed_from_u64(11);
        subpop.populate(&mut rng);
        assert_eq!(subpop.num_filled(), 20);
        for ind in subpop.filled() {
            assert!(ind.trees[0].validate().is_ok());
        }
    }

    #[test]
    fn test_populate_accepts_duplicates_when_retries_exhaust() {
        // Far more slots than distinct shapes: retries must exhaust and the
        // last duplicate be accepted, leaving no hole.
        let mut subpop = Subpopulation {
            species: test_species(degenerate_builder()),
            individuals: vec![None; 10],
            num_duplicate_retries: 4,
        };
        let mut rng = StdRng::seed_from_u64(3);
        subpop.populate(&mut rng);
        assert_eq!(subpop.num_filled(), 10);
    }

    #[test]
    fn test_populate_builds_at_most_retries_plus_one_per_slot() {
        let slots = 10;
        let retries = 4;
        let mut subpop = Subpopulation {
            species: test_species(degenerate_builder()),
            individuals: vec![None; slots],
            num_duplicate_retries: retries,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let shadow_start = rng.clone();
        subpop.populate(&mut rng);

        // `populate` draws randomness only through `new_individual`, so
        // replaying builds from the pre-populate rng state until the states
        // meet counts exactly how many individuals were generated.
        let mut shadow = shadow_start;
        let mut calls = 0;
        while shadow != rng {
            subpop.species.new_individual(&mut shadow);
            calls += 1;
            assert!(calls <= slots * (retries + 1), "too many builds: {calls}");
        }
        // The degenerate builder forces duplicates, so some slots must have
        // regenerated; none may exceed its retry allowance.
        assert!(calls > slots);
        assert!(calls <= slots * (retries + 1));
        assert_eq!(subpop.num_filled(), slots);
    }

    #[test]
    fn test_structural_duplicate_test_is_not_identity() {
        let species = test_species(degenerate_builder());
        let mut rng = StdRng::seed_from_u64(5);
        // Draw until two distinct objects share a structure.
        let a = species.new_individual(&mut rng);
        let b = loop {
            let candidate = species.new_individual(&mut rng);
            if candidate.structurally_equals(&a) {
                break candidate;
            }
        };
        assert!(a.structurally_equals(&b));
    }

    #[test]
    fn test_empty_clone_preserves_shape_and_species() {
        let mut subpop = Subpopulation {
            species: test_species(rich_builder()),
            individuals: vec![None; 8],
            num_duplicate_retries: 1,
        };
        let mut rng = StdRng::seed_from_u64(2);
        subpop.populate(&mut rng);

        let clone = subpop.empty_clone();
        assert_eq!(clone.individuals.len(), 8);
        assert_eq!(clone.num_filled(), 0);
        assert!(Rc::ptr_eq(&clone.species, &subpop.species));
    }

    #[test]
    fn test_fitness_ideal_threshold() {
        let mut f = Fitness::unevaluated(Some(0.95));
        assert!(!f.is_ideal());
        f.value = 0.95;
        assert!(f.is_ideal());
        assert!(!Fitness::unevaluated(None).is_ideal());
    }
}
