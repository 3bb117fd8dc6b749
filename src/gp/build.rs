use crate::gp::{GpNode, GpNodeKind, GpTree, NodeId};
use crate::output::{EcError, Output};
use crate::params::{Parameter, ParameterDatabase};
use rand::Rng;

/// Random tree construction using the classic grow method.
///
/// A program tree is rooted at a register write whose child is a grown
/// arithmetic expression; subtree mutation grows bare expressions with the
/// same machinery. Depth bounds are inclusive and count the root.
#[derive(Debug, Clone)]
pub struct GrowBuilder {
    pub min_depth: usize,
    pub max_depth: usize,
    pub num_inputs: usize,
    pub num_registers: usize,
    pub const_min: f64,
    pub const_max: f64,
}

impl GrowBuilder {
    pub const P_MIN_DEPTH: &'static str = "min-depth";
    pub const P_MAX_DEPTH: &'static str = "max-depth";
    pub const P_INPUTS: &'static str = "inputs";
    pub const P_REGISTERS: &'static str = "registers";
    pub const P_CONST_MIN: &'static str = "const-min";
    pub const P_CONST_MAX: &'static str = "const-max";

    /// Reads the builder's parameters from beneath `base`. Out-of-range
    /// depths or an empty register file are fatal configuration errors.
    pub fn setup(
        params: &ParameterDatabase,
        base: &Parameter,
        output: &mut Output,
    ) -> Result<Self, EcError> {
        let min_depth =
            params.get_int_with_default(&base.push(Self::P_MIN_DEPTH), None, 2)?;
        let max_depth =
            params.get_int_with_default(&base.push(Self::P_MAX_DEPTH), None, 6)?;
        if min_depth < 1 || max_depth < min_depth {
            return Err(output.fatal(&format!(
                "Tree builder depths must satisfy 1 <= min <= max, got {min_depth}..{max_depth}"
            )));
        }

        let num_inputs = params.get_int_with_default(&base.push(Self::P_INPUTS), None, 1)?;
        let num_registers =
            params.get_int_with_default(&base.push(Self::P_REGISTERS), None, 1)?;
        if num_inputs < 0 || num_registers < 1 {
            return Err(output.fatal(
                "Tree builder needs inputs >= 0 and registers >= 1",
            ));
        }

        let const_min =
            params.get_double_with_default(&base.push(Self::P_CONST_MIN), None, -1.0)?;
        let const_max =
            params.get_double_with_default(&base.push(Self::P_CONST_MAX), None, 1.0)?;
        if const_max < const_min {
            return Err(output.fatal("Tree builder constant range is inverted"));
        }

        Ok(Self {
            min_depth: min_depth as usize,
            max_depth: max_depth as usize,
            num_inputs: num_inputs as usize,
            num_registers: num_registers as usize,
            const_min,
            const_max,
        })
    }

    /// Builds a complete program tree: a register write over a grown
    /// expression.
    pub fn build_tree<R: Rng>(&self, rng: &mut R) -> GpTree {
        let mut tree = GpTree::new();
        let reg = rng.random_range(0..self.num_registers);
        let root = tree.push(GpNode::new(GpNodeKind::WriteRegister(reg)));
        tree.set_root(root);
        // The write consumes one level of the depth budget.
        let min = self.min_depth.saturating_sub(1).max(1);
        let max = self.max_depth.saturating_sub(1).max(1);
        let child = self.grow_into(&mut tree, rng, 1, min, max);
        tree.attach(root, 0, child);
        tree
    }

    /// Grows a bare expression subtree, at most `max_depth` deep. Used by
    /// subtree mutation, which owns the result exclusively and splices it in
    /// without another clone.
    pub fn grow_subtree<R: Rng>(&self, rng: &mut R, max_depth: usize) -> GpTree {
        let mut tree = GpTree::new();
        let root = self.grow_into(&mut tree, rng, 1, 1, max_depth.max(1));
        tree.set_root(root);
        tree
    }

    fn grow_into<R: Rng>(
        &self,
        tree: &mut GpTree,
        rng: &mut R,
        depth: usize,
        min: usize,
        max: usize,
    ) -> NodeId {
        let want_terminal = depth >= max || (depth >= min && rng.random_bool(0.3));
        if want_terminal {
            return tree.push(GpNode::new(self.random_terminal(rng)));
        }

        let kind = match rng.random_range(0..4) {
            0 => GpNodeKind::Add,
            1 => GpNodeKind::Sub,
            2 => GpNodeKind::Mul,
            _ => GpNodeKind::Div,
        };
        let id = tree.push(GpNode::new(kind));
        for pos in 0..2 {
            let child = self.grow_into(tree, rng, depth + 1, min, max);
            tree.attach(id, pos, child);
        }
        id
    }

    fn random_terminal<R: Rng>(&self, rng: &mut R) -> GpNodeKind {
        // Inputs, register reads and constants are drawn evenly among the
        // choices actually available.
        let mut choices = vec![0];
        if self.num_inputs > 0 {
            choices.push(1);
        }
        if self.num_registers > 0 {
            choices.push(2);
        }
        match choices[rng.random_range(0..choices.len())] {
            1 => GpNodeKind::Input(rng.random_range(0..self.num_inputs)),
            2 => GpNodeKind::ReadRegister(rng.random_range(0..self.num_registers)),
            _ => {
                let v = if self.const_max > self.const_min {
                    rng.random_range(self.const_min..self.const_max)
                } else {
                    self.const_min
                };
                GpNodeKind::Const(v)
            }
        }
    }
}
