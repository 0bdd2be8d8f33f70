use good_lp::{
    Constraint, Expression, ProblemVariables, Solution, SolverModel, Variable, constraint, microlp,
    variable,
};
use log::{debug, trace};

use crate::cover::{Cover, CoverBounds, DenseChain, DenseGraph, Deadline};
use crate::error::{MatchingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

pub struct CoverModel {
    vars: ProblemVariables,
    variables: Vec<Variable>,
    rewards: Vec<(VarId, f64)>,
    constraints: Vec<Constraint>,
    pair_usage: Vec<Vec<VarId>>,
    ndd_usage: Vec<Vec<VarId>>,
}

impl CoverModel {
    pub fn new(graph: &DenseGraph) -> Self {
        Self {
            vars: ProblemVariables::new(),
            variables: Vec::new(),
            rewards: Vec::new(),
            constraints: Vec::new(),
            pair_usage: vec![Vec::new(); graph.pair_count()],
            ndd_usage: vec![Vec::new(); graph.ndd_count()],
        }
    }

    pub fn binary(&mut self, weight: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(self.vars.add(variable().binary()));
        if weight != 0.0 {
            self.rewards.push((id, weight));
        }
        id
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn occupy_pair(&mut self, pair: usize, id: VarId) {
        self.pair_usage[pair].push(id);
    }

    pub fn occupy_ndd(&mut self, ndd: usize, id: VarId) {
        self.ndd_usage[ndd].push(id);
    }

    pub fn sum(&self, ids: &[VarId]) -> Expression {
        ids.iter()
            .fold(Expression::from(0.0), |acc, id| acc + self.variables[id.0])
    }

    pub fn require(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn require_balance(&mut self, inflow: &[VarId], outflow: &[VarId]) {
        if inflow.is_empty() && outflow.is_empty() {
            return;
        }
        let lhs = self.sum(inflow);
        let rhs = self.sum(outflow);
        self.require(constraint!(lhs == rhs));
    }

    pub fn require_at_most(&mut self, outflow: &[VarId], inflow: &[VarId]) {
        if outflow.is_empty() {
            return;
        }
        let lhs = self.sum(outflow);
        let rhs = self.sum(inflow);
        self.require(constraint!(lhs <= rhs));
    }

    pub fn require_cap(&mut self, ids: &[VarId], bound: f64) {
        if ids.is_empty() {
            return;
        }
        let lhs = self.sum(ids);
        self.require(constraint!(lhs <= bound));
    }

    pub fn solve(mut self) -> Result<Assignment> {
        if self.variables.is_empty() {
            return Ok(Assignment::default());
        }

        let pair_usage = std::mem::take(&mut self.pair_usage);
        for usage in &pair_usage {
            self.require_cap(usage, 1.0);
        }
        let ndd_usage = std::mem::take(&mut self.ndd_usage);
        for usage in &ndd_usage {
            self.require_cap(usage, 1.0);
        }

        let objective = self
            .rewards
            .iter()
            .fold(Expression::from(0.0), |acc, (id, weight)| {
                acc + *weight * self.variables[id.0]
            });
        debug!(
            "Solving cover model: {} binaries, {} rows",
            self.variables.len(),
            self.constraints.len()
        );

        let mut problem = self.vars.maximise(objective).using(microlp);
        for row in self.constraints {
            problem = problem.with(row);
        }
        let solution = problem
            .solve()
            .map_err(|err| MatchingError::SolverFailure(err.to_string()))?;

        let values: Vec<f64> = self
            .variables
            .iter()
            .map(|var| solution.value(*var))
            .collect();
        let objective = self
            .rewards
            .iter()
            .map(|(id, weight)| weight * values[id.0])
            .sum();
        trace!("Cover model objective {objective}");
        Ok(Assignment { values, objective })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Assignment {
    values: Vec<f64>,
    objective: f64,
}

impl Assignment {
    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn value(&self, id: VarId) -> f64 {
        self.values.get(id.0).copied().unwrap_or_default()
    }

    pub fn selected(&self, id: VarId) -> bool {
        self.value(id) > 0.5
    }
}

pub trait CycleFormulation: Sized {
    fn build(
        graph: &DenseGraph,
        max_cycle: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self>;

    fn extract(&self, assignment: &Assignment) -> Vec<Vec<usize>>;
}

pub trait ChainFormulation: Sized {
    fn build(
        graph: &DenseGraph,
        max_chain: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self>;

    fn extract(&self, assignment: &Assignment) -> Vec<DenseChain>;
}

/// Combine a cycle part and a chain part into one program and solve it.
/// Either part is left out entirely when its bound disables it.
pub fn solve_composite<C, H>(
    graph: &DenseGraph,
    bounds: CoverBounds,
    deadline: &Deadline,
) -> Result<Cover>
where
    C: CycleFormulation,
    H: ChainFormulation,
{
    let mut model = CoverModel::new(graph);
    let cycles = if bounds.cycles_enabled() {
        Some(C::build(graph, bounds.max_cycle, &mut model, deadline)?)
    } else {
        None
    };
    let chains = if bounds.chains_enabled() {
        Some(H::build(graph, bounds.max_chain, &mut model, deadline)?)
    } else {
        None
    };
    deadline.check()?;

    let assignment = model.solve()?;
    Ok(Cover {
        objective: assignment.objective(),
        cycles: cycles
            .map(|part| part.extract(&assignment))
            .unwrap_or_default(),
        chains: chains
            .map(|part| part.extract(&assignment))
            .unwrap_or_default(),
    })
}
