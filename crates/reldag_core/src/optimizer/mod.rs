//! Rewrite passes run over a bound DAG.
//!
//! Passes run in a fixed order, later passes rely on the shape earlier ones
//! leave behind (e.g. coalescing expects window functions to already be
//! separated into their own projects).

pub mod coalesce;
pub mod dead_columns;
pub mod fold_filters;
pub mod hoist_cross_join;
pub mod identical_copy;
pub mod left_deep_join;
pub mod mark_nops;
pub mod simplify_sort;
pub mod window_pre_project;
pub mod window_separation;

use coalesce::CoalesceNodes;
use dead_columns::EliminateDeadColumns;
use fold_filters::FoldFilters;
use hoist_cross_join::HoistCrossJoinCondition;
use identical_copy::EliminateIdenticalCopy;
use left_deep_join::{CreateLeftDeepJoins, left_deep_join_root};
use mark_nops::MarkNops;
use reldag_error::{Result, internal};
use simplify_sort::SimplifySort;
use tracing::debug;
use window_pre_project::WindowPreProject;
use window_separation::SeparateWindowFunctions;

use crate::builder::NodeIdGenerator;
use crate::config::BuildConfig;
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::RelAlgOperator;

/// State shared between rules during a single optimizer run.
#[derive(Debug)]
pub struct OptimizerContext<'a> {
    /// Ids for nodes created by rewrites.
    pub ids: &'a mut NodeIdGenerator,
    /// Roots of left-deep join chains found before coalescing.
    pub left_deep_join_roots: Vec<NodeId>,
}

pub trait OptimizeRule {
    /// Apply an optimization rule to the DAG.
    fn optimize(&mut self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()>;
}

#[derive(Debug)]
pub struct Optimizer {
    config: BuildConfig,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(BuildConfig::default())
    }
}

impl Optimizer {
    pub fn new(config: BuildConfig) -> Self {
        Optimizer { config }
    }

    /// Run a bound DAG through every rewrite pass.
    pub fn optimize(&self, ids: &mut NodeIdGenerator, dag: &mut RelAlgDag) -> Result<()> {
        let mut ctx = OptimizerContext {
            ids,
            left_deep_join_roots: Vec::new(),
        };

        run_rule("mark_nops", &mut MarkNops, &mut ctx, dag)?;
        run_rule("simplify_sort", &mut SimplifySort, &mut ctx, dag)?;
        run_rule(
            "eliminate_identical_copy",
            &mut EliminateIdenticalCopy,
            &mut ctx,
            dag,
        )?;
        run_rule("fold_filters", &mut FoldFilters, &mut ctx, dag)?;

        // Filters rooting a left-deep join hold (part of) the join condition,
        // they must survive until the joins are flattened.
        ctx.left_deep_join_roots = dag
            .order()
            .iter()
            .filter_map(|id| left_deep_join_root(dag, *id))
            .collect();
        let filtered_roots = ctx
            .left_deep_join_roots
            .iter()
            .any(|id| matches!(dag.node(*id).op, RelAlgOperator::Filter(_)));
        if !filtered_roots {
            run_rule(
                "hoist_cross_join",
                &mut HoistCrossJoinCondition,
                &mut ctx,
                dag,
            )?;
        }

        run_rule("dead_columns", &mut EliminateDeadColumns, &mut ctx, dag)?;
        run_rule(
            "window_separation",
            &mut SeparateWindowFunctions,
            &mut ctx,
            dag,
        )?;
        if self.config.cluster_mode {
            run_rule("window_pre_project", &mut WindowPreProject, &mut ctx, dag)?;
        }
        run_rule("coalesce", &mut CoalesceNodes, &mut ctx, dag)?;

        if let Some(root) = dag.root() {
            if dag.use_count(root) != 0 {
                return Err(internal!("Root {} is consumed by other nodes", dag.node(root)));
            }
        }

        run_rule("left_deep_join", &mut CreateLeftDeepJoins, &mut ctx, dag)?;

        Ok(())
    }
}

fn run_rule(
    name: &str,
    rule: &mut impl OptimizeRule,
    ctx: &mut OptimizerContext,
    dag: &mut RelAlgDag,
) -> Result<()> {
    let before = dag.len();
    rule.optimize(ctx, dag)?;
    debug!(rule = name, before, after = dag.len(), "applied optimizer rule");
    Ok(())
}
