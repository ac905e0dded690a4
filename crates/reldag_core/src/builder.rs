//! Entry point for turning a serialized plan into an optimized DAG.

use std::sync::Arc;

use reldag_error::{Result, ensure};
use serde_json::Value;
use tracing::debug;

use crate::binder::bind_inputs;
use crate::catalog::{Catalog, MaterializedTableRegistry};
use crate::config::BuildConfig;
use crate::deserialize::dispatcher::RelAlgDispatcher;
use crate::deserialize::{SubqueryBuilder, field};
use crate::logical::dag::RelAlgDag;
use crate::optimizer::Optimizer;
use crate::validate::validate_dag;

/// Hands out node ids for a single top level build.
///
/// Subquery builds share the generator of the enclosing build.
#[derive(Debug, Default)]
pub struct NodeIdGenerator {
    next: u32,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// State shared between a top level build and the subquery builds it
/// triggers.
#[derive(Debug, Default)]
pub struct BuildContext {
    pub ids: NodeIdGenerator,
    /// Subquery DAGs built so far, registered on the root DAG once the top
    /// level build finishes.
    pub subqueries: Vec<Arc<RelAlgDag>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builds relational algebra DAGs from json plans.
pub struct RelAlgDagBuilder<'a> {
    catalog: &'a dyn Catalog,
    registry: Option<&'a MaterializedTableRegistry>,
    config: BuildConfig,
}

impl<'a> RelAlgDagBuilder<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        RelAlgDagBuilder {
            catalog,
            registry: None,
            config: BuildConfig::default(),
        }
    }

    /// Use `registry` to resolve scans over materialized tables.
    pub fn with_registry(mut self, registry: &'a MaterializedTableRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Parse, bind and optimize a plan.
    pub fn build(&self, query: &str) -> Result<RelAlgDag> {
        debug!(bytes = query.len(), "building relational algebra dag");
        let ast: Value = serde_json::from_str(query)?;
        self.build_value(&ast)
    }

    pub fn build_value(&self, ast: &Value) -> Result<RelAlgDag> {
        let mut ctx = BuildContext::new();
        let mut dag = self.build_with_context(&mut ctx, ast, true)?;
        for subquery in ctx.subqueries.drain(..) {
            dag.register_subquery(subquery);
        }
        Ok(dag)
    }

    /// Parse and bind a plan without running any rewrites.
    ///
    /// Subqueries are still fully built.
    pub fn build_unoptimized(&self, query: &str) -> Result<RelAlgDag> {
        let ast: Value = serde_json::from_str(query)?;
        let mut ctx = BuildContext::new();
        let mut dag = self.build_with_context(&mut ctx, &ast, false)?;
        for subquery in ctx.subqueries.drain(..) {
            dag.register_subquery(subquery);
        }
        Ok(dag)
    }

    fn build_with_context(
        &self,
        ctx: &mut BuildContext,
        ast: &Value,
        optimize: bool,
    ) -> Result<RelAlgDag> {
        let rels = field(ast, "rels")?;
        let mut dag =
            RelAlgDispatcher::new(self.catalog, self.registry, &self.config, self).run(ctx, rels)?;
        ensure!(!dag.is_empty(), "Plan doesn't contain any nodes");
        debug!(nodes = dag.len(), "dispatched plan");

        bind_inputs(&mut dag)?;

        if optimize {
            Optimizer::new(self.config.clone()).optimize(&mut ctx.ids, &mut dag)?;
            if self.config.validate_dag {
                validate_dag(&dag)?;
            }
        }

        Ok(dag)
    }
}

impl SubqueryBuilder for RelAlgDagBuilder<'_> {
    fn build_subquery(&self, ctx: &mut BuildContext, ast: &Value) -> Result<Arc<RelAlgDag>> {
        let dag = Arc::new(self.build_with_context(ctx, ast, true)?);
        debug!(nodes = dag.len(), "built subquery");
        ctx.subqueries.push(dag.clone());
        Ok(dag)
    }
}
