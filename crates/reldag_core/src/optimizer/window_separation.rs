use std::collections::HashMap;

use reldag_error::Result;
use tracing::debug;

use super::{OptimizeRule, OptimizerContext};
use crate::logical::dag::{NodeId, RelAlgDag};
use crate::logical::node::{RelAlgNode, RelAlgOperator};
use crate::logical::rel_project::RelProject;
use crate::rex::window::is_window_function_operator;
use crate::rex::{RexInput, RexScalar};

/// Splits window functions embedded in larger expressions into their own
/// project.
///
/// For a project `P` with an expression like `CASE WHEN ... THEN <window>
/// END`, the window function replaces the expression in `P`, and a new
/// project inserted right after `P` computes the original expression with
/// the window function swapped for a reference to `P`'s column. Columns the
/// new project needs from `P`'s input are appended to `P`.
///
/// Window functions at the top level of an expression are left alone.
#[derive(Debug, Default)]
pub struct SeparateWindowFunctions;

impl OptimizeRule for SeparateWindowFunctions {
    fn optimize(&mut self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag) -> Result<()> {
        let order = dag.order().to_vec();
        for id in order {
            if !matches!(dag.node(id).op, RelAlgOperator::Project(_)) {
                continue;
            }
            self.separate(ctx, dag, id)?;
        }
        Ok(())
    }
}

impl SeparateWindowFunctions {
    fn separate(&self, ctx: &mut OptimizerContext, dag: &mut RelAlgDag, id: NodeId) -> Result<()> {
        let RelAlgOperator::Project(proj) = &dag.node(id).op else {
            return Ok(());
        };

        let mut window_exprs: Vec<RexScalar> = Vec::with_capacity(proj.exprs.len());
        let mut new_exprs: Vec<RexScalar> = Vec::with_capacity(proj.exprs.len());
        let mut found = false;

        for (idx, expr) in proj.exprs.iter().enumerate() {
            let placeholder = RexScalar::input(id, idx);
            if is_window_function_operator(expr) {
                window_exprs.push(expr.clone());
                new_exprs.push(placeholder);
                continue;
            }
            let mut embedding = expr.clone();
            match take_embedded_window(&mut embedding, &placeholder)? {
                Some(window) => {
                    found = true;
                    window_exprs.push(window);
                    new_exprs.push(embedding);
                }
                None => {
                    window_exprs.push(expr.clone());
                    new_exprs.push(placeholder);
                }
            }
        }

        if !found {
            return Ok(());
        }

        let fields = proj.fields.clone();
        let mut appended_fields = Vec::new();
        let mut appended: HashMap<RexInput, usize> = HashMap::new();

        // Columns the new project reads from the original input get
        // forwarded through `P`.
        for expr in &mut new_exprs {
            if matches!(expr, RexScalar::Input(_)) {
                continue;
            }
            expr.for_each_input_mut(|input| {
                if input.source == id {
                    return Ok(());
                }
                let next = window_exprs.len();
                let idx = match appended.get(input) {
                    Some(idx) => *idx,
                    None => {
                        appended.insert(*input, next);
                        window_exprs.push(RexScalar::Input(*input));
                        appended_fields.push(forwarded_field_name(dag, input));
                        next
                    }
                };
                *input = RexInput::new(id, idx);
                Ok(())
            })?;
        }

        debug!(%id, forwarded = appended.len(), "separating window functions");

        if let RelAlgOperator::Project(proj) = &mut dag.node_mut(id).op {
            proj.exprs = window_exprs;
            proj.fields.extend(appended_fields);
        }

        let project = RelAlgNode::new(
            ctx.ids.next_id(),
            vec![id],
            RelAlgOperator::Project(RelProject::new(new_exprs, fields)),
        );
        let new_id = dag.insert_after(id, project)?;
        dag.replace_input_everywhere(id, new_id, None)?;

        Ok(())
    }
}

/// Replace the outermost window function nested in `expr` with
/// `replacement`, returning the window function.
///
/// Only the first window function found is replaced.
fn take_embedded_window(
    expr: &mut RexScalar,
    replacement: &RexScalar,
) -> Result<Option<RexScalar>> {
    let mut found = None;
    expr.for_each_child_mut(&mut |child| {
        if found.is_some() {
            return Ok(());
        }
        if is_window_function_operator(child) {
            found = Some(std::mem::replace(child, replacement.clone()));
        } else {
            found = take_embedded_window(child, replacement)?;
        }
        Ok(())
    })?;
    Ok(found)
}

fn forwarded_field_name(dag: &RelAlgDag, input: &RexInput) -> String {
    match &dag.node(input.source).op {
        RelAlgOperator::Project(proj) => proj.fields.get(input.index).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::case_expr::RexCase;
    use crate::rex::operator::{RexOperator, SqlOperator};
    use crate::rex::window::{RexWindowFunction, WindowBound, WindowFunctionKind};
    use crate::testutil::{apply_rule, binary, col, int_type, lit, project, project_of, scan};
    use crate::types::SqlType;

    fn window(kind: WindowFunctionKind, operand: RexScalar) -> RexScalar {
        RexScalar::WindowFunction(Box::new(RexWindowFunction {
            kind,
            operands: vec![operand],
            partition_keys: Vec::new(),
            order_keys: Vec::new(),
            collation: Vec::new(),
            lower_bound: WindowBound::default(),
            upper_bound: WindowBound::default(),
            is_rows: false,
            ty: int_type(),
        }))
    }

    /// `CASE WHEN COUNT(x) > 0 THEN $SUM0(x) ELSE NULL END`
    fn windowed_sum(x: RexScalar) -> RexScalar {
        RexScalar::Case(RexCase {
            when_then: vec![(
                binary(
                    SqlOperator::Gt,
                    window(WindowFunctionKind::Count, x.clone()),
                    lit(0),
                ),
                window(WindowFunctionKind::SumInternal, x),
            )],
            else_expr: Some(Box::new(lit(0))),
        })
    }

    #[test]
    fn top_level_window_untouched() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let p = project(
            &mut dag,
            t,
            vec![col(t, 0), windowed_sum(col(t, 1))],
        );

        apply_rule(&mut SeparateWindowFunctions, &mut dag).unwrap();

        assert_eq!(&[t, p], dag.order());
    }

    #[test]
    fn case_over_plain_sum_separated() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let case = RexScalar::Case(RexCase {
            when_then: vec![(
                binary(
                    SqlOperator::Gt,
                    window(WindowFunctionKind::Count, col(t, 1)),
                    lit(0),
                ),
                window(WindowFunctionKind::Sum, col(t, 1)),
            )],
            else_expr: Some(Box::new(lit(0))),
        });
        let p = project(&mut dag, t, vec![col(t, 0), case]);

        apply_rule(&mut SeparateWindowFunctions, &mut dag).unwrap();

        assert_eq!(3, dag.len());
        let new_id = dag.root().unwrap();
        assert_eq!(&[t, p, new_id], dag.order());
        assert_eq!(
            window(WindowFunctionKind::Count, col(t, 1)),
            project_of(&dag, p).exprs[1]
        );
        assert!(matches!(
            project_of(&dag, new_id).exprs[1],
            RexScalar::Case(_)
        ));
    }

    #[test]
    fn embedded_window_separated() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        // a + SUM(b) OVER ()
        let embedded = binary(
            SqlOperator::Plus,
            col(t, 0),
            window(WindowFunctionKind::Sum, col(t, 1)),
        );
        let p = project(&mut dag, t, vec![col(t, 0), embedded]);
        let top = project(&mut dag, p, vec![col(p, 1)]);

        apply_rule(&mut SeparateWindowFunctions, &mut dag).unwrap();

        assert_eq!(4, dag.len());
        let new_id = dag.order()[2];
        assert_eq!(&[t, p, new_id, top], dag.order());

        // Original project computes the window function and forwards `a`.
        let original = project_of(&dag, p);
        assert_eq!(
            vec![
                col(t, 0),
                window(WindowFunctionKind::Sum, col(t, 1)),
                col(t, 0)
            ],
            original.exprs
        );
        assert_eq!(3, original.fields.len());

        let separated = project_of(&dag, new_id);
        assert_eq!(vec![p], dag.node(new_id).inputs);
        assert_eq!(
            vec![
                col(p, 0),
                binary(SqlOperator::Plus, col(p, 2), col(p, 1)),
            ],
            separated.exprs
        );
        assert_eq!(vec!["p0".to_string(), "p1".to_string()], separated.fields);

        assert_eq!(vec![new_id], dag.node(top).inputs);
        assert_eq!(vec![col(new_id, 1)], project_of(&dag, top).exprs);
    }

    #[test]
    fn embedded_windowed_sum_moves_as_one_unit() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a", "b"]);
        let halved = binary(SqlOperator::Divide, windowed_sum(col(t, 1)), lit(2));
        let p = project(&mut dag, t, vec![col(t, 0), halved]);

        apply_rule(&mut SeparateWindowFunctions, &mut dag).unwrap();

        let new_id = dag.root().unwrap();
        assert_eq!(&[t, p, new_id], dag.order());
        assert_eq!(
            vec![col(t, 0), windowed_sum(col(t, 1))],
            project_of(&dag, p).exprs
        );
        assert_eq!(
            vec![col(p, 0), binary(SqlOperator::Divide, col(p, 1), lit(2))],
            project_of(&dag, new_id).exprs
        );
    }

    #[test]
    fn cast_wrapped_window_separated() {
        let mut dag = RelAlgDag::new();
        let t = scan(&mut dag, "t", &["a"]);
        let cast = RexScalar::Operator(RexOperator::new(
            SqlOperator::Cast,
            vec![window(WindowFunctionKind::RowNumber, col(t, 0))],
            SqlType::new(crate::types::SqlTypeKind::BigInt, false),
        ));
        let wrapped = binary(SqlOperator::Multiply, cast.clone(), lit(2));
        let p = project(&mut dag, t, vec![wrapped]);

        apply_rule(&mut SeparateWindowFunctions, &mut dag).unwrap();

        let new_id = dag.root().unwrap();
        assert_ne!(p, new_id);
        assert_eq!(vec![cast], project_of(&dag, p).exprs);
        assert_eq!(
            vec![binary(SqlOperator::Multiply, col(p, 0), lit(2))],
            project_of(&dag, new_id).exprs
        );
    }
}
