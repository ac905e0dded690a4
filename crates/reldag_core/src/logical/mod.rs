//! Relational algebra nodes and the DAG holding them.

pub mod dag;
pub mod node;
pub mod output;
pub mod rel_aggregate;
pub mod rel_compound;
pub mod rel_filter;
pub mod rel_join;
pub mod rel_left_deep_join;
pub mod rel_modify;
pub mod rel_project;
pub mod rel_scan;
pub mod rel_sort;
pub mod rel_table_function;
pub mod rel_union;
pub mod rel_values;
