//! Transform node: evaluate expressions and write results into the data bag.
//!
//! Each transformation is isolated. A failing expression is logged as a
//! warning and skipped; the node itself never fails.

use async_trait::async_trait;

use crate::definition::TransformNode;
use crate::expr::evaluate;
use crate::path::set_value_at_path;
use crate::template::replace_template_variables;
use crate::traits::{ExecutableNode, Services};
use crate::{ExecutionContext, LogLevel, NodeError};

#[async_trait]
impl ExecutableNode for TransformNode {
    async fn execute(&self, ctx: &mut ExecutionContext, _services: &Services) -> Result<(), NodeError> {
        let mut applied = 0usize;

        for t in &self.transformations {
            let expression = replace_template_variables(&t.expression, &ctx.data);
            let written = evaluate(&expression, &ctx.data)
                .map_err(|e| e.to_string())
                .and_then(|value| {
                    set_value_at_path(&mut ctx.data, &t.output_field, value).map_err(|e| e.to_string())
                });
            match written {
                Ok(()) => applied += 1,
                Err(e) => ctx.log(
                    LogLevel::Warning,
                    "transform_failed",
                    format!("Skipping '{}' -> {}: {}", t.expression, t.output_field, e),
                ),
            }
        }

        ctx.log(
            LogLevel::Info,
            "transform",
            format!("Applied {}/{} transformations", applied, self.transformations.len()),
        );
        Ok(())
    }
}
