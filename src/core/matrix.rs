//! Matrix expansion of job templates into concrete instances

use crate::core::job::{AxisBinding, JobInstance, JobTemplate};
use std::sync::Arc;

/// Expander for job template matrices
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a template into one instance per axis combination.
    ///
    /// Combinations are ordered lexicographically over the declared axes with
    /// the rightmost axis varying fastest. A template without axes yields a
    /// single instance with an empty binding.
    pub fn expand(template: &Arc<JobTemplate>) -> Vec<JobInstance> {
        Self::combinations(&template.axes)
            .into_iter()
            .map(|binding| JobInstance::new(Arc::clone(template), binding))
            .collect()
    }

    fn combinations(axes: &[(String, Vec<String>)]) -> Vec<AxisBinding> {
        let mut result = vec![AxisBinding::default()];

        for (axis, values) in axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for partial in &result {
                for value in values {
                    let mut binding = partial.clone();
                    binding.push(axis.clone(), value.clone());
                    next.push(binding);
                }
            }
            result = next;
        }

        result
    }
}
