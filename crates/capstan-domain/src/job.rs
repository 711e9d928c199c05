//! Matrix axes and job specifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One matrix axis: a named, ordered list of scalar values.
///
/// Multiple axes combine via Cartesian product in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixAxis {
    /// Axis name, e.g. `python_version`.
    pub name: String,

    /// Ordered values, e.g. `["3.8", "3.9", "3.10", "3.11"]`.
    pub values: Vec<String>,
}

impl MatrixAxis {
    pub fn new(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// One concrete job produced by matrix expansion.
///
/// Jobs are fully independent: no shared mutable state, and one job's step
/// failures never abort a sibling when fail-fast is off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Stable, human-readable id derived from the axis assignment.
    pub id: String,

    /// The axis point this job was expanded from.
    pub axis_values: BTreeMap<String, String>,

    /// Whether this job keeps running when a sibling fails.
    pub continue_on_sibling_failure: bool,
}

impl JobSpec {
    /// The single job produced by an empty matrix.
    pub fn default_job() -> Self {
        Self {
            id: "default".to_string(),
            axis_values: BTreeMap::new(),
            continue_on_sibling_failure: true,
        }
    }

    /// Build a job from one Cartesian point, in axis declaration order.
    ///
    /// The id joins the axis values with `-`; hyphens inside a value are
    /// escaped so two distinct points can never collapse to the same id
    /// (the id also keys external report submissions).
    pub fn from_point(point: &[(&str, &str)]) -> Self {
        let id = point
            .iter()
            .map(|(_, v)| encode_id_segment(v))
            .collect::<Vec<_>>()
            .join("-");
        Self {
            id,
            axis_values: point
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            continue_on_sibling_failure: true,
        }
    }

    /// Axis values exported into a step's environment, uppercased and
    /// prefixed so they never collide with user-provided variables.
    pub fn matrix_env(&self) -> BTreeMap<String, String> {
        self.axis_values
            .iter()
            .map(|(k, v)| (format!("MATRIX_{}", sanitize_env_key(k)), v.clone()))
            .collect()
    }
}

// `-` separates id segments; escape it (and the escape character) so the
// segment encoding stays injective.
fn encode_id_segment(value: &str) -> String {
    value.replace('%', "%25").replace('-', "%2D")
}

fn sanitize_env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_from_point() {
        let job = JobSpec::from_point(&[("python_version", "3.8"), ("os", "linux")]);
        assert_eq!(job.id, "3.8-linux");
        assert_eq!(job.axis_values.get("os"), Some(&"linux".to_string()));
    }

    #[test]
    fn test_hyphenated_values_keep_distinct_ids() {
        let a = JobSpec::from_point(&[("os", "ubuntu-latest"), ("arch", "x64")]);
        let b = JobSpec::from_point(&[("os", "ubuntu"), ("arch", "latest-x64")]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, "ubuntu%2Dlatest-x64");
        assert_eq!(b.id, "ubuntu-latest%2Dx64");
    }

    #[test]
    fn test_matrix_env_sanitized() {
        let job = JobSpec::from_point(&[("python-version", "3.8")]);
        let env = job.matrix_env();
        assert_eq!(env.get("MATRIX_PYTHON_VERSION"), Some(&"3.8".to_string()));
    }

    #[test]
    fn test_default_job() {
        let job = JobSpec::default_job();
        assert_eq!(job.id, "default");
        assert!(job.axis_values.is_empty());
    }
}
