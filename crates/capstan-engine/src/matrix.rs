//! Matrix expansion into independent job specs.

use capstan_domain::{JobSpec, MatrixAxis};

/// Expand the Cartesian product of axis values into ordered job specs.
///
/// Axis declaration order and value order are preserved, so job ids are
/// stable run-to-run. No axes degenerates to a single default job; an axis
/// with zero values yields zero jobs (documented edge case, not an error).
pub fn expand(axes: &[MatrixAxis]) -> Vec<JobSpec> {
    if axes.is_empty() {
        return vec![JobSpec::default_job()];
    }
    if axes.iter().any(|a| a.values.is_empty()) {
        return Vec::new();
    }

    let mut points: Vec<Vec<(&str, &str)>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(points.len() * axis.values.len());
        for point in &points {
            for value in &axis.values {
                let mut extended = point.clone();
                extended.push((axis.name.as_str(), value.as_str()));
                next.push(extended);
            }
        }
        points = next;
    }

    points.iter().map(|p| JobSpec::from_point(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_axis() {
        let axes = vec![MatrixAxis::new(
            "python_version",
            &["3.8", "3.9", "3.10", "3.11"],
        )];
        let jobs = expand(&axes);
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].id, "3.8");
        assert_eq!(jobs[3].id, "3.11");
    }

    #[test]
    fn test_two_axes_product_and_order() {
        let axes = vec![
            MatrixAxis::new("version", &["3.8", "3.9"]),
            MatrixAxis::new("os", &["linux", "macos", "windows"]),
        ];
        let jobs = expand(&axes);
        assert_eq!(jobs.len(), 6);
        // First axis varies slowest.
        assert_eq!(jobs[0].id, "3.8-linux");
        assert_eq!(jobs[1].id, "3.8-macos");
        assert_eq!(jobs[3].id, "3.9-linux");
        assert_eq!(jobs[5].id, "3.9-windows");
    }

    #[test]
    fn test_ids_unique() {
        let axes = vec![
            MatrixAxis::new("a", &["1", "2", "3"]),
            MatrixAxis::new("b", &["x", "y"]),
        ];
        let jobs = expand(&axes);
        let mut ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), jobs.len());
    }

    #[test]
    fn test_ids_unique_with_hyphenated_values() {
        let axes = vec![
            MatrixAxis::new("os", &["ubuntu-latest", "ubuntu"]),
            MatrixAxis::new("arch", &["x64", "latest-x64"]),
        ];
        let jobs = expand(&axes);
        assert_eq!(jobs.len(), 4);
        let mut ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "value hyphens must not collapse job ids");
    }

    #[test]
    fn test_stable_across_calls() {
        let axes = vec![MatrixAxis::new("v", &["b", "a", "c"])];
        let first: Vec<_> = expand(&axes).iter().map(|j| j.id.clone()).collect();
        let second: Vec<_> = expand(&axes).iter().map(|j| j.id.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_no_axes_yields_default_job() {
        let jobs = expand(&[]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "default");
    }

    #[test]
    fn test_empty_axis_yields_no_jobs() {
        let axes = vec![
            MatrixAxis::new("version", &["3.8", "3.9"]),
            MatrixAxis::new("os", &[]),
        ];
        assert!(expand(&axes).is_empty());
    }
}
