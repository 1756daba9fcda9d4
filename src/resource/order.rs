//! Route ordering so that static segments are matched before parameters.
//!
//! Two paths with the same number of segments are decided at the first
//! index where exactly one of them is a `:param`; the static one goes first.
//! Otherwise the path with more segments goes first. Anything left equal
//! keeps its registration order.

use std::cmp::Ordering;

use super::route::Route;

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':')
}

fn is_capture(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('*')
}

/// Names of the `:param` and `*rest` segments of a path, left to right
pub fn param_names(path: &str) -> Vec<String> {
    segments(path)
        .into_iter()
        .filter(|segment| is_capture(segment))
        .map(|segment| segment[1..].to_string())
        .collect()
}

/// The path with every capture renamed after its position, so paths of the
/// same shape collapse to one string whatever their parameter names.
pub fn canonical_path(path: &str) -> String {
    let renamed: Vec<String> = segments(path)
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            if is_capture(segment) {
                format!("{}p{}", &segment[..1], index)
            } else {
                segment.to_string()
            }
        })
        .collect();
    let mut canonical = format!("/{}", renamed.join("/"));
    if path.len() > 1 && path.ends_with('/') && canonical.len() > 1 {
        canonical.push('/');
    }
    canonical
}

pub fn compare_paths(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);

    if !a.is_empty() && a.len() == b.len() {
        let differing = a
            .iter()
            .zip(b.iter())
            .find(|(x, y)| is_param(x) != is_param(y));
        if let Some((x, _)) = differing {
            return if is_param(x) {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
    }

    b.len().cmp(&a.len())
}

/// Stable sort of routes into match order
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| compare_paths(a.path(), b.path()));
}
