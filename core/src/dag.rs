//! Pure graph functions over the task dependency DAG.
//!
//! The graph is represented as `task id -> list of prerequisite ids`.
//! Graphs here are small (tens of tasks), so every function is a plain
//! O(V+E) traversal with no incremental state.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoordError, Result};

/// Outcome of cycle validation. When `valid` is false, `cycle` holds the
/// offending path in order (a self-loop reports the single node).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCheck {
    pub valid: bool,
    pub cycle: Vec<String>,
}

impl CycleCheck {
    fn ok() -> Self {
        CycleCheck {
            valid: true,
            cycle: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validate that the dependency edge set contains no cycles.
///
/// Depth-first three-coloring; on meeting a node that is currently on the
/// DFS stack the cycle path is reconstructed through parent links.
/// Handles self-loops (A -> A), parallel edges, and isolated nodes.
pub fn validate_no_cycles(deps: &HashMap<String, Vec<String>>) -> CycleCheck {
    let mut color: HashMap<&str, Color> = HashMap::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();

    // Sorted roots keep cycle reports deterministic across runs.
    let mut roots: Vec<&str> = deps.keys().map(String::as_str).collect();
    roots.sort_unstable();

    for root in roots {
        if *color.get(root).unwrap_or(&Color::White) == Color::White {
            if let Some(cycle) = visit(root, deps, &mut color, &mut parent) {
                return CycleCheck {
                    valid: false,
                    cycle,
                };
            }
        }
    }

    CycleCheck::ok()
}

fn visit<'a>(
    node: &'a str,
    deps: &'a HashMap<String, Vec<String>>,
    color: &mut HashMap<&'a str, Color>,
    parent: &mut HashMap<&'a str, &'a str>,
) -> Option<Vec<String>> {
    color.insert(node, Color::Gray);

    if let Some(next_nodes) = deps.get(node) {
        for next in next_nodes {
            match *color.get(next.as_str()).unwrap_or(&Color::White) {
                Color::Gray => {
                    // Back edge: walk parent links from `node` up to `next`.
                    let mut path = vec![node];
                    let mut cur = node;
                    while cur != next.as_str() {
                        cur = parent[cur];
                        path.push(cur);
                    }
                    path.reverse();
                    return Some(path.into_iter().map(String::from).collect());
                }
                Color::White => {
                    parent.insert(next.as_str(), node);
                    if let Some(cycle) = visit(next, deps, color, parent) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
    }

    color.insert(node, Color::Black);
    None
}

/// Order tasks so that every prerequisite precedes its dependents
/// (Kahn's in-degree reduction). Tie order between independent tasks is
/// unspecified. Fails on cyclic input.
pub fn topological_sort(deps: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut nodes: HashSet<&str> = HashSet::new();
    for (task, prereqs) in deps {
        nodes.insert(task);
        for p in prereqs {
            nodes.insert(p);
        }
    }

    // in_degree counts unresolved prerequisites; dependents is the
    // reverse adjacency used to decrement them.
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (task, prereqs) in deps {
        let unique: HashSet<&str> = prereqs.iter().map(String::as_str).collect();
        if let Some(degree) = in_degree.get_mut(task.as_str()) {
            *degree += unique.len();
        }
        for p in unique {
            dependents.entry(p).or_default().push(task.as_str());
        }
    }

    let mut ready: VecDeque<&str> = {
        let mut zero: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        zero.sort_unstable();
        zero.into_iter().collect()
    };

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_front() {
        order.push(node.to_string());
        if let Some(deps_of) = dependents.get(node) {
            for &task in deps_of {
                let degree = in_degree.get_mut(task).expect("node registered");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(task);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(CoordError::Validation(
            "dependency graph contains a cycle".to_string(),
        ));
    }
    Ok(order)
}

/// True iff every prerequisite of `task` is in the completed set. A task
/// with no prerequisites is always startable.
pub fn can_start(
    task: &str,
    deps: &HashMap<String, Vec<String>>,
    completed: &HashSet<String>,
) -> bool {
    deps.get(task)
        .map(|prereqs| prereqs.iter().all(|p| completed.contains(p)))
        .unwrap_or(true)
}

/// Task ids that newly satisfy [`can_start`] once `completed_task` joins
/// the completed set. Only direct dependents of `completed_task` are
/// candidates, and each must have *all* of its prerequisites satisfied.
pub fn unlocked_by(
    completed_task: &str,
    deps: &HashMap<String, Vec<String>>,
    completed: &HashSet<String>,
) -> Vec<String> {
    let mut augmented: HashSet<&str> = completed.iter().map(String::as_str).collect();
    augmented.insert(completed_task);

    let mut candidates: Vec<&str> = deps
        .iter()
        .filter(|(task, prereqs)| {
            task.as_str() != completed_task
                && !augmented.contains(task.as_str())
                && prereqs.iter().any(|p| p == completed_task)
                && prereqs.iter().all(|p| augmented.contains(p.as_str()))
        })
        .map(|(task, _)| task.as_str())
        .collect();
    candidates.sort_unstable();
    candidates.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(task, prereqs)| {
                (
                    task.to_string(),
                    prereqs.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_graph_is_valid() {
        let deps = HashMap::new();
        assert!(validate_no_cycles(&deps).valid);
        assert!(topological_sort(&deps).unwrap().is_empty());
        assert!(can_start("anything", &deps, &HashSet::new()));
    }

    #[test]
    fn test_self_loop_detected() {
        let deps = graph(&[("a", &["a"])]);
        let check = validate_no_cycles(&deps);
        assert!(!check.valid);
        assert!(check.cycle.contains(&"a".to_string()));
        assert!(topological_sort(&deps).is_err());
    }

    #[test]
    fn test_two_node_cycle() {
        let deps = graph(&[("a", &["b"]), ("b", &["a"])]);
        let check = validate_no_cycles(&deps);
        assert!(!check.valid);
        assert!(check.cycle.contains(&"a".to_string()));
        assert!(check.cycle.contains(&"b".to_string()));
    }

    #[test]
    fn test_diamond_is_valid_and_sorts() {
        // b and c depend on a; d depends on b and c.
        let deps = graph(&[("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        assert!(validate_no_cycles(&deps).valid);

        let order = topological_sort(&deps).unwrap();
        assert_eq!(order.len(), 4);
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_parallel_edges_deduplicated() {
        let deps = graph(&[("b", &["a", "a"])]);
        assert!(validate_no_cycles(&deps).valid);
        let order = topological_sort(&deps).unwrap();
        assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_can_start_requires_all_prerequisites() {
        let deps = graph(&[("d", &["b", "c"])]);
        assert!(!can_start("d", &deps, &completed(&["b"])));
        assert!(can_start("d", &deps, &completed(&["b", "c"])));
        assert!(can_start("b", &deps, &HashSet::new()));
    }

    #[test]
    fn test_diamond_unlock_requires_both_arms() {
        let deps = graph(&[("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);

        // a completes: both arms unlock, d does not.
        let unlocked = unlocked_by("a", &deps, &HashSet::new());
        assert_eq!(unlocked, vec!["b".to_string(), "c".to_string()]);

        // b completes while c is outstanding: nothing unlocks.
        assert!(unlocked_by("b", &deps, &completed(&["a"])).is_empty());

        // c completes after b: d unlocks.
        assert_eq!(
            unlocked_by("c", &deps, &completed(&["a", "b"])),
            vec!["d".to_string()]
        );
    }

    #[test]
    fn test_unlocked_by_only_direct_dependents() {
        let deps = graph(&[("b", &["a"]), ("c", &["b"])]);
        // Completing a unlocks b but never c, even though c becomes
        // reachable transitively later.
        assert_eq!(unlocked_by("a", &deps, &HashSet::new()), vec!["b".to_string()]);
    }

    #[test]
    fn test_unlocked_by_skips_already_completed() {
        let deps = graph(&[("b", &["a"])]);
        assert!(unlocked_by("a", &deps, &completed(&["b"])).is_empty());
    }
}
