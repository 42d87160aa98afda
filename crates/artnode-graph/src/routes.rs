//! Route assignment.
//!
//! Every valid node gets the route derived from its tree path. The single
//! override maps `/` to the `root_content` target; the routing table is one
//! `route -> id` map, so serving the root is a plain lookup.

use std::collections::BTreeMap;

use artnode_schema::Diagnostic;

use crate::error::BuildError;
use crate::graph::ContentNode;

/// Normalize a route or tree path to its canonical route.
///
/// Segments are trimmed and empty segments dropped; case is preserved.
///
/// ```
/// use artnode_graph::normalize_route;
///
/// assert_eq!(normalize_route("artists/zol/"), "/artists/zol");
/// assert_eq!(normalize_route("/ artists //Zol"), "/artists/Zol");
/// assert_eq!(normalize_route(""), "/");
/// ```
#[must_use]
pub fn normalize_route(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Assign routes to valid nodes and build the routing table.
///
/// `nodes` must be sorted by id so collisions are reported the same way on
/// every build.
///
/// # Errors
///
/// Returns [`BuildError::RootResolution`] if `root_target` is missing or
/// invalid, and [`BuildError::RouteCollision`] if two nodes share a natural
/// route.
pub(crate) fn assign_routes(
    nodes: &mut [ContentNode],
    root_target: &str,
) -> Result<BTreeMap<String, String>, BuildError> {
    match nodes.iter().find(|n| n.id == root_target) {
        None => {
            return Err(BuildError::RootResolution {
                target: root_target.to_owned(),
                reason: "missing",
            });
        }
        Some(node) if !node.is_valid() => {
            return Err(BuildError::RootResolution {
                target: root_target.to_owned(),
                reason: "invalid",
            });
        }
        Some(_) => {}
    }

    let mut routes = BTreeMap::new();
    routes.insert("/".to_owned(), root_target.to_owned());

    for node in nodes.iter_mut().filter(|n| n.is_valid()) {
        if node.id.is_empty() {
            if root_target.is_empty() {
                node.route = Some("/".to_owned());
            }
            continue;
        }

        let route = normalize_route(&node.id);
        if route == "/" {
            if node.id == root_target {
                node.route = Some(route);
            } else {
                node.diagnostics.push(Diagnostic::reference(
                    node.id.clone(),
                    "route.shadowed",
                    "natural route '/' is taken by the root content; node has no route",
                ));
            }
            continue;
        }

        if let Some(first) = routes.get(&route) {
            return Err(BuildError::RouteCollision {
                route,
                first: first.clone(),
                second: node.id.clone(),
            });
        }
        routes.insert(route.clone(), node.id.clone());
        node.route = Some(route);
    }

    tracing::debug!(routes = routes.len(), root_target, "Routes assigned");
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use artnode_schema::{NodeKind, Payload};
    use pretty_assertions::assert_eq;

    use super::*;

    fn valid(id: &str) -> ContentNode {
        ContentNode::shell(id, NodeKind::Generic, Some(Payload::default()))
    }

    fn invalid(id: &str) -> ContentNode {
        ContentNode::shell(id, NodeKind::Generic, None)
    }

    fn sorted(mut nodes: Vec<ContentNode>) -> Vec<ContentNode> {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    #[test]
    fn test_natural_routes_with_root_at_root() {
        let mut nodes = sorted(vec![valid(""), valid("artists/zol"), invalid("pages/broken")]);

        let routes = assign_routes(&mut nodes, "").unwrap();

        assert_eq!(routes.get("/").map(String::as_str), Some(""));
        assert_eq!(routes.get("/artists/zol").map(String::as_str), Some("artists/zol"));
        assert_eq!(nodes[0].route.as_deref(), Some("/"));
        assert_eq!(nodes[2].route, None);
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_root_override_shares_content() {
        let mut nodes = sorted(vec![valid(""), valid("artists/zol")]);

        let routes = assign_routes(&mut nodes, "artists/zol").unwrap();

        assert_eq!(routes.get("/").map(String::as_str), Some("artists/zol"));
        assert_eq!(routes.get("/artists/zol").map(String::as_str), Some("artists/zol"));
        // The displaced content root keeps no route of its own.
        assert_eq!(nodes[0].route, None);
        assert_eq!(nodes[1].route.as_deref(), Some("/artists/zol"));
    }

    #[test]
    fn test_missing_and_invalid_root_target() {
        let mut nodes = sorted(vec![valid(""), invalid("pages/home")]);
        assert!(matches!(
            assign_routes(&mut nodes, "pages/nope"),
            Err(BuildError::RootResolution { reason: "missing", .. })
        ));
        assert!(matches!(
            assign_routes(&mut nodes, "pages/home"),
            Err(BuildError::RootResolution { reason: "invalid", .. })
        ));
    }

    #[test]
    fn test_whitespace_segments_collide() {
        let mut nodes = sorted(vec![valid(""), valid("artists/zol"), valid("artists/zol ")]);

        let err = assign_routes(&mut nodes, "").unwrap_err();

        let BuildError::RouteCollision {
            route,
            first,
            second,
        } = err
        else {
            panic!("expected collision, got {err:?}");
        };
        assert_eq!(route, "/artists/zol");
        assert_eq!(first, "artists/zol");
        assert_eq!(second, "artists/zol ");
    }

    #[test]
    fn test_blank_directory_loses_root_deterministically() {
        for _ in 0..3 {
            let mut nodes = sorted(vec![valid(""), valid(" "), valid("pages/home")]);

            let routes = assign_routes(&mut nodes, "pages/home").unwrap();

            assert_eq!(routes.get("/").map(String::as_str), Some("pages/home"));
            let blank = nodes.iter().find(|n| n.id == " ").unwrap();
            assert_eq!(blank.route, None);
            assert_eq!(blank.diagnostics[0].rule, "route.shadowed");
            assert!(blank.is_valid());
        }
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("/"), "/");
        assert_eq!(normalize_route(" / "), "/");
        assert_eq!(normalize_route("Artists/Zol"), "/Artists/Zol");
    }
}
