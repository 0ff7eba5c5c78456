//! Cross-channel routing order.
//!
//! Channels that read other channels' output (copy/merge) declare a
//! dependency `source → target`; the scheduler produces a per-block
//! processing order that honors every dependency, with ties broken by
//! channel creation order so the result is deterministic. Cycle creation
//! is refused at the entry point; if a cycle ever appears anyway the
//! offending (most recently added) dependency is dropped, a warning
//! counter is bumped, and scheduling proceeds on the reduced graph.

use thiserror::Error;
use tracing::warn;

use crate::diag::EngineDiagnostics;

/// A routing dependency: `target` reads `source`'s output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEdge {
    /// Channel whose output is read.
    pub source: usize,
    /// Channel doing the reading.
    pub target: usize,
}

/// Why a routing edit was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The dependency would close a cycle.
    #[error("dependency {from} -> {target} would create a routing cycle")]
    WouldCycle {
        /// Proposed source channel.
        from: usize,
        /// Proposed target channel.
        target: usize,
    },
    /// A channel referenced itself.
    #[error("channel {0} cannot depend on itself")]
    SelfDependency(usize),
}

/// Builds per-block channel processing orders.
#[derive(Debug, Default)]
pub struct RoutingScheduler {
    edges: Vec<RouteEdge>,
}

impl RoutingScheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current dependencies, in insertion order.
    pub fn edges(&self) -> &[RouteEdge] {
        &self.edges
    }

    /// Declare that `target` reads `source`. Refuses self-references and
    /// anything that would close a cycle.
    pub fn add_dependency(&mut self, source: usize, target: usize) -> Result<(), RoutingError> {
        if source == target {
            return Err(RoutingError::SelfDependency(source));
        }
        if self.reaches(target, source) {
            return Err(RoutingError::WouldCycle { from: source, target });
        }
        if !self.edges.iter().any(|e| e.source == source && e.target == target) {
            self.edges.push(RouteEdge { source, target });
        }
        Ok(())
    }

    /// Remove a dependency. Returns whether it existed.
    pub fn remove_dependency(&mut self, source: usize, target: usize) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.source == source && e.target == target));
        self.edges.len() != before
    }

    /// Drop every dependency touching a channel (channel removal).
    pub fn remove_channel(&mut self, channel: usize) {
        self.edges
            .retain(|e| e.source != channel && e.target != channel);
    }

    /// Whether `from` can reach `to` through the dependency graph.
    fn reaches(&self, from: usize, to: usize) -> bool {
        // Dependency edges point source -> target; "reaches" follows them.
        let mut stack = vec![from];
        let mut visited = Vec::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited.contains(&node) {
                continue;
            }
            visited.push(node);
            for edge in &self.edges {
                if edge.source == node {
                    stack.push(edge.target);
                }
            }
        }
        false
    }

    /// Compute the processing order over `channels` (channel ids
    /// `0..channels`; `alive` masks out tombstoned ids).
    ///
    /// Kahn's algorithm with the ready set scanned in creation order, so
    /// independent channels always process lowest-id first. Should a cycle
    /// survive (it cannot through [`add_dependency`], but scheduling is
    /// defensive), the most recently added edge inside the stuck subgraph
    /// is dropped and scheduling restarts on the reduced graph.
    pub fn compute_order(
        &mut self,
        channels: usize,
        alive: &[bool],
        diag: &EngineDiagnostics,
    ) -> Vec<usize> {
        loop {
            let mut in_degree = vec![0usize; channels];
            for edge in &self.edges {
                if edge.source < channels
                    && edge.target < channels
                    && alive.get(edge.source).copied().unwrap_or(false)
                    && alive.get(edge.target).copied().unwrap_or(false)
                {
                    in_degree[edge.target] += 1;
                }
            }

            let mut order = Vec::with_capacity(channels);
            let mut placed = vec![false; channels];
            loop {
                // Lowest-id ready channel first: deterministic tie-break.
                let next = (0..channels).find(|&c| {
                    alive.get(c).copied().unwrap_or(false) && !placed[c] && in_degree[c] == 0
                });
                let Some(c) = next else { break };
                placed[c] = true;
                order.push(c);
                for edge in &self.edges {
                    if edge.source == c
                        && edge.target < channels
                        && alive.get(edge.target).copied().unwrap_or(false)
                    {
                        in_degree[edge.target] = in_degree[edge.target].saturating_sub(1);
                    }
                }
            }

            let alive_count = (0..channels)
                .filter(|&c| alive.get(c).copied().unwrap_or(false))
                .count();
            if order.len() == alive_count {
                return order;
            }

            // A cycle survived: drop the newest edge among the stuck
            // channels and try again.
            let stuck = |c: usize| alive.get(c).copied().unwrap_or(false) && !placed[c];
            if let Some(pos) = self
                .edges
                .iter()
                .rposition(|e| stuck(e.source) && stuck(e.target))
            {
                let dropped = self.edges.remove(pos);
                warn!(
                    source = dropped.source,
                    target = dropped.target,
                    "dropping routing dependency to break a cycle"
                );
                diag.record_routing_drop();
            } else {
                // No droppable edge; schedule what we have.
                return order;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_alive(n: usize) -> Vec<bool> {
        vec![true; n]
    }

    #[test]
    fn independent_channels_order_by_creation() {
        let mut scheduler = RoutingScheduler::new();
        let diag = EngineDiagnostics::new();
        let order = scheduler.compute_order(3, &all_alive(3), &diag);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn dependency_orders_source_first() {
        let mut scheduler = RoutingScheduler::new();
        let diag = EngineDiagnostics::new();
        // Channel 0 reads channel 2's output.
        scheduler.add_dependency(2, 0).unwrap();
        let order = scheduler.compute_order(3, &all_alive(3), &diag);
        let pos = |c: usize| order.iter().position(|&x| x == c).unwrap();
        assert!(pos(2) < pos(0));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn chain_of_dependencies() {
        let mut scheduler = RoutingScheduler::new();
        let diag = EngineDiagnostics::new();
        scheduler.add_dependency(0, 1).unwrap();
        scheduler.add_dependency(1, 2).unwrap();
        let order = scheduler.compute_order(3, &all_alive(3), &diag);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_is_refused_at_entry() {
        let mut scheduler = RoutingScheduler::new();
        scheduler.add_dependency(0, 1).unwrap();
        scheduler.add_dependency(1, 2).unwrap();
        assert_eq!(
            scheduler.add_dependency(2, 0),
            Err(RoutingError::WouldCycle {
                from: 2,
                target: 0
            })
        );
        assert_eq!(
            scheduler.add_dependency(3, 3),
            Err(RoutingError::SelfDependency(3))
        );
    }

    #[test]
    fn forced_cycle_drops_newest_edge() {
        let mut scheduler = RoutingScheduler::new();
        let diag = EngineDiagnostics::new();
        // Bypass add_dependency to force a cycle.
        scheduler.edges.push(RouteEdge { source: 0, target: 1 });
        scheduler.edges.push(RouteEdge { source: 1, target: 0 });

        let order = scheduler.compute_order(2, &all_alive(2), &diag);
        assert_eq!(order.len(), 2);
        assert_eq!(diag.routing_drops(), 1);
        // The newer edge (1 -> 0) was the one dropped.
        assert_eq!(
            scheduler.edges(),
            &[RouteEdge { source: 0, target: 1 }]
        );
    }

    #[test]
    fn tombstoned_channels_are_skipped() {
        let mut scheduler = RoutingScheduler::new();
        let diag = EngineDiagnostics::new();
        scheduler.add_dependency(0, 2).unwrap();
        let alive = vec![true, false, true];
        let order = scheduler.compute_order(3, &alive, &diag);
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn remove_dependency_and_channel() {
        let mut scheduler = RoutingScheduler::new();
        scheduler.add_dependency(0, 1).unwrap();
        scheduler.add_dependency(1, 2).unwrap();
        assert!(scheduler.remove_dependency(0, 1));
        assert!(!scheduler.remove_dependency(0, 1));
        scheduler.remove_channel(2);
        assert!(scheduler.edges().is_empty());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut scheduler = RoutingScheduler::new();
        scheduler.add_dependency(0, 1).unwrap();
        scheduler.add_dependency(0, 1).unwrap();
        assert_eq!(scheduler.edges().len(), 1);
    }
}
