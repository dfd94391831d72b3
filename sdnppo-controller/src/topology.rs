/**
 * TOPOLOGY STORE - Graphe orienté des switches, ports sortants en poids d'arête
 *
 * RÔLE : Reconstruit entièrement le graphe à chaque événement de topologie
 * (switch-join, link-add). Les lecteurs prennent un snapshot `Arc<Topology>` :
 * la reconstruction se fait hors verrou puis le pointeur est remplacé d'un coup,
 * personne n'observe jamais un graphe à moitié construit.
 */

use crate::models::{Dpid, LinkDesc, PortNo};
use crate::state::{new_rw_state, SharedRw};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Graphe orienté des switches; le poids d'une arête est le port sortant
/// côté source.
#[derive(Debug, Clone)]
pub struct Topology {
    graph: DiGraphMap<Dpid, PortNo>,
    link_count: usize,
}

impl Default for Topology {
    fn default() -> Self {
        Self { graph: DiGraphMap::new(), link_count: 0 }
    }
}

impl Topology {
    /// Dérive le graphe depuis la liste des switches et des liens découverts.
    /// Chaque switch est présent même sans lien (noeud isolé). Un lien ajoute
    /// les deux directions, chacune avec le port sortant de son côté.
    pub fn from_parts(switches: &[Dpid], links: &[LinkDesc]) -> Self {
        let mut edges: BTreeMap<(Dpid, Dpid), PortNo> = BTreeMap::new();
        for link in links {
            edges.insert((link.src, link.dst), link.src_port);
        }
        for link in links {
            // la découverte peut ne remonter qu'un sens
            edges.entry((link.dst, link.src)).or_insert(link.dst_port);
        }

        let mut graph = DiGraphMap::with_capacity(switches.len(), edges.len());
        let mut nodes: Vec<Dpid> = switches.to_vec();
        nodes.sort_unstable();
        for sw in nodes {
            graph.add_node(sw);
        }
        // insertion par (source, destination) croissants : les voisins sortants
        // sont itérés par dpid croissant
        for ((from, to), port) in edges {
            graph.add_edge(from, to, port);
        }
        Self { graph, link_count: links.len() }
    }

    pub fn graph(&self) -> &DiGraphMap<Dpid, PortNo> {
        &self.graph
    }

    pub fn neighbors(&self, dpid: Dpid) -> impl Iterator<Item = Dpid> + '_ {
        self.contains(dpid)
            .then(|| self.graph.neighbors_directed(dpid, Direction::Outgoing))
            .into_iter()
            .flatten()
    }

    pub fn outgoing_port(&self, from: Dpid, to: Dpid) -> Option<PortNo> {
        self.graph.edge_weight(from, to).copied()
    }

    pub fn has_edge(&self, from: Dpid, to: Dpid) -> bool {
        self.graph.contains_edge(from, to)
    }

    pub fn contains(&self, dpid: Dpid) -> bool {
        self.graph.contains_node(dpid)
    }

    pub fn switch_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.link_count
    }
}

#[derive(Debug, Clone)]
pub struct TopologyStore {
    current: SharedRw<Arc<Topology>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self { current: new_rw_state(Arc::new(Topology::default())) }
    }

    /// Remplace atomiquement le graphe courant.
    pub fn rebuild(&self, switches: &[Dpid], links: &[LinkDesc]) -> Arc<Topology> {
        let topo = Arc::new(Topology::from_parts(switches, links));
        *self.current.write() = topo.clone();
        info!(switches = switches.len(), links = links.len(), "topology updated");
        topo
    }

    pub fn snapshot(&self) -> Arc<Topology> {
        self.current.read().clone()
    }

    pub fn neighbors(&self, dpid: Dpid) -> Vec<Dpid> {
        self.snapshot().neighbors(dpid).collect()
    }

    pub fn outgoing_port(&self, from: Dpid, to: Dpid) -> Option<PortNo> {
        self.snapshot().outgoing_port(from, to)
    }
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(src: Dpid, src_port: PortNo, dst: Dpid, dst_port: PortNo) -> LinkDesc {
        LinkDesc { src, src_port, dst, dst_port }
    }

    #[test]
    fn isolated_switches_are_nodes() {
        let topo = Topology::from_parts(&[1, 2, 3], &[]);
        assert_eq!(topo.switch_count(), 3);
        assert!(topo.contains(2));
        assert_eq!(topo.neighbors(2).count(), 0);
    }

    #[test]
    fn link_maps_both_directions() {
        let topo = Topology::from_parts(&[1, 2], &[link(1, 3, 2, 4)]);
        assert_eq!(topo.outgoing_port(1, 2), Some(3));
        assert_eq!(topo.outgoing_port(2, 1), Some(4));
        assert!(topo.has_edge(2, 1));
        assert_eq!(topo.outgoing_port(1, 9), None);
    }

    #[test]
    fn explicit_reverse_link_wins_over_derived_one() {
        let topo = Topology::from_parts(&[1, 2], &[link(2, 7, 1, 8), link(1, 8, 2, 7)]);
        assert_eq!(topo.outgoing_port(1, 2), Some(8));
        assert_eq!(topo.outgoing_port(2, 1), Some(7));
        assert_eq!(topo.link_count(), 2);
    }

    #[test]
    fn rebuild_replaces_previous_graph() {
        let store = TopologyStore::new();
        store.rebuild(&[1, 2], &[link(1, 1, 2, 1)]);
        let before = store.snapshot();
        store.rebuild(&[3], &[]);
        assert!(before.has_edge(1, 2));
        assert!(!store.snapshot().contains(1));
        assert_eq!(store.neighbors(1), Vec::<Dpid>::new());
        assert_eq!(store.snapshot().switch_count(), 1);
    }

    #[test]
    fn link_to_unlisted_switch_adds_node() {
        let topo = Topology::from_parts(&[1], &[link(1, 2, 5, 1)]);
        assert!(topo.contains(5));
        assert_eq!(topo.neighbors(5).collect::<Vec<_>>(), vec![1]);
        assert_eq!(topo.neighbors(42).count(), 0);
    }

    #[test]
    fn neighbors_are_sorted() {
        let topo = Topology::from_parts(&[1, 2, 3, 4], &[link(1, 1, 4, 1), link(1, 2, 2, 1), link(1, 3, 3, 1)]);
        assert_eq!(topo.neighbors(1).collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
