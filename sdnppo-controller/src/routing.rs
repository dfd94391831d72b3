//! Moteur de routage : plus court chemin en nombre de sauts sur un snapshot
//! de topologie. Aucun cache, recalculé à chaque packet-in.

use crate::models::{Dpid, PortNo};
use crate::topology::Topology;
use petgraph::algo::dijkstra;
use petgraph::Direction;

/// Chemin `src -> dst` (inclus) ou vide si injoignable.
/// Distances en sauts (coût unitaire), puis remontée depuis `dst` : à chaque
/// pas, le prédécesseur retenu est le plus petit dpid à distance - 1.
pub fn shortest_path(topo: &Topology, src: Dpid, dst: Dpid) -> Vec<Dpid> {
    if src == dst {
        return vec![src];
    }
    if !topo.contains(src) || !topo.contains(dst) {
        return Vec::new();
    }

    let hops = dijkstra(topo.graph(), src, Some(dst), |_| 1usize);
    let Some(&total) = hops.get(&dst) else {
        return Vec::new();
    };

    let mut path = vec![dst];
    let mut cursor = dst;
    for remaining in (0..total).rev() {
        let prev = topo
            .graph()
            .neighbors_directed(cursor, Direction::Incoming)
            .filter(|p| hops.get(p) == Some(&remaining))
            .min();
        let Some(prev) = prev else {
            return Vec::new();
        };
        path.push(prev);
        cursor = prev;
    }
    path.reverse();
    path
}

/// Port de sortie sur `current` pour suivre `path`; le dernier switch sort
/// vers l'hôte sur `dst_port`.
pub fn next_hop_port(topo: &Topology, path: &[Dpid], current: Dpid, dst_port: PortNo) -> Option<PortNo> {
    let idx = path.iter().position(|&sw| sw == current)?;
    match path.get(idx + 1) {
        None => Some(dst_port),
        Some(&next) => topo.outgoing_port(current, next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkDesc;

    fn bidir(pairs: &[(Dpid, Dpid)]) -> Vec<LinkDesc> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| LinkDesc { src: a, src_port: i as PortNo + 1, dst: b, dst_port: i as PortNo + 101 })
            .collect()
    }

    fn is_valid_path(topo: &Topology, path: &[Dpid]) -> bool {
        path.windows(2).all(|w| topo.has_edge(w[0], w[1]))
    }

    #[test]
    fn same_switch_is_single_hop() {
        let empty = Topology::default();
        assert_eq!(shortest_path(&empty, 7, 7), vec![7]);
        let topo = Topology::from_parts(&[1, 2], &bidir(&[(1, 2)]));
        assert_eq!(shortest_path(&topo, 2, 2), vec![2]);
    }

    #[test]
    fn unreachable_is_empty() {
        let topo = Topology::from_parts(&[1, 2, 3], &bidir(&[(1, 2)]));
        assert!(shortest_path(&topo, 1, 3).is_empty());
        assert!(shortest_path(&topo, 1, 42).is_empty());
    }

    #[test]
    fn prefers_fewest_hops() {
        // 1-2-3-4 en ligne + raccourci 1-5-4
        let topo = Topology::from_parts(&[1, 2, 3, 4, 5], &bidir(&[(1, 2), (2, 3), (3, 4), (1, 5), (5, 4)]));
        let path = shortest_path(&topo, 1, 4);
        assert_eq!(path, vec![1, 5, 4]);
        assert!(is_valid_path(&topo, &path));
    }

    #[test]
    fn ties_break_on_lowest_dpid() {
        // leaf-spine : deux spines (10, 11) entre les leaves 1 et 2
        let topo = Topology::from_parts(&[1, 2, 10, 11], &bidir(&[(1, 11), (1, 10), (2, 11), (2, 10)]));
        assert_eq!(shortest_path(&topo, 1, 2), vec![1, 10, 2]);
        assert_eq!(shortest_path(&topo, 2, 1), vec![2, 10, 1]);
        // stable d'un appel à l'autre
        assert_eq!(shortest_path(&topo, 1, 2), shortest_path(&topo, 1, 2));
    }

    #[test]
    fn path_is_minimal_on_ring() {
        let ring: Vec<(Dpid, Dpid)> = (1..=6).map(|i| (i, i % 6 + 1)).collect();
        let topo = Topology::from_parts(&[1, 2, 3, 4, 5, 6], &bidir(&ring));
        for dst in 1..=6u64 {
            let path = shortest_path(&topo, 1, dst);
            let expected_hops = std::cmp::min(dst - 1, 7 - dst) as usize;
            assert_eq!(path.len(), expected_hops + 1, "dst {dst}");
            assert_eq!(path.first(), Some(&1));
            assert_eq!(path.last(), Some(&dst));
            assert!(is_valid_path(&topo, &path));
        }
    }

    #[test]
    fn next_hop_resolution() {
        let links = vec![LinkDesc { src: 1, src_port: 3, dst: 2, dst_port: 4 }];
        let topo = Topology::from_parts(&[1, 2], &links);
        let path = vec![1, 2];
        assert_eq!(next_hop_port(&topo, &path, 1, 9), Some(3));
        assert_eq!(next_hop_port(&topo, &path, 2, 9), Some(9));
        assert_eq!(next_hop_port(&topo, &path, 5, 9), None);
    }
}
