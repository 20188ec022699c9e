/// Topology classification: recognizes a fully-connected mesh or a Hybrid
/// Cube Mesh (HCM) from the peer-link adjacency matrix, and — for HCM —
/// fixes the symmetric neighbor/relay role assignment (spec §4.6).
use super::peer::MAX_DEVICES;

/// Peer-link adjacency matrix: `nvl[i][j]` is the link count between ranks
/// `i` and `j` (0 = no direct link). Only the leading `world_size` rows and
/// columns are consulted.
pub type AdjMatrix = [[u32; MAX_DEVICES]; MAX_DEVICES];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    FullyConnected,
    HybridCubeMesh,
    Unsupported,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::FullyConnected => write!(f, "FullyConnected"),
            Topology::HybridCubeMesh => write!(f, "HybridCubeMesh"),
            Topology::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// Per-rank role row: indices 0..2 are the three direct neighbors, index 3
/// is the relay. Only populated (and only meaningful) for `HybridCubeMesh`
/// at `world_size == 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HcmRow(pub [u8; 4]);

#[derive(Debug, Clone)]
pub struct HcmRoleTable {
    pub rows: [HcmRow; MAX_DEVICES],
}

impl HcmRoleTable {
    pub fn row(&self, rank: usize) -> HcmRow {
        self.rows[rank]
    }

    pub fn relay(&self, rank: usize) -> usize {
        self.rows[rank].0[3] as usize
    }

    pub fn direct_neighbors(&self, rank: usize) -> [usize; 3] {
        let r = self.rows[rank].0;
        [r[0] as usize, r[1] as usize, r[2] as usize]
    }
}

fn neighbor_mask(nvl: &AdjMatrix, i: usize, world_size: usize) -> u32 {
    let mut mask = 0u32;
    for j in 0..world_size {
        if j != i && nvl[i][j] > 0 {
            mask |= 1 << j;
        }
    }
    mask
}

/// Classify the adjacency matrix into {FullyConnected, HybridCubeMesh,
/// Unsupported} and, for HCM, build the role table.
pub fn classify(nvl: &AdjMatrix, world_size: usize) -> (Topology, Option<HcmRoleTable>) {
    if !(2..=8).contains(&world_size) {
        return (Topology::Unsupported, None);
    }

    let masks: Vec<u32> = (0..world_size).map(|i| neighbor_mask(nvl, i, world_size)).collect();
    let counts: Vec<u32> = masks.iter().map(|m| m.count_ones()).collect();

    if counts.iter().all(|&c| c as usize == world_size - 1) {
        return (Topology::FullyConnected, None);
    }

    if world_size == 8 && counts.iter().all(|&c| c == 4) {
        if let Some(table) = try_build_hcm(&masks) {
            return (Topology::HybridCubeMesh, Some(table));
        }
    }

    (Topology::Unsupported, None)
}

fn try_build_hcm(masks: &[u32]) -> Option<HcmRoleTable> {
    let n = masks.len();
    debug_assert_eq!(n, 8);

    // Relay: the unique j with mask[i] & mask[j] == 0.
    let mut relay = [0u8; 8];
    for i in 0..n {
        let mut candidates = (0..n).filter(|&j| j != i && masks[i] & masks[j] == 0);
        let r = candidates.next()?;
        if candidates.next().is_some() {
            return None; // not exactly one relay
        }
        relay[i] = r as u8;
    }
    // Involution: relay(relay(x)) == x.
    for i in 0..n {
        if relay[relay[i] as usize] as usize != i {
            return None;
        }
    }

    // Greedy symmetric neighbor-column assignment (spec guarantees success
    // given the recognition invariants above hold).
    let mut cols = [[None; 3]; 8];
    for k in 0..3 {
        for i in 0..n {
            if cols[i][k].is_some() {
                continue;
            }
            let already_used: Vec<u8> = cols[i].iter().filter_map(|c| *c).collect();
            let neighbors_of_i = (0..n).filter(|&j| {
                j != i
                    && j != relay[i] as usize
                    && masks[i] & (1 << j) != 0
                    && !already_used.contains(&(j as u8))
            });
            let mut assigned = false;
            for j in neighbors_of_i {
                if cols[j][k].is_none() {
                    cols[i][k] = Some(j as u8);
                    cols[j][k] = Some(i as u8);
                    assigned = true;
                    break;
                }
            }
            if !assigned && cols[i][k].is_none() {
                return None;
            }
        }
    }

    let mut rows = [HcmRow([0; 4]); 8];
    for i in 0..n {
        let c = cols[i];
        rows[i] = HcmRow([c[0]?, c[1]?, c[2]?, relay[i]]);
    }
    Some(HcmRoleTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_connected(n: usize) -> AdjMatrix {
        let mut m = [[0u32; MAX_DEVICES]; MAX_DEVICES];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    m[i][j] = 1;
                }
            }
        }
        m
    }

    /// Real HGX-style 8-GPU direct topology: each rank links to its three
    /// Hamming-distance-1 neighbors (a 3-cube) plus its antipodal rank.
    fn hcm_adjacency() -> AdjMatrix {
        let mut m = [[0u32; MAX_DEVICES]; MAX_DEVICES];
        for i in 0..8usize {
            for j in 0..8usize {
                if i == j {
                    continue;
                }
                let d = i ^ j;
                if d.count_ones() == 1 || d == 7 {
                    m[i][j] = 1;
                }
            }
        }
        m
    }

    fn ring(n: usize) -> AdjMatrix {
        let mut m = [[0u32; MAX_DEVICES]; MAX_DEVICES];
        for i in 0..n {
            let next = (i + 1) % n;
            let prev = (i + n - 1) % n;
            m[i][next] = 1;
            m[i][prev] = 1;
        }
        m
    }

    #[test]
    fn four_rank_mesh_is_fully_connected() {
        let (topo, table) = classify(&fully_connected(4), 4);
        assert_eq!(topo, Topology::FullyConnected);
        assert!(table.is_none());
    }

    #[test]
    fn eight_rank_hcm_satisfies_all_invariants() {
        let (topo, table) = classify(&hcm_adjacency(), 8);
        assert_eq!(topo, Topology::HybridCubeMesh);
        let table = table.expect("HCM must produce a role table");

        for i in 0..8usize {
            // (a) exactly four assigned peers
            let neighbors = table.direct_neighbors(i);
            let relay = table.relay(i);
            let mut all = neighbors.to_vec();
            all.push(relay);
            all.sort_unstable();
            all.dedup();
            assert_eq!(all.len(), 4, "rank {i} must have exactly four distinct peers");

            // (c) relay is involutive
            assert_eq!(table.relay(relay), i);

            // (d) neighbor columns are symmetric
            for k in 0..3 {
                let j = table.rows[i].0[k] as usize;
                assert!(table.direct_neighbors(j).contains(&i));
            }
        }
    }

    #[test]
    fn eight_rank_ring_is_unsupported() {
        let (topo, table) = classify(&ring(8), 8);
        assert_eq!(topo, Topology::Unsupported);
        assert!(table.is_none());
    }
}
