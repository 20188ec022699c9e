/// The three reduction kernels: one-shot, two-shot, and hybrid-cube-mesh
/// (spec §4.3-4.5). Each is parameterized by world size and operates over a
/// grid of `blocks` conceptual thread blocks; within a block this simulator
/// runs the packed-8 stride loop directly rather than unrolling individual
/// warps/lanes, since numeric correctness does not depend on that extra
/// layer once the cross-device barrier protocol is honored at block
/// granularity (see `SPEC_FULL.md` §10.1).
use std::sync::Arc;

use super::bf16_ops::{PackedBf16, LANES};
use super::peer::{barrier, PeerBuffer, SignalRing};
use super::topology::HcmRoleTable;

/// Element range `[start, end)` that `block_idx` of `blocks` owns within a
/// `n_aligned`-element grid, at 8-lane granularity.
fn block_range(n_aligned: usize, blocks: u32, block_idx: u32) -> (usize, usize) {
    let total_groups = n_aligned / LANES;
    let blocks = blocks.max(1) as usize;
    let groups_per_block = total_groups.div_ceil(blocks).max(1);
    let start_group = (block_idx as usize * groups_per_block).min(total_groups);
    let end_group = (start_group + groups_per_block).min(total_groups);
    (start_group * LANES, end_group * LANES)
}

/// Write `sum`'s bits into `output[i..]`, guarded to `output`'s own length —
/// `output` is sized exactly `numel`, so this can never write past it.
fn store_guarded(output: &mut [u16], i: usize, sum: PackedBf16) {
    let bits = sum.to_bits();
    let valid = output.len().saturating_sub(i).min(LANES);
    output[i..i + valid].copy_from_slice(&bits[..valid]);
}

// ---------------------------------------------------------------------------
// One-shot
// ---------------------------------------------------------------------------

/// Every device reads every peer's contribution, sums locally, stores to its
/// own output. Peer order is rotated by `rank` to spread fabric load.
/// Bandwidth cost = (W+1)·N; best for small N.
pub fn one_shot(
    rank: usize,
    world_size: usize,
    blocks: u32,
    n_aligned: usize,
    peer_buffers: &[PeerBuffer],
    rings: &[Arc<SignalRing>],
    output: &mut [u16],
) {
    let peers: Vec<usize> = (0..world_size).collect();
    for block_idx in 0..blocks {
        barrier(rings, rank, &rings[rank], 0, block_idx as usize, &peers);
        let (start, end) = block_range(n_aligned, blocks, block_idx);
        let mut i = start;
        while i < end {
            if i >= output.len() {
                break;
            }
            let mut sum = PackedBf16::ZERO;
            for k in 0..world_size {
                let peer = (rank + k) % world_size;
                sum = sum.add(peer_buffers[peer].load_packed_streaming(i));
            }
            store_guarded(output, i, sum);
            i += LANES;
        }
    }
}

// ---------------------------------------------------------------------------
// Two-shot
// ---------------------------------------------------------------------------

/// Reduce-scatter then all-gather. Each rank reduces only its shard, writes
/// the shard result to its own peer buffer slot (the `(rank + 0) mod W`
/// rotation target — disjoint across ranks by construction, see
/// `SPEC_FULL.md` §10 Open Question), then gathers the remaining shards.
/// `output` must be exactly `n_aligned` elements long; the caller copies the
/// `numel`-length prefix back afterward (spec §4.7 step 6, §9 tail handling).
/// Precondition: `n_aligned` is a multiple of `world_size * LANES`.
pub fn two_shot(
    rank: usize,
    world_size: usize,
    blocks: u32,
    n_aligned: usize,
    peer_buffers: &[PeerBuffer],
    rings: &[Arc<SignalRing>],
    output: &mut [u16],
) {
    debug_assert_eq!(n_aligned % (world_size * LANES), 0);
    let n_per_rank = n_aligned / world_size;
    let peers: Vec<usize> = (0..world_size).collect();

    for block_idx in 0..blocks {
        barrier(rings, rank, &rings[rank], 0, block_idx as usize, &peers);

        // Reduce-scatter over this block's slice of the local shard.
        let (shard_start, shard_end) = block_range(n_per_rank, blocks, block_idx);
        let base = rank * n_per_rank;
        let mut local = shard_start;
        while local < shard_end {
            let i = base + local;
            let mut sum = PackedBf16::ZERO;
            for peer in 0..world_size {
                sum = sum.add(peer_buffers[peer].load_packed_streaming(i));
            }
            peer_buffers[rank].store_packed_streaming(i, sum);
            let bits = sum.to_bits();
            output[i..i + LANES].copy_from_slice(&bits);
            local += LANES;
        }

        barrier(rings, rank, &rings[rank], 1, block_idx as usize, &peers);

        // All-gather the remaining W-1 shards, one per peer.
        for k in 1..world_size {
            let peer = (rank + k) % world_size;
            let peer_base = peer * n_per_rank;
            let (pstart, pend) = block_range(n_per_rank, blocks, block_idx);
            let mut local = pstart;
            while local < pend {
                let i = peer_base + local;
                let packed = peer_buffers[peer].load_packed_streaming(i);
                let bits = packed.to_bits();
                output[i..i + LANES].copy_from_slice(&bits);
                local += LANES;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Hybrid Cube Mesh
// ---------------------------------------------------------------------------

/// Each device reduces with its three direct neighbors, exchanges the
/// partial with its relay neighbor over the second half of its peer buffer,
/// and completes. Precondition: `world_size == 8` and a valid `HcmRoleTable`.
/// Bandwidth cost ≈ 4·N direct + 1·N relay, all on direct peer links.
pub fn hcm(
    rank: usize,
    blocks: u32,
    n_aligned: usize,
    role: &HcmRoleTable,
    peer_buffers: &[PeerBuffer],
    rings: &[Arc<SignalRing>],
    output: &mut [u16],
) {
    let neighbors = role.direct_neighbors(rank);
    let relay = role.relay(rank);
    let relay_scratch_base = n_aligned;

    for block_idx in 0..blocks {
        barrier(rings, rank, &rings[rank], 0, block_idx as usize, &neighbors);

        let (start, end) = block_range(n_aligned, blocks, block_idx);

        // Reduce with the three direct neighbors, stash the 4-way partial
        // in this device's own relay scratch (cache-respecting: written and
        // re-read on the same device).
        let mut i = start;
        while i < end {
            let mut partial = peer_buffers[rank].load_packed_streaming(i);
            for &neighbor in &neighbors {
                partial = partial.add(peer_buffers[neighbor].load_packed_streaming(i));
            }
            peer_buffers[rank].store_packed_respecting(relay_scratch_base + i, partial);
            i += LANES;
        }

        // The relay is not among the three direct neighbors, so its signal
        // column in the same phase-0 table has not been touched yet.
        barrier(rings, rank, &rings[rank], 0, block_idx as usize, &[relay]);

        let mut i = start;
        while i < end {
            if i >= output.len() {
                break;
            }
            let local_partial = peer_buffers[rank].load_packed_respecting(relay_scratch_base + i);
            let relay_partial = peer_buffers[relay].load_packed_streaming(relay_scratch_base + i);
            let total = local_partial.add(relay_partial);
            store_guarded(output, i, total);
            i += LANES;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::topology::{classify, AdjMatrix};
    use half::bf16;
    use std::thread;

    const MAX_DEVICES: usize = 8;

    fn make_rings(world_size: usize) -> Vec<Arc<SignalRing>> {
        (0..world_size).map(|_| SignalRing::zeroed()).collect()
    }

    fn stage(peer_buffers: &[PeerBuffer], rank: usize, values: &[f32]) {
        for (i, &v) in values.iter().enumerate() {
            peer_buffers[rank].store_streaming(i, bf16::from_f32(v).to_bits());
        }
    }

    fn to_f32(bits: &[u16]) -> Vec<f32> {
        bits.iter().map(|&b| bf16::from_bits(b).to_f32()).collect()
    }

    #[test]
    fn one_shot_scenario_w2_eight_elements() {
        let world_size = 2;
        let n = 8usize;
        let blocks = 1u32;
        let peer_buffers: Vec<PeerBuffer> = (0..world_size).map(|_| PeerBuffer::zeroed(n)).collect();
        let rings = make_rings(world_size);

        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let b = [8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        stage(&peer_buffers, 0, &a);
        stage(&peer_buffers, 1, &b);

        let mut out0 = vec![0u16; n];
        let mut out1 = vec![0u16; n];

        thread::scope(|s| {
            let pb = &peer_buffers;
            let r = &rings;
            s.spawn(|| one_shot(0, world_size, blocks, n, pb, r, &mut out0));
            s.spawn(|| one_shot(1, world_size, blocks, n, pb, r, &mut out1));
        });

        assert_eq!(to_f32(&out0), vec![9.0; 8]);
        assert_eq!(to_f32(&out1), vec![9.0; 8]);
        for ring in &rings {
            assert!(ring.all_zero());
        }
    }

    #[test]
    fn one_shot_tail_leaves_nothing_unwritten_within_numel() {
        // 7 elements per rank, world_size 3 — non-8-aligned tail.
        let world_size = 3;
        let numel = 7usize;
        let n_aligned = 256; // warp*lane alignment granularity
        let blocks = 1u32;
        let peer_buffers: Vec<PeerBuffer> =
            (0..world_size).map(|_| PeerBuffer::zeroed(n_aligned)).collect();
        let rings = make_rings(world_size);

        let inputs = [
            vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
            vec![10.0f32, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0],
            vec![100.0f32, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0],
        ];
        for (rank, vals) in inputs.iter().enumerate() {
            stage(&peer_buffers, rank, vals);
        }

        let mut outs: Vec<Vec<u16>> = (0..world_size).map(|_| vec![0u16; numel]).collect();
        {
            let mut out_refs: Vec<&mut [u16]> = outs.iter_mut().map(|v| v.as_mut_slice()).collect();
            thread::scope(|s| {
                let pb = &peer_buffers;
                let r = &rings;
                for (rank, out) in out_refs.iter_mut().enumerate() {
                    let out: &mut [u16] = out;
                    s.spawn(move || one_shot(rank, world_size, blocks, n_aligned, pb, r, out));
                }
            });
        }

        let expected: Vec<f32> = (0..numel).map(|i| 1.0 * (i + 1) as f32 * 111.0).collect();
        for out in &outs {
            let got = to_f32(out);
            for (g, e) in got.iter().zip(expected.iter()) {
                assert!((g - e).abs() < 1.0, "got {:?} expected {:?}", got, expected);
            }
            assert_eq!(out.len(), numel);
        }
    }

    #[test]
    fn two_shot_rank_value_fill_four_ranks() {
        let world_size = 4;
        let n_per_rank = 256usize; // already a multiple of LANES
        let n_aligned = n_per_rank * world_size;
        let blocks = 2u32;
        let peer_buffers: Vec<PeerBuffer> =
            (0..world_size).map(|_| PeerBuffer::zeroed(n_aligned)).collect();
        let rings = make_rings(world_size);

        for rank in 0..world_size {
            let vals = vec![rank as f32; n_aligned];
            stage(&peer_buffers, rank, &vals);
        }

        let mut outs: Vec<Vec<u16>> = (0..world_size).map(|_| vec![0u16; n_aligned]).collect();
        {
            let mut out_refs: Vec<&mut [u16]> = outs.iter_mut().map(|v| v.as_mut_slice()).collect();
            thread::scope(|s| {
                let pb = &peer_buffers;
                let r = &rings;
                for (rank, out) in out_refs.iter_mut().enumerate() {
                    let out: &mut [u16] = out;
                    s.spawn(move || two_shot(rank, world_size, blocks, n_aligned, pb, r, out));
                }
            });
        }

        // 0 + 1 + 2 + 3 = 6 on every lane of every rank's output.
        for out in &outs {
            let got = to_f32(out);
            assert!(got.iter().all(|&v| (v - 6.0).abs() < 1e-3), "{:?}", got);
        }
        for ring in &rings {
            assert!(ring.all_zero());
        }
    }

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

    #[test]
    fn hcm_scenario_w8_all_ones() {
        let (_, table) = classify(&hcm_adjacency(), 8);
        let table = table.expect("HCM table");
        let world_size = 8;
        let n = 8usize; // one packed group
        let blocks = 1u32;
        // each buffer: [0, n) contribution, [n, 2n) relay scratch
        let peer_buffers: Vec<PeerBuffer> = (0..world_size).map(|_| PeerBuffer::zeroed(2 * n)).collect();
        let rings = make_rings(world_size);

        for rank in 0..world_size {
            stage(&peer_buffers, rank, &[1.0; 8]);
        }

        let mut outs: Vec<Vec<u16>> = (0..world_size).map(|_| vec![0u16; n]).collect();
        {
            let mut out_refs: Vec<&mut [u16]> = outs.iter_mut().map(|v| v.as_mut_slice()).collect();
            thread::scope(|s| {
                let pb = &peer_buffers;
                let r = &rings;
                let t = &table;
                for (rank, out) in out_refs.iter_mut().enumerate() {
                    let out: &mut [u16] = out;
                    s.spawn(move || hcm(rank, blocks, n, t, pb, r, out));
                }
            });
        }

        for out in &outs {
            let got = to_f32(out);
            assert_eq!(got, vec![8.0; 8]);
        }
        for ring in &rings {
            assert!(ring.all_zero());
        }
    }
}
