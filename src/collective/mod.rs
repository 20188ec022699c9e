/// Intra-node bf16 all-reduce: a value-exact, kernel-level collective core
/// for single-node multi-GPU groups, complementing the analytic timing
/// model in [`crate::cluster`]/[`crate::interconnect`].
///
/// Call order mirrors a real NCCL-style bootstrap: `is_supported` once per
/// device, `init_topo_info` + `init_p2p_state` once per group, then
/// `select_all_reduce_algo` and `all_reduce` per collective call.
pub mod bf16_ops;
pub mod errors;
pub mod kernels;
pub mod peer;
pub mod topology;

use std::sync::Arc;

use errors::{CapabilityError, CollectiveError, ConfigurationError};
use peer::{PeerBuffer, SignalRing};
use topology::{classify, AdjMatrix, HcmRoleTable, Topology};

use crate::metrics::{self, IntraNodeAllReduceSnapshot};

// ---------------------------------------------------------------------------
// Constants (spec §2)
// ---------------------------------------------------------------------------

pub const K_MAX_DEVICES: usize = 8;
pub const K_MAX_ALL_REDUCE_BLOCKS: u32 = 24;
pub const K_THREADS_PER_BLOCK: u32 = 1024;
pub const K_WARP_SIZE: u32 = 32;
pub const K_BYTES_PER_THREAD: usize = 16;
/// Largest payload this core will route through the intra-node fast path.
pub const K_MAX_INTRA_NODE_SIZE: usize = 20 * 1024 * 1024;
pub const K_HCM_THRESH_BYTES: usize = 256 * 1024;
pub const K_ONE_SHOT_THRESH_BYTES: usize = 256 * 1024;
pub const K_TWO_SHOT_THRESH_BYTES: usize = 10 * 1024 * 1024;

/// Alignment granularity: one warp's worth of packed-8 work per thread.
const ALIGN_ELEMS: usize = (K_WARP_SIZE as usize) * bf16_ops::LANES;

// ---------------------------------------------------------------------------
// Tensor surface (spec §10.3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Bf16,
}

/// A minimal dense-tensor descriptor. `stride == 1` stands in for "dense,
/// non-overlapping" — Rust's borrow checker already rules out the aliasing
/// a real allocator-level check would otherwise need to catch.
#[derive(Debug)]
pub struct TensorView<'a> {
    pub data: &'a mut [u16],
    pub device: usize,
    pub dtype: DType,
    pub stride: usize,
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a mut [u16], device: usize) -> Self {
        TensorView { data, device, dtype: DType::Bf16, stride: 1 }
    }

    fn numel(&self) -> usize {
        self.data.len()
    }
}

// ---------------------------------------------------------------------------
// Algorithm selection (spec §4.6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllReduceAlgo {
    None,
    OneShot,
    TwoShot,
    Hcm,
}

impl std::fmt::Display for AllReduceAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllReduceAlgo::None => write!(f, "None"),
            AllReduceAlgo::OneShot => write!(f, "OneShot"),
            AllReduceAlgo::TwoShot => write!(f, "TwoShot"),
            AllReduceAlgo::Hcm => write!(f, "Hcm"),
        }
    }
}

/// Device architecture capability flags checked by `is_supported`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCapabilities {
    pub packed_bf16_add: bool,
    pub system_scope_atomics: bool,
}

impl DeviceCapabilities {
    pub const NATIVE: DeviceCapabilities =
        DeviceCapabilities { packed_bf16_add: true, system_scope_atomics: true };
}

/// Architecture gate, checked once per device before any group is formed.
pub fn is_supported(caps: DeviceCapabilities) -> Result<(), CapabilityError> {
    if !caps.packed_bf16_add {
        return Err(CapabilityError::NoPackedBf16Add);
    }
    if !caps.system_scope_atomics {
        return Err(CapabilityError::NoSystemScopeAtomics);
    }
    Ok(())
}

/// Classify the group's peer-link fabric once, ahead of any collective call.
pub fn init_topo_info(nvl: &AdjMatrix, world_size: usize) -> (Topology, Option<HcmRoleTable>) {
    tracing::debug!(world_size, "classifying intra-node topology");
    classify(nvl, world_size)
}

/// Allocate and zero one rank's `SignalRing`. Called once per rank, before
/// the first collective in a group's lifetime.
pub fn init_p2p_state() -> Arc<SignalRing> {
    SignalRing::zeroed()
}

/// Pick an algorithm for a `bytes`-sized payload given the group's topology,
/// per the size/topology decision table in spec §4.6.
pub fn select_all_reduce_algo(bytes: usize, topology: Topology, world_size: usize) -> AllReduceAlgo {
    if bytes == 0 || bytes > K_MAX_INTRA_NODE_SIZE {
        return AllReduceAlgo::None;
    }

    match topology {
        Topology::HybridCubeMesh if world_size == 8 && bytes <= K_HCM_THRESH_BYTES => AllReduceAlgo::Hcm,
        Topology::FullyConnected if bytes <= K_ONE_SHOT_THRESH_BYTES => AllReduceAlgo::OneShot,
        Topology::FullyConnected if bytes <= K_TWO_SHOT_THRESH_BYTES => AllReduceAlgo::TwoShot,
        _ => AllReduceAlgo::None,
    }
}

fn align_up(n: usize, granularity: usize) -> usize {
    n.div_ceil(granularity) * granularity
}

fn grid_blocks(n_aligned: usize) -> u32 {
    let groups = (n_aligned / bf16_ops::LANES).max(1) as u32;
    groups.min(K_MAX_ALL_REDUCE_BLOCKS).max(1)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Validate, stage, dispatch, and (for two-shot) copy back. This is the one
/// function a collaborator calls per rank per collective; every rank in the
/// group must call it concurrently (spec §4.7).
#[allow(clippy::too_many_arguments)]
pub fn all_reduce(
    rank: usize,
    world_size: usize,
    tensor: &mut TensorView<'_>,
    algo: AllReduceAlgo,
    role: Option<&HcmRoleTable>,
    peer_buffers: &[PeerBuffer],
    rings: &[Arc<SignalRing>],
) -> Result<(), CollectiveError> {
    if tensor.dtype != DType::Bf16 {
        return Err(ConfigurationError::DtypeNotBf16.into());
    }
    if tensor.device != rank {
        return Err(ConfigurationError::DeviceMismatch { tensor_device: tensor.device, rank }.into());
    }
    if tensor.stride != 1 {
        return Err(ConfigurationError::NotDense { stride: tensor.stride }.into());
    }
    if !(2..=K_MAX_DEVICES).contains(&world_size) {
        return Err(ConfigurationError::WorldSizeOutOfRange { world_size }.into());
    }

    let numel = tensor.numel();
    let bytes = numel * 2;
    if bytes > K_MAX_INTRA_NODE_SIZE {
        return Err(ConfigurationError::PayloadTooLarge { bytes, max: K_MAX_INTRA_NODE_SIZE }.into());
    }

    if algo == AllReduceAlgo::Hcm && world_size != 8 {
        return Err(ConfigurationError::HcmRequiresEight { world_size }.into());
    }
    let role = if algo == AllReduceAlgo::Hcm {
        Some(role.ok_or(ConfigurationError::UnclassifiableTopology)?)
    } else {
        None
    };

    let alignment = if algo == AllReduceAlgo::TwoShot { world_size * ALIGN_ELEMS } else { ALIGN_ELEMS };
    let n_aligned = align_up(numel.max(1), alignment);
    let blocks = grid_blocks(n_aligned);

    tracing::info!(rank, world_size, numel, algo = %algo, blocks, "intra-node all_reduce dispatch");

    // Stage this rank's own contribution into its peer-visible slot.
    for i in 0..numel {
        peer_buffers[rank].store_streaming(i, tensor.data[i]);
    }
    for i in numel..n_aligned.min(peer_buffers[rank].len()) {
        peer_buffers[rank].store_streaming(i, 0);
    }

    match algo {
        AllReduceAlgo::None => {
            tracing::warn!(rank, numel, "all_reduce called with AllReduceAlgo::None, no-op");
        }
        AllReduceAlgo::OneShot => {
            kernels::one_shot(rank, world_size, blocks, n_aligned, peer_buffers, rings, tensor.data);
        }
        AllReduceAlgo::TwoShot => {
            let mut scratch = vec![0u16; n_aligned];
            kernels::two_shot(rank, world_size, blocks, n_aligned, peer_buffers, rings, &mut scratch);
            tensor.data.copy_from_slice(&scratch[..numel]);
        }
        AllReduceAlgo::Hcm => {
            let role = role.expect("validated above");
            kernels::hcm(rank, blocks, n_aligned, role, peer_buffers, rings, tensor.data);
        }
    }

    Ok(())
}

/// Test/demo harness: spawn one OS thread per rank, each staging `inputs[r]`
/// and calling `all_reduce`, and return the resulting per-rank buffers.
/// Mirrors how a collaborator would drive the group in a real process-per-
/// rank launch, collapsed onto `std::thread::scope` for in-process use.
pub fn run_group(
    inputs: Vec<Vec<u16>>,
    algo: AllReduceAlgo,
    nvl: &AdjMatrix,
) -> Result<Vec<Vec<u16>>, CollectiveError> {
    let world_size = inputs.len();
    let numel = inputs[0].len();
    let (topology, role) = init_topo_info(nvl, world_size);
    let rings: Vec<Arc<SignalRing>> = (0..world_size).map(|_| init_p2p_state()).collect();

    let alignment = if algo == AllReduceAlgo::TwoShot { world_size * ALIGN_ELEMS } else { ALIGN_ELEMS };
    let n_aligned = align_up(numel.max(1), alignment);
    let relay_room = if algo == AllReduceAlgo::Hcm { n_aligned } else { 0 };
    let peer_buffers: Vec<PeerBuffer> =
        (0..world_size).map(|_| PeerBuffer::zeroed(n_aligned + relay_room)).collect();

    let mut outputs: Vec<Vec<u16>> = inputs.clone();
    let results: Vec<Result<(), CollectiveError>> = std::thread::scope(|s| {
        let pb = &peer_buffers;
        let rings_ref = &rings;
        let role_ref = role.as_ref();
        let handles: Vec<_> = outputs
            .iter_mut()
            .enumerate()
            .map(|(rank, out)| {
                s.spawn(move || {
                    let mut tensor = TensorView::new(out.as_mut_slice(), rank);
                    all_reduce(rank, world_size, &mut tensor, algo, role_ref, pb, rings_ref)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
    });

    for r in results {
        r?;
    }
    write_intra_node_snapshot(algo, topology, world_size, numel * 2, grid_blocks(n_aligned));
    Ok(outputs)
}

/// Record the most recent intra-node dispatch for the `viz` binary, the same
/// way `Cluster::all_reduce` records `last_collective` — read-modify-write
/// the shared snapshot file so transfer/collective history isn't clobbered.
fn write_intra_node_snapshot(algo: AllReduceAlgo, topology: Topology, world_size: usize, bytes_per_rank: usize, blocks: u32) {
    let mut m = metrics::read_metrics().unwrap_or_default();
    m.last_intra_node_all_reduce = Some(IntraNodeAllReduceSnapshot {
        algorithm: algo.to_string(),
        topology: topology.to_string(),
        world_size,
        bytes_per_rank,
        blocks,
    });
    m.timestamp_ms = metrics::now_ms();
    metrics::write_metrics(&m);
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::bf16;

    fn fully_connected(n: usize) -> AdjMatrix {
        let mut m = [[0u32; K_MAX_DEVICES]; K_MAX_DEVICES];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    m[i][j] = 1;
                }
            }
        }
        m
    }

    #[test]
    fn select_algo_prefers_one_shot_below_threshold() {
        let algo = select_all_reduce_algo(1024, Topology::FullyConnected, 4);
        assert_eq!(algo, AllReduceAlgo::OneShot);
    }

    #[test]
    fn select_algo_escalates_to_two_shot() {
        let algo = select_all_reduce_algo(1024 * 1024, Topology::FullyConnected, 4);
        assert_eq!(algo, AllReduceAlgo::TwoShot);
    }

    #[test]
    fn select_algo_rejects_oversized_payload() {
        let algo = select_all_reduce_algo(K_MAX_INTRA_NODE_SIZE + 1, Topology::FullyConnected, 4);
        assert_eq!(algo, AllReduceAlgo::None);
    }

    #[test]
    fn end_to_end_one_shot_four_ranks() {
        let world_size = 4;
        let numel = 8;
        let inputs: Vec<Vec<u16>> = (0..world_size)
            .map(|r| vec![bf16::from_f32(r as f32 + 1.0).to_bits(); numel])
            .collect();

        let outputs =
            run_group(inputs, AllReduceAlgo::OneShot, &fully_connected(world_size)).expect("all_reduce");

        for out in &outputs {
            for &bits in out {
                assert_eq!(bf16::from_bits(bits).to_f32(), 10.0); // 1+2+3+4
            }
        }
    }

    #[test]
    fn end_to_end_two_shot_non_aligned_tail() {
        let world_size = 3;
        let numel = 7;
        let inputs: Vec<Vec<u16>> = vec![
            (1..=7u32).map(|v| bf16::from_f32(v as f32).to_bits()).collect(),
            (1..=7u32).map(|v| bf16::from_f32(v as f32 * 10.0).to_bits()).collect(),
            (1..=7u32).map(|v| bf16::from_f32(v as f32 * 100.0).to_bits()).collect(),
        ];

        let outputs =
            run_group(inputs, AllReduceAlgo::TwoShot, &fully_connected(world_size)).expect("all_reduce");

        for out in &outputs {
            assert_eq!(out.len(), numel);
            for (i, &bits) in out.iter().enumerate() {
                let expected = (i as f32 + 1.0) * 111.0;
                assert!((bf16::from_bits(bits).to_f32() - expected).abs() < 1.0);
            }
        }
    }

    /// Scenario 2 (spec §8): W=4, 65536 bf16 elements (128 KiB) per rank,
    /// each rank's buffer filled with its own rank value. Algo: OneShot.
    #[test]
    fn scenario_w4_rank_value_fill_one_shot() {
        let world_size = 4;
        let numel = 65_536;
        let bytes = numel * 2;
        assert!(bytes <= K_ONE_SHOT_THRESH_BYTES);

        let algo = select_all_reduce_algo(bytes, Topology::FullyConnected, world_size);
        assert_eq!(algo, AllReduceAlgo::OneShot);

        let inputs: Vec<Vec<u16>> =
            (0..world_size).map(|r| vec![bf16::from_f32(r as f32).to_bits(); numel]).collect();
        let outputs = run_group(inputs, algo, &fully_connected(world_size)).expect("all_reduce");

        for out in &outputs {
            assert!(out.iter().all(|&b| bf16::from_bits(b).to_f32() == 6.0)); // 0+1+2+3
        }
    }

    /// Scenario 3 (spec §8): W=8, 3 MiB per rank on an HCM topology. 3 MiB
    /// exceeds `kHcmThreshBytes` (256 KiB), so the selector must return
    /// `None` rather than dispatch HCM — this is the selector-boundary
    /// case, not a reduction to execute.
    #[test]
    fn scenario_w8_three_mib_exceeds_hcm_threshold() {
        let bytes = 3 * 1024 * 1024;
        let algo = select_all_reduce_algo(bytes, Topology::HybridCubeMesh, 8);
        assert_eq!(algo, AllReduceAlgo::None);
    }

    /// Scenario 4 (spec §8): W=8, 5 MiB per rank on FullyConnected. Algo:
    /// TwoShot; expected result is the rank-sum (0+1+...+7 = 28) on every
    /// lane.
    #[test]
    fn scenario_w8_five_mib_two_shot() {
        let world_size = 8;
        let numel = (5 * 1024 * 1024) / 2;
        let bytes = numel * 2;
        assert!(bytes > K_ONE_SHOT_THRESH_BYTES && bytes <= K_TWO_SHOT_THRESH_BYTES);

        let algo = select_all_reduce_algo(bytes, Topology::FullyConnected, world_size);
        assert_eq!(algo, AllReduceAlgo::TwoShot);

        let inputs: Vec<Vec<u16>> =
            (0..world_size).map(|r| vec![bf16::from_f32(r as f32).to_bits(); numel]).collect();
        let outputs = run_group(inputs, algo, &fully_connected(world_size)).expect("all_reduce");

        for out in &outputs {
            assert_eq!(out.len(), numel);
            assert!(out.iter().all(|&b| bf16::from_bits(b).to_f32() == 28.0));
        }
    }

    #[test]
    fn rejects_non_bf16_world_size() {
        let peer_buffers: Vec<PeerBuffer> = (0..9).map(|_| PeerBuffer::zeroed(8)).collect();
        let rings: Vec<Arc<SignalRing>> = (0..9).map(|_| init_p2p_state()).collect();
        let mut data = vec![0u16; 8];
        let mut tensor = TensorView::new(&mut data, 0);
        let err = all_reduce(0, 9, &mut tensor, AllReduceAlgo::OneShot, None, &peer_buffers, &rings)
            .unwrap_err();
        assert_eq!(err, CollectiveError::Configuration(ConfigurationError::WorldSizeOutOfRange { world_size: 9 }));
    }
}
