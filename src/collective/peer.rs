/// Cross-device shared state: `PeerBuffer` (payload) and `SignalRing`
/// (handshake), plus the block-level barrier that replaces per-thread
/// acquire/release fencing (spec §4.1).
///
/// `PeerBuffer` allocation and registration across devices is a
/// collaborator's job (bootstrap/rendezvous, out of scope per §1); the
/// core only ever borrows `&[PeerBuffer]`. `SignalRing` lifecycle *is*
/// core surface (`init_p2p_state`), so it owns its own zeroing and no
/// caller-visible reset step exists between collectives.
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use super::bf16_ops::{PackedBf16, LANES};

/// Maximum world size a `SignalRing` table is sized for.
pub const MAX_DEVICES: usize = 8;
/// Maximum block count per grid a `SignalRing` table is sized for.
pub const MAX_BLOCKS: usize = 24;

// ---------------------------------------------------------------------------
// PeerBuffer
// ---------------------------------------------------------------------------

/// A peer-visible region of device memory, mapped for direct read/write by
/// every rank in the group. Addressed in bf16 elements (2 bytes each).
///
/// Loads/stores come in two flavors, matching §4.1/§4.2:
///   - `*_respecting`: `Acquire`/`Release` — ordering established locally.
///   - `*_streaming`: `Relaxed` — ordering is established separately, by a
///     `SignalRing` barrier; this is the "cache-bypassing" traffic the
///     protocol is built around.
pub struct PeerBuffer {
    cells: Box<[AtomicU16]>,
}

impl PeerBuffer {
    /// Allocate and zero a peer buffer of `len_elems` bf16 slots. Stands in
    /// for the real NVLink-mapped allocation a collaborator would hand the
    /// core in production; used directly by tests and the demo harness.
    pub fn zeroed(len_elems: usize) -> Self {
        let cells = (0..len_elems).map(|_| AtomicU16::new(0)).collect::<Vec<_>>();
        PeerBuffer { cells: cells.into_boxed_slice() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn load_streaming(&self, idx: usize) -> u16 {
        self.cells[idx].load(Ordering::Relaxed)
    }

    pub fn store_streaming(&self, idx: usize, val: u16) {
        self.cells[idx].store(val, Ordering::Relaxed);
    }

    pub fn load_respecting(&self, idx: usize) -> u16 {
        self.cells[idx].load(Ordering::Acquire)
    }

    pub fn store_respecting(&self, idx: usize, val: u16) {
        self.cells[idx].store(val, Ordering::Release);
    }

    /// Load a packed 8-lane unit starting at element offset `idx` with
    /// cache-bypassing semantics.
    pub fn load_packed_streaming(&self, idx: usize) -> PackedBf16 {
        let mut bits = [0u16; LANES];
        for (lane, bit) in bits.iter_mut().enumerate() {
            *bit = self.load_streaming(idx + lane);
        }
        PackedBf16::from_bits(bits)
    }

    /// Store a packed 8-lane unit starting at element offset `idx` with
    /// cache-bypassing semantics.
    pub fn store_packed_streaming(&self, idx: usize, packed: PackedBf16) {
        let bits = packed.to_bits();
        for (lane, bit) in bits.into_iter().enumerate() {
            self.store_streaming(idx + lane, bit);
        }
    }

    /// Cache-respecting packed load — used for the HCM relay scratch, which
    /// is written once and re-read on the same device.
    pub fn load_packed_respecting(&self, idx: usize) -> PackedBf16 {
        let mut bits = [0u16; LANES];
        for (lane, bit) in bits.iter_mut().enumerate() {
            *bit = self.load_respecting(idx + lane);
        }
        PackedBf16::from_bits(bits)
    }

    pub fn store_packed_respecting(&self, idx: usize, packed: PackedBf16) {
        let bits = packed.to_bits();
        for (lane, bit) in bits.into_iter().enumerate() {
            self.store_respecting(idx + lane, bit);
        }
    }

    /// Write a lane-by-lane guarded tail fragment (the `i + lane < numel`
    /// boundary handling of §4.3/§4.5).
    pub fn store_tail(&self, idx: usize, packed: PackedBf16, valid_lanes: usize) {
        let bits = packed.to_bits();
        for (lane, bit) in bits.into_iter().take(valid_lanes).enumerate() {
            self.store_streaming(idx + lane, bit);
        }
    }
}

// ---------------------------------------------------------------------------
// SignalRing
// ---------------------------------------------------------------------------

/// Per-device fixed-size table of 32-bit counters, `signals[phase][block][peer]`.
/// Two phase tables let the two-shot algorithm sequence its two barriers
/// without resetting state between them (spec §3).
pub struct SignalRing {
    signals: [[[AtomicU32; MAX_DEVICES]; MAX_BLOCKS]; 2],
}

impl SignalRing {
    /// Allocate and zero one `SignalRing`. This is `init_p2p_state()` from
    /// §6 — core-owned lifecycle, unlike `PeerBuffer`.
    pub fn zeroed() -> Arc<SignalRing> {
        let signals = std::array::from_fn(|_phase| {
            std::array::from_fn(|_block| std::array::from_fn(|_peer| AtomicU32::new(0)))
        });
        Arc::new(SignalRing { signals })
    }

    /// Every counter is zero — the steady-state invariant §8 tests after
    /// every completed collective.
    pub fn all_zero(&self) -> bool {
        self.signals
            .iter()
            .all(|phase| phase.iter().all(|block| block.iter().all(|c| c.load(Ordering::Relaxed) == 0)))
    }
}

// ---------------------------------------------------------------------------
// MemProtocol barrier
// ---------------------------------------------------------------------------

/// Release: increment the counter this rank owns in every peer's
/// `SignalRing`, at `(phase, block_idx, my_rank)`.
fn release(rings: &[Arc<SignalRing>], phase: usize, block_idx: usize, my_rank: usize, peers: &[usize]) {
    for &peer in peers {
        rings[peer].signals[phase][block_idx][my_rank].fetch_add(1, Ordering::Release);
    }
}

/// Acquire: for each expected peer, spin on this rank's own `SignalRing`
/// entry with a compare-exchange that decrements only when positive, so a
/// balanced phase returns every counter to zero (§4.1 item 3, §8 steady
/// state). `std::thread::yield_now` is a host-simulation concession — real
/// warp schedulers need no equivalent (see `SPEC_FULL.md` §10.1).
fn acquire(my_ring: &SignalRing, phase: usize, block_idx: usize, peers: &[usize]) {
    for &peer in peers {
        let counter = &my_ring.signals[phase][block_idx][peer];
        loop {
            let cur = counter.load(Ordering::Acquire);
            if cur > 0 {
                if counter.compare_exchange(cur, cur - 1, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    break;
                }
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// One block-level barrier: release to every rank in `peers`, then acquire
/// from every rank in `peers`. This is the cross-device half of the
/// protocol; the intra-block `__syncthreads()` half is a no-op in this
/// simulator, where one host thread already represents an entire device's
/// sequential block execution (see `SPEC_FULL.md` §10.1).
pub fn barrier(
    rings: &[Arc<SignalRing>],
    my_rank: usize,
    my_ring: &SignalRing,
    phase: usize,
    block_idx: usize,
    peers: &[usize],
) {
    release(rings, phase, block_idx, my_rank, peers);
    acquire(my_ring, phase, block_idx, peers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn balanced_barrier_returns_every_counter_to_zero() {
        let world_size = 4usize;
        let rings: Vec<Arc<SignalRing>> = (0..world_size).map(|_| SignalRing::zeroed()).collect();
        let peers: Vec<usize> = (0..world_size).collect();

        thread::scope(|s| {
            for rank in 0..world_size {
                let rings = &rings;
                let peers = peers.clone();
                s.spawn(move || {
                    barrier(rings, rank, &rings[rank], 0, 0, &peers);
                });
            }
        });

        for ring in &rings {
            assert!(ring.all_zero());
        }
    }

    #[test]
    fn two_phase_tables_do_not_interfere() {
        let world_size = 2usize;
        let rings: Vec<Arc<SignalRing>> = (0..world_size).map(|_| SignalRing::zeroed()).collect();
        let peers: Vec<usize> = (0..world_size).collect();

        thread::scope(|s| {
            for rank in 0..world_size {
                let rings = &rings;
                let peers = peers.clone();
                s.spawn(move || {
                    barrier(rings, rank, &rings[rank], 0, 0, &peers);
                    barrier(rings, rank, &rings[rank], 1, 0, &peers);
                });
            }
        });

        for ring in &rings {
            assert!(ring.all_zero());
        }
    }

    #[test]
    fn peer_buffer_packed_round_trip() {
        use half::bf16;
        let buf = PeerBuffer::zeroed(16);
        let packed = PackedBf16::from_bits([bf16::from_f32(2.5).to_bits(); LANES]);
        buf.store_packed_streaming(0, packed);
        let back = buf.load_packed_streaming(0);
        assert_eq!(back, packed);
    }
}
