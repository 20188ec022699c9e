/// Error taxonomy for the intra-node all-reduce core.
///
/// Recoverable errors surface to the caller at the dispatcher boundary; the
/// core never retries and never blocks waiting for a missing peer beyond the
/// handshake described in `peer::barrier`.
use thiserror::Error;

/// Rejected before any kernel is launched — the collective never starts.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigurationError {
    #[error("dtype must be bf16")]
    DtypeNotBf16,

    #[error("tensor device {tensor_device} does not match caller rank {rank}")]
    DeviceMismatch { tensor_device: usize, rank: usize },

    #[error("tensor stride {stride} is not dense (expected 1)")]
    NotDense { stride: usize },

    #[error("payload of {bytes} bytes exceeds kMaxIntraNodeSize ({max} bytes)")]
    PayloadTooLarge { bytes: usize, max: usize },

    #[error("world_size {world_size} is out of range [2, 8]")]
    WorldSizeOutOfRange { world_size: usize },

    #[error("HCM algorithm requires world_size == 8, got {world_size}")]
    HcmRequiresEight { world_size: usize },

    #[error("topology is not classifiable for the requested algorithm")]
    UnclassifiableTopology,
}

/// The device architecture lacks the instructions the protocol needs.
/// Surfaced by `is_supported()`; callers must check before calling
/// `all_reduce` — `all_reduce` itself does not re-check.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CapabilityError {
    #[error("device architecture lacks packed bf16 add")]
    NoPackedBf16Add,

    #[error("device architecture lacks system-scope atomics")]
    NoSystemScopeAtomics,
}

/// Kernel-launch failure reported by the runtime. Reserved for a real GPU
/// backend; the host simulator cannot fail a launch once validation passes,
/// so this variant is part of the taxonomy but never constructed today.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LaunchError {
    #[error("kernel launch failed: {reason}")]
    RuntimeRejected { reason: String },
}

/// Umbrella error returned by `all_reduce`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CollectiveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}
