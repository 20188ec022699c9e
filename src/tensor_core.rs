/// Tensor Core simulation.
/// Tensor cores are dedicated hardware units within each SM subpartition
/// that accelerate matrix multiply-accumulate (MMA) operations.
/// On H100, they support fp8, fp16, bf16, tf32, and fp64 precisions.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Precision {
    FP8,
    FP16,
    BF16,
    TF32,
    FP64,
}

/// A Tensor Core unit capable of performing matrix multiply-accumulate (MMA) ops.
pub struct TensorCore {
    pub precision: Precision,
}

impl TensorCore {
    pub fn new() -> Self {
        TensorCore {
            precision: Precision::BF16,
        }
    }

    /// Perform a matrix multiply-accumulate: D = A * B + C
    /// Matrices are represented as flat row-major Vec<f32> for now.
    pub fn mma(
        &self,
        a: &[f32],
        b: &[f32],
        c: &[f32],
        m: usize,
        n: usize,
        k: usize,
    ) -> Vec<f32> {
        assert_eq!(a.len(), m * k);
        assert_eq!(b.len(), k * n);
        assert_eq!(c.len(), m * n);

        let mut d = c.to_vec();
        for i in 0..m {
            for j in 0..n {
                for l in 0..k {
                    d[i * n + j] += a[i * k + l] * b[l * n + j];
                }
            }
        }
        d
    }
}
