use candle_core::{DType, Device, Tensor};
use sentvec_core::PoolingStrategy;
use sentvec_embed::pool::{l2_normalize, pool};

/// Batch of 2, three tokens, hidden dim 2. Row 0 has its last token masked.
fn fixture() -> (Tensor, Tensor) {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 2.0,   3.0, 4.0,   100.0, 100.0,
                                 -1.0, 0.0,   5.0, -6.0,   7.0, 8.0],
                               (2, 3, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 0, 1, 1, 1], (2, 3), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    (h, mask)
}

fn rows(t: Tensor) -> Vec<Vec<f32>> { t.to_vec2().unwrap() }

fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.len(), y.len());
        for (p, q) in x.iter().zip(y) { assert!((p - q).abs() < 1e-5, "{p} vs {q}"); }
    }
}

#[test]
fn mean_ignores_padding() {
    let (h, m) = fixture();
    let out = rows(pool(&h, &m, PoolingStrategy::ReduceMean).unwrap());
    assert_close(&out, &[vec![2.0, 3.0], vec![11.0 / 3.0, 2.0 / 3.0]]);
}

#[test]
fn max_ignores_padding() {
    let (h, m) = fixture();
    let out = rows(pool(&h, &m, PoolingStrategy::ReduceMax).unwrap());
    assert_close(&out, &[vec![3.0, 4.0], vec![7.0, 8.0]]);
}

#[test]
fn mean_max_concatenates() {
    let (h, m) = fixture();
    let out = rows(pool(&h, &m, PoolingStrategy::ReduceMeanMax).unwrap());
    assert_eq!(out[0].len(), 4);
    assert_close(&out[..1], &[vec![2.0, 3.0, 3.0, 4.0]]);
}

#[test]
fn first_and_last_token() {
    let (h, m) = fixture();
    let first = rows(pool(&h, &m, PoolingStrategy::FirstToken).unwrap());
    assert_close(&first, &[vec![1.0, 2.0], vec![-1.0, 0.0]]);
    let last = rows(pool(&h, &m, PoolingStrategy::LastToken).unwrap());
    assert_close(&last, &[vec![3.0, 4.0], vec![7.0, 8.0]]);
}

#[test]
fn none_is_rejected() {
    let (h, m) = fixture();
    assert!(pool(&h, &m, PoolingStrategy::None).is_err());
}

#[test]
fn l2_normalize_unit_rows() {
    let t = Tensor::from_slice(&[3.0f32, 4.0, 0.0, 2.0], (2, 2), &Device::Cpu).unwrap();
    let out = rows(l2_normalize(&t).unwrap());
    assert_close(&out, &[vec![0.6, 0.8], vec![0.0, 1.0]]);
}
