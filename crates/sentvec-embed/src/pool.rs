//! Pooling of token-level hidden states `[B,T,H]` into sentence vectors `[B,H]`
//! (or `[B,2H]` for mean+max), honouring the attention mask.
use anyhow::{bail, Result};
use candle_core::{DType, Tensor};
use sentvec_core::PoolingStrategy;

fn check_rank(hidden: &Tensor) -> Result<()> {
    if hidden.dims().len() != 3 { bail!("hidden shape must be [B,T,H], got {:?}", hidden.dims()); }
    Ok(())
}

/// `[B,T]` mask as `[B,T,1]` in the dtype of `hidden`.
fn mask_3d(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    Ok(attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?)
}

pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    check_rank(hidden)?;
    let mask = mask_3d(hidden, attention_mask)?;
    let sum = hidden.broadcast_mul(&mask)?.sum(1)?;
    let lengths = mask.sum(1)?.affine(1.0, 1e-9)?;
    Ok(sum.broadcast_div(&lengths)?)
}

pub fn masked_max(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    check_rank(hidden)?;
    // padded positions get -1e9 so they never win
    let penalty = mask_3d(hidden, attention_mask)?.affine(1e9, -1e9)?;
    Ok(hidden.broadcast_add(&penalty)?.max(1)?)
}

pub fn first_token(hidden: &Tensor) -> Result<Tensor> {
    check_rank(hidden)?;
    Ok(hidden.narrow(1, 0, 1)?.squeeze(1)?)
}

/// Last unmasked position of each row.
pub fn last_token(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    check_rank(hidden)?;
    let lengths = attention_mask.to_dtype(DType::F32)?.sum(1)?.to_vec1::<f32>()?;
    let mut rows = Vec::with_capacity(lengths.len());
    for (b, len) in lengths.iter().enumerate() {
        let idx = (*len as usize).saturating_sub(1);
        rows.push(hidden.narrow(0, b, 1)?.narrow(1, idx, 1)?.squeeze(1)?);
    }
    Ok(Tensor::cat(&rows, 0)?)
}

pub fn pool(hidden: &Tensor, attention_mask: &Tensor, strategy: PoolingStrategy) -> Result<Tensor> {
    match strategy {
        PoolingStrategy::ReduceMean => masked_mean(hidden, attention_mask),
        PoolingStrategy::ReduceMax => masked_max(hidden, attention_mask),
        PoolingStrategy::ReduceMeanMax => {
            let mean = masked_mean(hidden, attention_mask)?;
            let max = masked_max(hidden, attention_mask)?;
            Ok(Tensor::cat(&[&mean, &max], 1)?)
        }
        PoolingStrategy::FirstToken => first_token(hidden),
        PoolingStrategy::LastToken => last_token(hidden, attention_mask),
        PoolingStrategy::None => bail!("pooling strategy NONE yields token matrices, not sentence vectors"),
    }
}

/// Row-wise L2 normalization of a `[B,H]` tensor.
pub fn l2_normalize(pooled: &Tensor) -> Result<Tensor> {
    let eps_val = match pooled.dtype() { DType::F16 | DType::BF16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], pooled.device())?.to_dtype(pooled.dtype())?.unsqueeze(0)?;
    let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    Ok(pooled.broadcast_div(&norm)?)
}
