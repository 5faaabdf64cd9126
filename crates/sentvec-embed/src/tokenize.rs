use anyhow::{anyhow, bail, Result};
use candle_core::{Device, Tensor};
use sentvec_core::SentenceInput;
use tokenizers::{Encoding, Tokenizer};

/// Padded model inputs for one batch, all `[B,T]` with `T` the longest row.
pub struct Batch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

pub fn pad_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0)
}

/// Token lists go through the tokenizer as pre-split words.
pub fn encode_input(tokenizer: &Tokenizer, input: &SentenceInput) -> Result<Encoding> {
    let enc = match input {
        SentenceInput::Text(text) => tokenizer.encode(text.as_str(), true),
        SentenceInput::Tokens(tokens) => tokenizer.encode(tokens.clone(), true),
    };
    enc.map_err(|e| anyhow!("Tokenization failed: {}", e))
}

pub fn tokenize_batch_on_device(
    tokenizer: &Tokenizer,
    inputs: &[SentenceInput],
    max_len: usize,
    device: &Device,
) -> Result<Batch> {
    if inputs.is_empty() { bail!("cannot tokenize an empty batch"); }
    if max_len == 0 { bail!("max_len must be positive"); }
    let mut rows = Vec::with_capacity(inputs.len());
    for input in inputs {
        let enc = encode_input(tokenizer, input)?;
        let mut ids = enc.get_ids().to_vec();
        let mut types = enc.get_type_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > max_len { ids.truncate(max_len); types.truncate(max_len); mask.truncate(max_len); }
        rows.push((ids, types, mask));
    }

    let width = rows.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(0).max(1);
    let pad = pad_id(tokenizer);
    let (mut all_ids, mut all_types, mut all_mask) = (Vec::new(), Vec::new(), Vec::new());
    for (mut ids, mut types, mut mask) in rows {
        let missing = width - ids.len();
        ids.extend(std::iter::repeat(pad).take(missing));
        types.extend(std::iter::repeat(0).take(missing));
        mask.extend(std::iter::repeat(0).take(missing));
        all_ids.extend(ids);
        all_types.extend(types);
        all_mask.extend(mask);
    }
    let shape = (inputs.len(), width);
    Ok(Batch {
        input_ids: Tensor::from_vec(all_ids, shape, device)?,
        token_type_ids: Tensor::from_vec(all_types, shape, device)?,
        attention_mask: Tensor::from_vec(all_mask, shape, device)?,
    })
}
