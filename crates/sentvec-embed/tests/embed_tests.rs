use sentvec_core::{Embedder, SentenceInput, Tokenization};
use sentvec_embed::HashingEmbedder;

#[test]
fn hashing_embedder_shapes_and_determinism() {
    let embedder = HashingEmbedder::new(64);
    let inputs = vec![SentenceInput::Text("hello world".into()), SentenceInput::Text("hello world".into())];
    let embs = embedder.embed_batch(&inputs).expect("embed_batch");
    assert_eq!(embs.len(), 2);
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 64);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn token_and_text_forms_agree() {
    let embedder = HashingEmbedder::new(32);
    let raw = Tokenization::Raw.apply("a  man plays");
    let toks = Tokenization::Whitespace.apply("a  man plays");
    let out = embedder.embed_batch(&[raw, toks]).unwrap();
    assert_eq!(out[0], out[1]);
}

#[test]
fn empty_sentence_still_embeds() {
    let embedder = HashingEmbedder::new(8);
    let out = embedder.embed_batch(&[SentenceInput::Text(String::new())]).unwrap();
    assert_eq!(out[0], vec![0.0; 8]);
}
