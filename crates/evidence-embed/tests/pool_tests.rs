use candle_core::{Device, Tensor};
use evidence_embed::cls_l2;

#[test]
fn cls_l2_takes_first_token_and_normalises() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; only the first (CLS) token is pooled.
    let h = Tensor::from_slice(&[3.0f32, 0.0, 4.0, 0.0,  // token 0
                                 5.0, 6.0, 7.0, 8.0],    // token 1
                               (1, 2, 4), &dev).unwrap();
    let out = cls_l2(&h).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let expected = [0.6f32, 0.0, 0.8, 0.0];
    for (a, b) in v[0].iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}
