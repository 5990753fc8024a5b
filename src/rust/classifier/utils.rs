use ndarray::{Array1, ArrayView1};

pub(crate) fn normalize_vector(vec: &Array1<f32>) -> Array1<f32> {
    let norm: f32 = vec.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec / norm
    } else {
        Array1::zeros(vec.len())
    }
}

pub(crate) fn average_vectors(vectors: &[Array1<f32>], embedding_size: usize) -> Array1<f32> {
    if vectors.is_empty() {
        return Array1::zeros(embedding_size);
    }
    let sum = vectors.iter().fold(Array1::zeros(vectors[0].len()), |acc, v| acc + v);
    sum / vectors.len() as f32
}

/// Numerically stable softmax of `logits / temperature`.
pub(crate) fn softmax(logits: ArrayView1<f32>, temperature: f32) -> Array1<f32> {
    if logits.is_empty() {
        return Array1::zeros(0);
    }
    let scaled = logits.mapv(|x| x / temperature);
    let max = scaled.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = scaled.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn uniform(len: usize) -> Array1<f32> {
    if len == 0 {
        return Array1::zeros(0);
    }
    Array1::from_elem(len, 1.0 / len as f32)
}
