use crate::layers::parameter::Parameter;

/// Rescales all gradients so their joint L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping.
pub fn clip_grad_norm(params: &mut [&mut Parameter], max_norm: f64) -> f64 {
    let total_norm = params.iter().map(|p| p.grad_sq_norm()).sum::<f64>().sqrt();
    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1.0 {
        for p in params.iter_mut() {
            p.grad.data.iter_mut().for_each(|g| *g *= clip_coef);
        }
    }
    total_norm
}
