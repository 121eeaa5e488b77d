//! Compute backend selection
//!
//! The backend is fixed at compile time: `cuda` when that feature is on, otherwise the
//! NdArray CPU backend. Training runs on the autodiff wrapper of the same backend and
//! evaluation runs on the plain one, so the device is threaded explicitly through the
//! trainer and the evaluator instead of being picked up from global state.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray")))]
compile_error!("Enable one backend feature: `ndarray` (CPU) or `cuda` (GPU)");

/// Autodiff backend used by the training loop
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device handle of the selected backend
pub type ComputeDevice = <DefaultBackend as Backend>::Device;

/// First device of the selected backend (GPU 0 for CUDA, the host for NdArray)
pub fn default_device() -> ComputeDevice {
    ComputeDevice::default()
}

/// Human-readable backend name for the run banner
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}
