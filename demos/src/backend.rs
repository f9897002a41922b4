//! Backend selection for the piecewise CRF tools.
//!
//! The tools are generic over Burn backends; this module picks one at compile time
//! from the `cuda`, `wgpu` and `ndarray` features, in that order of preference.
//! `loss_smoke` wraps the selection in `Autodiff` to get gradients.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        use burn::backend::cuda::{Cuda, CudaDevice};

        /// Selected backend type
        pub type SelectedBackend = Cuda;
        /// Selected device type
        pub type SelectedDevice = CudaDevice;

        /// Creates the device records are batched onto and scores are drawn on
        pub fn create_device() -> SelectedDevice {
            CudaDevice::default()
        }

        /// Gets the backend name reported in the tool logs
        pub const fn get_backend_name() -> &'static str {
            "CUDA (NVIDIA GPU)"
        }
    } else if #[cfg(feature = "wgpu")] {
        use burn::backend::wgpu::{Wgpu, WgpuDevice};

        /// Selected backend type
        pub type SelectedBackend = Wgpu;
        /// Selected device type
        pub type SelectedDevice = WgpuDevice;

        /// Creates the device records are batched onto and scores are drawn on
        pub fn create_device() -> SelectedDevice {
            WgpuDevice::default()
        }

        /// Gets the backend name reported in the tool logs
        pub const fn get_backend_name() -> &'static str {
            "WGPU (GPU)"
        }
    } else {
        // CPU fallback when no GPU feature is enabled
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        /// Selected backend type
        pub type SelectedBackend = NdArray;
        /// Selected device type
        pub type SelectedDevice = NdArrayDevice;

        /// Creates the device records are batched onto and scores are drawn on
        pub fn create_device() -> SelectedDevice {
            NdArrayDevice::default()
        }

        /// Gets the backend name reported in the tool logs
        pub const fn get_backend_name() -> &'static str {
            "NdArray (CPU)"
        }
    }
}

#[cfg(all(test, not(any(feature = "cuda", feature = "wgpu"))))]
mod tests {
    use burn::tensor::Tensor;

    use super::*;

    #[test]
    fn cpu_backend_is_selected_without_gpu_features() {
        assert_eq!(get_backend_name(), "NdArray (CPU)");

        let device = create_device();
        let zeros = Tensor::<SelectedBackend, 1>::zeros([3], &device);
        assert_eq!(zeros.dims(), [3]);
    }
}
