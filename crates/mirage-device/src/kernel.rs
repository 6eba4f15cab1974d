//! Kernel invocation descriptor
//!
//! One launch of a kernel with fixed global/local sizes. The simulator
//! shares the descriptor with observers as `Arc<KernelInvocation>` for the
//! duration of the launch; observers drop their clone at `kernel_end`.

use crate::dim::Dim3;

/// One launch of a kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInvocation {
    name: String,
    global_size: Dim3,
    local_size: Dim3,
}

impl KernelInvocation {
    /// Create a descriptor for a launch
    ///
    /// `local_size` must divide `global_size` in every dimension.
    pub fn new(name: impl Into<String>, global_size: Dim3, local_size: Dim3) -> Self {
        Self {
            name: name.into(),
            global_size,
            local_size,
        }
    }

    /// Kernel name, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total work-items in each dimension
    pub const fn global_size(&self) -> Dim3 {
        self.global_size
    }

    /// Work-items per work-group in each dimension
    pub const fn local_size(&self) -> Dim3 {
        self.local_size
    }

    /// Work-groups in each dimension
    pub fn num_groups(&self) -> Dim3 {
        self.global_size / self.local_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_groups() {
        let invocation = KernelInvocation::new("vecadd", Dim3::new(8, 4, 1), Dim3::new(2, 2, 1));
        assert_eq!(invocation.num_groups(), Dim3::new(4, 2, 1));
        assert_eq!(invocation.name(), "vecadd");
    }

    #[test]
    fn test_one_dimensional_launch() {
        let invocation = KernelInvocation::new("scan", Dim3::linear(4), Dim3::linear(2));
        assert_eq!(invocation.global_size().product(), 4);
        assert_eq!(invocation.num_groups(), Dim3::linear(2));
    }
}
