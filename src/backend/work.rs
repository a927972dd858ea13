//! Work-group sizing for 2D kernel ranges.

use super::DeviceLimits;

/// Largest local size the device accepts: start from the per-dimension
/// maxima and halve dimensions in turn (latitude first) until the total fits
/// the maximum work-group size.
pub fn local_work_sizes(limits: &DeviceLimits) -> [u32; 2] {
    let mut local = limits.max_work_item_sizes.map(|size| size.max(1));
    let max_total = limits.max_work_group_size.max(1) as u64;

    let mut dimension = 0;
    while local[0] as u64 * local[1] as u64 > max_total {
        if local[dimension] > 1 {
            local[dimension] /= 2;
        }
        dimension = (dimension + 1) % local.len();
    }
    local
}

/// Pad each size up to the next multiple of the local size
pub fn global_work_sizes(local: [u32; 2], sizes: [u32; 2]) -> [u32; 2] {
    [
        sizes[0].div_ceil(local[0]) * local[0],
        sizes[1].div_ceil(local[1]) * local[1],
    ]
}

/// Work groups to dispatch per dimension
pub fn workgroup_counts(local: [u32; 2], global: [u32; 2]) -> [u32; 2] {
    [global[0] / local[0], global[1] / local[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_four_over_hundred_square() {
        let limits = DeviceLimits {
            max_work_group_size: 64,
            max_work_item_sizes: [256, 256],
        };
        let local = local_work_sizes(&limits);
        assert!(local[0] * local[1] <= 64);
        assert_eq!(local, [8, 8]);

        let global = global_work_sizes(local, [100, 100]);
        assert_eq!(global, [104, 104]);
        assert_eq!(workgroup_counts(local, global), [13, 13]);
    }

    #[test]
    fn test_global_is_smallest_covering_multiple() {
        let local = [16, 4];
        for size in [1u32, 15, 16, 17, 33, 100] {
            let global = global_work_sizes(local, [size, size]);
            for d in 0..2 {
                assert!(global[d] >= size);
                assert_eq!(global[d] % local[d], 0);
                assert!(global[d] - size < local[d]);
            }
        }
    }

    #[test]
    fn test_halving_rotates_between_dimensions() {
        let limits = DeviceLimits {
            max_work_group_size: 128,
            max_work_item_sizes: [64, 64],
        };
        // 64x64 -> 32x64 -> 32x32 -> 16x32 -> 16x16 -> 8x16
        assert_eq!(local_work_sizes(&limits), [8, 16]);
    }

    #[test]
    fn test_already_fitting_sizes_are_kept() {
        let limits = DeviceLimits {
            max_work_group_size: 256,
            max_work_item_sizes: [16, 16],
        };
        assert_eq!(local_work_sizes(&limits), [16, 16]);
    }

    #[test]
    fn test_degenerate_limits_terminate() {
        let limits = DeviceLimits {
            max_work_group_size: 0,
            max_work_item_sizes: [1, 8],
        };
        assert_eq!(local_work_sizes(&limits), [1, 1]);
    }
}
