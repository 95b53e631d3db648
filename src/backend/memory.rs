// Memory type selection
//
// Picks a device memory type index that the resource allows (requirement
// bitmask) and that provides every desired property flag.

use ash::vk;

use crate::error::{ErrorKind, RenderError, RenderResult};

/// Scan the advertised memory types in ascending order and return the first
/// index allowed by `type_bits` whose flags contain all of `desired`.
///
/// `None` means no type matches. There is no fallback to weaker flags.
pub fn select_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    desired: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count).find(|&i| {
        let allowed = type_bits & (1 << i) != 0;
        allowed
            && properties.memory_types[i as usize]
                .property_flags
                .contains(desired)
    })
}

/// Same as [`select_memory_type`] but for a resource's requirements, as a
/// recoverable error when nothing matches.
pub fn memory_type_for(
    properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    desired: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    select_memory_type(properties, requirements.memory_type_bits, desired).ok_or_else(|| {
        RenderError::warning(ErrorKind::NoSuitableMemoryType {
            type_bits: requirements.memory_type_bits,
            desired,
        })
    })
}
