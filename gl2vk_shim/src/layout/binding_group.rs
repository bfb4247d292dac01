/// Per-buffer-slot attribute group

use std::collections::BTreeMap;

/// Size and offset of one attribute within its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSlice {
    pub size: u32,
    pub offset: u32,
}

/// Attributes sourced from one buffer slot
///
/// Created lazily on the first pointer call that names a new slot and
/// mutated in place by every later call. The stride is whatever the most
/// recent call specified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingGroup {
    /// Backend binding index (dense, assigned in creation order)
    binding: u32,
    stride: u32,
    /// Keyed by declared location so attribute descriptors come out sorted
    attributes: BTreeMap<u32, AttributeSlice>,
}

impl BindingGroup {
    /// Create an empty group
    ///
    /// # Arguments
    ///
    /// * `binding` - Backend binding index for this group
    /// * `stride` - Initial stride (the stage's packed attribute size)
    pub fn new(binding: u32, stride: u32) -> Self {
        Self {
            binding,
            stride,
            attributes: BTreeMap::new(),
        }
    }

    /// Record an attribute at `location`, replacing any previous entry,
    /// and overwrite the group stride
    pub fn set_attribute(&mut self, location: u32, size: u32, offset: u32, stride: u32) {
        self.attributes.insert(location, AttributeSlice { size, offset });
        self.stride = stride;
    }

    pub fn binding(&self) -> u32 {
        self.binding
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Attributes in ascending location order
    pub fn attributes(&self) -> impl Iterator<Item = (u32, AttributeSlice)> + '_ {
        self.attributes.iter().map(|(location, slice)| (*location, *slice))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
#[path = "binding_group_tests.rs"]
mod tests;
