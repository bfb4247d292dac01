/// Issues unique, strictly increasing `u32` handles.
///
/// Unlike a slot allocator, handles are never recycled: a value handed out
/// once is never handed out again by the same allocator, even after the
/// object it named is gone. Zero is never issued so it can stand for
/// "no handle".
///
/// # Example
///
/// ```ignore
/// let mut alloc = HandleAllocator::new();
/// let a = alloc.alloc();  // 1
/// let b = alloc.alloc();  // 2
/// assert!(b > a);
/// ```
#[derive(Debug)]
pub struct HandleAllocator {
    next_id: u32,
}

impl HandleAllocator {
    /// Create a new allocator; the first handle issued is 1
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Issue the next handle
    pub fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "handle_allocator_tests.rs"]
mod tests;
