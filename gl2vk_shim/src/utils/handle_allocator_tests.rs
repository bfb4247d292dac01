use super::*;

// ============================================================================
// Allocation tests
// ============================================================================

#[test]
fn test_first_handle_is_one() {
    let mut alloc = HandleAllocator::new();
    assert_eq!(alloc.alloc(), 1);
}

#[test]
fn test_sequential_alloc_is_strictly_increasing() {
    let mut alloc = HandleAllocator::new();
    let mut last = 0;
    for _ in 0..100 {
        let id = alloc.alloc();
        assert!(id > last);
        last = id;
    }
    assert_eq!(last, 100);
}

#[test]
fn test_default_matches_new() {
    let mut alloc = HandleAllocator::default();
    assert_eq!(alloc.alloc(), 1);
}

#[test]
fn test_independent_allocators_do_not_share_state() {
    let mut attributes = HandleAllocator::new();
    let mut uniforms = HandleAllocator::new();
    assert_eq!(attributes.alloc(), 1);
    assert_eq!(attributes.alloc(), 2);
    assert_eq!(uniforms.alloc(), 1);
}
