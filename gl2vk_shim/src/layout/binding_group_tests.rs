use super::*;

#[test]
fn test_new_group_is_empty() {
    let group = BindingGroup::new(0, 20);
    assert!(group.is_empty());
    assert_eq!(group.binding(), 0);
    assert_eq!(group.stride(), 20);
}

#[test]
fn test_stride_last_write_wins() {
    let mut group = BindingGroup::new(0, 20);
    group.set_attribute(0, 8, 0, 24);
    group.set_attribute(1, 12, 8, 32);
    assert_eq!(group.stride(), 32);
}

#[test]
fn test_attribute_overwrite_same_location() {
    let mut group = BindingGroup::new(1, 0);
    group.set_attribute(2, 8, 0, 20);
    group.set_attribute(2, 12, 4, 20);

    let attributes: Vec<_> = group.attributes().collect();
    assert_eq!(attributes, vec![(2, AttributeSlice { size: 12, offset: 4 })]);
}

#[test]
fn test_attributes_sorted_by_location() {
    let mut group = BindingGroup::new(0, 0);
    group.set_attribute(3, 4, 44, 48);
    group.set_attribute(0, 8, 20, 48);
    group.set_attribute(1, 12, 28, 48);

    let locations: Vec<u32> = group.attributes().map(|(location, _)| location).collect();
    assert_eq!(locations, vec![0, 1, 3]);
    assert_eq!(group.len(), 3);
}
