//! End-to-end tests for table creation, mutation, cloning, element
//! segments, the guest-visible libcalls and fault-address resolution.

use std::sync::Arc;
use weft_types::{
    Elem, FunctionIndex, FunctionType, TableStyle, TableType, TrapCode, Type,
    RESERVED_TABLE_ELEMENTS,
};
use weft_vm::libcalls::{self, VMContext};
use weft_vm::{
    is_address_owned_by_table, Compartment, ModuleInstance, Reference, ResourceQuota,
    SignatureRegistry, Table,
};

fn funcref_table(minimum: u32, maximum: Option<u32>) -> TableType {
    TableType::new(Type::FuncRef, minimum, maximum)
}

/// An instance with four `() -> ()` functions, one `(i32) -> ()` function
/// and the given element segments.
fn test_instance(elem_segments: Vec<Vec<Elem>>) -> Arc<ModuleInstance> {
    let signatures = Arc::new(SignatureRegistry::new());
    let nullary = FunctionType::new(vec![], vec![]);
    let unary = FunctionType::new(vec![Type::I32], vec![]);
    let mut functions: Vec<(String, FunctionType)> = (0..4)
        .map(|index| (format!("f{}", index), nullary.clone()))
        .collect();
    functions.push(("g".to_string(), unary));
    ModuleInstance::new(signatures, functions, elem_segments)
}

fn function(instance: &ModuleInstance, index: u32) -> Reference {
    instance
        .function(FunctionIndex::from_u32(index))
        .expect("test function index")
}

#[test]
fn create_respects_min_and_max() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);

    let table = Table::new(funcref_table(2, Some(4)), Some(f), "scenario 1", None).unwrap();
    assert_eq!(table.size(), 2);
    assert_eq!(table.get(0).unwrap(), Some(f));
    assert_eq!(table.get(1).unwrap(), Some(f));
    assert_eq!(
        table.get(2).unwrap_err().trap_code(),
        TrapCode::TableAccessOutOfBounds
    );
}

#[test]
fn tables_adopt_the_style_for_their_element_type() {
    let table = Table::new(funcref_table(1, None), None, "styled", None).unwrap();
    assert_eq!(*table.style(), TableStyle::for_element(Type::FuncRef));
    assert_eq!(*table.style(), TableStyle::CallerChecksSignature);
}

#[test]
fn create_rejects_min_above_max() {
    assert!(Table::new(funcref_table(5, Some(4)), None, "inverted", None).is_err());
}

#[test]
fn grow_beyond_max_fails_atomically() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);
    let quota = Arc::new(ResourceQuota::new(100));

    let table = Table::new(
        funcref_table(2, Some(4)),
        Some(f),
        "scenario 2",
        Some(quota.clone()),
    )
    .unwrap();
    assert_eq!(quota.table_elems_used(), 2);

    assert!(table.grow(3, None).is_err());
    assert_eq!(table.size(), 2);
    assert_eq!(table.get(0).unwrap(), Some(f));
    assert_eq!(table.get(1).unwrap(), Some(f));
    assert_eq!(quota.table_elems_used(), 2);

    // The rejected delta left room for a legal grow.
    assert_eq!(table.grow(2, None).unwrap(), 2);
    assert_eq!(table.size(), 4);
    assert_eq!(quota.table_elems_used(), 4);
}

#[test]
fn grow_denied_by_quota_changes_nothing() {
    let quota = Arc::new(ResourceQuota::new(3));
    let table = Table::new(funcref_table(2, None), None, "lean", Some(quota.clone())).unwrap();

    assert!(table.grow(2, None).is_err());
    assert_eq!(table.size(), 2);
    assert_eq!(quota.table_elems_used(), 2);
}

#[test]
fn destroying_a_table_refunds_its_quota() {
    let quota = Arc::new(ResourceQuota::new(10));
    let table = Table::new(funcref_table(4, None), None, "refunded", Some(quota.clone())).unwrap();
    assert_eq!(quota.table_elems_used(), 4);
    drop(table);
    assert_eq!(quota.table_elems_used(), 0);
}

#[test]
fn successful_grow_keeps_old_elements_and_nulls_new_ones() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);

    let table = Table::new(funcref_table(2, None), Some(f), "growing", None).unwrap();
    assert_eq!(table.grow(3, None).unwrap(), 2);
    assert_eq!(table.size(), 5);
    assert_eq!(table.get(0).unwrap(), Some(f));
    assert_eq!(table.get(1).unwrap(), Some(f));
    for index in 2..5 {
        assert_eq!(table.get(index).unwrap(), None);
    }
}

#[test]
fn null_and_uninitialized_are_distinguished() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);
    let compartment = Compartment::new();
    let table = compartment
        .create_table(funcref_table(2, None), Some(f), "scenario 3", None)
        .unwrap();
    let table_id = table.id().unwrap() as u32;
    let ctx = VMContext::new(compartment, instance.clone());

    assert_eq!(table.set(0, None).unwrap(), Some(f));
    assert_eq!(table.get(0).unwrap(), None);

    // `call_indirect` through index 0 loads the raw element and, after the
    // signature compare fails, reports it as uninitialized.
    let element = table.get_element(0).unwrap();
    let expected_signature = function(&instance, 0).signature();
    let trap = libcalls::call_indirect_fail(&ctx, 0, table_id, element, expected_signature);
    assert_eq!(trap.trap_code(), TrapCode::UninitializedElement);
}

#[test]
fn set_returns_the_previous_element() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);
    let g = function(&instance, 1);

    let table = Table::new(funcref_table(1, None), None, "swap", None).unwrap();
    assert_eq!(table.set(0, Some(f)).unwrap(), None);
    assert_eq!(table.set(0, Some(g)).unwrap(), Some(f));
    assert_eq!(table.get(0).unwrap(), Some(g));
}

#[test]
fn copy_with_overlap_iterates_descending() {
    let instance = test_instance(vec![]);
    let refs: Vec<Reference> = (0..4).map(|index| function(&instance, index)).collect();

    let table = Table::new(funcref_table(4, None), None, "scenario 4", None).unwrap();
    for (index, reference) in refs.iter().enumerate() {
        table.set(index as u32, Some(*reference)).unwrap();
    }

    // [A, B, C, D], copy(dest = 1, src = 0, n = 3) => [A, A, B, C].
    Table::copy(&table, &table, 1, 0, 3).unwrap();
    let expected = [refs[0], refs[0], refs[1], refs[2]];
    for (index, reference) in expected.iter().enumerate() {
        assert_eq!(table.get(index as u32).unwrap(), Some(*reference));
    }
}

#[test]
fn copy_of_identical_ranges_is_idempotent() {
    let instance = test_instance(vec![]);
    let refs: Vec<Reference> = (0..3).map(|index| function(&instance, index)).collect();

    let table = Table::new(funcref_table(3, None), None, "identity copy", None).unwrap();
    for (index, reference) in refs.iter().enumerate() {
        table.set(index as u32, Some(*reference)).unwrap();
    }
    Table::copy(&table, &table, 0, 0, 3).unwrap();
    for (index, reference) in refs.iter().enumerate() {
        assert_eq!(table.get(index as u32).unwrap(), Some(*reference));
    }
}

#[test]
fn shifting_up_and_back_down_restores_the_prefix() {
    let instance = test_instance(vec![]);
    let refs: Vec<Reference> = (0..3).map(|index| function(&instance, index)).collect();

    let table = Table::new(funcref_table(4, None), None, "shift", None).unwrap();
    for (index, reference) in refs.iter().enumerate() {
        table.set(index as u32, Some(*reference)).unwrap();
    }

    Table::copy(&table, &table, 1, 0, 3).unwrap();
    Table::copy(&table, &table, 0, 1, 3).unwrap();
    for (index, reference) in refs.iter().enumerate() {
        assert_eq!(table.get(index as u32).unwrap(), Some(*reference));
    }
}

#[test]
fn copy_out_of_bounds_traps() {
    let table = Table::new(funcref_table(2, None), None, "oob copy", None).unwrap();
    let err = Table::copy(&table, &table, 0, 1, 2).unwrap_err();
    assert_eq!(err.trap_code(), TrapCode::TableAccessOutOfBounds);
}

#[test]
fn fill_writes_every_slot_in_range() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);

    let table = Table::new(funcref_table(6, None), None, "filled", None).unwrap();
    table.fill(1, Some(f), 3).unwrap();
    assert_eq!(table.get(0).unwrap(), None);
    for index in 1..4 {
        assert_eq!(table.get(index).unwrap(), Some(f));
    }
    assert_eq!(table.get(4).unwrap(), None);

    // Filling with null resets the range to uninitialized.
    table.fill(1, None, 3).unwrap();
    for index in 1..4 {
        assert_eq!(table.get(index).unwrap(), None);
    }
}

#[test]
fn fill_past_the_size_traps() {
    let table = Table::new(funcref_table(2, None), None, "overfill", None).unwrap();
    let err = table.fill(1, None, 2).unwrap_err();
    assert_eq!(err.trap_code(), TrapCode::TableAccessOutOfBounds);
}

#[test]
fn init_with_an_out_of_range_source_modifies_nothing() {
    let instance = test_instance(vec![vec![
        Elem::RefFunc(FunctionIndex::from_u32(0)),
        Elem::RefFunc(FunctionIndex::from_u32(1)),
    ]]);
    let f = function(&instance, 2);

    let table = Table::new(funcref_table(4, None), Some(f), "scenario 5", None).unwrap();

    let err = instance
        .init_elem_segment(weft_types::ElemIndex::from_u32(0), &table, 0, 1, 2)
        .unwrap_err();
    assert_eq!(err.trap_code(), TrapCode::ElemSegmentAccessOutOfBounds);

    // No slot was touched.
    for index in 0..4 {
        assert_eq!(table.get(index).unwrap(), Some(f));
    }
}

#[test]
fn init_resolves_functions_and_nulls() {
    let instance = test_instance(vec![vec![
        Elem::RefFunc(FunctionIndex::from_u32(0)),
        Elem::RefNull,
        Elem::RefFunc(FunctionIndex::from_u32(1)),
    ]]);
    let table = Table::new(funcref_table(5, None), None, "initialized", None).unwrap();

    instance
        .init_elem_segment(weft_types::ElemIndex::from_u32(0), &table, 1, 0, 3)
        .unwrap();
    assert_eq!(table.get(1).unwrap(), Some(function(&instance, 0)));
    assert_eq!(table.get(2).unwrap(), None);
    assert_eq!(table.get(3).unwrap(), Some(function(&instance, 1)));
}

#[test]
fn cloned_tables_are_independent_and_share_the_id_slot() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);
    let g = function(&instance, 1);

    let source_compartment = Compartment::new();
    let source = source_compartment
        .create_table(funcref_table(3, None), Some(f), "cloned", None)
        .unwrap();
    source.set(1, Some(g)).unwrap();

    let new_compartment = Compartment::new();
    let clone = new_compartment.clone_table(&source).unwrap();

    assert_eq!(clone.id(), source.id());
    assert_eq!(clone.size(), source.size());
    assert_eq!(clone.get(0).unwrap(), Some(f));
    assert_eq!(clone.get(1).unwrap(), Some(g));
    assert_eq!(clone.get(2).unwrap(), Some(f));

    // Mutating the clone leaves the source alone, and vice versa.
    clone.set(0, None).unwrap();
    assert_eq!(source.get(0).unwrap(), Some(f));
    source.set(2, Some(g)).unwrap();
    assert_eq!(clone.get(2).unwrap(), Some(f));
}

#[test]
fn cloning_into_an_occupied_id_slot_fails() {
    let source_compartment = Compartment::new();
    let source = source_compartment
        .create_table(funcref_table(1, None), None, "original", None)
        .unwrap();

    let new_compartment = Compartment::new();
    new_compartment
        .create_table(funcref_table(1, None), None, "squatter", None)
        .unwrap();

    assert!(new_compartment.clone_table(&source).is_err());
}

#[test]
fn removing_a_table_clears_its_published_base() {
    let compartment = Compartment::new();
    let table = compartment
        .create_table(funcref_table(1, None), None, "published", None)
        .unwrap();
    let id = table.id().unwrap();
    assert_eq!(
        compartment.runtime_data().table_base(id),
        table.base_ptr().as_ptr()
    );

    let removed = compartment.remove_table(id).unwrap();
    assert!(Arc::ptr_eq(&removed, &table));
    assert!(compartment.runtime_data().table_base(id).is_null());
    assert!(compartment.table(id).is_none());
    assert_eq!(table.id(), None);
}

#[test]
fn addresses_resolve_to_their_owning_table() {
    let table = Table::new(funcref_table(2, None), None, "resolved", None).unwrap();
    let base = table.base_ptr().as_ptr() as usize;
    let element_size = std::mem::size_of::<usize>();

    let (owner, index) = is_address_owned_by_table(base).unwrap();
    assert!(Arc::ptr_eq(&owner, &table));
    assert_eq!(index, 0);

    let (_, index) = is_address_owned_by_table(base + 17 * element_size + 3).unwrap();
    assert_eq!(index, 17);

    // The guard page still resolves to the table, at an index past the
    // reservation's element count.
    let guard = base + (RESERVED_TABLE_ELEMENTS as usize) * element_size;
    let (_, index) = is_address_owned_by_table(guard).unwrap();
    assert_eq!(index, RESERVED_TABLE_ELEMENTS);

    let unrelated = &base as *const usize as usize;
    assert!(is_address_owned_by_table(unrelated).is_none());
}

#[test]
fn destroyed_tables_no_longer_resolve() {
    let table = Table::new(funcref_table(1, None), None, "ephemeral", None).unwrap();
    let base = table.base_ptr().as_ptr() as usize;
    drop(table);
    assert!(is_address_owned_by_table(base).is_none());
}

#[test]
fn libcalls_resolve_ids_against_the_context() {
    let instance = test_instance(vec![vec![
        Elem::RefFunc(FunctionIndex::from_u32(0)),
        Elem::RefFunc(FunctionIndex::from_u32(1)),
    ]]);
    let f = function(&instance, 0);
    let compartment = Compartment::new();
    let table = compartment
        .create_table(funcref_table(2, Some(6)), None, "guest", None)
        .unwrap();
    let table_id = table.id().unwrap() as u32;
    let ctx = VMContext::new(compartment, instance.clone());

    assert_eq!(libcalls::table_size(&ctx, table_id).unwrap(), 2);
    assert_eq!(libcalls::table_grow(&ctx, Some(f), 2, table_id).unwrap(), 2);
    assert_eq!(libcalls::table_size(&ctx, table_id).unwrap(), 4);

    // A grow past the maximum reports the guest-visible failure value
    // instead of trapping.
    assert_eq!(
        libcalls::table_grow(&ctx, None, 100, table_id).unwrap(),
        u32::MAX
    );

    libcalls::table_set(&ctx, 0, Some(f), table_id).unwrap();
    assert_eq!(libcalls::table_get(&ctx, 0, table_id).unwrap(), Some(f));

    libcalls::table_init(&ctx, 1, 0, 2, table_id, 0).unwrap();
    assert_eq!(
        libcalls::table_get(&ctx, 2, table_id).unwrap(),
        Some(function(&instance, 1))
    );

    libcalls::table_fill(&ctx, 2, None, 2, table_id).unwrap();
    assert_eq!(libcalls::table_get(&ctx, 2, table_id).unwrap(), None);

    libcalls::table_copy(&ctx, 3, 0, 1, table_id, table_id).unwrap();
    assert_eq!(libcalls::table_get(&ctx, 3, table_id).unwrap(), Some(f));

    libcalls::elem_drop(&ctx, 0).unwrap();
    assert_eq!(
        libcalls::table_init(&ctx, 0, 0, 1, table_id, 0)
            .unwrap_err()
            .trap_code(),
        TrapCode::InvalidArgument
    );

    // Unknown ids resolve to nothing.
    assert_eq!(
        libcalls::table_size(&ctx, 99).unwrap_err().trap_code(),
        TrapCode::InvalidArgument
    );
}

#[test]
fn call_indirect_failure_diagnoses_all_three_cases() {
    let instance = test_instance(vec![]);
    let f = function(&instance, 0);
    let g = function(&instance, 4); // (i32) -> (), a different signature
    let compartment = Compartment::new();
    let table = compartment
        .create_table(funcref_table(2, None), Some(f), "indirect", None)
        .unwrap();
    let table_id = table.id().unwrap() as u32;
    let ctx = VMContext::new(compartment, instance.clone());
    let expected_signature = f.signature();

    // Out of bounds: the loaded element is the out-of-bounds sentinel.
    let trap = libcalls::call_indirect_fail(
        &ctx,
        9,
        table_id,
        weft_vm::out_of_bounds_element(),
        expected_signature,
    );
    assert_eq!(trap.trap_code(), TrapCode::TableAccessOutOfBounds);

    // Uninitialized: a slot that was set to null.
    table.set(0, None).unwrap();
    let element = table.get_element(0).unwrap();
    let trap = libcalls::call_indirect_fail(&ctx, 0, table_id, element, expected_signature);
    assert_eq!(trap.trap_code(), TrapCode::UninitializedElement);

    // Mismatch: a live function whose signature differs from the expected
    // one.
    table.set(1, Some(g)).unwrap();
    let element = table.get_element(1).unwrap();
    assert_ne!(element.signature(), expected_signature);
    let trap = libcalls::call_indirect_fail(&ctx, 1, table_id, element, expected_signature);
    assert_eq!(trap.trap_code(), TrapCode::BadSignature);
}
