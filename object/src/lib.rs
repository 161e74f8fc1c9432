mod array;
mod dict;
mod handle;
mod header;
mod lookup;
mod scope;
mod string;
mod value;

pub use array::{
    box_array_allocation_size, init_box_array, init_packed_syntax_tree,
    init_u32_array, u32_array_allocation_size, BoxArray, PackedSyntaxTree,
    U32Array,
};
pub use dict::{
    dict_allocation_size, dict_insert, dict_lookup, dict_reinsert,
    init_property_dict, DescriptorKind, DictEntry, InsertOutcome,
    PropertyDescriptor, PropertyDict,
};
pub use handle::Tagged;
pub use header::{words_for_bytes, Generation, HeaderFlags, HeapFormat, HeapHeader};
pub use lookup::{lookup_property, LookupOutcome};
pub use scope::{
    init_hash_object, is_hash_object_format, is_scope_format, HashObject,
};
pub use string::{
    compare_values, init_heap_double, init_heap_string, number_value,
    string_allocation_size, string_cmp, string_eq, string_hash, string_len,
    string_to_rust, string_unit, utf16_units, HeapDouble, HeapString,
    STRING_INTERNED,
};
pub use value::ValBox;

#[cfg(test)]
mod tests {
    use super::*;
    use core::cmp::Ordering;

    fn buffer(words: usize) -> Box<[u64]> {
        vec![0u64; words].into_boxed_slice()
    }

    // ── ValBox tagging ─────────────────────────────────────────────

    fn predicate_count(v: ValBox) -> usize {
        [
            v.is_undefined(),
            v.is_null(),
            v.is_bool(),
            v.is_int32(),
            v.is_immediate_double(),
            v.is_str8(),
            v.is_str16(),
            v.is_object_ref(),
            v.is_heap_string_ref(),
            v.is_heap_double_ref(),
            v.is_magic(),
        ]
        .iter()
        .filter(|&&p| p)
        .count()
    }

    #[test]
    fn exactly_one_predicate_holds() {
        let buf = buffer(2);
        let ptr = buf.as_ptr();
        for v in [
            ValBox::undefined(),
            ValBox::null(),
            ValBox::bool(true),
            ValBox::bool(false),
            ValBox::int32(0),
            ValBox::int32(-1),
            ValBox::immediate_double(1.5),
            ValBox::str8(b"abc"),
            ValBox::str16(&[0x2603]),
            ValBox::object_ref(ptr),
            ValBox::heap_string_ref(ptr),
            ValBox::heap_double_ref(ptr),
            ValBox::magic(7),
        ] {
            assert_eq!(predicate_count(v), 1, "{v:?}");
            assert!(v.is_valid());
        }
    }

    #[test]
    fn int32_round_trip() {
        for n in [0, 1, -1, 42, i32::MAX, i32::MIN] {
            let v = ValBox::int32(n);
            assert!(v.is_int32());
            assert!(v.is_number());
            assert_eq!(v.as_int32(), n);
        }
    }

    #[test]
    fn str8_round_trip() {
        for s in ["", "a", "abc", "1234567"] {
            let v = ValBox::str8(s.as_bytes());
            assert!(v.is_str8());
            assert!(v.is_string());
            assert_eq!(v.str8_len(), s.len());
            let bytes: Vec<u8> =
                (0..v.str8_len()).map(|i| v.str8_byte(i)).collect();
            assert_eq!(&bytes, s.as_bytes());
        }
    }

    #[test]
    fn str16_round_trip() {
        let units = [0x2603u16, 0x0041, 0xFFFF];
        let v = ValBox::str16(&units);
        assert_eq!(v.str16_len(), 3);
        for (i, &u) in units.iter().enumerate() {
            assert_eq!(v.str16_unit(i), u);
        }
    }

    #[test]
    fn immediate_double_round_trip() {
        for d in [1.0, -1.0, 1.5, -2.25, 3.141592653589793, 1e30, -1e-30] {
            assert!(ValBox::fits_immediate_double(d), "{d}");
            let v = ValBox::immediate_double(d);
            assert!(v.is_immediate_double());
            assert!(v.is_number());
            assert_eq!(v.as_immediate_double(), d);
        }
    }

    #[test]
    fn extreme_doubles_are_not_immediate() {
        for d in [0.0, -0.0, f64::NAN, f64::INFINITY, f64::MIN_POSITIVE, 1e300] {
            assert!(!ValBox::fits_immediate_double(d), "{d}");
        }
    }

    #[test]
    fn int32_and_double_encodings_are_disjoint() {
        let a = ValBox::int32(1);
        let b = ValBox::immediate_double(1.0);
        assert_ne!(a.raw(), b.raw());
        assert!(!a.is_immediate_double());
        assert!(!b.is_int32());
    }

    #[test]
    fn ref_subtags() {
        let buf = buffer(2);
        let ptr = buf.as_ptr();
        let o = ValBox::object_ref(ptr);
        let s = ValBox::heap_string_ref(ptr);
        let d = ValBox::heap_double_ref(ptr);
        for v in [o, s, d] {
            assert!(v.is_ref());
            assert_eq!(v.ref_bits(), ptr as u64);
        }
        assert!(s.is_string());
        assert!(d.is_number());
    }

    #[test]
    fn with_ptr_preserves_subtag() {
        let a = buffer(2);
        let b = buffer(2);
        let v = ValBox::heap_string_ref(a.as_ptr());
        let moved = v.with_ptr(b.as_ptr() as *mut u8);
        assert!(moved.is_heap_string_ref());
        assert_eq!(moved.ref_bits(), b.as_ptr() as u64);
    }

    // ── Header ─────────────────────────────────────────────────────

    #[test]
    fn header_packing() {
        let mut h = HeapHeader::new(HeapFormat::PropertyDict, 12);
        assert_eq!(h.format(), HeapFormat::PropertyDict);
        assert_eq!(h.size_in_words(), 12);
        assert_eq!(h.size_in_bytes(), 96);
        assert_eq!(h.generation(), Generation::Hatchery);
        assert_eq!(h.user_data(), 0);

        h.set_user_data(0x5A);
        h.set_generation(Generation::Nursery);
        h.set_marked();
        h.set_forwarded();
        h.set_remembered();
        assert_eq!(h.user_data(), 0x5A);
        assert_eq!(h.generation(), Generation::Nursery);
        assert!(h.is_marked() && h.is_forwarded() && h.is_remembered());
        assert_eq!(h.format(), HeapFormat::PropertyDict);
        assert_eq!(h.size_in_words(), 12);

        h.clear_marked();
        h.clear_remembered();
        assert!(!h.is_marked());
        assert!(!h.is_remembered());
        assert!(h.is_forwarded());
    }

    #[test]
    fn header_flags() {
        let mut h = HeapHeader::new(HeapFormat::BoxArray, 2);
        assert!(!h.has_flag(HeaderFlags::MARKED));

        h.add_flag(HeaderFlags::MARKED);
        assert!(h.has_flag(HeaderFlags::MARKED));

        h.add_flag(HeaderFlags::REMEMBERED);
        assert!(h.has_flag(HeaderFlags::MARKED));
        assert!(h.has_flag(HeaderFlags::REMEMBERED));

        h.remove_flag(HeaderFlags::MARKED);
        assert!(!h.has_flag(HeaderFlags::MARKED));
        assert!(h.has_flag(HeaderFlags::REMEMBERED));
        assert_eq!(h.flags(), HeaderFlags::REMEMBERED);

        h.set_flags(HeaderFlags::FORWARDED | HeaderFlags::SINGLETON);
        assert_eq!(h.flags(), HeaderFlags::FORWARDED | HeaderFlags::SINGLETON);

        // Flag traffic never disturbs the packed fields around it.
        assert_eq!(h.format(), HeapFormat::BoxArray);
        assert_eq!(h.size_in_words(), 2);
        assert_eq!(h.generation(), Generation::Hatchery);
    }

    #[test]
    fn generation_promotion_order() {
        assert_eq!(Generation::Hatchery.next(), Generation::Nursery);
        assert_eq!(Generation::Nursery.next(), Generation::Tenured);
        assert_eq!(Generation::Tenured.next(), Generation::Tenured);
    }

    // ── Strings ────────────────────────────────────────────────────

    #[test]
    fn heap_string_round_trip() {
        let units = utf16_units("hello, packed world");
        let mut buf = buffer(words_for_bytes(string_allocation_size(units.len())) as usize);
        let ptr = buf.as_mut_ptr() as *mut HeapString;
        unsafe {
            init_heap_string(ptr, units.len());
            let dst = ptr.add(1) as *mut u16;
            core::ptr::copy_nonoverlapping(units.as_ptr(), dst, units.len());
            let v = ValBox::heap_string_ref(ptr);
            assert!(v.is_string());
            assert_eq!(string_len(v), units.len());
            assert_eq!(string_to_rust(v), "hello, packed world");
            assert!(string_eq(v, v));
        }
    }

    #[test]
    fn string_equality_across_representations() {
        let units = utf16_units("abc");
        let mut buf = buffer(words_for_bytes(string_allocation_size(3)) as usize);
        let ptr = buf.as_mut_ptr() as *mut HeapString;
        unsafe {
            init_heap_string(ptr, units.len());
            let dst = ptr.add(1) as *mut u16;
            core::ptr::copy_nonoverlapping(units.as_ptr(), dst, units.len());
            let heap = ValBox::heap_string_ref(ptr);
            let imm = ValBox::str8(b"abc");
            assert!(string_eq(heap, imm));
            assert!(string_eq(imm, heap));
            assert!(!string_eq(imm, ValBox::str8(b"abd")));
            assert_eq!(string_cmp(imm, heap), Ordering::Equal);
            assert_eq!(string_cmp(ValBox::str8(b"abd"), heap), Ordering::Greater);
        }
    }

    #[test]
    fn string_hash_respects_spoiler() {
        unsafe {
            let v = ValBox::str8(b"name");
            assert_eq!(string_hash(v, 17), string_hash(v, 17));
            assert_ne!(string_hash(v, 17), string_hash(v, 18));
        }
    }

    #[test]
    fn cross_category_comparison_is_undefined() {
        unsafe {
            assert!(compare_values(ValBox::int32(1), ValBox::str8(b"1")).is_none());
            assert_eq!(
                compare_values(ValBox::int32(2), ValBox::int32(3)),
                Some(Ordering::Less)
            );
            assert_eq!(
                compare_values(ValBox::int32(2), ValBox::immediate_double(2.0)),
                Some(Ordering::Equal)
            );
        }
    }

    // ── Dict ───────────────────────────────────────────────────────

    #[test]
    fn dict_insert_lookup_replace() {
        const CAP: usize = 8;
        let mut buf = buffer(words_for_bytes(dict_allocation_size(CAP)) as usize);
        let ptr = buf.as_mut_ptr() as *mut PropertyDict;
        let spoiler = 99;
        unsafe {
            init_property_dict(ptr, CAP);
            let dict = &mut *ptr;
            let name = ValBox::str8(b"x");
            assert!(dict_lookup(dict, name, spoiler).is_none());

            let desc = PropertyDescriptor::make_slot(ValBox::int32(3), true);
            assert_eq!(dict_insert(dict, name, desc, spoiler), InsertOutcome::Done);
            let found = dict_lookup(dict, name, spoiler).expect("bound");
            assert!(found.is_value());
            assert!(found.writable);
            assert_eq!(found.value.as_int32(), 3);

            // Replacement keeps used count stable.
            let ro = PropertyDescriptor::make_slot(ValBox::int32(4), false);
            assert_eq!(dict_insert(dict, name, ro, spoiler), InsertOutcome::Done);
            assert_eq!(dict.used(), 1);
            let found = dict_lookup(dict, name, spoiler).expect("bound");
            assert!(!found.writable);
            assert_eq!(found.value.as_int32(), 4);
        }
    }

    #[test]
    fn dict_reports_grow_at_load_limit() {
        const CAP: usize = 4;
        let mut buf = buffer(words_for_bytes(dict_allocation_size(CAP)) as usize);
        let ptr = buf.as_mut_ptr() as *mut PropertyDict;
        unsafe {
            init_property_dict(ptr, CAP);
            let dict = &mut *ptr;
            let desc = PropertyDescriptor::make_slot(ValBox::int32(0), true);
            for name in [b"a", b"b", b"c"] {
                assert_eq!(
                    dict_insert(dict, ValBox::str8(name), desc, 1),
                    InsertOutcome::Done
                );
            }
            assert_eq!(
                dict_insert(dict, ValBox::str8(b"d"), desc, 1),
                InsertOutcome::NeedsGrow
            );
        }
    }

    // ── Lookup over delegates ──────────────────────────────────────

    struct TestScope {
        _dict_buf: Box<[u64]>,
        _delegates_buf: Box<[u64]>,
        _obj_buf: Box<[u64]>,
        obj: ValBox,
        dict: *mut PropertyDict,
        delegates: *mut BoxArray,
    }

    fn make_scope(delegates: &[ValBox]) -> TestScope {
        const CAP: usize = 8;
        let mut dict_buf = buffer(words_for_bytes(dict_allocation_size(CAP)) as usize);
        let mut delegates_buf =
            buffer(words_for_bytes(box_array_allocation_size(delegates.len())) as usize);
        let mut obj_buf = buffer(3);
        unsafe {
            let dict = dict_buf.as_mut_ptr() as *mut PropertyDict;
            init_property_dict(dict, CAP);
            let arr = delegates_buf.as_mut_ptr() as *mut BoxArray;
            init_box_array(arr, delegates.len());
            for (i, &d) in delegates.iter().enumerate() {
                (*arr).set(i, d);
            }
            let obj = obj_buf.as_mut_ptr() as *mut HashObject;
            init_hash_object(
                obj,
                HeapFormat::CallScope,
                ValBox::object_ref(arr),
                ValBox::object_ref(dict),
            );
            TestScope {
                _dict_buf: dict_buf,
                _delegates_buf: delegates_buf,
                _obj_buf: obj_buf,
                obj: ValBox::object_ref(obj),
                dict,
                delegates: arr,
            }
        }
    }

    #[test]
    fn lookup_walks_delegates_in_order() {
        let spoiler = 5;
        let grandparent = make_scope(&[]);
        let parent = make_scope(&[grandparent.obj]);
        let child = make_scope(&[parent.obj]);

        let name = ValBox::str8(b"n");
        unsafe {
            dict_insert(
                &mut *grandparent.dict,
                name,
                PropertyDescriptor::make_slot(ValBox::int32(1), true),
                spoiler,
            );
            match lookup_property(child.obj, name, spoiler) {
                LookupOutcome::Found { holder, descriptor } => {
                    assert_eq!(holder.raw(), grandparent.obj.raw());
                    assert_eq!(descriptor.value.as_int32(), 1);
                }
                LookupOutcome::NotFound => panic!("expected delegate hit"),
            }

            // Shadowing: the nearer binding wins.
            dict_insert(
                &mut *parent.dict,
                name,
                PropertyDescriptor::make_slot(ValBox::int32(2), true),
                spoiler,
            );
            match lookup_property(child.obj, name, spoiler) {
                LookupOutcome::Found { holder, descriptor } => {
                    assert_eq!(holder.raw(), parent.obj.raw());
                    assert_eq!(descriptor.value.as_int32(), 2);
                }
                LookupOutcome::NotFound => panic!("expected delegate hit"),
            }
        }
    }

    #[test]
    fn lookup_survives_delegate_cycles() {
        let spoiler = 5;
        let a = make_scope(&[ValBox::undefined()]);
        let b = make_scope(&[a.obj]);
        unsafe {
            // Close the cycle: a delegates back to b.
            (*a.delegates).set(0, b.obj);
            match lookup_property(b.obj, ValBox::str8(b"missing"), spoiler) {
                LookupOutcome::NotFound => {}
                _ => panic!("expected miss"),
            }
            // A binding on the far side of the cycle is still found.
            dict_insert(
                &mut *a.dict,
                ValBox::str8(b"hit"),
                PropertyDescriptor::make_slot(ValBox::int32(9), true),
                spoiler,
            );
            match lookup_property(b.obj, ValBox::str8(b"hit"), spoiler) {
                LookupOutcome::Found { descriptor, .. } => {
                    assert_eq!(descriptor.value.as_int32(), 9);
                }
                LookupOutcome::NotFound => panic!("expected hit"),
            }
        }
    }
}
