use crate::array::BoxArray;
use crate::dict::{dict_lookup, PropertyDict, PropertyDescriptor};
use crate::scope::{is_hash_object_format, HashObject};
use crate::{HeapHeader, ValBox};

/// Stack-allocated linked list for cycle detection.
///
/// Each node lives on a recursive call's stack frame and points to the
/// caller's node. Every node outlives its callees, so the raw pointer
/// chain stays valid for the duration of a lookup.
struct VisitedLink {
    value: ValBox,
    prev: *const VisitedLink,
}

impl VisitedLink {
    #[inline]
    fn contains(mut link: *const Self, target: ValBox) -> bool {
        while !link.is_null() {
            // SAFETY: all nodes are stack-allocated in the recursion
            // chain and remain valid for the duration of the lookup.
            let node = unsafe { &*link };
            if node.value.raw() == target.raw() {
                return true;
            }
            link = node.prev;
        }
        false
    }
}

/// The result of a property lookup.
#[derive(Debug, Clone, Copy)]
pub enum LookupOutcome {
    /// Name was not found anywhere along the delegate graph.
    NotFound,
    /// Name was found.
    Found {
        /// The object whose own dictionary holds the binding (may
        /// differ from the receiver when found via a delegate).
        holder: ValBox,
        /// Copy of the matching descriptor.
        descriptor: PropertyDescriptor,
    },
}

/// Look up `name` on `receiver`: the object's own dictionary first,
/// then its delegates depth-first in order, first match wins.
///
/// A `Method` descriptor in the result is not yet invocable; the caller
/// reifies it into a function object bound to `holder`'s receiver.
///
/// # Safety
///
/// - `receiver` must be a valid tagged reference to a hash-backed
///   object; `name` must be a string value.
/// - All objects reachable through delegate lists must be live.
pub unsafe fn lookup_property(
    receiver: ValBox,
    name: ValBox,
    spoiler: u64,
) -> LookupOutcome {
    lookup_inner(receiver, name, spoiler, core::ptr::null())
}

unsafe fn lookup_inner(
    receiver: ValBox,
    name: ValBox,
    spoiler: u64,
    visited: *const VisitedLink,
) -> LookupOutcome {
    if !receiver.is_object_ref() {
        return LookupOutcome::NotFound;
    }
    let header: &HeapHeader = receiver.as_ref();
    if !is_hash_object_format(header.format()) {
        return LookupOutcome::NotFound;
    }
    if VisitedLink::contains(visited, receiver) {
        return LookupOutcome::NotFound;
    }

    let obj: &HashObject = receiver.as_ref();

    // Own dictionary first.
    let dict: &PropertyDict = obj.dict.as_ref();
    if let Some(descriptor) = dict_lookup(dict, name, spoiler) {
        return LookupOutcome::Found {
            holder: receiver,
            descriptor,
        };
    }

    // Delegate walk, depth-first, first match wins.
    let link = VisitedLink {
        value: receiver,
        prev: visited,
    };
    let delegates: &BoxArray = obj.delegates.as_ref();
    for i in 0..delegates.len() {
        let delegate = delegates.at(i);
        match lookup_inner(delegate, name, spoiler, &link) {
            LookupOutcome::NotFound => continue,
            found => return found,
        }
    }

    LookupOutcome::NotFound
}
